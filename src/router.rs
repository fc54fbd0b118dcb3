//! Method-aware radix-tree router.
//!
//! One [`matchit::Router`] per HTTP method, plus the dispatch policy knobs
//! that decide what happens when a path does not match outright: automatic
//! `OPTIONS` answers, trailing-slash and cleaned-path redirects, and `405
//! Method Not Allowed` detection.
//!
//! Route syntax follows matchit: `{name}` captures one segment,
//! `{*name}` captures the rest of the path.

use std::collections::HashMap;

use http::{Method, StatusCode};

use crate::chain::Pipeline;
use crate::context::Params;

/// The outcome of routing one request.
#[derive(Clone)]
pub(crate) enum Resolution {
    /// A route matched; run its pipeline.
    Matched { pipeline: Pipeline, params: Params },
    /// The path matches under a different spelling; redirect the client.
    Redirect { location: String, status: StatusCode },
    /// Automatic `OPTIONS` answer listing the allowed methods.
    Options { allow: String },
    /// The path exists but not for this method.
    MethodNotAllowed { allow: String },
    NotFound,
}

/// Routing table plus dispatch policy.
pub struct Router {
    methods: HashMap<Method, matchit::Router<Pipeline>>,
    /// Redirect `/path/` to `/path` (and vice versa) when only the other
    /// spelling is registered.
    pub redirect_trailing_slash: bool,
    /// Redirect to the cleaned path (`//a/../b` to `/b`) when that matches.
    pub redirect_fixed_path: bool,
    /// Answer `OPTIONS` requests automatically with an `Allow` header.
    pub handle_options: bool,
    /// Answer with `405` and an `Allow` header instead of `404` when the
    /// path is registered for other methods.
    pub handle_method_not_allowed: bool,
    not_found: Option<Pipeline>,
    method_not_allowed: Option<Pipeline>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
            redirect_trailing_slash: true,
            redirect_fixed_path: true,
            handle_options: true,
            handle_method_not_allowed: true,
            not_found: None,
            method_not_allowed: None,
        }
    }

    /// Registers `pipeline` for `method` and `path`.
    ///
    /// # Panics
    ///
    /// Panics when `path` conflicts with an already registered route. Routes
    /// are registered at startup; a conflicting table is a programming error
    /// worth failing loudly for.
    pub(crate) fn register(&mut self, method: Method, path: &str, pipeline: Pipeline) {
        if let Err(e) = self
            .methods
            .entry(method.clone())
            .or_insert_with(matchit::Router::new)
            .insert(path, pipeline)
        {
            panic!("invalid route {method} {path}: {e}");
        }
    }

    pub(crate) fn set_not_found(&mut self, pipeline: Pipeline) {
        self.not_found = Some(pipeline);
    }

    pub(crate) fn set_method_not_allowed(&mut self, pipeline: Pipeline) {
        self.method_not_allowed = Some(pipeline);
    }

    pub(crate) fn not_found(&self) -> Option<Pipeline> {
        self.not_found.clone()
    }

    pub(crate) fn method_not_allowed(&self) -> Option<Pipeline> {
        self.method_not_allowed.clone()
    }

    /// Routes one request to an outcome. Pure lookup, no handler runs here.
    pub(crate) fn resolve(&self, method: &Method, path: &str) -> Resolution {
        if let Some(table) = self.methods.get(method)
            && let Ok(matched) = table.at(path)
        {
            let params = matched
                .params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            return Resolution::Matched {
                pipeline: matched.value.clone(),
                params,
            };
        }

        if *method == Method::OPTIONS && self.handle_options {
            let allow = self.allowed_methods(path);
            if !allow.is_empty() {
                return Resolution::Options { allow };
            }
        }

        if self.redirect_trailing_slash
            && let Some(alternate) = toggle_trailing_slash(path)
            && self.path_matches(method, &alternate)
        {
            return Resolution::Redirect {
                location: alternate,
                status: redirect_status(method),
            };
        }

        if self.redirect_fixed_path {
            let cleaned = clean_path(path);
            if cleaned != path && self.path_matches(method, &cleaned) {
                return Resolution::Redirect {
                    location: cleaned,
                    status: redirect_status(method),
                };
            }
        }

        if self.handle_method_not_allowed {
            let allow = self.allowed_methods(path);
            if !allow.is_empty() {
                return Resolution::MethodNotAllowed { allow };
            }
        }

        Resolution::NotFound
    }

    fn path_matches(&self, method: &Method, path: &str) -> bool {
        self.methods
            .get(method)
            .is_some_and(|table| table.at(path).is_ok())
    }

    /// Comma-separated list of methods registered for `path`, for the
    /// `Allow` header. Empty when no method matches.
    pub(crate) fn allowed_methods(&self, path: &str) -> String {
        let mut allowed: Vec<&str> = self
            .methods
            .iter()
            .filter(|(_, table)| table.at(path).is_ok())
            .map(|(method, _)| method.as_str())
            .collect();
        if allowed.is_empty() {
            return String::new();
        }
        allowed.sort_unstable();
        let mut allow = allowed.join(", ");
        if self.handle_options && !allowed.contains(&Method::OPTIONS.as_str()) {
            allow.push_str(", OPTIONS");
        }
        allow
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn redirect_status(method: &Method) -> StatusCode {
    if *method == Method::GET {
        StatusCode::MOVED_PERMANENTLY
    } else {
        StatusCode::TEMPORARY_REDIRECT
    }
}

/// The other spelling of `path`: with the trailing slash removed, or added.
/// `None` for the root path.
fn toggle_trailing_slash(path: &str) -> Option<String> {
    if path == "/" || path.is_empty() {
        return None;
    }
    if let Some(stripped) = path.strip_suffix('/') {
        Some(stripped.to_string())
    } else {
        Some(format!("{path}/"))
    }
}

/// Lexically cleans `path`: collapses repeated slashes and resolves `.` and
/// `..` segments. Always returns a rooted path; a trailing slash survives.
pub(crate) fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let trailing = path.len() > 1 && path.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    let mut cleaned = String::with_capacity(path.len());
    cleaned.push('/');
    cleaned.push_str(&segments.join("/"));
    if trailing && cleaned.len() > 1 {
        cleaned.push('/');
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::context::Context;

    fn noop_pipeline() -> Pipeline {
        Chain::new().then(|_ctx: Context| async {})
    }

    fn router_with(routes: &[(Method, &str)]) -> Router {
        let mut router = Router::new();
        for (method, path) in routes {
            router.register(method.clone(), path, noop_pipeline());
        }
        router
    }

    #[test]
    fn matches_and_extracts_params() {
        let router = router_with(&[(Method::GET, "/users/{id}")]);
        match router.resolve(&Method::GET, "/users/42") {
            Resolution::Matched { params, .. } => assert_eq!(params["id"], "42"),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn wildcard_captures_the_rest() {
        let router = router_with(&[(Method::GET, "/assets/{*filepath}")]);
        match router.resolve(&Method::GET, "/assets/css/site.css") {
            Resolution::Matched { params, .. } => {
                assert_eq!(params["filepath"], "css/site.css");
            }
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn unknown_path_is_not_found() {
        let router = router_with(&[(Method::GET, "/users")]);
        assert!(matches!(
            router.resolve(&Method::GET, "/missing"),
            Resolution::NotFound
        ));
    }

    #[test]
    fn wrong_method_is_405_with_allow() {
        let router = router_with(&[(Method::GET, "/users"), (Method::POST, "/users")]);
        match router.resolve(&Method::DELETE, "/users") {
            Resolution::MethodNotAllowed { allow } => {
                assert_eq!(allow, "GET, POST, OPTIONS");
            }
            _ => panic!("expected 405"),
        }
    }

    #[test]
    fn wrong_method_is_404_when_disabled() {
        let mut router = router_with(&[(Method::GET, "/users")]);
        router.handle_method_not_allowed = false;
        assert!(matches!(
            router.resolve(&Method::DELETE, "/users"),
            Resolution::NotFound
        ));
    }

    #[test]
    fn options_is_answered_automatically() {
        let router = router_with(&[(Method::GET, "/users")]);
        match router.resolve(&Method::OPTIONS, "/users") {
            Resolution::Options { allow } => assert_eq!(allow, "GET, OPTIONS"),
            _ => panic!("expected an OPTIONS answer"),
        }
    }

    #[test]
    fn explicit_options_route_wins_over_automatic() {
        let router = router_with(&[(Method::OPTIONS, "/users")]);
        assert!(matches!(
            router.resolve(&Method::OPTIONS, "/users"),
            Resolution::Matched { .. }
        ));
    }

    #[test]
    fn trailing_slash_redirects() {
        let router = router_with(&[(Method::GET, "/users")]);
        match router.resolve(&Method::GET, "/users/") {
            Resolution::Redirect { location, status } => {
                assert_eq!(location, "/users");
                assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
            }
            _ => panic!("expected a redirect"),
        }
    }

    #[test]
    fn trailing_slash_redirect_is_307_for_post() {
        let router = router_with(&[(Method::POST, "/users/")]);
        match router.resolve(&Method::POST, "/users") {
            Resolution::Redirect { location, status } => {
                assert_eq!(location, "/users/");
                assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
            }
            _ => panic!("expected a redirect"),
        }
    }

    #[test]
    fn fixed_path_redirects_to_the_cleaned_path() {
        let router = router_with(&[(Method::GET, "/users")]);
        match router.resolve(&Method::GET, "//users/../users") {
            Resolution::Redirect { location, .. } => assert_eq!(location, "/users"),
            _ => panic!("expected a redirect"),
        }
    }

    #[test]
    fn redirects_can_be_disabled() {
        let mut router = router_with(&[(Method::GET, "/users")]);
        router.redirect_trailing_slash = false;
        router.redirect_fixed_path = false;
        assert!(matches!(
            router.resolve(&Method::GET, "/users/"),
            Resolution::NotFound
        ));
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic() {
        let mut router = router_with(&[(Method::GET, "/users/{id}")]);
        router.register(Method::GET, "/users/{name}", noop_pipeline());
    }

    #[test]
    fn clean_path_normalizes() {
        assert_eq!(clean_path(""), "/");
        assert_eq!(clean_path("/"), "/");
        assert_eq!(clean_path("//a//b"), "/a/b");
        assert_eq!(clean_path("/a/./b"), "/a/b");
        assert_eq!(clean_path("/a/../b"), "/b");
        assert_eq!(clean_path("/a/b/"), "/a/b/");
        assert_eq!(clean_path("/../a"), "/a");
    }
}
