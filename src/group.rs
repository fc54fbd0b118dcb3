//! Route groups.
//!
//! A [`RouteGroup`] pairs a path prefix with a middleware [`Chain`] and a
//! shared routing table. Registering a handler joins the group prefix with
//! the relative path, seals the group's chain around the handler and stores
//! the resulting pipeline in the router. The pipeline is a snapshot:
//! middleware added to the group afterwards only affects routes registered
//! afterwards.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use http::{Method, StatusCode};
use parking_lot::RwLock;

use crate::chain::Chain;
use crate::context::Context;
use crate::handler::Handler;
use crate::router::Router;

/// A path-prefixed view onto the routing table with its own middleware
/// chain.
#[derive(Clone)]
pub struct RouteGroup {
    path: String,
    chain: Chain,
    router: Arc<RwLock<Router>>,
}

impl RouteGroup {
    pub(crate) fn new(path: impl Into<String>, router: Arc<RwLock<Router>>) -> Self {
        Self {
            path: path.into(),
            chain: Chain::new(),
            router,
        }
    }

    /// The group's absolute path prefix.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Appends `middleware` to this group's chain. Routes already registered
    /// keep their pipeline; only future registrations see the middleware.
    pub fn use_middleware(&mut self, middleware: impl Handler) {
        self.chain = self.chain.append(middleware);
    }

    /// Returns a copy of this group with `middleware` appended, leaving the
    /// receiver unchanged. Handy for one-off protected routes:
    ///
    /// ```text
    /// api.with(require_auth).get("/admin", admin_panel);
    /// ```
    #[must_use = "with returns a new group and leaves the receiver unchanged"]
    pub fn with(&self, middleware: impl Handler) -> Self {
        Self {
            path: self.path.clone(),
            chain: self.chain.append(middleware),
            router: Arc::clone(&self.router),
        }
    }

    /// Creates a sub-group at `relative_path`, inheriting this group's chain
    /// as it stands right now.
    #[must_use = "group returns the new sub-group"]
    pub fn group(&self, relative_path: &str) -> Self {
        Self {
            path: join_paths(&self.path, relative_path),
            chain: self.chain.clone(),
            router: Arc::clone(&self.router),
        }
    }

    /// Registers `handler` for `method` under the group prefix.
    ///
    /// # Panics
    ///
    /// Panics when the resulting path conflicts with an existing route.
    pub fn handle(&self, method: Method, relative_path: &str, handler: impl Handler) {
        let path = join_paths(&self.path, relative_path);
        let pipeline = self.chain.then(handler);
        tracing::debug!(%method, %path, handlers = pipeline.len(), "route registered");
        self.router.write().register(method, &path, pipeline);
    }

    pub fn get(&self, relative_path: &str, handler: impl Handler) {
        self.handle(Method::GET, relative_path, handler);
    }

    pub fn post(&self, relative_path: &str, handler: impl Handler) {
        self.handle(Method::POST, relative_path, handler);
    }

    pub fn put(&self, relative_path: &str, handler: impl Handler) {
        self.handle(Method::PUT, relative_path, handler);
    }

    pub fn delete(&self, relative_path: &str, handler: impl Handler) {
        self.handle(Method::DELETE, relative_path, handler);
    }

    pub fn patch(&self, relative_path: &str, handler: impl Handler) {
        self.handle(Method::PATCH, relative_path, handler);
    }

    pub fn head(&self, relative_path: &str, handler: impl Handler) {
        self.handle(Method::HEAD, relative_path, handler);
    }

    pub fn options(&self, relative_path: &str, handler: impl Handler) {
        self.handle(Method::OPTIONS, relative_path, handler);
    }

    /// Serves a single file at `relative_path` for `GET` and `HEAD`.
    pub fn static_file(&self, relative_path: &str, file: impl Into<PathBuf>) {
        let file = Arc::new(file.into());
        let handler = move |ctx: Context| {
            let file = Arc::clone(&file);
            async move { serve_file(&ctx, &file).await }
        };
        self.get(relative_path, handler.clone());
        self.head(relative_path, handler);
    }

    /// Serves the files under `dir` at `relative_path/{*filepath}` for
    /// `GET` and `HEAD`. Requests escaping `dir` (via `..` or absolute
    /// segments) answer `404`.
    pub fn static_dir(&self, relative_path: &str, dir: impl Into<PathBuf>) {
        let root = Arc::new(dir.into());
        let pattern = format!("{}/{{*filepath}}", relative_path.trim_end_matches('/'));
        let handler = move |ctx: Context| {
            let root = Arc::clone(&root);
            async move {
                let requested = ctx.param("filepath").unwrap_or_default().to_string();
                match resolve_under(&root, &requested) {
                    Some(path) => serve_file(&ctx, &path).await,
                    None => not_found(&ctx),
                }
            }
        };
        self.get(&pattern, handler.clone());
        self.head(&pattern, handler);
    }
}

/// Joins a group prefix and a relative path into one rooted path. A trailing
/// slash on `relative` survives, so `/users/` stays distinct from `/users`.
fn join_paths(base: &str, relative: &str) -> String {
    let segments: Vec<&str> = base
        .split('/')
        .chain(relative.split('/'))
        .filter(|s| !s.is_empty())
        .collect();
    let mut joined = String::with_capacity(base.len() + relative.len() + 1);
    joined.push('/');
    joined.push_str(&segments.join("/"));
    if relative.ends_with('/') && joined.len() > 1 {
        joined.push('/');
    }
    joined
}

/// Maps `requested` below `root`, rejecting anything that could escape it.
fn resolve_under(root: &Path, requested: &str) -> Option<PathBuf> {
    let relative = Path::new(requested);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

async fn serve_file(ctx: &Context, path: &Path) {
    let Ok(contents) = tokio::fs::read(path).await else {
        not_found(ctx);
        return;
    };
    let content_type = content_type_for(path);
    if *ctx.method() == Method::HEAD {
        ctx.set_header("content-type", content_type);
        ctx.write_status(StatusCode::OK);
    } else {
        ctx.data(StatusCode::OK, content_type, &contents);
    }
}

fn not_found(ctx: &Context) {
    ctx.string(StatusCode::NOT_FOUND, "Not Found");
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}
