//! Application facade.
//!
//! [`App`] ties the pieces together: it owns the routing table, acts as the
//! root [`RouteGroup`] and turns routed requests into responses. It is also
//! where the fallback handlers live — the `404` and `405` answers pass
//! through the root middleware chain just like any routed request, so the
//! access log and recovery middleware see them too.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use parking_lot::RwLock;

use crate::chain::Pipeline;
use crate::context::{Context, Params};
use crate::error::Error;
use crate::group::RouteGroup;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::router::{Resolution, Router};
use crate::server::Server;

/// The application: root route group, routing table and dispatcher.
pub struct App {
    group: RouteGroup,
    router: Arc<RwLock<Router>>,
    not_found: BoxedHandler,
    method_not_allowed: BoxedHandler,
}

impl App {
    /// A new application with the default dispatch policy and fallback
    /// handlers.
    pub fn new() -> Self {
        let router = Arc::new(RwLock::new(Router::new()));
        let mut app = Self {
            group: RouteGroup::new("", Arc::clone(&router)),
            router,
            not_found: default_status_handler(StatusCode::NOT_FOUND),
            method_not_allowed: default_status_handler(StatusCode::METHOD_NOT_ALLOWED),
        };
        app.refresh_fallbacks();
        app
    }

    /// Appends `middleware` to the root chain.
    ///
    /// Shadows [`RouteGroup::use_middleware`] so the fallback pipelines can
    /// be rebuilt: the `404` and `405` handlers always run behind the full
    /// root chain as it stands when dispatching starts.
    pub fn use_middleware(&mut self, middleware: impl Handler) {
        self.group.use_middleware(middleware);
        self.refresh_fallbacks();
    }

    /// Replaces the handler for unmatched paths.
    pub fn not_found(&mut self, handler: impl Handler) {
        self.not_found = handler.into_boxed_handler();
        self.refresh_fallbacks();
    }

    /// Replaces the handler for matched paths with an unregistered method.
    pub fn method_not_allowed(&mut self, handler: impl Handler) {
        self.method_not_allowed = handler.into_boxed_handler();
        self.refresh_fallbacks();
    }

    fn refresh_fallbacks(&mut self) {
        let chain = self.group.chain().clone();
        let mut router = self.router.write();
        router.set_not_found(chain.then_boxed(self.not_found.clone()));
        router.set_method_not_allowed(chain.then_boxed(self.method_not_allowed.clone()));
    }

    pub fn set_redirect_trailing_slash(&mut self, on: bool) {
        self.router.write().redirect_trailing_slash = on;
    }

    pub fn set_redirect_fixed_path(&mut self, on: bool) {
        self.router.write().redirect_fixed_path = on;
    }

    pub fn set_handle_options(&mut self, on: bool) {
        self.router.write().handle_options = on;
    }

    pub fn set_handle_method_not_allowed(&mut self, on: bool) {
        self.router.write().handle_method_not_allowed = on;
    }

    /// Routes `request` and runs the matching pipeline to completion.
    ///
    /// This is the whole request lifecycle minus the transport; tests call
    /// it directly, [`Server`] calls it per inbound request.
    pub async fn dispatch(&self, request: Request) -> http::Response<Full<Bytes>> {
        let resolution = self.router.read().resolve(request.method(), request.path());
        match resolution {
            Resolution::Matched { pipeline, params } => {
                let ctx = pipeline.run(request, params).await;
                ctx.take_response().into_http()
            }
            Resolution::Redirect { location, status } => {
                let mut response = http::Response::new(Full::default());
                *response.status_mut() = status;
                if let Ok(value) = location.try_into() {
                    response.headers_mut().insert(http::header::LOCATION, value);
                }
                response
            }
            Resolution::Options { allow } => {
                let mut response = http::Response::new(Full::default());
                if let Ok(value) = allow.try_into() {
                    response.headers_mut().insert(http::header::ALLOW, value);
                }
                response
            }
            Resolution::MethodNotAllowed { allow } => {
                let pipeline = self.router.read().method_not_allowed();
                let ctx = self.fallback_context(pipeline, request);
                ctx.set_header("allow", &allow);
                ctx.next().await;
                ctx.take_response().into_http()
            }
            Resolution::NotFound => {
                let pipeline = self.router.read().not_found();
                let ctx = self.fallback_context(pipeline, request);
                ctx.next().await;
                ctx.take_response().into_http()
            }
        }
    }

    fn fallback_context(&self, pipeline: Option<Pipeline>, request: Request) -> Context {
        // refresh_fallbacks runs at construction, so the slots are always
        // filled; the guard keeps a misconfigured table from panicking.
        let pipeline =
            pipeline.unwrap_or_else(|| self.group.chain().then(|_ctx: Context| async {}));
        pipeline.context(request, Params::new())
    }

    /// Binds to `addr` and serves this application until shutdown.
    pub async fn listen(self, addr: &str) -> Result<(), Error> {
        Server::bind(addr).serve(self).await
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for App {
    type Target = RouteGroup;

    fn deref(&self) -> &RouteGroup {
        &self.group
    }
}

impl DerefMut for App {
    fn deref_mut(&mut self) -> &mut RouteGroup {
        &mut self.group
    }
}

fn default_status_handler(status: StatusCode) -> BoxedHandler {
    (move |ctx: Context| async move {
        ctx.string(status, status.canonical_reason().unwrap_or_default());
    })
    .into_boxed_handler()
}

#[cfg(test)]
mod tests {
    use http::Method;
    use http_body_util::BodyExt;

    use super::*;

    async fn body_string(response: http::Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn hello_app() -> App {
        let app = App::new();
        app.get("/hello", |ctx: Context| async move {
            ctx.string(StatusCode::OK, "hello");
        });
        app
    }

    #[tokio::test]
    async fn dispatches_matched_routes() {
        let app = hello_app();
        let response = app.dispatch(Request::new(Method::GET, "/hello")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "hello");
    }

    #[tokio::test]
    async fn unmatched_paths_get_the_default_404() {
        let app = hello_app();
        let response = app.dispatch(Request::new(Method::GET, "/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "Not Found");
    }

    #[tokio::test]
    async fn wrong_method_gets_405_with_allow_header() {
        let app = hello_app();
        let response = app.dispatch(Request::new(Method::POST, "/hello")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()["allow"], "GET, OPTIONS");
        assert_eq!(body_string(response).await, "Method Not Allowed");
    }

    #[tokio::test]
    async fn custom_fallbacks_run_behind_the_root_chain() {
        let mut app = hello_app();
        app.use_middleware(|ctx: Context| async move {
            ctx.set_header("x-seen", "yes");
            ctx.next().await;
        });
        app.not_found(|ctx: Context| async move {
            ctx.string(StatusCode::NOT_FOUND, "nothing here");
        });

        let response = app.dispatch(Request::new(Method::GET, "/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-seen"], "yes");
        assert_eq!(body_string(response).await, "nothing here");
    }

    #[tokio::test]
    async fn middleware_added_after_a_fallback_still_wraps_it() {
        let mut app = App::new();
        app.not_found(|ctx: Context| async move {
            ctx.string(StatusCode::NOT_FOUND, "custom");
        });
        app.use_middleware(|ctx: Context| async move {
            ctx.set_header("x-late", "yes");
            ctx.next().await;
        });

        let response = app.dispatch(Request::new(Method::GET, "/missing")).await;
        assert_eq!(response.headers()["x-late"], "yes");
        assert_eq!(body_string(response).await, "custom");
    }

    #[tokio::test]
    async fn options_requests_are_answered_automatically() {
        let app = hello_app();
        let response = app.dispatch(Request::new(Method::OPTIONS, "/hello")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["allow"], "GET, OPTIONS");
    }

    #[tokio::test]
    async fn trailing_slash_requests_redirect() {
        let app = hello_app();
        let response = app.dispatch(Request::new(Method::GET, "/hello/")).await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()["location"], "/hello");
    }

    #[tokio::test]
    async fn method_not_allowed_can_fall_back_to_404() {
        let mut app = hello_app();
        app.set_handle_method_not_allowed(false);
        let response = app.dispatch(Request::new(Method::POST, "/hello")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn groups_registered_through_the_app_resolve() {
        let app = App::new();
        let api = app.group("/api");
        api.get("/users/{id}", |ctx: Context| async move {
            let id = ctx.param("id").unwrap_or_default().to_string();
            ctx.string(StatusCode::OK, id);
        });

        let response = app.dispatch(Request::new(Method::GET, "/api/users/7")).await;
        assert_eq!(body_string(response).await, "7");
    }
}
