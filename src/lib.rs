//! # torii
//!
//! A small middleware-composition and request-dispatch layer on top of
//! hyper, for services behind a reverse proxy.
//!
//! ## The contract
//!
//! nginx handles TLS, rate limiting, slow clients, and body-size limits.
//! torii does not — the proxy does proxy things. What's left is the part
//! that changes between applications:
//!
//! - **Middleware composition** — immutable [`Chain`]s sealed into
//!   per-route [`Pipeline`]s; one handler shape for middleware and
//!   endpoints alike
//! - **Radix-tree routing** — O(path-length) lookup via [`matchit`], with
//!   route groups, automatic `OPTIONS`, trailing-slash redirects and `405`
//!   detection
//! - **A per-request [`Context`]** — `next()`/`abort()` flow control, a
//!   typed value bag, a diagnostics accumulator and a tracked response
//! - **Batteries** — recovery, timeout, request-id and access-log
//!   middleware in [`middleware`], health probes in [`health`]
//! - **Graceful shutdown** — SIGTERM / Ctrl-C, drains in-flight requests
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use torii::{App, Context, StatusCode, middleware};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = App::new();
//!     app.use_middleware(middleware::log_requests());
//!     app.use_middleware(middleware::recovery());
//!     app.use_middleware(middleware::timeout(
//!         Duration::from_secs(30),
//!         "Server request timeout",
//!     ));
//!
//!     app.get("/users/{id}", get_user);
//!
//!     app.listen("0.0.0.0:3000").await.unwrap();
//! }
//!
//! async fn get_user(ctx: Context) {
//!     let id = ctx.param("id").unwrap_or("unknown").to_string();
//!     ctx.string(StatusCode::OK, id);
//! }
//! ```

mod app;
mod chain;
mod context;
mod error;
mod group;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod health;
pub mod middleware;

pub use app::App;
pub use chain::{Chain, Pipeline};
pub use context::{Context, Params};
pub use error::Error;
pub use group::RouteGroup;
pub use handler::Handler;
pub use http::{Method, StatusCode};
pub use request::Request;
pub use response::ResponseState;
pub use server::Server;
