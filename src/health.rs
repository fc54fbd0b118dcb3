//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them like any other handler:
//!
//! ```rust,no_run
//! use torii::{App, health};
//!
//! let app = App::new();
//! app.get("/healthz", health::liveness);
//! app.get("/readyz", health::readiness);
//! ```
//!
//! Override `readiness` with a custom handler if you need to gate on
//! dependency availability (database connections, downstream services).

use http::StatusCode;

use crate::context::Context;

/// Kubernetes liveness probe handler.
///
/// Always answers `200 OK` with body `"ok"`. If the process can respond to
/// HTTP at all, it is alive — this handler intentionally has no
/// dependencies.
pub async fn liveness(ctx: Context) {
    ctx.string(StatusCode::OK, "ok");
}

/// Kubernetes readiness probe handler (default implementation).
///
/// Answers `200 OK` with body `"ready"`. Replace it with your own handler if
/// your application needs a warm-up period or must verify dependency health
/// before accepting traffic.
pub async fn readiness(ctx: Context) {
    ctx.string(StatusCode::OK, "ready");
}
