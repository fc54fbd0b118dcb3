//! Panic recovery.
//!
//! Catches panics from everything downstream, records the panic message and
//! a backtrace on the context, and answers `500 Internal server error` if
//! the response is still unwritten. A partially written response is left as
//! is; the status line is already on its way conceptually, so overwriting
//! it would lie to the client.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use crate::context::Context;
use crate::handler::{BoxedHandler, Handler};

const PANIC_MESSAGE_KEY: &str = "torii.panic-message";
const PANIC_BACKTRACE_KEY: &str = "torii.panic-backtrace";

/// Recovery middleware with the default `500 Internal server error` answer.
pub fn recovery() -> impl Handler {
    with_fallback(None)
}

/// Recovery middleware that delegates the response to `handler` after a
/// panic. The handler can read the panic through [`panic_error`] and
/// [`panic_stack_trace`].
pub fn recovery_with(handler: impl Handler) -> impl Handler {
    with_fallback(Some(handler.into_boxed_handler()))
}

fn with_fallback(custom: Option<BoxedHandler>) -> impl Handler {
    move |ctx: Context| {
        let custom = custom.clone();
        async move {
            let outcome = AssertUnwindSafe(ctx.next()).catch_unwind().await;
            let Err(payload) = outcome else { return };

            let message = panic_message(payload);
            let backtrace = Backtrace::force_capture().to_string();
            error!(panic = %message, "handler panicked");

            ctx.error(format!("panic: {message}"));
            ctx.set(PANIC_MESSAGE_KEY, message);
            ctx.set(PANIC_BACKTRACE_KEY, backtrace);
            // The rest of the pipeline is in an unknown state; make sure
            // nothing resumes it.
            ctx.abort();

            match custom {
                Some(handler) => handler.call(ctx.clone()).await,
                None => {
                    if !ctx.written() {
                        ctx.string(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
                    }
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// The panic message recorded by the recovery middleware, if the request
/// panicked.
pub fn panic_error(ctx: &Context) -> Option<String> {
    ctx.get_as::<String>(PANIC_MESSAGE_KEY).map(|s| (*s).clone())
}

/// The backtrace captured at the recovery point, if the request panicked.
///
/// The trace is taken where the panic is *caught*, not where it was
/// raised, so it shows the middleware stack above the failing handler
/// rather than the faulting frame itself. Capturing at the panic site
/// would require a global panic hook, which a library should not install;
/// set `RUST_BACKTRACE=1` and read the runtime's own panic output for the
/// faulting frames.
pub fn panic_stack_trace(ctx: &Context) -> Option<String> {
    ctx.get_as::<String>(PANIC_BACKTRACE_KEY)
        .map(|s| (*s).clone())
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;
    use crate::chain::Chain;
    use crate::context::Params;
    use crate::request::Request;

    async fn run(pipeline: &crate::chain::Pipeline) -> Context {
        pipeline
            .run(Request::new(Method::GET, "/"), Params::new())
            .await
    }

    fn body_of(ctx: &Context) -> String {
        ctx.with_response(|r| String::from_utf8(r.body().to_vec()).unwrap())
    }

    #[tokio::test]
    async fn panics_become_500() {
        let pipeline = Chain::new()
            .append(recovery())
            .then(|_ctx: Context| async { panic!("boom") });

        let ctx = run(&pipeline).await;
        assert_eq!(ctx.status(), 500);
        assert_eq!(body_of(&ctx), "Internal server error");
        assert_eq!(ctx.errors(), vec!["panic: boom".to_string()]);
    }

    #[tokio::test]
    async fn partially_written_responses_are_left_alone() {
        let pipeline = Chain::new().append(recovery()).then(|ctx: Context| async move {
            ctx.string(StatusCode::OK, "partial");
            panic!("after write");
        });

        let ctx = run(&pipeline).await;
        assert_eq!(ctx.status(), 200);
        assert_eq!(body_of(&ctx), "partial");
    }

    #[tokio::test]
    async fn custom_handler_sees_the_panic() {
        let pipeline = Chain::new()
            .append(recovery_with(|ctx: Context| async move {
                let message = panic_error(&ctx).unwrap_or_default();
                assert!(panic_stack_trace(&ctx).is_some());
                ctx.string(StatusCode::INTERNAL_SERVER_ERROR, format!("caught: {message}"));
            }))
            .then(|_ctx: Context| async { panic!("custom boom") });

        let ctx = run(&pipeline).await;
        assert_eq!(ctx.status(), 500);
        assert_eq!(body_of(&ctx), "caught: custom boom");
    }

    #[tokio::test]
    async fn healthy_requests_pass_through() {
        let pipeline = Chain::new().append(recovery()).then(|ctx: Context| async move {
            ctx.string(StatusCode::OK, "fine");
        });

        let ctx = run(&pipeline).await;
        assert_eq!(ctx.status(), 200);
        assert_eq!(body_of(&ctx), "fine");
        assert!(panic_error(&ctx).is_none());
    }
}
