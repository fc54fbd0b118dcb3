//! Deadline enforcement.
//!
//! Runs the rest of the pipeline on its own task and races it against a
//! timer. When the deadline fires first, the client gets `503` with the
//! configured message and the response state is frozen; the downstream work
//! is *not* cancelled, it keeps running detached, but everything it writes
//! from then on is discarded.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tracing::warn;

use crate::context::Context;
use crate::handler::Handler;

/// Timeout middleware: answer `503` with `message` when the rest of the
/// pipeline takes longer than `limit`.
pub fn timeout(limit: Duration, message: &str) -> impl Handler + use<> {
    let message: Arc<str> = Arc::from(message);
    move |ctx: Context| {
        let message = Arc::clone(&message);
        async move {
            let downstream = ctx.clone();
            let work = tokio::spawn(async move { downstream.next().await });

            tokio::select! {
                joined = work => {
                    if let Err(e) = joined
                        && e.is_panic()
                    {
                        // Surface the downstream panic to the recovery
                        // middleware wrapping this one.
                        std::panic::resume_unwind(e.into_panic());
                    }
                }
                () = tokio::time::sleep(limit) => {
                    warn!(path = %ctx.path(), limit = ?limit, "request deadline exceeded");
                    ctx.with_response(|r| {
                        if !r.written() {
                            r.set_header("content-type", "text/plain; charset=utf-8");
                            r.write_head(StatusCode::SERVICE_UNAVAILABLE);
                            r.write(message.as_bytes());
                        }
                        // Dropping the join handle detached the worker;
                        // freezing shuts its late writes out.
                        r.freeze();
                    });
                }
            }
        }
    }
}
