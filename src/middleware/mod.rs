//! Built-in middleware.
//!
//! Each constructor returns a plain handler, so the built-ins compose like
//! anything else:
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use torii::{App, middleware};
//!
//! let mut app = App::new();
//! app.use_middleware(middleware::log_requests());
//! app.use_middleware(middleware::recovery());
//! app.use_middleware(middleware::unique_request_id());
//! app.use_middleware(middleware::timeout(
//!     Duration::from_secs(30),
//!     "Server request timeout",
//! ));
//! ```
//!
//! Order matters: a middleware only observes what happens downstream of its
//! own `next().await`, and a panic unwinds straight through any middleware
//! between it and `recovery`. Put `log_requests` *outside* `recovery` so a
//! panicking request is still logged with the 500 recovery produced; were
//! the logger inside, the unwind would skip its post-`next()` code and the
//! request would never reach the access log. Likewise keep `recovery`
//! outside `timeout` so re-raised downstream panics are caught, and
//! `log_requests` outside `timeout` so timed-out requests get logged with
//! their 503.

mod logger;
mod recovery;
mod request_id;
mod timeout;

pub use logger::{RequestLog, log_requests, log_requests_to};
pub use recovery::{panic_error, panic_stack_trace, recovery, recovery_with};
pub use request_id::{REQUEST_ID_HEADER, request_id, unique_request_id};
pub use timeout::timeout;
