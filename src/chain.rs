//! Middleware chains and compiled pipelines.
//!
//! A [`Chain`] is an immutable, ordered recipe of middleware. Composition
//! methods return a *new* chain and never mutate the receiver, so a chain
//! can be shared, stored and branched freely:
//!
//! ```text
//! let base     = Chain::new().append(recovery()).append(log_requests());
//! let timed    = base.append(timeout(TIMEOUT, "too slow"));   // base unchanged
//! let pipeline = timed.then(serve_user);
//! ```
//!
//! [`Chain::then`] seals the chain with a terminal handler and produces a
//! [`Pipeline`], the runnable form the router stores. The pipeline is a
//! snapshot: chains mutated or extended after `then()` do not affect it.

use std::sync::Arc;

use crate::context::{Context, Params};
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;

/// An immutable, ordered collection of middleware.
#[derive(Clone, Default)]
pub struct Chain {
    stack: Vec<BoxedHandler>,
}

impl Chain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new chain with `middleware` appended. The receiver is
    /// untouched.
    #[must_use = "append returns a new chain and leaves the receiver unchanged"]
    pub fn append(&self, middleware: impl Handler) -> Self {
        let mut stack = self.stack.clone();
        stack.push(middleware.into_boxed_handler());
        Self { stack }
    }

    /// Returns a new chain running `self`'s middleware first, then
    /// `other`'s.
    #[must_use = "extend returns a new chain and leaves the receiver unchanged"]
    pub fn extend(&self, other: &Chain) -> Self {
        let mut stack = self.stack.clone();
        stack.extend(other.stack.iter().cloned());
        Self { stack }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Seals the chain with a terminal handler, producing a runnable
    /// [`Pipeline`]. The pipeline is a snapshot of the chain at this moment.
    pub fn then(&self, handler: impl Handler) -> Pipeline {
        self.then_boxed(handler.into_boxed_handler())
    }

    pub(crate) fn then_boxed(&self, handler: BoxedHandler) -> Pipeline {
        let mut handlers = self.stack.clone();
        handlers.push(handler);
        Pipeline {
            handlers: handlers.into(),
        }
    }
}

/// A sealed, runnable middleware-plus-handler sequence.
///
/// Cloning a pipeline is cheap (one `Arc` bump); the router hands out clones
/// per request.
#[derive(Clone)]
pub struct Pipeline {
    handlers: Arc<[BoxedHandler]>,
}

impl Pipeline {
    /// Runs the pipeline against `request`, returning the finished context.
    pub async fn run(&self, request: Request, params: Params) -> Context {
        let ctx = self.context(request, params);
        ctx.next().await;
        ctx
    }

    /// Builds the context without starting it, so the caller can pre-seed
    /// response headers (the dispatcher does this for the `Allow` header).
    pub(crate) fn context(&self, request: Request, params: Params) -> Context {
        Context::new(request, params, Arc::clone(&self.handlers))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
