//! Per-request execution context.
//!
//! A [`Context`] is created fresh for every inbound request and discarded
//! once the response is complete. It owns the resolved handler pipeline and
//! a cursor into it, the request, the extracted path parameters, a lazily
//! allocated key/value bag, a diagnostics accumulator and the shared
//! [`ResponseState`] tracker.
//!
//! `Context` is a cheap handle (one `Arc` clone) so middleware can hand it
//! to spawned tasks — the timeout middleware relies on this. All mutation
//! goes through atomics or short lock scopes; a context is never shared
//! across requests.
//!
//! # Control flow
//!
//! [`Context::next`] advances the cursor and invokes exactly one handler.
//! The remainder of the pipeline runs because that handler itself calls
//! `next()` — so a middleware runs code before *and* after the rest of the
//! pipeline by straddling its own `next().await`, and a middleware that
//! returns without calling `next()` short-circuits everything after it.
//! [`Context::abort`] additionally parks the cursor on a sentinel larger
//! than any valid index, turning every pending or future `next()` into a
//! no-op. There is no undo.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, Ordering};

use http::{Method, StatusCode};
use parking_lot::Mutex;
use serde::Serialize;

use crate::handler::BoxedHandler;
use crate::request::Request;
use crate::response::ResponseState;

/// Path parameters extracted by the router, keyed by placeholder name.
pub type Params = HashMap<String, String>;

/// Cursor value before the first `next()` call.
const FRESH: isize = -1;

/// Cursor sentinel for an aborted pipeline. Strictly greater than any legal
/// pipeline index, so advancing is impossible once it is set.
const ABORT_INDEX: isize = isize::MAX;

struct ContextInner {
    request: Request,
    params: Params,
    handlers: Arc<[BoxedHandler]>,
    cursor: AtomicIsize,
    response: Mutex<ResponseState>,
    bag: Mutex<Option<HashMap<String, Arc<dyn Any + Send + Sync>>>>,
    diagnostics: Mutex<Vec<String>>,
}

/// The per-request execution context handed to every handler.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn new(request: Request, params: Params, handlers: Arc<[BoxedHandler]>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                request,
                params,
                handlers,
                cursor: AtomicIsize::new(FRESH),
                response: Mutex::new(ResponseState::new()),
                bag: Mutex::new(None),
                diagnostics: Mutex::new(Vec::new()),
            }),
        }
    }

    // ── Flow ──────────────────────────────────────────────────────────────

    /// Invokes the next handler in the pipeline.
    ///
    /// Calling `next()` past the end of the pipeline, or after [`abort`]
    /// (Context::abort), is a safe no-op.
    pub async fn next(&self) {
        let Some(index) = self.advance() else { return };
        let Some(handler) = self.inner.handlers.get(index).cloned() else {
            return;
        };
        handler.call(self.clone()).await;
    }

    /// Atomically advances the cursor, unless it is parked on the abort
    /// sentinel. The cursor never moves backwards.
    fn advance(&self) -> Option<usize> {
        self.inner
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| {
                if i == ABORT_INDEX { None } else { Some(i + 1) }
            })
            .ok()
            .map(|previous| (previous + 1) as usize)
    }

    /// Stops the remaining pipeline for this request. Idempotent.
    pub fn abort(&self) {
        self.inner.cursor.store(ABORT_INDEX, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.cursor.load(Ordering::Acquire) == ABORT_INDEX
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> isize {
        self.inner.cursor.load(Ordering::Acquire)
    }

    // ── Request accessors ─────────────────────────────────────────────────

    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    pub fn method(&self) -> &Method {
        self.inner.request.method()
    }

    pub fn path(&self) -> &str {
        self.inner.request.path()
    }

    /// The peer address as reported by the transport.
    pub fn client_ip(&self) -> &str {
        self.inner.request.remote_addr()
    }

    pub fn params(&self) -> &Params {
        &self.inner.params
    }

    /// Returns the named path parameter, e.g. `ctx.param("id")` for a route
    /// registered as `/users/{id}`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name).map(String::as_str)
    }

    // ── Value bag ─────────────────────────────────────────────────────────

    /// Stores a value under `key` for later middleware and handlers.
    ///
    /// The bag is allocated on first use. Keys are plain strings; prefix
    /// them (`"mycrate.session"`) to stay out of other middleware's way, or
    /// wrap `set`/`get_as` in typed accessor functions the way
    /// [`crate::middleware::request_id`] does.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        let mut bag = self.inner.bag.lock();
        bag.get_or_insert_with(HashMap::new)
            .insert(key.into(), Arc::new(value));
    }

    /// Returns the raw value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner
            .bag
            .lock()
            .as_ref()
            .and_then(|bag| bag.get(key).cloned())
    }

    /// Returns the value stored under `key` downcast to `T`. `None` when
    /// the key is missing or holds a different type.
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key).and_then(|value| value.downcast::<T>().ok())
    }

    // ── Diagnostics ───────────────────────────────────────────────────────

    /// Records a diagnostic for this request. Diagnostics never reach the
    /// client; they surface through [`Context::errors`] and the access log.
    pub fn error(&self, message: impl Into<String>) {
        self.inner.diagnostics.lock().push(message.into());
    }

    pub fn errors(&self) -> Vec<String> {
        self.inner.diagnostics.lock().clone()
    }

    /// Numbered, newline-separated rendering of the accumulated
    /// diagnostics. Empty string when there are none.
    pub fn errors_display(&self) -> String {
        let diagnostics = self.inner.diagnostics.lock();
        let mut out = String::new();
        for (i, message) in diagnostics.iter().enumerate() {
            let _ = writeln!(out, "Error #{:02}: {}", i + 1, message);
        }
        out
    }

    // ── Response ──────────────────────────────────────────────────────────

    /// Runs `f` against the tracked response state. `f` runs under the
    /// response lock; keep it short and never call `next()` from within it.
    pub fn with_response<R>(&self, f: impl FnOnce(&mut ResponseState) -> R) -> R {
        f(&mut self.inner.response.lock())
    }

    /// The committed status code, or `0` if nothing was written yet.
    pub fn status(&self) -> u16 {
        self.inner.response.lock().status()
    }

    pub fn written(&self) -> bool {
        self.inner.response.lock().written()
    }

    /// Sets a response header, replacing any previous value.
    pub fn set_header(&self, name: &str, value: &str) {
        self.inner.response.lock().set_header(name, value);
    }

    /// Commits the status code without a body.
    pub fn write_status(&self, status: StatusCode) {
        self.inner.response.lock().write_head(status);
    }

    /// Writes a plain-text response (`text/plain; charset=utf-8`).
    pub fn string(&self, status: StatusCode, body: impl AsRef<str>) {
        self.data(status, "text/plain; charset=utf-8", body.as_ref().as_bytes());
    }

    /// Serializes `value` as a JSON response (`application/json`).
    ///
    /// A serialization failure is recorded as a diagnostic and answered
    /// with a plain 500 if nothing was written yet.
    pub fn json<T: Serialize>(&self, status: StatusCode, value: &T) {
        match serde_json::to_vec(value) {
            Ok(body) => self.data(status, "application/json", &body),
            Err(e) => {
                self.error(format!("json serialization failed: {e}"));
                let mut response = self.inner.response.lock();
                if !response.written() {
                    response.write_head(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        }
    }

    /// Writes `data` with the given content type and status code. A content
    /// type already set on the response is left alone.
    pub fn data(&self, status: StatusCode, content_type: &str, data: &[u8]) {
        let mut response = self.inner.response.lock();
        if !content_type.is_empty() && !response.headers().contains_key("content-type") {
            response.set_header("content-type", content_type);
        }
        response.write_head(status);
        response.write(data);
    }

    /// Answers with an HTTP redirect to `location`.
    ///
    /// # Panics
    ///
    /// Panics when `status` is not a 3xx code — a composition mistake, and
    /// one the recovery middleware converts to a 500 like any other panic.
    pub fn redirect(&self, status: StatusCode, location: &str) {
        assert!(
            status.is_redirection(),
            "cannot send a redirect with status code {status}"
        );
        let mut response = self.inner.response.lock();
        response.set_header("location", location);
        response.write_head(status);
    }

    /// Takes the buffered response out of the context, leaving a fresh one
    /// behind. Called once by the dispatch glue after the pipeline returns.
    pub(crate) fn take_response(&self) -> ResponseState {
        std::mem::take(&mut *self.inner.response.lock())
    }
}
