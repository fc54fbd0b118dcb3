//! Access logging.
//!
//! Records one entry per request after the rest of the pipeline finishes:
//! status, latency, peer address, method, path and any diagnostics the
//! request accumulated. The default sink emits a structured `tracing` event
//! under the `torii::access` target; [`log_requests_to`] accepts any sink,
//! which is also how tests capture entries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Method;
use tracing::info;

use crate::context::Context;
use crate::handler::Handler;

/// One completed request, as seen by the access log.
#[derive(Clone, Debug)]
pub struct RequestLog {
    pub status: u16,
    pub latency: Duration,
    pub remote_addr: String,
    pub method: Method,
    pub path: String,
    /// Rendered diagnostics, empty when the request recorded none.
    pub errors: String,
}

impl RequestLog {
    /// Renders the entry as a single ANSI-colored console line, without a
    /// timestamp (the subscriber adds its own).
    pub fn console_line(&self) -> String {
        let status_color = status_color(self.status);
        let method_color = method_color(&self.method);
        let mut line = format!(
            "|{status_color} {:3} {RESET}| {:>13?} | {} |{method_color} {} {RESET}| {}",
            self.status, self.latency, self.remote_addr, self.method, self.path,
        );
        if !self.errors.is_empty() {
            line.push('\n');
            line.push_str(self.errors.trim_end());
        }
        line
    }
}

/// Access-log middleware with the default `tracing` sink.
pub fn log_requests() -> impl Handler {
    log_requests_to(|entry: RequestLog| {
        info!(
            target: "torii::access",
            status = entry.status,
            latency = ?entry.latency,
            client = %entry.remote_addr,
            method = %entry.method,
            path = %entry.path,
            errors = %entry.errors.trim_end(),
            "request",
        );
    })
}

/// Access-log middleware delivering each entry to `sink`.
pub fn log_requests_to(sink: impl Fn(RequestLog) + Send + Sync + 'static) -> impl Handler {
    let sink = Arc::new(sink);
    move |ctx: Context| {
        let sink = Arc::clone(&sink);
        async move {
            let start = Instant::now();
            ctx.next().await;
            sink(RequestLog {
                status: ctx.status(),
                latency: start.elapsed(),
                remote_addr: ctx.client_ip().to_string(),
                method: ctx.method().clone(),
                path: ctx.path().to_string(),
                errors: ctx.errors_display(),
            });
        }
    }
}

const RESET: &str = "\x1b[0m";

fn status_color(status: u16) -> &'static str {
    match status {
        200..=299 => "\x1b[97;42m", // white on green
        300..=399 => "\x1b[90;47m", // black on white
        400..=499 => "\x1b[90;43m", // black on yellow
        _ => "\x1b[97;41m",         // white on red
    }
}

fn method_color(method: &Method) -> &'static str {
    match method.as_str() {
        "GET" => "\x1b[97;44m",    // blue
        "POST" => "\x1b[97;46m",   // cyan
        "PUT" => "\x1b[90;43m",    // yellow
        "DELETE" => "\x1b[97;41m", // red
        "PATCH" => "\x1b[97;42m",  // green
        "HEAD" => "\x1b[97;45m",   // magenta
        _ => "\x1b[90;47m",        // white
    }
}
