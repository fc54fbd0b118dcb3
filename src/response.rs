//! Response-state tracker.
//!
//! Every handler writes through a [`ResponseState`] rather than a raw socket.
//! The tracker records whether headers were committed, which status code was
//! chosen and how many body bytes were produced, so middleware can always
//! answer the one question it keeps asking: *has a response been sent yet?*
//!
//! The state buffers the full response; the server glue converts it into a
//! hyper response once the pipeline returns. A frozen state (see the timeout
//! middleware) silently discards every further write — first writer wins.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;

/// Tracked, buffered state of the outbound response.
///
/// Invariants:
/// - `written() == (status() != 0)`
/// - the status is set at most once; the first body write on an unset status
///   commits `200 OK` implicitly
/// - `size()` only ever grows
pub struct ResponseState {
    status: u16,
    headers: HeaderMap,
    body: BytesMut,
    size: usize,
    frozen: bool,
}

impl ResponseState {
    pub(crate) fn new() -> Self {
        Self {
            status: 0,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            size: 0,
            frozen: false,
        }
    }

    /// The committed status code, or `0` if nothing was written yet.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// True once a status code has been committed.
    pub fn written(&self) -> bool {
        self.status != 0
    }

    /// Total number of body bytes accepted so far.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Inserts a header, replacing any previous value. Invalid names or
    /// values are dropped.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.insert(name, value);
        }
    }

    /// Commits the status code. A second call, or a call on a frozen state,
    /// is ignored.
    pub fn write_head(&mut self, status: StatusCode) {
        if self.frozen || self.status != 0 {
            return;
        }
        self.status = status.as_u16();
    }

    /// Appends body bytes, committing `200 OK` first if no status was set.
    /// Returns the number of bytes accepted (zero on a frozen state).
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.frozen {
            return 0;
        }
        if self.status == 0 {
            self.write_head(StatusCode::OK);
        }
        self.body.extend_from_slice(data);
        self.size += data.len();
        data.len()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// After this call every write is discarded. Used by the timeout
    /// middleware to shut out late writers from a detached pipeline.
    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let status = if self.status == 0 {
            StatusCode::OK
        } else {
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        };
        let mut response = http::Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl Default for ResponseState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_tracks_status() {
        let mut rs = ResponseState::new();
        assert!(!rs.written());
        assert_eq!(rs.status(), 0);

        rs.write_head(StatusCode::NOT_FOUND);
        assert!(rs.written());
        assert_eq!(rs.status(), 404);
    }

    #[test]
    fn first_write_defaults_to_200() {
        let mut rs = ResponseState::new();
        let n = rs.write(b"hello");
        assert_eq!(n, 5);
        assert_eq!(rs.status(), 200);
        assert_eq!(rs.body(), b"hello");
    }

    #[test]
    fn status_is_set_exactly_once() {
        let mut rs = ResponseState::new();
        rs.write_head(StatusCode::CREATED);
        rs.write_head(StatusCode::NOT_FOUND);
        assert_eq!(rs.status(), 201);
    }

    #[test]
    fn size_accumulates() {
        let mut rs = ResponseState::new();
        rs.write(b"abc");
        rs.write(b"de");
        assert_eq!(rs.size(), 5);
        assert_eq!(rs.body(), b"abcde");
    }

    #[test]
    fn frozen_state_discards_writes() {
        let mut rs = ResponseState::new();
        rs.write(b"kept");
        rs.freeze();
        assert_eq!(rs.write(b"dropped"), 0);
        rs.write_head(StatusCode::NOT_FOUND);
        assert_eq!(rs.status(), 200);
        assert_eq!(rs.body(), b"kept");
        assert_eq!(rs.size(), 4);
    }

    #[test]
    fn converts_into_http_response() {
        let mut rs = ResponseState::new();
        rs.set_header("content-type", "text/plain");
        rs.write(b"ok");
        let response = rs.into_http();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/plain");
    }

    #[test]
    fn empty_state_converts_to_200() {
        let rs = ResponseState::new();
        let response = rs.into_http();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
