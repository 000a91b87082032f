//! HTTP/1.1 response type.
//!
//! Responses flow both ways through the edge layer: handlers build them with
//! the fluent builder, the cache stores and re-emits them, and the server
//! serializes them to a byte buffer for transmission over TCP.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::{Headers, StatusCode};

/// An HTTP/1.1 response.
///
/// Cloning a response copies the status and headers and shares the body
/// buffer, so a cached copy is never affected by later header edits on the
/// response handed to the client.
///
/// # Examples
///
/// ```
/// use edgekit::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    status_text: Option<String>,
    headers: Headers,
    body: Bytes,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            status_text: None,
            headers: Headers::new(),
            body: Bytes::new(),
            keep_alive: true,
        }
    }

    /// Creates a response with a JSON body and `Content-Type: application/json`.
    ///
    /// Serialization failures fall back to a `500` with a plain-text body.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .header("Content-Type", "application/json")
                .body_bytes(body),
            Err(e) => Self::new(StatusCode::InternalServerError)
                .body(format!("failed to encode response body: {e}")),
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in-place. Intended for middleware that decorates a
    /// response received from downstream.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Replaces any existing values of a header in-place.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Overrides the reason phrase written on the status line.
    ///
    /// Upstream responses keep their own status text through the cache.
    #[must_use]
    pub fn status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    /// Sets the response body from a string.
    ///
    /// The `Content-Length` header is written automatically by [`into_bytes`](Self::into_bytes).
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Controls whether the `Connection: keep-alive` or `Connection: close` header is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Returns a copy of this response with `headers` in place of its own.
    ///
    /// Status, status text and body carry over unchanged.
    #[must_use]
    pub fn with_headers(&self, headers: Headers) -> Self {
        Self {
            status: self.status,
            status_text: self.status_text.clone(),
            headers,
            body: self.body.clone(),
            keep_alive: self.keep_alive,
        }
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the reason phrase: the override if one was set, otherwise the canonical one.
    pub fn reason(&self) -> &str {
        self.status_text
            .as_deref()
            .unwrap_or_else(|| self.status.canonical_reason())
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body bytes.
    pub fn body_ref(&self) -> &Bytes {
        &self.body
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty and no
    ///   `Content-Type` header was set.
    /// - `Content-Length: <n>`, replacing any value carried over from upstream.
    /// - `Connection: keep-alive` or `Connection: close`.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set("Connection", connection);
        self.headers.remove("content-length");

        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(format!("HTTP/1.1 {} {}\r\n", self.status.as_u16(), self.reason()).as_bytes());

        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Content-Length is always the last header before the blank line
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        buf.put(&b"\r\n"[..]);

        if !self.body.is_empty() {
            buf.put(self.body.as_ref());
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn simple_ok_response() {
        let r = Response::new(StatusCode::Ok).body("Hello");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn status_text_override_on_wire() {
        let r = Response::new(StatusCode::Ok).status_text("Fine");
        assert_eq!(r.reason(), "Fine");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 Fine\r\n"));
    }

    #[test]
    fn upstream_content_length_is_replaced() {
        let r = Response::new(StatusCode::Ok)
            .header("Content-Length", "999")
            .body("ok");
        let s = to_string(r.into_bytes());
        assert_eq!(s.matches("Content-Length").count(), 1);
        assert!(s.contains("Content-Length: 2\r\n"));
    }

    #[test]
    fn connection_close() {
        let r = Response::new(StatusCode::Ok).keep_alive(false);
        let s = to_string(r.into_bytes());
        assert!(s.contains("Connection: close\r\n"));
    }

    #[test]
    fn json_body_sets_content_type() {
        let r = Response::json(StatusCode::TooManyRequests, &serde_json::json!({"error": "x"}));
        assert_eq!(r.status(), StatusCode::TooManyRequests);
        assert_eq!(r.headers().get("content-type"), Some("application/json"));
        assert_eq!(r.body_ref().as_ref(), br#"{"error":"x"}"#);
    }

    #[test]
    fn clone_has_independent_headers() {
        let original = Response::new(StatusCode::Ok).header("X-Cache", "MISS").body("x");
        let mut copy = original.clone();
        copy.set_header("X-Cache", "HIT");
        assert_eq!(original.headers().get("x-cache"), Some("MISS"));
        assert_eq!(copy.body_ref(), original.body_ref());
    }

    #[test]
    fn with_headers_keeps_status_and_body() {
        let original = Response::new(StatusCode::Accepted)
            .status_text("Queued")
            .body("payload");
        let mut headers = Headers::new();
        headers.insert("X-Cache", "HIT");
        let rebuilt = original.with_headers(headers);
        assert_eq!(rebuilt.status(), StatusCode::Accepted);
        assert_eq!(rebuilt.reason(), "Queued");
        assert_eq!(rebuilt.body_ref().as_ref(), b"payload");
        assert!(original.headers().is_empty());
    }
}
