//! HTTP/1.1 request parsing using the [`httparse`] crate.

use std::net::SocketAddr;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete: more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// An HTTP/1.1 request.
///
/// Created by [`Request::parse`] from a raw byte buffer, or directly with
/// [`Request::new`] when a handler needs to address an upstream resource
/// (for example to build a cache key).
///
/// # Examples
///
/// ```
/// use edgekit::http::request::Request;
///
/// let raw = b"GET /api/youtube/search?q=rust HTTP/1.1\r\nHost: example.com\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/api/youtube/search");
/// assert_eq!(request.url(), "http://example.com/api/youtube/search?q=rust");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    /// Scheme given in an absolute-form target, if any.
    scheme: Option<String>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Builds a request for `target` without going through the wire parser.
    ///
    /// `target` may be origin-form (`/path?query`) or absolute-form
    /// (`https://host/path?query`); in the latter case the authority becomes
    /// the `Host` header.
    pub fn new(method: Method, target: &str) -> Self {
        let mut headers = Headers::new();
        let mut scheme = None;
        let origin_form = match target.split_once("://") {
            Some((given, rest)) => {
                scheme = Some(given.to_ascii_lowercase());
                let (authority, tail) = match rest.find('/') {
                    Some(pos) => (&rest[..pos], &rest[pos..]),
                    None => match rest.find('?') {
                        Some(pos) => (&rest[..pos], &rest[pos..]),
                        None => (rest, "/"),
                    },
                };
                headers.insert("Host", authority);
                if tail.starts_with('?') {
                    format!("/{tail}")
                } else {
                    tail.to_owned()
                }
            }
            None => target.to_owned(),
        };
        let (path, query) = split_target(&origin_form);

        Self {
            method,
            path,
            version: 1,
            headers,
            query,
            body: Bytes::new(),
            remote_addr: None,
            scheme,
        }
    }

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body begins
    /// in `buf` (i.e. immediately after the `\r\n\r\n` header terminator).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: more data is needed to complete the request headers.
    /// - [`RequestError::Parse`]: the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`]: a required field (method, path, version) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = match raw_req.method {
            Some(m) => match m.parse::<Method>() {
                Ok(method) => method,
                Err(never) => match never {},
            },
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;
        let (path, query) = split_target(raw_path);

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let body = Bytes::copy_from_slice(&buf[body_offset..]);

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                query,
                body,
                remote_addr: None,
                scheme: None,
            },
            body_offset,
        ))
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Records the socket address of the connected peer.
    pub fn set_remote_addr(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    // The parser hands over everything after the headers; cut it back to
    // Content-Length so a pipelined request is not read as body.
    pub(crate) fn truncate_body(&mut self, len: usize) {
        self.body.truncate(len);
    }

    /// Returns the peer address, if the request arrived over a socket.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Reconstructs the absolute URL of this request.
    ///
    /// The scheme is the one given to [`Request::new`], otherwise `http`.
    /// `X-Forwarded-Proto` is ignored: it is client-controlled and would let
    /// any caller split one cache entry into `http` and `https` variants.
    /// The authority comes from the `Host` header (`localhost` if absent).
    /// The query string is kept verbatim.
    pub fn url(&self) -> String {
        let scheme = self.scheme.as_deref().unwrap_or("http");
        let host = self.headers.get("host").unwrap_or("localhost");
        match &self.query {
            Some(q) => format!("{scheme}://{host}{}?{q}", self.path),
            None => format!("{scheme}://{host}{}", self.path),
        }
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }
}

// Split an origin-form target into path and optional query.
fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
        None => (target.to_owned(), None),
    }
}
