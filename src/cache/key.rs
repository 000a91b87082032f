//! Cache key: request identity without headers.

use std::fmt;

use crate::http::{Method, Request};

/// Identifies a stored response by method and URL.
///
/// Two keys are equal only if both parts match byte-for-byte. Query
/// parameter order, case and trailing slashes are significant; callers that
/// want coarser entries normalize the URL before building the key.
///
/// # Examples
///
/// ```
/// use edgekit::cache::CacheKey;
/// use edgekit::http::Method;
///
/// let key = CacheKey::get("https://www.googleapis.com/youtube/v3/search?q=rust");
/// assert_eq!(key.method(), &Method::Get);
/// assert_eq!(key.to_string(), "GET https://www.googleapis.com/youtube/v3/search?q=rust");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    url: String,
}

impl CacheKey {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
        }
    }

    /// A `GET` key for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Keys an inbound request by its method and reconstructed URL.
    ///
    /// Only `Host` feeds into the URL; see [`Request::url`]. Proxy headers
    /// such as `X-Forwarded-Proto` cannot fan one resource out into
    /// several entries.
    pub fn from_request(request: &Request) -> Self {
        Self::new(request.method().clone(), request.url())
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
