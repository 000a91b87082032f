//! Security middleware: rate limiting, CORS, and response hardening headers.
//!
//! - [`RateLimitMiddleware`]: per-client fixed-window throttling backed by a
//!   shared [`RateLimiter`], with a stricter budget for expensive paths.
//! - [`CorsMiddleware`]: allow-list CORS with credentialed echo and
//!   preflight (`OPTIONS`) short-circuiting.
//! - [`SecurityHeadersMiddleware`]: `nosniff`, frame denial, referrer
//!   policy and optional HSTS on every response.

use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use super::{DEFAULT_LIMIT, RateLimiter};
use crate::clock::{Clock, iso_timestamp};
use crate::{
    Method, Request, Response, StatusCode,
    context::Context,
    middleware::{Middleware, Next},
};

/// Identifier of the calling client, as used for rate-limit accounting.
///
/// [`RateLimitMiddleware`] stores it in the request [`Context`] extensions
/// so downstream handlers can log or key on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

/// Resolves the client identifier for `request`.
///
/// Order: `CF-Connecting-IP`, the first `X-Forwarded-For` hop, the socket
/// peer IP, and finally the literal `"unknown"` (which all unidentifiable
/// clients share).
pub fn client_identifier(request: &Request) -> String {
    let headers = request.headers();
    if let Some(ip) = headers.get("cf-connecting-ip").map(str::trim).filter(|ip| !ip.is_empty()) {
        return ip.to_owned();
    }
    if let Some(first) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return first.to_owned();
    }
    match request.remote_addr() {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_owned(),
    }
}

/// Rejects clients that exceed their per-minute budget with `429 Too Many Requests`.
///
/// `OPTIONS` requests pass through uncounted. Paths containing the strict
/// marker (default `/ai`) are checked against the strict limit, everything
/// else against the standard one. Allowed responses carry
/// `X-RateLimit-Limit` and `X-RateLimit-Remaining`; rejections carry
/// `Retry-After` and a JSON body naming the reset instant.
///
/// `X-RateLimit-Remaining` comes from [`RateLimiter::get_info`], which counts
/// against a fixed budget of 60 regardless of the limit enforced here.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use edgekit::clock::SystemClock;
/// use edgekit::security::{RateLimitMiddleware, RateLimiter};
///
/// let clock = Arc::new(SystemClock);
/// let limiter = Arc::new(RateLimiter::new(clock.clone()));
/// let middleware = RateLimitMiddleware::new(limiter, clock)
///     .limit(30)
///     .strict_limit(10)
///     .strict_marker("/ai");
/// ```
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    limit: u32,
    strict_limit: u32,
    strict_marker: Option<String>,
}

impl RateLimitMiddleware {
    /// Creates the middleware with a standard and strict limit of [`DEFAULT_LIMIT`]
    /// and the strict marker `/ai`.
    pub fn new(limiter: Arc<RateLimiter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter,
            clock,
            limit: DEFAULT_LIMIT,
            strict_limit: DEFAULT_LIMIT,
            strict_marker: Some("/ai".to_owned()),
        }
    }

    /// Sets the per-window budget for ordinary paths.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the per-window budget for paths containing the strict marker.
    #[must_use]
    pub fn strict_limit(mut self, limit: u32) -> Self {
        self.strict_limit = limit;
        self
    }

    /// Sets the path fragment that selects the strict budget. An empty
    /// marker disables strict matching.
    #[must_use]
    pub fn strict_marker(mut self, marker: impl Into<String>) -> Self {
        let marker = marker.into();
        self.strict_marker = (!marker.is_empty()).then_some(marker);
        self
    }

    fn limit_for(&self, path: &str) -> u32 {
        match &self.strict_marker {
            Some(marker) if path.contains(marker.as_str()) => self.strict_limit,
            _ => self.limit,
        }
    }
}

impl Middleware for RateLimitMiddleware {
    fn handle(&self, mut ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let limiter = Arc::clone(&self.limiter);
        let clock = Arc::clone(&self.clock);
        let limit = self.limit_for(ctx.request().path());

        Box::pin(async move {
            if ctx.request().method() == &Method::Options {
                return next.run(ctx).await;
            }

            let client = client_identifier(ctx.request());

            if limiter.is_limited(&client, limit) {
                let info = limiter.get_info(&client);
                let now = clock.now_millis();
                let retry_after = info.reset_at.saturating_sub(now).div_ceil(1000);
                warn!(client = %client, path = %ctx.request().path(), limit, "rate limit exceeded");

                let body = json!({
                    "error": "Rate limit exceeded",
                    "message": format!(
                        "Too many requests. Try again after {}",
                        iso_timestamp(info.reset_at)
                    ),
                    "resetAt": info.reset_at,
                });
                let mut resp = Response::json(StatusCode::TooManyRequests, &body);
                resp.set_header("Retry-After", retry_after.to_string());
                resp.set_header("X-RateLimit-Limit", limit.to_string());
                resp.set_header("X-RateLimit-Remaining", info.remaining.to_string());
                return resp;
            }

            ctx.extensions_mut().insert(ClientId(client.clone()));
            let mut resp = next.run(ctx).await;
            let info = limiter.get_info(&client);
            resp.set_header("X-RateLimit-Limit", limit.to_string());
            resp.set_header("X-RateLimit-Remaining", info.remaining.to_string());
            resp
        })
    }
}

/// CORS middleware for a fixed set of trusted origins.
///
/// # Behavior
///
/// - No `Origin` header, or an origin outside the allow-list: the request
///   passes through and no CORS headers are added.
/// - Allowed origin: it is echoed in `Access-Control-Allow-Origin` together
///   with `Access-Control-Allow-Credentials: true` and `Vary: Origin`.
/// - Allowed `OPTIONS` preflight: short-circuited with `204 No Content`,
///   the allowed methods and headers, and `Access-Control-Max-Age: 86400`.
///
/// Local development origins (`http://localhost[:port]`,
/// `http://127.0.0.1[:port]`) are accepted unless disabled with
/// [`allow_local`](Self::allow_local).
///
/// # Examples
///
/// ```rust
/// use edgekit::security::CorsMiddleware;
///
/// let cors = CorsMiddleware::new()
///     .allow_origin("https://example.com")
///     .allow_origin("https://www.example.com")
///     .allow_local(false);
/// ```
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
    allow_local: bool,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsMiddleware {
    /// Creates a `CorsMiddleware` with an empty allow-list, methods
    /// `GET, POST, OPTIONS`, header `Content-Type`, and local origins allowed.
    pub fn new() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: vec!["GET".to_owned(), "POST".to_owned(), "OPTIONS".to_owned()],
            allowed_headers: vec!["Content-Type".to_owned()],
            allow_local: true,
        }
    }

    /// Adds a trusted origin, compared exactly (e.g. `"https://example.com"`).
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Adds an allowed method to the preflight answer.
    #[must_use]
    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allowed_methods.push(method.into());
        self
    }

    /// Adds an allowed request header to the preflight answer.
    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_headers.push(header.into());
        self
    }

    /// Controls whether `localhost` / `127.0.0.1` origins over plain HTTP are trusted.
    #[must_use]
    pub fn allow_local(mut self, allow: bool) -> Self {
        self.allow_local = allow;
        self
    }

    fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin) || (self.allow_local && is_local_origin(origin))
    }
}

// `http://localhost` or `http://127.0.0.1`, optionally with a numeric port.
fn is_local_origin(origin: &str) -> bool {
    let Some(rest) = origin.strip_prefix("http://") else {
        return false;
    };
    let (host, port) = match rest.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (rest, None),
    };
    let port_ok = port.is_none_or(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    (host == "localhost" || host == "127.0.0.1") && port_ok
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let origin = ctx
            .request()
            .headers()
            .get("origin")
            .filter(|o| self.is_allowed(o))
            .map(str::to_owned);
        let methods = self.allowed_methods.join(", ");
        let headers = self.allowed_headers.join(", ");

        Box::pin(async move {
            let Some(origin) = origin else {
                return next.run(ctx).await;
            };

            if ctx.request().method() == &Method::Options {
                return Response::new(StatusCode::NoContent)
                    .header("Access-Control-Allow-Origin", &origin)
                    .header("Access-Control-Allow-Credentials", "true")
                    .header("Access-Control-Allow-Methods", methods)
                    .header("Access-Control-Allow-Headers", headers)
                    .header("Access-Control-Max-Age", "86400")
                    .header("Vary", "Origin");
            }

            let mut resp = next.run(ctx).await;
            resp.set_header("Access-Control-Allow-Origin", origin);
            resp.set_header("Access-Control-Allow-Credentials", "true");
            resp.add_header("Vary", "Origin");
            resp
        })
    }
}

/// Adds hardening headers to every response that does not already set them.
///
/// | Header                      | Value                                   |
/// |-----------------------------|-----------------------------------------|
/// | `X-Content-Type-Options`    | `nosniff`                               |
/// | `X-Frame-Options`           | `DENY`                                  |
/// | `Referrer-Policy`           | `strict-origin-when-cross-origin`       |
/// | `Strict-Transport-Security` | `max-age=31536000; includeSubDomains` (only with [`hsts`](Self::hsts)) |
pub struct SecurityHeadersMiddleware {
    headers: Vec<(&'static str, String)>,
}

impl Default for SecurityHeadersMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityHeadersMiddleware {
    pub fn new() -> Self {
        Self {
            headers: vec![
                ("X-Content-Type-Options", "nosniff".to_owned()),
                ("X-Frame-Options", "DENY".to_owned()),
                ("Referrer-Policy", "strict-origin-when-cross-origin".to_owned()),
            ],
        }
    }

    /// Also emit `Strict-Transport-Security`. Leave off for plain-HTTP local development.
    #[must_use]
    pub fn hsts(mut self, enabled: bool) -> Self {
        self.headers.retain(|(name, _)| *name != "Strict-Transport-Security");
        if enabled {
            self.headers.push((
                "Strict-Transport-Security",
                "max-age=31536000; includeSubDomains".to_owned(),
            ));
        }
        self
    }
}

impl Middleware for SecurityHeadersMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let headers = self.headers.clone();
        Box::pin(async move {
            let mut resp = next.run(ctx).await;
            for (name, value) in headers {
                if !resp.headers().contains(name) {
                    resp.add_header(name, value);
                }
            }
            resp
        })
    }
}
