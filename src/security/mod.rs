//! Request admission and response hardening.
//!
//! [`RateLimiter`] holds the per-client counters; the middleware in
//! [`middleware`] applies it, along with CORS and security headers, to
//! requests flowing through a [`Pipeline`](crate::middleware::Pipeline).

pub mod middleware;
pub mod rate_limit;

pub use middleware::{
    ClientId, CorsMiddleware, RateLimitMiddleware, SecurityHeadersMiddleware, client_identifier,
};
pub use rate_limit::{DEFAULT_LIMIT, RateLimitInfo, RateLimiter, WINDOW_MS};
