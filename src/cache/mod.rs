//! Response caching: deduplicates identical upstream calls within a TTL window.
//!
//! The layer is split the way an edge platform splits it:
//!
//! - [`CacheStore`]: the key/value response store. On a CDN edge this is the
//!   platform cache; [`MemoryStore`] is the in-process stand-in that tracks
//!   expiry itself.
//! - [`ResponseCache`]: the policy on top: stamps `Cache-Control`, `X-Cache`
//!   and `X-Cache-Date`, and annotates hits.
//! - [`CacheKey`]: request identity (method + URL). Callers choose the URL,
//!   so they control granularity; nothing here canonicalizes it.

use thiserror::Error;

pub mod key;
pub mod response_cache;
pub mod store;

pub use key::CacheKey;
pub use response_cache::{DEFAULT_TTL_SECS, ResponseCache, cache_control_max_age};
pub use store::{CacheStore, MemoryStore, StoreFuture};

/// Failures surfaced by a [`CacheStore`].
///
/// [`ResponseCache`] never catches these; the calling handler decides
/// whether to treat them as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cache store rejected entry for {key}: {reason}")]
    Rejected { key: String, reason: String },
}
