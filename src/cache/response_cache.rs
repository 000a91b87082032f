//! Cache policy: TTL stamping on write, hit annotation on read.

use std::sync::Arc;

use tracing::debug;

use super::{CacheError, CacheKey, CacheStore};
use crate::clock::{Clock, http_date};
use crate::http::Response;

/// TTL applied by [`ResponseCache::put`].
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Placeholder written to `X-Cache-Date` when a stored entry lacks one.
const UNKNOWN_DATE: &str = "unknown";

/// Wraps a [`CacheStore`] and applies the edge caching policy.
///
/// Every response written through [`put`](Self::put) leaves with
/// `Cache-Control: public, max-age=<ttl>`, `X-Cache: MISS` and an
/// `X-Cache-Date` stamp; every hit returned by [`get`](Self::get) carries
/// `X-Cache: HIT` and the original stamp.
///
/// Nothing is locked between a `get` miss and the following `put`: two
/// concurrent misses for the same key both reach upstream and both write,
/// and the later write wins.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), edgekit::cache::CacheError> {
/// use std::sync::Arc;
/// use edgekit::cache::{CacheKey, MemoryStore, ResponseCache};
/// use edgekit::clock::SystemClock;
/// use edgekit::http::{Response, StatusCode};
///
/// let clock = Arc::new(SystemClock);
/// let cache = ResponseCache::new(Arc::new(MemoryStore::new(clock.clone())), clock);
/// let key = CacheKey::get("https://api.example/videos?id=1");
///
/// assert!(cache.get(&key).await?.is_none());
/// let fresh = cache.put_with_ttl(&key, Response::new(StatusCode::Ok).body("x"), 120).await?;
/// assert_eq!(fresh.headers().get("x-cache"), Some("MISS"));
///
/// let hit = cache.get(&key).await?.expect("stored");
/// assert_eq!(hit.headers().get("x-cache"), Some("HIT"));
/// assert_eq!(hit.headers().get("cache-control"), Some("public, max-age=120"));
/// # Ok(())
/// # }
/// ```
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Looks up `key` and annotates a hit.
    ///
    /// On a hit the stored headers are copied, `X-Cache` is set to `HIT` and
    /// `X-Cache-Date` keeps the stored stamp (or `unknown`). Status, status
    /// text and body come through untouched. A miss returns `Ok(None)` and
    /// has no side effects.
    ///
    /// # Errors
    ///
    /// Store failures are returned unchanged.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Response>, CacheError> {
        let Some(stored) = self.store.lookup(key).await? else {
            debug!(key = %key, "cache miss");
            return Ok(None);
        };

        let mut headers = stored.headers().clone();
        let cached_at = headers
            .get("x-cache-date")
            .unwrap_or(UNKNOWN_DATE)
            .to_owned();
        headers.set("X-Cache", "HIT");
        headers.set("X-Cache-Date", cached_at);

        debug!(key = %key, status = stored.status().as_u16(), "cache hit");
        Ok(Some(stored.with_headers(headers)))
    }

    /// Stores `response` under `key` with [`DEFAULT_TTL_SECS`].
    ///
    /// See [`put_with_ttl`](Self::put_with_ttl).
    pub async fn put(&self, key: &CacheKey, response: Response) -> Result<Response, CacheError> {
        self.put_with_ttl(key, response, DEFAULT_TTL_SECS).await
    }

    /// Stamps `response` for caching, stores a copy, and returns it.
    ///
    /// `Cache-Control` is overwritten with `public, max-age=<ttl_secs>`,
    /// `X-Cache` set to `MISS` and `X-Cache-Date` to the current HTTP-date.
    /// The store receives its own clone, so later edits to the returned
    /// response do not reach the cached entry.
    ///
    /// # Errors
    ///
    /// Store failures are returned unchanged; the response is not returned
    /// in that case.
    pub async fn put_with_ttl(
        &self,
        key: &CacheKey,
        response: Response,
        ttl_secs: u64,
    ) -> Result<Response, CacheError> {
        let mut headers = response.headers().clone();
        headers.set("Cache-Control", format!("public, max-age={ttl_secs}"));
        headers.set("X-Cache", "MISS");
        headers.set("X-Cache-Date", http_date(self.clock.now_millis()));

        let fresh = response.with_headers(headers);
        self.store.store(key, fresh.clone()).await?;

        debug!(key = %key, ttl_secs, "cached upstream response");
        Ok(fresh)
    }
}

/// Extracts the `max-age` directive (in seconds) from a `Cache-Control` value.
///
/// ```
/// use edgekit::cache::cache_control_max_age;
///
/// assert_eq!(cache_control_max_age("public, max-age=600"), Some(600));
/// assert_eq!(cache_control_max_age("no-cache"), None);
/// ```
pub fn cache_control_max_age(value: &str) -> Option<u64> {
    value.split(',').find_map(|directive| {
        let (name, secs) = directive.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            secs.trim().trim_matches('"').parse().ok()
        } else {
            None
        }
    })
}
