//! Response stores addressed by [`CacheKey`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::{CacheError, CacheKey, cache_control_max_age};
use crate::clock::Clock;
use crate::http::Response;

/// Boxed future returned by [`CacheStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// A key/value response store with `match`/`put` semantics.
///
/// Implementations own expiry: an entry stays visible until the
/// `max-age` in its stored `Cache-Control` header runs out. Both operations
/// may suspend, and no lock is held across calls, so two concurrent misses
/// for one key both write and the later write wins.
pub trait CacheStore: Send + Sync {
    /// Returns the live entry for `key`, or `None`.
    fn lookup<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<Response>>;

    /// Stores `response` under `key`, replacing any previous entry.
    fn store<'a>(&'a self, key: &'a CacheKey, response: Response) -> StoreFuture<'a, ()>;
}

#[derive(Debug)]
struct StoredEntry {
    response: Response,
    expires_at: u64,
}

/// In-process [`CacheStore`] with explicit expiry tracking.
///
/// `store` records `now + max-age` next to the response; `lookup` treats an
/// entry at or past that instant as absent and drops it. Responses without a
/// positive `max-age`, or marked `no-store`, are not retained. Memory is only
/// reclaimed on lookup or by [`purge_expired`](Self::purge_expired).
pub struct MemoryStore {
    entries: RwLock<HashMap<CacheKey, StoredEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Drops every expired entry and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "purged expired cache entries");
        }
        removed
    }

    /// Number of entries held, including expired ones not yet reclaimed.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn lookup<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<Response>> {
        Box::pin(async move {
            let now = self.clock.now_millis();
            {
                let entries = self.entries.read().await;
                match entries.get(key) {
                    None => return Ok(None),
                    Some(entry) if entry.expires_at > now => {
                        return Ok(Some(entry.response.clone()));
                    }
                    Some(_) => {}
                }
            }

            // Expired: re-check under the write lock, a concurrent store may have refreshed it.
            let mut entries = self.entries.write().await;
            if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
                entries.remove(key);
                debug!(key = %key, "cache entry expired");
            }
            Ok(None)
        })
    }

    fn store<'a>(&'a self, key: &'a CacheKey, response: Response) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let cache_control = response.headers().get("cache-control").unwrap_or("");
            if has_directive(cache_control, "no-store") {
                return Ok(());
            }
            let Some(max_age) = cache_control_max_age(cache_control).filter(|secs| *secs > 0)
            else {
                return Ok(());
            };

            let expires_at = self
                .clock
                .now_millis()
                .saturating_add(max_age.saturating_mul(1000));
            self.entries.write().await.insert(
                key.clone(),
                StoredEntry {
                    response,
                    expires_at,
                },
            );
            Ok(())
        })
    }
}

/// Reports whether a `Cache-Control` value carries `directive`, ignoring case.
pub(crate) fn has_directive(cache_control: &str, directive: &str) -> bool {
    cache_control
        .split(',')
        .filter_map(|d| d.split('=').next())
        .any(|name| name.trim().eq_ignore_ascii_case(directive))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::http::StatusCode;

    fn cacheable(max_age: u64, body: &str) -> Response {
        Response::new(StatusCode::Ok)
            .header("Cache-Control", format!("public, max-age={max_age}"))
            .body(body.to_owned())
    }

    #[tokio::test]
    async fn lookup_unknown_key_is_none() {
        let store = MemoryStore::new(Arc::new(ManualClock::new(0)));
        let found = store.lookup(&CacheKey::get("https://a.example/")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn entry_visible_until_max_age() {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = MemoryStore::new(clock.clone());
        let key = CacheKey::get("https://a.example/feed.xml");

        store.store(&key, cacheable(120, "feed")).await.unwrap();

        clock.advance(Duration::from_secs(119));
        assert!(store.lookup(&key).await.unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert!(store.lookup(&key).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn uncacheable_responses_are_not_retained() {
        let store = MemoryStore::new(Arc::new(ManualClock::new(0)));
        let key = CacheKey::get("https://a.example/x");

        store
            .store(&key, Response::new(StatusCode::Ok).body("no header"))
            .await
            .unwrap();
        store
            .store(
                &key,
                Response::new(StatusCode::Ok).header("Cache-Control", "no-store, max-age=60"),
            )
            .await
            .unwrap();
        store
            .store(
                &key,
                Response::new(StatusCode::Ok).header("Cache-Control", "public, max-age=0"),
            )
            .await
            .unwrap();

        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn store_overwrites_and_resets_expiry() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryStore::new(clock.clone());
        let key = CacheKey::get("https://a.example/x");

        store.store(&key, cacheable(10, "first")).await.unwrap();
        clock.advance(Duration::from_secs(8));
        store.store(&key, cacheable(10, "second")).await.unwrap();
        clock.advance(Duration::from_secs(8));

        let found = store.lookup(&key).await.unwrap().unwrap();
        assert_eq!(found.body_ref().as_ref(), b"second");
    }

    #[tokio::test]
    async fn purge_expired_reclaims_only_stale_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryStore::new(clock.clone());

        store
            .store(&CacheKey::get("https://a.example/short"), cacheable(5, "a"))
            .await
            .unwrap();
        store
            .store(&CacheKey::get("https://a.example/long"), cacheable(500, "b"))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(6));
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }
}
