//! Response-cache middleware.

use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{Middleware, Next};
use crate::cache::store::has_directive;
use crate::cache::{CacheKey, DEFAULT_TTL_SECS, ResponseCache};
use crate::{Method, Response, context::Context};

/// Serves `GET` requests from a [`ResponseCache`], filling it on a miss.
///
/// The request is keyed by method and reconstructed URL. On a hit the
/// downstream layers never run. On a miss the downstream response is
/// cached only if it is a 2xx the origin did not mark per-client, using
/// the configured TTL. Other methods bypass the cache entirely.
///
/// A response is per-client when its `Cache-Control` carries `private` or
/// `no-store`, or it sets a cookie. Those pass through unstamped, since the
/// stored copy would otherwise be served to every other client.
///
/// The cache itself never swallows store failures; this middleware does:
/// a failed lookup is treated as a miss and a failed write returns the
/// upstream response unstamped, each with a `warn!` record.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use edgekit::cache::{MemoryStore, ResponseCache};
/// use edgekit::clock::SystemClock;
/// use edgekit::middleware::CacheMiddleware;
///
/// let clock = Arc::new(SystemClock);
/// let cache = Arc::new(ResponseCache::new(Arc::new(MemoryStore::new(clock.clone())), clock));
/// let middleware = CacheMiddleware::new(cache).ttl(600);
/// ```
pub struct CacheMiddleware {
    cache: Arc<ResponseCache>,
    ttl_secs: u64,
}

impl CacheMiddleware {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self {
            cache,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }

    /// Sets the TTL stamped onto cached responses.
    #[must_use]
    pub fn ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let cache = Arc::clone(&self.cache);
        let ttl_secs = self.ttl_secs;

        Box::pin(async move {
            if ctx.request().method() != &Method::Get {
                return next.run(ctx).await;
            }

            let key = CacheKey::from_request(ctx.request());
            match cache.get(&key).await {
                Ok(Some(hit)) => return hit,
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "cache lookup failed; treating as miss"),
            }

            let response = next.run(ctx).await;
            if !response.status().is_success() {
                debug!(key = %key, status = response.status().as_u16(), "not caching non-2xx response");
                return response;
            }
            if is_per_client(&response) {
                debug!(key = %key, "not caching per-client response");
                return response;
            }

            match cache.put_with_ttl(&key, response.clone(), ttl_secs).await {
                Ok(fresh) => fresh,
                Err(e) => {
                    warn!(key = %key, error = %e, "cache write failed; serving uncached");
                    response
                }
            }
        })
    }
}

fn is_per_client(response: &Response) -> bool {
    let headers = response.headers();
    if headers.contains("set-cookie") {
        return true;
    }
    headers.get_all("cache-control").any(|value| {
        has_directive(value, "private") || has_directive(value, "no-store")
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::cache::{CacheError, CacheStore, MemoryStore, StoreFuture};
    use crate::clock::ManualClock;
    use crate::middleware::Pipeline;
    use crate::{Request, StatusCode};

    fn counting_pipeline(
        cache: Arc<ResponseCache>,
        status: StatusCode,
        ttl: u64,
    ) -> (Arc<AtomicUsize>, Pipeline) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let pipeline = Pipeline::new(move |_ctx: Context| {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Response::new(status).body(format!("upstream #{n}")) }
        })
        .layer(CacheMiddleware::new(cache).ttl(ttl));
        (calls, pipeline)
    }

    fn memory_cache(clock: Arc<ManualClock>) -> Arc<ResponseCache> {
        Arc::new(ResponseCache::new(
            Arc::new(MemoryStore::new(clock.clone())),
            clock,
        ))
    }

    fn get(target: &str) -> Request {
        Request::new(Method::Get, target).header("Host", "example.com")
    }

    #[tokio::test]
    async fn second_get_is_served_from_cache() {
        let clock = Arc::new(ManualClock::new(0));
        let (calls, pipeline) = counting_pipeline(memory_cache(clock), StatusCode::Ok, 120);

        let first = pipeline.handle(get("/api/youtube/videos?id=abc")).await;
        assert_eq!(first.headers().get("x-cache"), Some("MISS"));

        let second = pipeline.handle(get("/api/youtube/videos?id=abc")).await;
        assert_eq!(second.headers().get("x-cache"), Some("HIT"));
        assert_eq!(second.headers().get("cache-control"), Some("public, max-age=120"));
        assert_eq!(second.body_ref().as_ref(), b"upstream #1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_query_is_a_different_entry() {
        let clock = Arc::new(ManualClock::new(0));
        let (calls, pipeline) = counting_pipeline(memory_cache(clock), StatusCode::Ok, 120);

        pipeline.handle(get("/api/youtube/search?q=a")).await;
        pipeline.handle(get("/api/youtube/search?q=b")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entry_goes_back_upstream() {
        let clock = Arc::new(ManualClock::new(0));
        let (calls, pipeline) = counting_pipeline(memory_cache(clock.clone()), StatusCode::Ok, 60);

        pipeline.handle(get("/api/feed.xml")).await;
        clock.advance(Duration::from_secs(61));
        let resp = pipeline.handle(get("/api/feed.xml")).await;

        assert_eq!(resp.headers().get("x-cache"), Some("MISS"));
        assert_eq!(resp.body_ref().as_ref(), b"upstream #2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn error_responses_are_not_cached() {
        let clock = Arc::new(ManualClock::new(0));
        let (calls, pipeline) = counting_pipeline(memory_cache(clock), StatusCode::BadGateway, 60);

        let first = pipeline.handle(get("/api/youtube/search")).await;
        assert_eq!(first.status(), StatusCode::BadGateway);
        assert!(!first.headers().contains("x-cache"));
        pipeline.handle(get("/api/youtube/search")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn per_client_responses_are_not_shared() {
        let cases: [(&str, &str); 4] = [
            ("Cache-Control", "private, no-store"),
            ("Cache-Control", "no-store"),
            ("Cache-Control", "Private=\"Set-Cookie\""),
            ("Set-Cookie", "session=abc; HttpOnly"),
        ];

        for (name, value) in cases {
            let clock = Arc::new(ManualClock::new(0));
            let calls = Arc::new(AtomicUsize::new(0));
            let seen = Arc::clone(&calls);
            let pipeline = Pipeline::new(move |ctx: Context| {
                let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
                let client = ctx.request().headers().get("x-client").unwrap_or("").to_owned();
                async move {
                    Response::new(StatusCode::Ok)
                        .header(name, value)
                        .body(format!("account of {client} #{n}"))
                }
            })
            .layer(CacheMiddleware::new(memory_cache(clock)));

            let first = pipeline.handle(get("/api/account").header("X-Client", "1.1.1.1")).await;
            assert!(!first.headers().contains("x-cache"), "{name}: {value}");
            assert_eq!(first.headers().get(name), Some(value));

            let second = pipeline.handle(get("/api/account").header("X-Client", "2.2.2.2")).await;
            assert!(!second.headers().contains("x-cache"), "{name}: {value}");
            assert_eq!(second.body_ref().as_ref(), b"account of 2.2.2.2 #2");
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        }
    }

    #[tokio::test]
    async fn non_get_bypasses_cache() {
        let clock = Arc::new(ManualClock::new(0));
        let (calls, pipeline) = counting_pipeline(memory_cache(clock), StatusCode::Ok, 60);

        for _ in 0..2 {
            let req = Request::new(Method::Post, "/api/contact").header("Host", "example.com");
            let resp = pipeline.handle(req).await;
            assert!(!resp.headers().contains("x-cache"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn lookup<'a>(&'a self, _key: &'a CacheKey) -> StoreFuture<'a, Option<Response>> {
            Box::pin(async { Err(CacheError::Unavailable("down".into())) })
        }

        fn store<'a>(&'a self, key: &'a CacheKey, _response: Response) -> StoreFuture<'a, ()> {
            Box::pin(async move {
                Err(CacheError::Rejected {
                    key: key.to_string(),
                    reason: "read-only".into(),
                })
            })
        }
    }

    #[tokio::test]
    async fn store_failures_degrade_to_pass_through() {
        let cache = Arc::new(ResponseCache::new(
            Arc::new(BrokenStore),
            Arc::new(ManualClock::new(0)),
        ));
        let (calls, pipeline) = counting_pipeline(cache, StatusCode::Ok, 60);

        let resp = pipeline.handle(get("/api/gallery-items")).await;
        assert_eq!(resp.status(), StatusCode::Ok);
        assert_eq!(resp.body_ref().as_ref(), b"upstream #1");
        assert!(!resp.headers().contains("x-cache"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
