//! Edge configuration and the composition root that wires it together.
//!
//! [`EdgeConfig`] is a plain serde document (every field has a default) that
//! can be overridden from the environment. [`EdgeState`] owns the long-lived
//! shared pieces (clock, rate limiter, response cache) and is constructed
//! exactly once per process; [`EdgeConfig::pipeline`] assembles the
//! middleware stack around an origin endpoint using that state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{DEFAULT_TTL_SECS, MemoryStore, ResponseCache};
use crate::clock::Clock;
use crate::context::Context;
use crate::middleware::{CacheMiddleware, LoggerMiddleware, Pipeline};
use crate::security::{
    CorsMiddleware, DEFAULT_LIMIT, RateLimitMiddleware, RateLimiter, SecurityHeadersMiddleware,
};
use crate::Response;

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Runtime settings for the edge layer.
///
/// # Examples
///
/// ```
/// use edgekit::config::EdgeConfig;
///
/// let config = EdgeConfig::from_json(r#"{ "cache_ttl_secs": 600 }"#).unwrap();
/// assert_eq!(config.cache_ttl_secs, 600);
/// assert_eq!(config.rate_limit_per_minute, 60);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Address the server listens on.
    pub bind_addr: String,
    /// Requests per client per window on ordinary paths.
    pub rate_limit_per_minute: u32,
    /// Requests per client per window on paths containing `strict_path_marker`.
    pub strict_rate_limit_per_minute: u32,
    /// Path fragment selecting the strict limit; empty disables it.
    pub strict_path_marker: String,
    /// TTL stamped on cached upstream responses.
    pub cache_ttl_secs: u64,
    /// Exact origins trusted for CORS.
    pub allowed_origins: Vec<String>,
    /// Trust `http://localhost` / `http://127.0.0.1` origins.
    pub allow_local_origins: bool,
    /// Emit `Strict-Transport-Security`.
    pub hsts: bool,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_owned(),
            rate_limit_per_minute: DEFAULT_LIMIT,
            strict_rate_limit_per_minute: 10,
            strict_path_marker: "/ai".to_owned(),
            cache_ttl_secs: DEFAULT_TTL_SECS,
            allowed_origins: Vec::new(),
            allow_local_origins: true,
            hsts: false,
        }
    }
}

impl EdgeConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Applies overrides from the process environment.
    ///
    /// Recognized variables: `RATE_LIMIT_PER_MINUTE`, `CACHE_TTL`,
    /// `ALLOWED_ORIGINS` (comma-separated) and `EDGE_BIND_ADDR`.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup` instead of the real environment.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RATE_LIMIT_PER_MINUTE") {
            self.rate_limit_per_minute = parse_var("RATE_LIMIT_PER_MINUTE", &v)?;
        }
        if let Some(v) = lookup("CACHE_TTL") {
            self.cache_ttl_secs = parse_var("CACHE_TTL", &v)?;
        }
        if let Some(v) = lookup("ALLOWED_ORIGINS") {
            self.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(v) = lookup("EDGE_BIND_ADDR") {
            self.bind_addr = v;
        }
        debug!(config = ?self, "configuration loaded");
        Ok(self)
    }

    /// Assembles the request pipeline around `endpoint`.
    ///
    /// Layer order, outermost first: logging, security headers, CORS,
    /// rate limiting, response cache. Rejected and preflight requests
    /// therefore still get security headers and a log line, and never touch
    /// the cache.
    pub fn pipeline<H, F>(&self, state: &EdgeState, endpoint: H) -> Pipeline
    where
        H: Fn(Context) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let cors = self
            .allowed_origins
            .iter()
            .fold(CorsMiddleware::new(), |cors, origin| cors.allow_origin(origin.clone()))
            .allow_local(self.allow_local_origins);

        Pipeline::new(endpoint)
            .layer(LoggerMiddleware)
            .layer(SecurityHeadersMiddleware::new().hsts(self.hsts))
            .layer(cors)
            .layer(
                RateLimitMiddleware::new(Arc::clone(&state.limiter), Arc::clone(&state.clock))
                    .limit(self.rate_limit_per_minute)
                    .strict_limit(self.strict_rate_limit_per_minute)
                    .strict_marker(self.strict_path_marker.clone()),
            )
            .layer(CacheMiddleware::new(Arc::clone(&state.cache)).ttl(self.cache_ttl_secs))
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_owned(),
    })
}

/// Process-wide state shared by every request.
///
/// Nothing here is global: tests build a fresh `EdgeState` per case.
pub struct EdgeState {
    pub clock: Arc<dyn Clock>,
    pub limiter: Arc<RateLimiter>,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<ResponseCache>,
}

impl EdgeState {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(MemoryStore::new(Arc::clone(&clock)));
        let cache = Arc::new(ResponseCache::new(store.clone(), Arc::clone(&clock)));
        let limiter = Arc::new(RateLimiter::new(Arc::clone(&clock)));
        Self {
            clock,
            limiter,
            store,
            cache,
        }
    }

    /// Reclaims expired rate records and cache entries once.
    ///
    /// Returns `(rate_records_removed, cache_entries_removed)`.
    pub async fn sweep(&self) -> (usize, usize) {
        let records = self.limiter.purge_expired();
        let entries = self.store.purge_expired().await;
        (records, entries)
    }

    /// Runs [`sweep`](Self::sweep) every `period` on a background task.
    ///
    /// Optional: without it, state only grows until the process restarts.
    pub fn spawn_housekeeping(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let (records, entries) = state.sweep().await;
                debug!(records, entries, "housekeeping sweep");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::clock::ManualClock;
    use crate::{Method, Request, StatusCode};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = EdgeConfig::default();
        assert_eq!(config.rate_limit_per_minute, 60);
        assert_eq!(config.strict_rate_limit_per_minute, 10);
        assert_eq!(config.cache_ttl_secs, 3600);
        assert!(config.allow_local_origins);
        assert!(!config.hsts);
    }

    #[test]
    fn json_overrides_some_fields() {
        let config = EdgeConfig::from_json(
            r#"{"allowed_origins": ["https://example.com"], "hsts": true}"#,
        )
        .unwrap();
        assert_eq!(config.allowed_origins, vec!["https://example.com"]);
        assert!(config.hsts);
        assert_eq!(config.bind_addr, "127.0.0.1:8787");
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            EdgeConfig::from_json(r#"{"cache_ttl_secs": "soon"}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn env_overrides() {
        let config = EdgeConfig::default()
            .apply_env_from(env(&[
                ("RATE_LIMIT_PER_MINUTE", "30"),
                ("CACHE_TTL", " 120 "),
                ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ]))
            .unwrap();
        assert_eq!(config.rate_limit_per_minute, 30);
        assert_eq!(config.cache_ttl_secs, 120);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn env_rejects_non_numeric_limit() {
        let err = EdgeConfig::default()
            .apply_env_from(env(&[("RATE_LIMIT_PER_MINUTE", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "RATE_LIMIT_PER_MINUTE", .. }
        ));
    }

    #[tokio::test]
    async fn sweep_reclaims_expired_state() {
        let clock = Arc::new(ManualClock::new(0));
        let state = EdgeState::new(clock.clone());
        let config = EdgeConfig {
            cache_ttl_secs: 30,
            ..EdgeConfig::default()
        };
        let pipeline = config.pipeline(&state, |_ctx: Context| async {
            Response::new(StatusCode::Ok).body("origin")
        });

        let req = Request::new(Method::Get, "/api/feed.xml")
            .header("Host", "example.com")
            .header("CF-Connecting-IP", "1.2.3.4");
        pipeline.handle(req).await;
        assert_eq!(state.limiter.len(), 1);
        assert_eq!(state.store.len().await, 1);

        clock.advance(Duration::from_secs(61));
        assert_eq!(state.sweep().await, (1, 1));
        assert!(state.limiter.is_empty());
    }
}
