//! Cache coordination.
//!
//! The coordinator owns the single active store and drives the per-request
//! cache state: it decides before dispatch whether a request is served from
//! the cache, and after dispatch whether the handler output is written back.

use std::{str::FromStr, sync::Arc};

use axum::http::{HeaderMap, Method, Uri};
use bytes::Bytes;
use metrics::counter;
use tracing::{debug, error, info, warn};

use super::{
    config::CacheConfig,
    eligibility,
    keys::{MediaType, cache_key},
    policy::CachePolicy,
    store::{Backend, CacheStatus, CacheStore, LocalStore, SharedStore, StoreError},
};

/// Per-request cache state, decided once before the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCtl {
    /// Not a cache candidate.
    None,
    /// Candidate with nothing cached under `key`.
    Miss { key: String },
    /// Cached body for the negotiated representation.
    Hit { value: Bytes, media: MediaType },
}

impl CacheCtl {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Miss { .. } => "miss",
            Self::Hit { .. } => "hit",
        }
    }
}

/// Operator commands accepted by the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCommand {
    Flush,
}

impl FromStr for CacheCommand {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "flush" => Ok(Self::Flush),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct CacheCoordinator {
    store: Option<Arc<dyn CacheStore>>,
    max_body_bytes: usize,
}

impl CacheCoordinator {
    /// A coordinator that treats every request as a non-candidate.
    pub fn disabled() -> Self {
        Self {
            store: None,
            max_body_bytes: CacheConfig::default().max_body_bytes,
        }
    }

    pub fn with_store(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store: Some(store),
            max_body_bytes: CacheConfig::default().max_body_bytes,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Select and initialise the backend described by `config`.
    ///
    /// An unreachable Redis host leaves caching disabled instead of failing.
    pub async fn from_config(config: &CacheConfig) -> Self {
        let Some(raw_policy) = config.policy.as_deref() else {
            info!(cache = "disabled", "response cache not configured");
            return Self::disabled();
        };

        let policy = CachePolicy::parse(raw_policy);
        let store: Arc<dyn CacheStore> = match config.redis.as_ref() {
            Some(redis) => match SharedStore::connect(redis, &policy).await {
                Ok(store) => Arc::new(store),
                Err(err) => {
                    error!(
                        cache = "redis",
                        url = %redis.url,
                        error = %err,
                        "redis cache unavailable, response caching disabled"
                    );
                    return Self::disabled();
                }
            },
            None => Arc::new(LocalStore::new(&policy)),
        };

        info!(
            backend = store.backend().as_str(),
            bounded = policy.is_bounded(),
            max_entries = policy.max_entries.map(|max| max.get()),
            retention_secs = policy.retention.map(|retention| retention.as_secs()),
            "response cache enabled"
        );

        Self::with_store(store).with_max_body_bytes(config.max_body_bytes)
    }

    pub fn is_active(&self) -> bool {
        self.store.is_some()
    }

    pub fn backend(&self) -> Option<Backend> {
        self.store.as_ref().map(|store| store.backend())
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Decide the cache state for a request before it is dispatched.
    ///
    /// A failed lookup is reported as a miss so the request still completes
    /// through its handler.
    pub async fn evaluate(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> CacheCtl {
        let Some(store) = self.store.as_ref() else {
            return CacheCtl::None;
        };
        if !eligibility::is_candidate(method, uri.path()) {
            return CacheCtl::None;
        }

        let backend = store.backend().as_str();
        let media = MediaType::negotiate(headers);
        let key = cache_key(uri, media);

        match store.get(&key).await {
            Ok(Some(value)) => {
                counter!("backrest_cache_hit_total", "backend" => backend).increment(1);
                debug!(cache = backend, outcome = "hit", key = %key, "serving cached response");
                CacheCtl::Hit { value, media }
            }
            Ok(None) => {
                counter!("backrest_cache_miss_total", "backend" => backend).increment(1);
                debug!(
                    cache = backend,
                    outcome = "miss",
                    key = %key,
                    "cache miss, executing handler"
                );
                CacheCtl::Miss { key }
            }
            Err(err) => {
                counter!("backrest_cache_read_error_total", "backend" => backend).increment(1);
                warn!(
                    cache = backend,
                    key = %key,
                    error = %err,
                    "cache read failed, treating as miss"
                );
                CacheCtl::Miss { key }
            }
        }
    }

    /// Write a handler's body back under the key chosen by [`evaluate`].
    ///
    /// Only a `Miss` is ever written. Write failures are logged and dropped.
    /// Returns whether the body was stored.
    ///
    /// [`evaluate`]: Self::evaluate
    pub async fn remember(&self, ctl: &CacheCtl, body: Bytes) -> bool {
        let CacheCtl::Miss { key } = ctl else {
            return false;
        };
        let Some(store) = self.store.as_ref() else {
            return false;
        };

        let backend = store.backend().as_str();
        let len = body.len();
        match store.put(key, body).await {
            Ok(()) => {
                debug!(cache = backend, key = %key, bytes = len, "cached response");
                true
            }
            Err(err) => {
                counter!("backrest_cache_write_error_total", "backend" => backend).increment(1);
                warn!(
                    cache = backend,
                    key = %key,
                    error = %err,
                    "cache write failed, response served uncached"
                );
                false
            }
        }
    }

    /// Entry count and size of the active store, or `None` when inactive.
    pub async fn status(&self) -> Option<Result<CacheStatus, StoreError>> {
        let store = self.store.as_ref()?;
        Some(store.status().await)
    }

    /// Execute an operator command. Unknown commands are logged and ignored.
    pub async fn run_command(&self, command: Option<&str>) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let backend = store.backend().as_str();

        match command.map(str::parse::<CacheCommand>) {
            Some(Ok(CacheCommand::Flush)) => match store.invalidate_all().await {
                Ok(()) => info!(cache = backend, command = "flush", "cache flushed"),
                Err(err) => error!(
                    cache = backend,
                    command = "flush",
                    error = %err,
                    "cache flush failed"
                ),
            },
            Some(Err(unknown)) => {
                info!(cache = backend, command = %unknown, "unknown cache command");
            }
            None => info!(cache = backend, "cache command missing"),
        }
    }

    pub async fn shutdown(&self) {
        if let Some(store) = self.store.as_ref() {
            store.shutdown().await;
            info!(cache = store.backend().as_str(), "response cache shut down");
        }
    }
}
