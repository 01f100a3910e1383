//! Cache storage backends.
//!
//! Both backends implement [`CacheStore`]; the coordinator only ever talks to
//! the trait object selected at startup.

mod local;
mod shared;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

pub use local::LocalStore;
pub use shared::{RedisSettings, SharedStore, normalize_redis_url};

/// Which physical store backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Local,
    Redis,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Redis => "redis",
        }
    }
}

/// Entry count and approximate memory usage of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub entries: u64,
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
    #[error("failed to create connection pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),
    #[error("redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),
    #[error("unexpected reply from cache backend: {0}")]
    Protocol(String),
}

impl StoreError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

/// Storage contract shared by every cache backend.
///
/// Implementations must be safe to call concurrently from any number of
/// in-flight requests without external locking.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn backend(&self) -> Backend;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError>;

    async fn invalidate_all(&self) -> Result<(), StoreError>;

    async fn status(&self) -> Result<CacheStatus, StoreError>;

    /// Release backend resources. Called once when the service stops.
    async fn shutdown(&self) {}
}
