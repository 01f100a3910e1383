//! Shared networked store backed by Redis.
//!
//! Redis has no entry-count ceiling, so the configured capacity is converted
//! into a memory ceiling at an assumed average document size. Redis TTLs are
//! fixed from the write; reads re-arm the TTL inside a `MULTI`/`EXEC` block so
//! an entry cannot expire between the read and the refresh.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::{
    Config, Connection, Pool, PoolConfig, Runtime,
    redis::{self, AsyncCommands},
};
use tracing::{info, warn};

use super::{Backend, CacheStatus, CacheStore, StoreError};
use crate::cache::policy::CachePolicy;

/// Average serialized document size used to translate an entry ceiling into
/// a memory ceiling.
pub const AVERAGE_ENTRY_BYTES: u64 = 2 * 1024;

const USED_MEMORY_FIELD: &str = "used_memory:";

/// Connection settings for the Redis backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    /// `redis://` connection URL.
    pub url: String,
    /// Upper bound on pooled connections.
    pub pool_size: usize,
    /// How long an operation waits for a pooled connection.
    pub wait_timeout: Duration,
}

pub struct SharedStore {
    pool: Pool,
    expire_secs: Option<u64>,
}

impl SharedStore {
    /// Build the connection pool, verify the server answers and apply the
    /// capacity policy.
    pub async fn connect(
        settings: &RedisSettings,
        policy: &CachePolicy,
    ) -> Result<Self, StoreError> {
        let mut pool_config = PoolConfig::new(settings.pool_size.max(1));
        pool_config.timeouts.wait = Some(settings.wait_timeout);
        pool_config.timeouts.create = Some(settings.wait_timeout);
        pool_config.timeouts.recycle = Some(settings.wait_timeout);

        let mut config = Config::from_url(settings.url.clone());
        config.pool = Some(pool_config);
        let pool = config.create_pool(Some(Runtime::Tokio1))?;

        let store = Self {
            pool,
            expire_secs: policy.retention.map(|retention| retention.as_secs()),
        };
        store.ping().await?;
        store.apply_policy(policy).await;

        Ok(store)
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        Ok(self.pool.get().await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply != "PONG" {
            return Err(StoreError::protocol(format!("PING answered `{reply}`")));
        }
        Ok(())
    }

    /// Managed Redis deployments often refuse `CONFIG SET`; the store still
    /// works without the ceiling, so failures are only logged.
    async fn apply_policy(&self, policy: &CachePolicy) {
        if let Some(max_entries) = policy.max_entries {
            let max_memory = max_memory_bytes(max_entries.get());
            match self.config_set("maxmemory", &max_memory.to_string()).await {
                Ok(()) => info!(
                    cache = "redis",
                    max_entries = max_entries.get(),
                    max_memory,
                    "applied redis memory ceiling"
                ),
                Err(err) => warn!(
                    cache = "redis",
                    error = %err,
                    "failed to set redis maxmemory, continuing without a ceiling"
                ),
            }
        }

        if policy.retention.is_some() {
            if let Err(err) = self.config_set("maxmemory-policy", "volatile-lru").await {
                warn!(
                    cache = "redis",
                    error = %err,
                    "failed to set redis eviction policy"
                );
            }
        }
    }

    async fn config_set(&self, parameter: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("CONFIG")
            .arg("SET")
            .arg(parameter)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for SharedStore {
    fn backend(&self) -> Backend {
        Backend::Redis
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut conn = self.connection().await?;

        let value: Option<Vec<u8>> = match self.expire_secs {
            Some(secs) => {
                let (value,): (Option<Vec<u8>>,) = redis::pipe()
                    .atomic()
                    .get(key)
                    .expire(key, expire_arg(secs))
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
                value
            }
            None => conn.get(key).await?,
        };

        Ok(value.map(Bytes::from))
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        match self.expire_secs {
            Some(secs) => {
                let _: () = conn.set_ex(key, &value[..], secs).await?;
            }
            None => {
                let _: () = conn.set(key, &value[..]).await?;
            }
        }
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }

    async fn status(&self) -> Result<CacheStatus, StoreError> {
        let mut conn = self.connection().await?;

        let info: String = redis::cmd("INFO").arg("memory").query_async(&mut conn).await?;
        let size = parse_used_memory(&info)
            .ok_or_else(|| StoreError::protocol("INFO memory reply has no used_memory field"))?;
        let entries: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;

        Ok(CacheStatus { entries, size })
    }

    async fn shutdown(&self) {
        self.pool.close();
    }
}

/// Memory ceiling for `max_entries` documents of the assumed average size.
pub fn max_memory_bytes(max_entries: u64) -> u64 {
    max_entries.saturating_mul(AVERAGE_ENTRY_BYTES)
}

/// Extract the `used_memory` byte count from an `INFO memory` reply.
pub fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix(USED_MEMORY_FIELD))
        .and_then(|value| value.trim().parse().ok())
}

/// Accept a bare `host`, `host:port` or a full `redis://` / `rediss://` URL.
pub fn normalize_redis_url(host: &str) -> String {
    let host = host.trim();
    if host.contains("://") {
        host.to_string()
    } else {
        format!("redis://{host}")
    }
}

fn expire_arg(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}
