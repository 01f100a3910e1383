//! Response cache configuration.

use super::store::RedisSettings;

const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Cache configuration resolved from the service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Raw `"<maxEntries>:<retention>"` policy; `None` disables caching.
    pub policy: Option<String>,
    /// Redis connection; `None` selects the in-process store.
    pub redis: Option<RedisSettings>,
    /// Responses with a larger declared body are served but not cached.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: None,
            redis: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            policy: settings.policy.clone(),
            redis: settings.redis.as_ref().map(|redis| RedisSettings {
                url: redis.url.clone(),
                pool_size: redis.pool_size.get(),
                wait_timeout: redis.wait_timeout,
            }),
            max_body_bytes: settings.max_body_bytes.get(),
        }
    }
}

impl CacheConfig {
    /// Returns true when a policy string was supplied.
    pub fn is_enabled(&self) -> bool {
        self.policy.is_some()
    }

    /// Local store configuration for the given policy.
    pub fn local(policy: impl Into<String>) -> Self {
        Self {
            policy: Some(policy.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_by_default() {
        let config = CacheConfig::default();
        assert!(!config.is_enabled());
        assert!(config.redis.is_none());
        assert_eq!(config.max_body_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn empty_policy_still_enables_caching() {
        assert!(CacheConfig::local("").is_enabled());
        assert!(CacheConfig::local("100:10m").is_enabled());
    }
}
