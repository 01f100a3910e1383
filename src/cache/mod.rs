//! Response cache.
//!
//! Caches the bodies of read-only resource requests in front of the request
//! handlers, keyed by path, raw query and negotiated media type.
//!
//! ## Configuration
//!
//! The cache is enabled by a policy string of the form
//! `"[maxEntries]:[magnitude][unit]"`:
//!
//! ```toml
//! [cache]
//! policy = "5000:30m"
//!
//! [cache.redis]
//! host = "cache-host:6379"   # omit to use the in-process store
//! ```

mod config;
mod coordinator;
mod eligibility;
mod keys;
mod middleware;
mod policy;
mod store;

pub use config::CacheConfig;
pub use coordinator::{CacheCommand, CacheCoordinator, CacheCtl};
pub use eligibility::{is_cacheable_path, is_candidate};
pub use keys::{MediaType, cache_key};
pub use middleware::response_cache_layer;
pub use policy::{CachePolicy, Retention, RetentionUnit};
pub use store::{
    Backend, CacheStatus, CacheStore, LocalStore, RedisSettings, SharedStore, StoreError,
    normalize_redis_url,
};
