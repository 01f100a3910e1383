//! Bounded in-process store.
//!
//! An LRU map with an optional entry ceiling and an optional idle timeout.
//! The idle timeout slides: every successful read restarts it. Because reads
//! promote entries in the LRU order, the least recently used entries are also
//! the ones idle the longest, so expired entries are always found at the cold
//! end of the map.

use std::{
    num::NonZeroUsize,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{Backend, CacheStatus, CacheStore, StoreError};
use crate::cache::policy::CachePolicy;

struct Entry {
    value: Bytes,
    last_access: Instant,
}

pub struct LocalStore {
    entries: Mutex<LruCache<String, Entry>>,
    idle_timeout: Option<Duration>,
    /// Running sum of written value lengths; reset on flush only.
    size_bytes: AtomicU64,
}

impl LocalStore {
    pub fn new(policy: &CachePolicy) -> Self {
        let entries = match policy.max_entries {
            Some(max) => {
                let capacity = usize::try_from(max.get()).unwrap_or(usize::MAX);
                LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
            }
            None => LruCache::unbounded(),
        };

        Self {
            entries: Mutex::new(entries),
            idle_timeout: policy.retention.map(|retention| retention.as_duration()),
            size_bytes: AtomicU64::new(0),
        }
    }

    pub fn get_entry(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let mut entries = self.lock("get");

        let entry = entries.get_mut(key)?;
        if !self.is_expired(entry, now) {
            entry.last_access = now;
            return Some(entry.value.clone());
        }

        entries.pop(key);
        debug!(cache = "local", key, "dropped idle entry on read");
        None
    }

    pub fn put_entry(&self, key: &str, value: Bytes) {
        let now = Instant::now();
        let written = value.len() as u64;
        let mut entries = self.lock("put");

        self.purge_expired(&mut entries, now);

        let entry = Entry {
            value,
            last_access: now,
        };
        if let Some((evicted, _)) = entries.push(key.to_owned(), entry) {
            // `push` also hands back the previous value when overwriting a key.
            if evicted != key {
                counter!("backrest_cache_evict_total", "backend" => Backend::Local.as_str())
                    .increment(1);
                debug!(cache = "local", evicted = %evicted, "evicted least recently used entry");
            }
        }

        self.size_bytes.fetch_add(written, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        let mut entries = self.lock("clear");
        entries.clear();
        self.size_bytes.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatus {
        let now = Instant::now();
        let mut entries = self.lock("status");
        self.purge_expired(&mut entries, now);

        CacheStatus {
            entries: entries.len() as u64,
            size: self.size_bytes.load(Ordering::Relaxed),
        }
    }

    /// Lock the map, recovering the guard if a previous holder panicked.
    fn lock(&self, op: &'static str) -> MutexGuard<'_, LruCache<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!(
                cache = "local",
                op,
                result = "poisoned_recovered",
                "recovered from poisoned local cache lock, entries may be stale"
            );
            poisoned.into_inner()
        })
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        self.idle_timeout
            .is_some_and(|timeout| now.saturating_duration_since(entry.last_access) >= timeout)
    }

    fn purge_expired(&self, entries: &mut LruCache<String, Entry>, now: Instant) {
        if self.idle_timeout.is_none() {
            return;
        }

        loop {
            let stale = entries
                .peek_lru()
                .is_some_and(|(_, entry)| self.is_expired(entry, now));
            if !stale {
                break;
            }
            entries.pop_lru();
        }
    }
}

#[async_trait]
impl CacheStore for LocalStore {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.get_entry(key))
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.put_entry(key, value);
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<(), StoreError> {
        self.clear();
        Ok(())
    }

    async fn status(&self) -> Result<CacheStatus, StoreError> {
        Ok(self.snapshot())
    }
}
