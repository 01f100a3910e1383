use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, Uri};
use backrest::cache::{
    Backend, CacheCoordinator, CachePolicy, CacheStatus, CacheStore, LocalStore, StoreError,
};
use bytes::Bytes;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

struct UnavailableStore;

#[async_trait]
impl CacheStore for UnavailableStore {
    fn backend(&self) -> Backend {
        Backend::Redis
    }

    async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
        Err(StoreError::protocol("pool timed out"))
    }

    async fn put(&self, _key: &str, _value: Bytes) -> Result<(), StoreError> {
        Err(StoreError::protocol("pool timed out"))
    }

    async fn invalidate_all(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn status(&self) -> Result<CacheStatus, StoreError> {
        Ok(CacheStatus::default())
    }
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let headers = HeaderMap::new();

    // hit, miss and capacity eviction on the local store
    let local = CacheCoordinator::with_store(Arc::new(LocalStore::new(&CachePolicy::parse("1:"))));
    for uri in ["/items/1", "/items/1", "/items/2"] {
        let ctl = local
            .evaluate(&Method::GET, &Uri::from_static(uri), &headers)
            .await;
        local.remember(&ctl, Bytes::from_static(b"{}")).await;
    }

    // read and write failures on an unavailable shared store
    let shared = CacheCoordinator::with_store(Arc::new(UnavailableStore));
    let ctl = shared
        .evaluate(&Method::GET, &Uri::from_static("/items/1"), &headers)
        .await;
    shared.remember(&ctl, Bytes::from_static(b"{}")).await;

    let snapshot = snapshotter.snapshot().into_vec();

    let names: HashSet<(String, String)> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| {
            let key = composite_key.key();
            let backend = key
                .labels()
                .find(|label| label.key() == "backend")
                .map(|label| label.value().to_string())
                .unwrap_or_default();
            (key.name().to_string(), backend)
        })
        .collect();

    let expected = [
        ("backrest_cache_hit_total", "local"),
        ("backrest_cache_miss_total", "local"),
        ("backrest_cache_evict_total", "local"),
        ("backrest_cache_read_error_total", "redis"),
        ("backrest_cache_write_error_total", "redis"),
    ];

    for (metric, backend) in expected {
        assert!(
            names.contains(&(metric.to_string(), backend.to_string())),
            "missing metric: {metric}{{backend={backend}}}"
        );
    }

    let local_hits = snapshot.iter().find_map(|(composite_key, _, _, value)| {
        let key = composite_key.key();
        let is_local = key.labels().any(|label| label.value() == "local");
        (key.name() == "backrest_cache_hit_total" && is_local).then_some(value)
    });
    assert!(matches!(local_hits, Some(DebugValue::Counter(1))));
}
