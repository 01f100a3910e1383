use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{
        HeaderMap, Method, Request, StatusCode,
        header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use backrest::{
    cache::{
        Backend, CacheCoordinator, CachePolicy, CacheStatus, CacheStore, LocalStore, StoreError,
    },
    infra::{
        http::{self, HttpState},
        origin::OriginClient,
    },
};
use bytes::Bytes;
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

struct Origin {
    url: Url,
    calls: Arc<AtomicUsize>,
}

impl Origin {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Serve a stand-in repository that numbers every reply, so a replayed body
/// is distinguishable from a fresh one.
async fn spawn_origin() -> Origin {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let app = Router::new().fallback(move |request: Request<Body>| {
        let counter = Arc::clone(&counter);
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            origin_reply(n, &request)
        }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("origin listener should bind");
    let addr = listener.local_addr().expect("origin address");
    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("origin server should run");
    });

    Origin {
        url: Url::parse(&format!("http://{addr}/")).expect("origin url"),
        calls,
    }
}

fn origin_reply(n: usize, request: &Request<Body>) -> Response {
    let path = request.uri().path().to_string();
    if path.contains("missing") {
        return (StatusCode::NOT_FOUND, "no such object").into_response();
    }

    let accept = request
        .headers()
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/json")
        .to_string();
    let query = request.uri().query().unwrap_or("").to_string();

    (
        [(CONTENT_TYPE, accept.clone())],
        format!("#{n} {path}?{query} as {accept}"),
    )
        .into_response()
}

struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
    fn backend(&self) -> Backend {
        Backend::Redis
    }

    async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
        Err(StoreError::protocol("connection refused"))
    }

    async fn put(&self, _key: &str, _value: Bytes) -> Result<(), StoreError> {
        Err(StoreError::protocol("connection refused"))
    }

    async fn invalidate_all(&self) -> Result<(), StoreError> {
        Err(StoreError::protocol("connection refused"))
    }

    async fn status(&self) -> Result<CacheStatus, StoreError> {
        Err(StoreError::protocol("connection refused"))
    }
}

fn local_cache(policy: &str) -> CacheCoordinator {
    CacheCoordinator::with_store(Arc::new(LocalStore::new(&CachePolicy::parse(policy))))
}

fn service(cache: CacheCoordinator, origin: Option<&Origin>) -> Router {
    let origin = origin.map(|origin| {
        Arc::new(
            OriginClient::new(&origin.url, Duration::from_secs(5))
                .expect("origin client should build"),
        )
    });
    http::build_router(HttpState { cache, origin })
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    accept: Option<&str>,
) -> (StatusCode, HeaderMap, Bytes) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(accept) = accept {
        builder = builder.header(ACCEPT, accept);
    }
    let request = builder.body(Body::empty()).expect("request should build");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should collect");
    (status, headers, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    send(app, Method::GET, uri, None).await
}

async fn cache_status(app: &Router) -> Value {
    let (status, headers, body) = get(app, "/cache").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[CONTENT_TYPE], "application/json");
    serde_json::from_slice(&body).expect("status should be JSON")
}

#[tokio::test]
async fn repeated_request_is_served_from_cache() {
    let origin = spawn_origin().await;
    let app = service(local_cache("100:10m"), Some(&origin));

    let (first_status, _, first) = get(&app, "/items/42?expand=metadata").await;
    let (second_status, headers, second) = get(&app, "/items/42?expand=metadata").await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(headers[CONTENT_TYPE], "application/json");
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn distinct_queries_are_cached_separately() {
    let origin = spawn_origin().await;
    let app = service(local_cache(""), Some(&origin));

    let (_, _, limited) = get(&app, "/collections?limit=5").await;
    let (_, _, unlimited) = get(&app, "/collections").await;

    assert_ne!(limited, unlimited);
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn media_types_never_share_entries() {
    let origin = spawn_origin().await;
    let app = service(local_cache(""), Some(&origin));

    let (_, _, json) = send(&app, Method::GET, "/items/7", Some("application/json")).await;
    let (_, _, xml) = send(&app, Method::GET, "/items/7", Some("application/xml")).await;
    assert_ne!(json, xml);
    assert_eq!(origin.calls(), 2);

    let (status, headers, cached_xml) =
        send(&app, Method::GET, "/items/7", Some("application/xml")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[CONTENT_TYPE], "application/xml");
    assert_eq!(cached_xml, xml);
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn non_candidate_paths_bypass_cache() {
    let origin = spawn_origin().await;
    let app = service(local_cache(""), Some(&origin));

    for uri in ["/bitstreams/9/retrieve", "/login", "/status"] {
        get(&app, uri).await;
        get(&app, uri).await;
    }

    assert_eq!(origin.calls(), 6);
    assert_eq!(cache_status(&app).await["entries"], 0);
}

#[tokio::test]
async fn control_endpoint_is_never_cached() {
    let app = service(local_cache(""), None);

    let (_, headers, _) = get(&app, "/cache").await;
    assert_eq!(headers[CACHE_CONTROL], "must-revalidate,no-cache,no-store");
    assert_eq!(cache_status(&app).await["entries"], 0);
}

#[tokio::test]
async fn flush_empties_cache() {
    let origin = spawn_origin().await;
    let app = service(local_cache(""), Some(&origin));

    get(&app, "/communities").await;
    get(&app, "/handle/123456789/1").await;

    let before = cache_status(&app).await;
    assert_eq!(before["entries"], 2);
    assert!(before["size"].as_u64().expect("size") > 0);

    let (status, _, body) = send(&app, Method::POST, "/cache?command=flush", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(&body[..], b"Cache command received");

    let after = cache_status(&app).await;
    assert_eq!(after["entries"], 0);
    assert_eq!(after["size"], 0);

    get(&app, "/communities").await;
    assert_eq!(origin.calls(), 3);
}

#[tokio::test]
async fn unknown_command_is_accepted_and_ignored() {
    let origin = spawn_origin().await;
    let app = service(local_cache(""), Some(&origin));
    get(&app, "/communities").await;

    let (status, _, _) = send(&app, Method::POST, "/cache?command=compact", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _, _) = send(&app, Method::POST, "/cache", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    assert_eq!(cache_status(&app).await["entries"], 1);
}

#[tokio::test]
async fn status_negotiates_xml() {
    let app = service(local_cache(""), None);

    let (status, headers, body) = send(&app, Method::GET, "/cache", Some("application/xml")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[CONTENT_TYPE], "application/xml");
    let body = String::from_utf8(body.to_vec()).expect("utf-8");
    assert!(body.ends_with("<cacheStatus><entries>0</entries><size>0</size></cacheStatus>"));
}

#[tokio::test]
async fn inactive_cache_reports_not_found() {
    let origin = spawn_origin().await;
    let app = service(CacheCoordinator::disabled(), Some(&origin));

    let (status, _, body) = get(&app, "/cache").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(&body[..], b"Cache not active");

    let (status, _, _) = send(&app, Method::POST, "/cache?command=flush", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    get(&app, "/items").await;
    get(&app, "/items").await;
    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn error_responses_are_not_cached() {
    let origin = spawn_origin().await;
    let app = service(local_cache(""), Some(&origin));

    let (status, _, _) = get(&app, "/items/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = get(&app, "/items/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(origin.calls(), 2);
    assert_eq!(cache_status(&app).await["entries"], 0);
}

#[tokio::test]
async fn oversized_bodies_are_served_but_not_cached() {
    let origin = spawn_origin().await;
    let app = service(local_cache("").with_max_body_bytes(8), Some(&origin));

    let (status, _, body) = get(&app, "/items/1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.len() > 8);
    get(&app, "/items/1").await;

    assert_eq!(origin.calls(), 2);
}

#[tokio::test]
async fn failing_backend_is_invisible_to_clients() {
    let origin = spawn_origin().await;
    let app = service(
        CacheCoordinator::with_store(Arc::new(FailingStore)),
        Some(&origin),
    );

    let (status, _, _) = get(&app, "/items/3").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = get(&app, "/items/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(origin.calls(), 2);

    let (status, _, _) = get(&app, "/cache").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (status, _, _) = send(&app, Method::POST, "/cache?command=flush", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn ping_is_not_cacheable() {
    let app = service(local_cache(""), None);

    let (status, headers, body) = get(&app, "/ping").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"pong");
    assert_eq!(headers[CACHE_CONTROL], "must-revalidate,no-cache,no-store");
}

#[tokio::test]
async fn fallback_without_origin_or_for_writes() {
    let app = service(local_cache(""), None);

    let (status, _, body) = get(&app, "/items/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(&body[..], b"No such page");

    let (status, _, _) = send(&app, Method::PUT, "/items/1", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn unreachable_origin_is_bad_gateway() {
    let unreachable = Origin {
        url: Url::parse("http://127.0.0.1:1/").expect("url"),
        calls: Arc::new(AtomicUsize::new(0)),
    };
    let app = service(local_cache(""), Some(&unreachable));

    let (status, _, _) = get(&app, "/items/1").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(cache_status(&app).await["entries"], 0);
}
