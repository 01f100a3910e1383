mod control;
pub mod error;
mod middleware;

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{FromRef, State},
    http::{
        HeaderValue, Method, Request, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::cache::{CacheCoordinator, MediaType, response_cache_layer};

use self::{
    error::HttpError,
    middleware::{log_requests, set_request_context},
};
use super::origin::OriginClient;

pub use self::middleware::RequestContext;

/// `Cache-Control` value for responses that must never be stored downstream.
pub const NO_CACHE: &str = "must-revalidate,no-cache,no-store";

#[derive(Clone)]
pub struct HttpState {
    pub cache: CacheCoordinator,
    pub origin: Option<Arc<OriginClient>>,
}

impl FromRef<HttpState> for CacheCoordinator {
    fn from_ref(state: &HttpState) -> Self {
        state.cache.clone()
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .merge(control::routes())
        .fallback(forward_to_origin)
        .layer(axum_middleware::from_fn_with_state(
            state.cache.clone(),
            response_cache_layer,
        ))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_requests))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn ping() -> Response {
    (
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (CACHE_CONTROL, NO_CACHE),
        ],
        "pong",
    )
        .into_response()
}

async fn forward_to_origin(State(state): State<HttpState>, request: Request<Body>) -> Response {
    const SOURCE: &str = "infra::http::forward_to_origin";

    if request.method() != Method::GET {
        return HttpError::new(
            SOURCE,
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            format!("{} is not served", request.method()),
        )
        .into_response();
    }

    let Some(origin) = state.origin.as_ref() else {
        return HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "No such page",
            "no origin configured",
        )
        .into_response();
    };

    let media = MediaType::negotiate(request.headers());
    let uri = request.uri();
    match origin.fetch(uri.path(), uri.query(), media).await {
        Ok(upstream) => {
            let mut response = Response::new(Body::from(upstream.body));
            *response.status_mut() = upstream.status;
            let content_type = upstream
                .content_type
                .unwrap_or_else(|| HeaderValue::from_static(media.as_str()));
            response.headers_mut().insert(CONTENT_TYPE, content_type);
            response
        }
        Err(err) => {
            HttpError::from_error(SOURCE, StatusCode::BAD_GATEWAY, "Origin unavailable", &err)
                .into_response()
        }
    }
}
