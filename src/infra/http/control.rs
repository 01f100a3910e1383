//! Operator endpoints for the response cache.

use axum::{
    Router,
    extract::{FromRef, Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use crate::cache::{CacheCoordinator, CacheStatus, MediaType};

use super::{NO_CACHE, error::HttpError};

const SOURCE: &str = "infra::http::control";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommandQuery {
    command: Option<String>,
}

pub fn routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    CacheCoordinator: FromRef<S>,
{
    Router::new().route("/cache", get(cache_status).post(cache_command))
}

async fn cache_status(State(cache): State<CacheCoordinator>, headers: HeaderMap) -> Response {
    let mut response = match cache.status().await {
        None => not_active(),
        Some(Ok(status)) => status_response(status, MediaType::negotiate(&headers)),
        Some(Err(err)) => HttpError::from_error(
            SOURCE,
            StatusCode::SERVICE_UNAVAILABLE,
            "Cache status unavailable",
            &err,
        )
        .into_response(),
    };
    set_no_cache(&mut response);
    response
}

async fn cache_command(
    State(cache): State<CacheCoordinator>,
    Query(query): Query<CommandQuery>,
) -> Response {
    let mut response = if cache.is_active() {
        cache.run_command(query.command.as_deref()).await;
        (StatusCode::ACCEPTED, "Cache command received").into_response()
    } else {
        not_active()
    };
    set_no_cache(&mut response);
    response
}

fn not_active() -> Response {
    HttpError::new(
        SOURCE,
        StatusCode::NOT_FOUND,
        "Cache not active",
        "response cache is not configured or its backend is unavailable",
    )
    .into_response()
}

fn status_response(status: CacheStatus, media: MediaType) -> Response {
    let body = match media {
        MediaType::Json => match serde_json::to_string(&status) {
            Ok(body) => body,
            Err(err) => {
                return HttpError::from_error(
                    SOURCE,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    &err,
                )
                .into_response();
            }
        },
        MediaType::Xml => status_xml(status),
    };

    ([(CONTENT_TYPE, media.as_str())], body).into_response()
}

fn status_xml(status: CacheStatus) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <cacheStatus><entries>{}</entries><size>{}</size></cacheStatus>",
        status.entries, status.size
    )
}

fn set_no_cache(response: &mut Response) {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_status_document() {
        let xml = status_xml(CacheStatus {
            entries: 3,
            size: 120,
        });
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <cacheStatus><entries>3</entries><size>120</size></cacheStatus>"
        );
    }

    #[test]
    fn json_status_document() {
        let response = status_response(
            CacheStatus {
                entries: 1,
                size: 2,
            },
            MediaType::Json,
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
    }
}
