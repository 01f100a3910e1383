//! Response cache middleware.
//!
//! Serves cached bodies for eligible GET requests and writes handler output
//! back on a miss. The cache state is decided once before dispatch; a hit
//! never reaches the handler.

use axum::{
    body::{Body, BodyDataStream},
    extract::State,
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use tracing::{Span, debug, field, instrument, warn};

use super::coordinator::{CacheCoordinator, CacheCtl};

#[instrument(skip_all, fields(path = %request.uri().path(), cache = field::Empty))]
pub async fn response_cache_layer(
    State(cache): State<CacheCoordinator>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ctl = cache
        .evaluate(request.method(), request.uri(), request.headers())
        .await;
    Span::current().record("cache", ctl.outcome());

    match ctl {
        CacheCtl::None => next.run(request).await,
        CacheCtl::Hit { value, media } => {
            let mut response = Response::new(Body::from(value));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(media.as_str()),
            );
            response
        }
        CacheCtl::Miss { .. } => {
            let response = next.run(request).await;
            write_back(&cache, &ctl, response).await
        }
    }
}

async fn write_back(cache: &CacheCoordinator, ctl: &CacheCtl, response: Response) -> Response {
    if response.status() != StatusCode::OK {
        debug!(status = %response.status(), "response not cacheable");
        return response;
    }

    let limit = cache.max_body_bytes();
    if declared_length(&response).is_some_and(|len| len > limit) {
        debug!(max_body_bytes = limit, "response body too large to cache");
        return response;
    }

    let (parts, body) = response.into_parts();
    match collect_within(body, limit).await {
        Ok(Collected::Complete(bytes)) => {
            cache.remember(ctl, bytes.clone()).await;
            Response::from_parts(parts, Body::from(bytes))
        }
        Ok(Collected::Oversized(body)) => {
            debug!(max_body_bytes = limit, "response body too large to cache");
            Response::from_parts(parts, body)
        }
        Err(err) => {
            warn!(error = %err, "failed to collect response body");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

enum Collected {
    /// The whole body, no larger than the limit.
    Complete(Bytes),
    /// The buffered prefix followed by the unread remainder.
    Oversized(Body),
}

/// Buffer `body` until it ends or grows past `limit` bytes.
async fn collect_within(body: Body, limit: usize) -> Result<Collected, axum::Error> {
    let mut chunks = body.into_data_stream();
    let mut buffer = BytesMut::new();

    while let Some(chunk) = chunks.next().await {
        buffer.extend_from_slice(&chunk?);
        if buffer.len() > limit {
            return Ok(Collected::Oversized(replay(buffer.freeze(), chunks)));
        }
    }

    Ok(Collected::Complete(buffer.freeze()))
}

fn replay(head: Bytes, rest: BodyDataStream) -> Body {
    let head = stream::once(async move { Ok::<_, axum::Error>(head) });
    Body::from_stream(head.chain(rest))
}

fn declared_length(response: &Response) -> Option<usize> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}
