use std::{net::SocketAddr, time::Instant};

use axum::{
    body::{Body, HttpBody},
    extract::ConnectInfo,
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::ErrorReport;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// One access-log line per request. A failure that attached an
/// [`ErrorReport`] is logged a second time with its diagnostic chain.
pub async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();
    let start = Instant::now();

    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    info!(
        target: "backrest::http::access",
        remote = %remote,
        method = %method,
        path = %uri.path(),
        query = uri.query().unwrap_or(""),
        version = ?version,
        status = status.as_u16(),
        bytes = response.body().size_hint().exact(),
        elapsed_ms = start.elapsed().as_millis(),
        request_id = %request_id,
        "request served",
    );

    let Some(report) = response.extensions_mut().remove::<ErrorReport>() else {
        return response;
    };
    let detail = report
        .messages
        .first()
        .map(String::as_str)
        .unwrap_or("no diagnostic available");

    if status.is_server_error() {
        error!(
            target: "backrest::http::response",
            status = status.as_u16(),
            source = report.source,
            detail = %detail,
            chain = ?report.messages,
            request_id = %request_id,
            "request failed",
        );
    } else if status.is_client_error() {
        warn!(
            target: "backrest::http::response",
            status = status.as_u16(),
            source = report.source,
            detail = %detail,
            chain = ?report.messages,
            request_id = %request_id,
            "client request error",
        );
    }

    response
}
