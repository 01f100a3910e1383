//! Client for the backing repository service.
//!
//! Requests the cache cannot answer are forwarded here and the origin's
//! status, content type and body are relayed unchanged.

use std::time::Duration;

use axum::http::{HeaderValue, StatusCode};
use bytes::Bytes;
use reqwest::{Client, Url, header};
use thiserror::Error;
use tracing::debug;

use crate::cache::MediaType;

#[derive(Debug, Error)]
pub enum OriginError {
    #[error("invalid origin URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("origin request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// A fully buffered origin response.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct OriginClient {
    client: Client,
    base: Url,
}

impl OriginClient {
    pub fn new(base: &Url, timeout: Duration) -> Result<Self, OriginError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base: directory_base(base),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("backrest/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve a request path and query against the origin base URL.
    pub fn url(&self, path: &str, query: Option<&str>) -> Result<Url, OriginError> {
        let mut url = self.base.join(path.trim_start_matches('/'))?;
        url.set_query(query.filter(|query| !query.is_empty()));
        Ok(url)
    }

    pub async fn fetch(
        &self,
        path: &str,
        query: Option<&str>,
        media: MediaType,
    ) -> Result<OriginResponse, OriginError> {
        let url = self.url(path, query)?;
        debug!(url = %url, accept = media.as_str(), "forwarding to origin");

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, media.as_str())
            .send()
            .await?;

        let status = response.status();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let body = response.bytes().await?;

        Ok(OriginResponse {
            status,
            content_type,
            body,
        })
    }
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn directory_base(base: &Url) -> Url {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.set_query(None);
    base
}
