//! Cache key derivation.
//!
//! A key is the request path, the raw query string and the negotiated media
//! type concatenated without a delimiter. The negotiated media type is part of
//! the key so JSON and XML representations of one resource never collide.

use axum::http::{HeaderMap, Uri, header::ACCEPT};

/// Response representation chosen by content negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Json,
    Xml,
}

impl MediaType {
    /// Resolve the representation from the `Accept` header.
    ///
    /// XML is served only when explicitly accepted; everything else,
    /// including a missing header, negotiates to JSON.
    pub fn negotiate(headers: &HeaderMap) -> Self {
        let accepts_xml = headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| value.contains("application/xml"));

        if accepts_xml { Self::Xml } else { Self::Json }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
        }
    }
}

/// Build the cache key for a request.
pub fn cache_key(uri: &Uri, media: MediaType) -> String {
    let path = uri.path();
    let query = uri.query().unwrap_or("");
    let media = media.as_str();

    let mut key = String::with_capacity(path.len() + query.len() + media.len());
    key.push_str(path);
    key.push_str(query);
    key.push_str(media);
    key
}
