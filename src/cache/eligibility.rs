//! Which requests are response-cache candidates.

use axum::http::Method;

/// First path segments of the resource collections whose listings and
/// documents may be cached.
const RESOURCE_COLLECTIONS: &[&str] = &[
    "communities",
    "collections",
    "items",
    "bitstreams",
    "handle",
];

/// Segment marking binary retrieval; those bytes are streamed, never cached.
const BINARY_RETRIEVAL_SEGMENT: &str = "retrieve";

/// Returns true when a response for `path` may be cached.
pub fn is_cacheable_path(path: &str) -> bool {
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());

    let Some(first) = segments.next() else {
        return false;
    };
    if !RESOURCE_COLLECTIONS.contains(&first) {
        return false;
    }

    segments.all(|segment| segment != BINARY_RETRIEVAL_SEGMENT)
}

/// Returns true when the request is a read whose response may be cached.
pub fn is_candidate(method: &Method, path: &str) -> bool {
    method == Method::GET && is_cacheable_path(path)
}
