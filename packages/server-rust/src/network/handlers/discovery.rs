//! `GET /.well-known/ops`: the operation registry as a cacheable document.

use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

use super::AppState;
use crate::service::registry::OperationRegistry;

const CACHE_POLICY: &str = "public, max-age=3600";

/// The serialized registry and its strong `ETag`, computed once at startup.
#[derive(Debug, Clone)]
pub struct DiscoveryDocument {
    pub body: String,
    pub etag: String,
}

impl DiscoveryDocument {
    #[must_use]
    pub fn render(registry: &OperationRegistry) -> Self {
        let body = registry.discovery_document().to_string();
        let etag = format!("\"{}\"", hex::encode(Sha256::digest(body.as_bytes())));
        Self { body, etag }
    }

    fn matches(&self, headers: &HeaderMap) -> bool {
        headers
            .get(IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|tag| tag == self.etag)
    }
}

/// Returns `304` when the client already holds the current document.
pub async fn discovery_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let doc = &state.discovery;
    let etag = HeaderValue::from_str(&doc.etag).unwrap_or_else(|_| HeaderValue::from_static(""));
    let cache = HeaderValue::from_static(CACHE_POLICY);

    if doc.matches(&headers) {
        return (StatusCode::NOT_MODIFIED, [(ETAG, etag), (CACHE_CONTROL, cache)]).into_response();
    }

    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (ETAG, etag),
            (CACHE_CONTROL, cache),
        ],
        doc.body.clone(),
    )
        .into_response()
}
