//! HTTP and WebSocket handler definitions for the `OpenCALL` server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod call;
pub mod discovery;
pub mod health;
pub mod media;
pub mod ops;
pub mod streams;
pub mod tokens;

pub use call::{call_handler, call_method_not_allowed};
pub use discovery::{discovery_handler, DiscoveryDocument};
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use media::{media_data_handler, media_redirect_handler};
pub use ops::{chunks_handler, poll_handler};
pub use streams::stream_upgrade_handler;
pub use tokens::register_token_handler;

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use opencall_core::{CallIdentity, CallResponse, EnvelopeResponse, ErrorBody, ProtocolCode};
use uuid::Uuid;

use super::{NetworkConfig, ShutdownController};
use crate::app::Services;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Stores, registry and the dispatch pipeline.
    pub services: Arc<Services>,
    /// Discovery body and `ETag`, rendered once.
    pub discovery: Arc<DiscoveryDocument>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Network configuration.
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(
        services: Arc<Services>,
        shutdown: Arc<ShutdownController>,
        config: Arc<NetworkConfig>,
    ) -> Self {
        let discovery = Arc::new(DiscoveryDocument::render(&services.registry));
        Self {
            services,
            discovery,
            shutdown,
            config,
            start_time: Instant::now(),
        }
    }
}

/// Writes a dispatch result as an HTTP response.
pub(crate) fn envelope_reply(response: CallResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body)).into_response()
}

/// A protocol error body for routes outside `/call`. Without a known request
/// id a fresh one is minted.
pub(crate) fn protocol_reply(
    request_id: Option<&str>,
    code: ProtocolCode,
    message: impl Into<String>,
) -> Response {
    let id = request_id.map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
    envelope_reply(CallResponse::new(
        code.status(),
        EnvelopeResponse::failed(&CallIdentity::new(id), ErrorBody::protocol(code, message)),
    ))
}


#[cfg(test)]
mod tests {
    use super::test_support::json_body;
    use super::*;

    #[tokio::test]
    async fn protocol_reply_mints_an_id_when_missing() {
        let response = protocol_reply(None, ProtocolCode::NotFound, "Media not found");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["state"], "error");
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert!(Uuid::parse_str(body["requestId"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn envelope_reply_keeps_custom_status() {
        let reply = envelope_reply(CallResponse::new(
            418,
            EnvelopeResponse::failed(&CallIdentity::new("r"), ErrorBody::new("TEAPOT", "no")),
        ));
        assert_eq!(reply.status().as_u16(), 418);
    }
}
