//! `/call`: the single invocation endpoint.
//!
//! Accepts either a JSON envelope or `multipart/form-data` with an `envelope`
//! part and an optional `file` part, turns it into a [`CallRequest`], and runs
//! it through the dispatch pipeline.

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::{ALLOW, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use opencall_core::{Envelope, ProtocolCode};
use serde_json::Value;
use tower::ServiceExt;
use tracing::debug;

use super::{envelope_reply, protocol_reply, AppState};
use crate::service::dispatcher::CallRequest;
use crate::service::handler::MediaPart;

const INVALID_JSON: &str = "Invalid JSON in request body";
const INVALID_MULTIPART: &str = "Invalid multipart request";
const MISSING_ENVELOPE: &str = "Missing envelope part in multipart request";
const USE_POST: &str =
    "Use POST /call to invoke operations. Discover available operations at GET /.well-known/ops";

/// Content type given to an uploaded part that declares none.
const DEFAULT_PART_TYPE: &str = "application/octet-stream";
const DEFAULT_PART_NAME: &str = "upload";

/// `POST /call`
pub async fn call_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
) -> Response {
    let _in_flight = state.shutdown.in_flight_guard();

    let is_multipart = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("multipart/form-data"));

    let parsed = if is_multipart {
        match Multipart::from_request(request, &state).await {
            Ok(multipart) => read_multipart(multipart).await,
            Err(_) => Err(INVALID_MULTIPART),
        }
    } else {
        read_json(request, &state).await
    };

    let (envelope, media) = match parsed {
        Ok(parts) => parts,
        Err(message) => {
            debug!(reason = message, "rejected /call body");
            return protocol_reply(None, ProtocolCode::InvalidRequest, message);
        }
    };

    let mut call = CallRequest::new(envelope);
    if let Some(credential) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        call = call.with_credential(credential);
    }
    if let Some(media) = media {
        call = call.with_media(media);
    }

    let response = state
        .services
        .dispatch
        .clone()
        .oneshot(call)
        .await
        .unwrap_or_else(|never| match never {});
    envelope_reply(response)
}

/// `GET /call`
pub async fn call_method_not_allowed() -> Response {
    let mut response = protocol_reply(None, ProtocolCode::MethodNotAllowed, USE_POST);
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static("POST"));
    response
}

async fn read_json(
    request: Request,
    state: &AppState,
) -> Result<(Envelope, Option<MediaPart>), &'static str> {
    let body = Bytes::from_request(request, state)
        .await
        .map_err(|_| INVALID_JSON)?;
    let doc: Value = serde_json::from_slice(&body).map_err(|_| INVALID_JSON)?;
    Ok((Envelope::from_json(doc), None))
}

async fn read_multipart(
    mut multipart: Multipart,
) -> Result<(Envelope, Option<MediaPart>), &'static str> {
    let mut envelope = None;
    let mut media = None;

    while let Some(field) = multipart.next_field().await.map_err(|_| INVALID_MULTIPART)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("envelope") => {
                let raw = field.bytes().await.map_err(|_| INVALID_MULTIPART)?;
                let doc: Value = serde_json::from_slice(&raw).map_err(|_| INVALID_MULTIPART)?;
                envelope = Some(Envelope::from_json(doc));
            }
            Some("file") => {
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_PART_TYPE)
                    .to_string();
                let filename = field
                    .file_name()
                    .unwrap_or(DEFAULT_PART_NAME)
                    .to_string();
                let data = field.bytes().await.map_err(|_| INVALID_MULTIPART)?;
                media = Some(MediaPart {
                    data,
                    content_type,
                    filename,
                });
            }
            _ => {}
        }
    }

    let envelope = envelope.ok_or(MISSING_ENVELOPE)?;
    Ok((envelope, media))
}
