//! `GET /ops/{requestId}` and `GET /ops/{requestId}/chunks`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use opencall_core::ProtocolCode;
use serde::Deserialize;

use super::{protocol_reply, AppState};
use crate::storage::instances::ChunkLookupError;

#[derive(Debug, Default, Deserialize)]
pub struct ChunkQuery {
    pub cursor: Option<String>,
}

fn not_found(request_id: &str) -> Response {
    protocol_reply(
        Some(request_id),
        ProtocolCode::NotFound,
        format!("Operation {request_id} not found"),
    )
}

/// Current state of an async instance.
pub async fn poll_handler(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Response {
    match state.services.instances.poll(&request_id) {
        Some(view) => (StatusCode::OK, Json(view)).into_response(),
        None => not_found(&request_id),
    }
}

/// One chunk of a completed instance; `?cursor=` selects which.
pub async fn chunks_handler(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Query(query): Query<ChunkQuery>,
) -> Response {
    match state
        .services
        .instances
        .chunk(&request_id, query.cursor.as_deref())
    {
        Ok(chunk) => (StatusCode::OK, Json(chunk)).into_response(),
        Err(ChunkLookupError::NotFound) => not_found(&request_id),
        Err(ChunkLookupError::NotReady) => protocol_reply(
            Some(&request_id),
            ProtocolCode::NotReady,
            "Operation not yet complete or has no chunks",
        ),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use serde_json::json;
    use tower::ServiceExt;

    use super::super::test_support::{harness, json_body};
    use super::*;

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/ops/{request_id}", get(poll_handler))
            .route("/ops/{request_id}/chunks", get(chunks_handler))
            .with_state(state)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        (status, json_body(response).await)
    }

    #[tokio::test]
    async fn unknown_instance_is_not_found() {
        let h = harness();
        let app = router(h.state);

        for uri in ["/ops/missing", "/ops/missing/chunks"] {
            let (status, body) = get_json(&app, uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["requestId"], "missing");
            assert_eq!(body["error"]["code"], "NOT_FOUND");
            assert_eq!(body["error"]["message"], "Operation missing not found");
        }
    }

    #[tokio::test]
    async fn pending_instance_polls_but_has_no_chunks() {
        let h = harness();
        let instances = &h.state.services.instances;
        let generation = instances
            .create("job-1", "v1:reports.generate", 1000, 100, 3600)
            .generation;
        instances.mark_pending("job-1", generation).unwrap();
        let app = router(h.state);

        let (status, body) = get_json(&app, "/ops/job-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "pending");
        assert_eq!(body["retryAfterMs"], 1000);
        assert_eq!(body["expiresAt"], 3700);

        let (status, body) = get_json(&app, "/ops/job-1/chunks").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["requestId"], "job-1");
        assert_eq!(body["error"]["code"], "NOT_READY");
    }

    #[tokio::test]
    async fn cursor_walks_the_chain() {
        let h = harness();
        let instances = &h.state.services.instances;
        let generation = instances.create("job-2", "v1:todos.export", 1000, 100, 3600).generation;
        instances.mark_pending("job-2", generation).unwrap();
        instances
            .complete("job-2", generation, json!({ "count": 0 }), Some("abcdefghij"), 4)
            .unwrap();
        let app = router(h.state);

        let (_, first) = get_json(&app, "/ops/job-2/chunks").await;
        assert_eq!(first["chunk"]["data"], "abcd");
        assert_eq!(first["chunk"]["state"], "partial");
        let cursor = first["chunk"]["cursor"].as_str().unwrap();

        let (_, second) = get_json(&app, &format!("/ops/job-2/chunks?cursor={cursor}")).await;
        assert_eq!(second["chunk"]["offset"], 4);
        assert_eq!(second["chunk"]["checksumPrevious"], first["chunk"]["checksum"]);

        let (status, body) = get_json(&app, "/ops/job-2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "complete");
        assert_eq!(body["result"]["count"], 0);
    }
}
