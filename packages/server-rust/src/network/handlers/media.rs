//! `GET /media/{id}` and the byte route it redirects to.

use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use opencall_core::ProtocolCode;

use super::{protocol_reply, AppState};

fn missing() -> Response {
    protocol_reply(None, ProtocolCode::NotFound, "Media not found")
}

/// `303 See Other` to `/media/{id}/data`.
pub async fn media_redirect_handler(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
) -> Response {
    if state.services.media.get(&media_id).is_none() {
        return missing();
    }
    match HeaderValue::from_str(&format!("/media/{media_id}/data")) {
        Ok(location) => (StatusCode::SEE_OTHER, [(LOCATION, location)]).into_response(),
        Err(_) => missing(),
    }
}

/// The stored bytes as an attachment.
pub async fn media_data_handler(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
) -> Response {
    let Some(media) = state.services.media.get(&media_id) else {
        return missing();
    };

    let content_type = HeaderValue::from_str(&media.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", media.filename))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        StatusCode::OK,
        [(CONTENT_TYPE, content_type), (CONTENT_DISPOSITION, disposition)],
        media.data,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use bytes::Bytes;
    use tower::ServiceExt;

    use super::super::test_support::{harness, json_body};
    use super::*;

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/media/{media_id}", get(media_redirect_handler))
            .route("/media/{media_id}/data", get(media_data_handler))
            .with_state(state)
    }

    #[tokio::test]
    async fn redirect_then_download() {
        let h = harness();
        let stored = h.state.services.media.store(
            Bytes::from_static(b"%PDF-1.7"),
            "application/pdf",
            "plan.pdf",
        );
        let app = router(h.state);

        let redirect = app
            .clone()
            .oneshot(
                Request::get(format!("/media/{}", stored.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(redirect.status(), StatusCode::SEE_OTHER);
        let location = redirect.headers()[LOCATION].to_str().unwrap().to_string();
        assert_eq!(location, format!("/media/{}/data", stored.id));

        let data = app
            .oneshot(Request::get(location).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(data.status(), StatusCode::OK);
        assert_eq!(data.headers()[CONTENT_TYPE], "application/pdf");
        assert_eq!(
            data.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"plan.pdf\""
        );
        let bytes = to_bytes(data.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF-1.7");
    }

    #[tokio::test]
    async fn unknown_media_is_not_found() {
        let h = harness();
        let app = router(h.state);
        for uri in ["/media/nope", "/media/nope/data"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            let body = json_body(response).await;
            assert_eq!(body["error"]["message"], "Media not found");
        }
    }
}
