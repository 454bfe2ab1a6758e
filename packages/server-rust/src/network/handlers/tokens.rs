//! `POST /_internal/tokens`: seeds the token store for test harnesses.
//!
//! Only mounted when `expose_token_endpoint` is set.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterToken {
    pub token: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

pub async fn register_token_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterToken>,
) -> Json<Value> {
    info!(scopes = ?body.scopes, "registered bearer token");
    state.services.tokens.register(body.token, body.scopes);
    Json(json!({ "ok": true }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    use super::super::test_support::{harness, json_body};
    use super::*;
    use crate::service::auth::AuthValidator;

    #[tokio::test]
    async fn registered_token_grants_scopes() {
        let h = harness();
        let tokens = std::sync::Arc::clone(&h.state.services.tokens);
        let app = Router::new()
            .route("/_internal/tokens", post(register_token_handler))
            .with_state(h.state);

        let response = app
            .oneshot(
                Request::post("/_internal/tokens")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"token":"t-1","scopes":["todos:read","reports:read"]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "ok": true }));

        let required = vec!["reports:read".to_string()];
        assert!(tokens.validate(Some("Bearer t-1"), &required).is_ok());
        assert!(tokens
            .validate(Some("Bearer t-1"), &["todos:write".to_string()])
            .is_err());
    }
}
