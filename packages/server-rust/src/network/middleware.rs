//! HTTP layers shared by every route.
//!
//! Applied with `Router::layer`, so the layer added last sees the request
//! first.

use axum::http::header::HeaderName;
use axum::http::Method;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wraps `router`, outermost first, in: request-id assignment, HTTP tracing,
/// gzip, CORS, the body size cap (413 above `max_body_bytes`), and request-id
/// propagation onto the response.
///
/// No request timeout is applied. Async operations answer `202` at once and
/// sync handlers run to completion.
pub fn apply_http_layers<S>(router: Router<S>, config: &NetworkConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    router
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(build_cors_layer(&config.cors_origins))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

/// `"*"` anywhere in the list allows any origin; otherwise unparseable
/// entries are skipped.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use tower::ServiceExt;

    use super::*;

    fn echo_router(config: &NetworkConfig) -> Router {
        apply_http_layers(
            Router::new().route("/echo", post(|body: String| async move { body })),
            config,
        )
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let response = echo_router(&NetworkConfig::default())
            .oneshot(Request::post("/echo").body(Body::from("hi")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn cors_allowlist_echoes_known_origin_only() {
        let config = NetworkConfig {
            cors_origins: vec!["http://app.test".to_string(), "not a url\n".to_string()],
            ..NetworkConfig::default()
        };
        let app = echo_router(&config);

        let allowed = app
            .clone()
            .oneshot(
                Request::post("/echo")
                    .header("origin", "http://app.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            allowed.headers()["access-control-allow-origin"],
            "http://app.test"
        );

        let denied = app
            .oneshot(
                Request::post("/echo")
                    .header("origin", "http://other.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(!denied.headers().contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let config = NetworkConfig {
            max_body_bytes: 8,
            ..NetworkConfig::default()
        };
        let response = echo_router(&config)
            .oneshot(
                Request::post("/echo")
                    .header("content-length", "32")
                    .body(Body::from(vec![b'x'; 32]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
