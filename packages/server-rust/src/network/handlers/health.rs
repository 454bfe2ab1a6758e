//! Health, liveness, and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;
use crate::network::HealthState;

/// Always 200; the body's `state` says whether the server is serving,
/// so monitoring can tell "up but draining" from "down".
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let services = &state.services;
    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "operations": services.registry.len(),
        "instances": services.instances.len(),
        "listeners": services.broadcaster.count(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Process is up. Never checks anything else, since a failure restarts the pod.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// 200 only in `ready`; 503 while starting, draining or stopped.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
