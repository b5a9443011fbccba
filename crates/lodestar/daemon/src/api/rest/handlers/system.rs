//! System lifecycle handlers.

use crate::api::rest::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness probe.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub version: String,
    /// Symmetric sessions currently held in memory. Lost on restart;
    /// beacons re-handshake to rebuild them.
    pub active_sessions: usize,
    pub idle_interval_secs: u64,
    pub stale_threshold_secs: u64,
}

/// Coordinator status for the operator console.
pub async fn daemon_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: state.crypto.session_count(),
        idle_interval_secs: state.config.idle_interval_secs,
        stale_threshold_secs: state.config.stale_threshold_secs,
    })
}
