//! API router configuration.

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health and status
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::daemon_status))
        // Beacon surface
        .route("/beacon/handshake", post(handlers::beacon_handshake))
        .route("/beacon/checkin", post(handlers::beacon_checkin))
        // Operator surface
        .route("/beacons", get(handlers::list_beacons))
        .route("/beacons/:id/tasks", get(handlers::beacon_history))
        .route("/tasks", post(handlers::create_task))
        .route("/tasks/:id", get(handlers::get_task));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
