use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/recording/start", post(handlers::start_recording))
        .route("/recording/stop", post(handlers::stop_recording))
        .route("/recording/toggle", post(handlers::toggle_recording))
        .route("/recording/status", get(handlers::recording_status))
        // Transcript queries
        .route("/transcripts/recent", get(handlers::recent_transcripts))
        .route("/transcripts/search", get(handlers::search_transcripts))
        .route("/session/export/:format", get(handlers::export_session))
        // Device discovery
        .route("/devices", get(handlers::list_devices))
        // Request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
