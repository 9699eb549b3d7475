use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Device lifecycle
        .route("/capture/status", get(handlers::capture_status))
        .route("/capture/acquire", post(handlers::acquire))
        .route("/capture/release", post(handlers::release))
        .route(
            "/capture/audio",
            post(handlers::add_audio).delete(handlers::remove_audio),
        )
        // Takes
        .route("/capture/record/start", post(handlers::start_recording))
        .route("/capture/record/stop", post(handlers::stop_recording))
        .route("/capture/record/reset", post(handlers::reset_recording))
        // Recordings
        .route("/recordings", get(handlers::list_recordings))
        .route("/recordings/:id", delete(handlers::delete_recording))
        .route("/recordings/:id/play", post(handlers::play_recording))
        .route("/recordings/:id/download", post(handlers::download_recording))
        .route("/playback/pause", post(handlers::pause_playback))
        .route("/playback/resume", post(handlers::resume_playback))
        // Progress
        .route("/progress", get(handlers::get_progress))
        .route("/progress/topics/:topic", post(handlers::complete_topic))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // Practice UI is served from another origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
