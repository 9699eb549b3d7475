//! HTTP API for driving a capture session remotely
//!
//! Routes (all JSON):
//! - GET /health - Health check
//! - GET /capture/status - Session diagnostics
//! - POST /capture/acquire, POST /capture/release - Device lifecycle
//! - POST|DELETE /capture/audio - Microphone toggle
//! - POST /capture/record/{start,stop,reset} - Takes
//! - GET /recordings, DELETE /recordings/:id - Collection
//! - POST /recordings/:id/play, POST /playback/{pause,resume} - Playback
//! - POST /recordings/:id/download - Export to the download directory
//! - GET /progress, POST /progress/topics/:topic - Challenge progress

mod handlers;
mod routes;
mod state;

pub use handlers::ErrorResponse;
pub use routes::create_router;
pub use state::AppState;
