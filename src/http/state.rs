use crate::progress::ProgressStore;
use crate::session::MediaCaptureSession;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The one capture session this server drives
    pub session: MediaCaptureSession,

    pub progress: Arc<ProgressStore>,
}

impl AppState {
    pub fn new(session: MediaCaptureSession, progress: Arc<ProgressStore>) -> Self {
        Self { session, progress }
    }
}
