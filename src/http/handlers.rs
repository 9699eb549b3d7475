use super::state::AppState;
use crate::device::{FacingMode, MediaConstraints, VideoConstraints};
use crate::export::{ExportError, SavedArtifact};
use crate::progress::{challenge_day, ChallengeDay, ProgressError, UserProgress};
use crate::session::{Diagnostics, RecordingSummary, SessionError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AcquireRequest {
    /// Request a camera track
    pub video: bool,

    /// Request a microphone track
    pub audio: bool,

    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
    pub facing_mode: Option<FacingMode>,
}

impl AcquireRequest {
    fn constraints(&self) -> MediaConstraints {
        MediaConstraints {
            video: self.video.then(|| VideoConstraints {
                ideal_width: self.ideal_width,
                ideal_height: self.ideal_height,
                facing_mode: self.facing_mode,
            }),
            audio: self.audio,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlaybackResponse {
    pub id: Uuid,
    pub url: Option<String>,
    pub paused: bool,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub progress: UserProgress,
    pub completed_today: bool,
    pub today: Option<ChallengeDay>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub retry_hint: Option<String>,
}

/// Handler error, rendered as `ErrorResponse`
pub enum ApiError {
    Session(SessionError),
    Progress(ProgressError),
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        ApiError::Session(e)
    }
}

impl From<ProgressError> for ApiError {
    fn from(e: ProgressError) -> Self {
        ApiError::Progress(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, retry_hint, message) = match self {
            ApiError::Session(e) => {
                let (status, code, hint) = match &e {
                    SessionError::InvalidState { .. } => {
                        (StatusCode::CONFLICT, "INVALID_STATE", None)
                    }
                    SessionError::Cancelled => (StatusCode::CONFLICT, "CANCELLED", None),
                    SessionError::UnknownRecording(_) => {
                        (StatusCode::NOT_FOUND, "NOT_FOUND", None)
                    }
                    SessionError::Capture(capture) => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        capture.kind.code(),
                        Some(capture.retry_hint()),
                    ),
                    SessionError::Playback(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, "RENDER_ERROR", None)
                    }
                    SessionError::Export(ExportError::InvalidName(_)) => {
                        (StatusCode::BAD_REQUEST, "EXPORT_FAILED", None)
                    }
                    SessionError::Export(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "EXPORT_FAILED", None)
                    }
                };
                (status, code, hint, e.to_string())
            }
            ApiError::Progress(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PROGRESS_UNAVAILABLE",
                None,
                e.to_string(),
            ),
        };

        if status.is_server_error() {
            error!("Request failed ({}): {}", code, message);
        } else {
            warn!("Request rejected ({}): {}", code, message);
        }

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
                retry_hint: retry_hint.map(str::to_string),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /capture/status
pub async fn capture_status(State(state): State<AppState>) -> Json<Diagnostics> {
    Json(state.session.diagnostics())
}

/// POST /capture/acquire
/// Acquire devices and bring the preview up
pub async fn acquire(
    State(state): State<AppState>,
    Json(req): Json<AcquireRequest>,
) -> ApiResult<Diagnostics> {
    info!("Acquire requested (video={}, audio={})", req.video, req.audio);
    state.session.acquire(req.constraints()).await?;
    Ok(Json(state.session.diagnostics()))
}

/// POST /capture/release
pub async fn release(State(state): State<AppState>) -> Json<Diagnostics> {
    state.session.release();
    Json(state.session.diagnostics())
}

/// POST /capture/audio
/// Merge a microphone track into the held stream
pub async fn add_audio(State(state): State<AppState>) -> ApiResult<Diagnostics> {
    state.session.add_audio_track().await?;
    Ok(Json(state.session.diagnostics()))
}

/// DELETE /capture/audio
pub async fn remove_audio(State(state): State<AppState>) -> ApiResult<Diagnostics> {
    state.session.remove_audio_track()?;
    Ok(Json(state.session.diagnostics()))
}

/// POST /capture/record/start
pub async fn start_recording(State(state): State<AppState>) -> ApiResult<Diagnostics> {
    state.session.start_recording()?;
    Ok(Json(state.session.diagnostics()))
}

/// POST /capture/record/stop
/// Finish the take and return it
pub async fn stop_recording(State(state): State<AppState>) -> ApiResult<RecordingSummary> {
    let recording = state.session.stop_recording().await?;
    Ok(Json(recording.summary()))
}

/// POST /capture/record/reset
/// Back to live preview to record again
pub async fn reset_recording(State(state): State<AppState>) -> ApiResult<Diagnostics> {
    state.session.reset()?;
    Ok(Json(state.session.diagnostics()))
}

/// GET /recordings
pub async fn list_recordings(State(state): State<AppState>) -> Json<Vec<RecordingSummary>> {
    Json(
        state
            .session
            .recordings()
            .iter()
            .map(|r| r.summary())
            .collect(),
    )
}

/// DELETE /recordings/:id
pub async fn delete_recording(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<RecordingSummary> {
    let removed = state.session.delete(id)?;
    Ok(Json(removed.summary()))
}

/// POST /recordings/:id/play
pub async fn play_recording(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PlaybackResponse> {
    state.session.play(id).await?;
    Ok(Json(playback_status(&state, id)))
}

/// POST /playback/pause
pub async fn pause_playback(State(state): State<AppState>) -> Json<Option<PlaybackResponse>> {
    state.session.pause();
    Json(current_playback(&state))
}

/// POST /playback/resume
pub async fn resume_playback(State(state): State<AppState>) -> Json<Option<PlaybackResponse>> {
    state.session.resume();
    Json(current_playback(&state))
}

/// POST /recordings/:id/download
/// Save the payload into the configured download directory
pub async fn download_recording(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SavedArtifact> {
    let saved = state.session.download(id).await?;
    Ok(Json(saved))
}

/// GET /progress
pub async fn get_progress(State(state): State<AppState>) -> ApiResult<ProgressResponse> {
    let progress = state.progress.snapshot().await;
    let completed_today = progress.has_completed_today(Local::now().date_naive());
    let today = challenge_day(progress.current_challenge).copied();
    Ok(Json(ProgressResponse {
        progress,
        completed_today,
        today,
    }))
}

/// POST /progress/topics/:topic
/// Mark a practice topic as completed
pub async fn complete_topic(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> ApiResult<UserProgress> {
    if state.progress.mark_topic_completed(&topic).await? {
        info!("Topic completed: {}", topic);
    }
    Ok(Json(state.progress.snapshot().await))
}

fn current_playback(state: &AppState) -> Option<PlaybackResponse> {
    state
        .session
        .now_playing()
        .map(|(id, _)| playback_status(state, id))
}

fn playback_status(state: &AppState, id: Uuid) -> PlaybackResponse {
    let url = state
        .session
        .now_playing()
        .filter(|(playing, _)| *playing == id)
        .map(|(_, url)| url);
    PlaybackResponse {
        id,
        url,
        paused: state.session.is_paused(),
    }
}
