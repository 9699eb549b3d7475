//! Session state machine types and events

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::config::PracticeMode;
use super::error::CaptureError;

/// Current state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    /// No device held
    #[default]
    Idle,
    /// Waiting on permission prompt / device handshake / preview
    Acquiring,
    /// Device held, preview running
    Live,
    /// Take in progress
    Recording,
    /// Take finished, device still held
    Stopped,
    /// Last attempt failed; retry with acquire
    Failed,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Idle => "idle",
            CaptureState::Acquiring => "acquiring",
            CaptureState::Live => "live",
            CaptureState::Recording => "recording",
            CaptureState::Stopped => "stopped",
            CaptureState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why playback of a recording stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackEnd {
    /// Reached the end
    Finished,
    /// Another recording was selected
    Replaced,
    /// The recording was deleted
    Deleted,
    /// Session torn down
    Disposed,
}

/// Events emitted by a session
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        from: CaptureState,
        to: CaptureState,
    },
    /// Timer advanced (once per second while recording)
    Tick { elapsed_secs: u64 },
    AudioTrackAdded,
    AudioTrackRemoved,
    RecordingSaved {
        id: Uuid,
        name: String,
        duration_secs: u64,
        interrupted: bool,
    },
    RecordingDeleted { id: Uuid },
    PlaybackStarted { id: Uuid },
    PlaybackStopped { id: Uuid, reason: PlaybackEnd },
    Error(CaptureError),
    /// A take of at least one tick finished normally; consumed by progress tracking
    SessionCompleted {
        mode: PracticeMode,
        recording_id: Uuid,
        duration_secs: u64,
    },
}

/// Point-in-time view of a session for troubleshooting
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub state: CaptureState,
    pub gateway: String,
    pub preview: String,
    pub attempt: u64,
    pub stream_active: bool,
    pub video_tracks: usize,
    pub audio_tracks: usize,
    pub live_tracks: usize,
    pub elapsed_secs: u64,
    pub recordings: usize,
    pub playing: Option<Uuid>,
    pub live_object_urls: usize,
    pub last_error: Option<CaptureError>,
}
