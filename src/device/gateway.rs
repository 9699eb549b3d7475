use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

/// Hardware track type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Camera feed
    Video,
    /// Microphone feed
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => write!(f, "video"),
            TrackKind::Audio => write!(f, "audio"),
        }
    }
}

/// A single live hardware track granted by a gateway.
///
/// Clones share liveness: stopping any clone stops the track for all of them,
/// which is how a gateway can observe that the session let go of its hardware.
#[derive(Debug, Clone)]
pub struct Track {
    id: Uuid,
    kind: TrackKind,
    label: String,
    live: Arc<AtomicBool>,
}

impl Track {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            label: label.into(),
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop the track. Idempotent.
    pub fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            debug!("Stopped {} track {} ({})", self.kind, self.label, self.id);
        }
    }
}

/// The set of tracks granted for one request (the "device handle").
#[derive(Debug, Clone)]
pub struct StreamHandle {
    id: Uuid,
    tracks: Vec<Track>,
}

impl StreamHandle {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_count(&self, kind: TrackKind) -> usize {
        self.tracks.iter().filter(|t| t.kind() == kind).count()
    }

    pub fn has_video(&self) -> bool {
        self.track_count(TrackKind::Video) > 0
    }

    pub fn has_audio(&self) -> bool {
        self.track_count(TrackKind::Audio) > 0
    }

    /// Number of tracks still delivering media
    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    pub fn is_active(&self) -> bool {
        self.live_track_count() > 0
    }

    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    /// Remove every track of `kind` from the handle and hand them back
    pub fn take_tracks(&mut self, kind: TrackKind) -> Vec<Track> {
        let (taken, kept): (Vec<Track>, Vec<Track>) = std::mem::take(&mut self.tracks)
            .into_iter()
            .partition(|t| t.kind() == kind);
        self.tracks = kept;
        taken
    }

    /// Stop and drop every track of `kind`
    pub fn stop_tracks(&mut self, kind: TrackKind) -> usize {
        let removed = self.take_tracks(kind);
        for track in &removed {
            track.stop();
        }
        removed.len()
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Camera facing preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    Environment,
}

/// Optional camera preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
    pub facing_mode: Option<FacingMode>,
}

impl VideoConstraints {
    pub fn is_bare(&self) -> bool {
        self.ideal_width.is_none() && self.ideal_height.is_none() && self.facing_mode.is_none()
    }
}

/// Capability set requested from a gateway
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// Request a camera track (with optional preferences)
    pub video: Option<VideoConstraints>,
    /// Request a microphone track
    pub audio: bool,
}

impl MediaConstraints {
    pub fn video_only() -> Self {
        Self {
            video: Some(VideoConstraints::default()),
            audio: false,
        }
    }

    pub fn audio_only() -> Self {
        Self {
            video: None,
            audio: true,
        }
    }

    pub fn audio_video() -> Self {
        Self {
            video: Some(VideoConstraints::default()),
            audio: true,
        }
    }

    pub fn wants_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_none() && !self.audio
    }

    /// Whether dropping camera preferences could change the outcome
    pub fn is_relaxable(&self) -> bool {
        self.video.as_ref().map(|v| !v.is_bare()).unwrap_or(false)
    }

    /// Same capabilities with every camera preference dropped
    pub fn relaxed(&self) -> Self {
        Self {
            video: self.video.as_ref().map(|_| VideoConstraints::default()),
            audio: self.audio,
        }
    }
}

/// Raw failure reported by a gateway. Classified into a `CaptureError`
/// at the session boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("access denied: {0}")]
    Denied(String),

    #[error("no matching device: {0}")]
    NotFound(String),

    #[error("device in use: {0}")]
    InUse(String),

    #[error("constraints cannot be satisfied: {0}")]
    Overconstrained(String),

    #[error("{0}")]
    Other(String),
}

/// Output of a running encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// A piece of the encoded take
    Chunk(Vec<u8>),
    /// The source track went away (unplugged, revoked)
    Fault(String),
}

/// A running encoder over a stream.
///
/// The encoder delivers chunks on `events` until it is asked to stop, then
/// flushes anything pending and closes the channel. Dropping the stop sender
/// has the same effect as sending on it.
pub struct MediaEncoder {
    mime_type: String,
    events: mpsc::Receiver<EncoderEvent>,
    stop_tx: oneshot::Sender<()>,
}

impl MediaEncoder {
    pub fn new(
        mime_type: impl Into<String>,
        events: mpsc::Receiver<EncoderEvent>,
        stop_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            mime_type: mime_type.into(),
            events,
            stop_tx,
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn into_parts(self) -> (String, mpsc::Receiver<EncoderEvent>, oneshot::Sender<()>) {
        (self.mime_type, self.events, self.stop_tx)
    }
}

/// Device access capability
///
/// Implementations:
/// - `SyntheticGateway`: software camera/microphone (headless runs, CLI, HTTP)
/// - test fakes with scripted outcomes
#[async_trait::async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Request a stream satisfying `constraints`
    ///
    /// Suspends until the permission prompt and device handshake resolve.
    async fn request_stream(&self, constraints: &MediaConstraints)
        -> Result<StreamHandle, DeviceError>;

    /// Start encoding the given stream
    fn open_encoder(&self, stream: &StreamHandle) -> Result<MediaEncoder, DeviceError>;

    /// Get gateway name for logging
    fn name(&self) -> &str;
}
