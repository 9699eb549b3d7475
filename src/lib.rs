pub mod config;
pub mod device;
pub mod export;
pub mod http;
pub mod progress;
pub mod session;

pub use config::Config;
pub use device::{
    DeviceError, DeviceGateway, MediaConstraints, PlaybackSurface, PreviewSink, StreamHandle,
    SyntheticGateway, TrackKind,
};
pub use export::{ArtifactSink, DirectorySink, ObjectUrlRegistry, SavedArtifact, WavInfo};
pub use http::{create_router, AppState};
pub use progress::{spawn_progress_listener, ProgressStore, UserProgress};
pub use session::{
    CaptureBackends, CaptureError, CaptureErrorKind, CaptureState, MediaCaptureSession,
    PracticeMode, Recording, SessionConfig, SessionError, SessionEvent,
};
