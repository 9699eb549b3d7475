//! Capture session management
//!
//! This module provides the `MediaCaptureSession` abstraction that manages:
//! - Device acquisition and release through a `DeviceGateway`
//! - Live preview binding
//! - Recording takes and the elapsed-time counter
//! - The in-memory recording collection, playback and download
//! - Classified, user-facing capture errors

mod config;
mod error;
mod recording;
mod session;
mod state;
mod timer;

pub use config::{PracticeMode, SessionConfig};
pub use error::{CaptureError, CaptureErrorKind, DeviceNoun, SessionError};
pub use recording::{extension_for, Recording, RecordingSummary};
pub use session::{CaptureBackends, MediaCaptureSession};
pub use state::{CaptureState, Diagnostics, PlaybackEnd, SessionEvent};
pub use timer::{spawn_ticker, TimerHandle};
