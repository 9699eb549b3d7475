use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::state::CaptureState;
use crate::device::{DeviceError, RenderFault};
use crate::export::ExportError;

/// Classified capture failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureErrorKind {
    PermissionDenied,
    DeviceNotFound,
    DeviceBusy,
    DeviceTimeout,
    RenderError,
    DeviceLost,
    Unknown,
}

impl CaptureErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            CaptureErrorKind::PermissionDenied => "PERMISSION_DENIED",
            CaptureErrorKind::DeviceNotFound => "DEVICE_NOT_FOUND",
            CaptureErrorKind::DeviceBusy => "DEVICE_BUSY",
            CaptureErrorKind::DeviceTimeout => "DEVICE_TIMEOUT",
            CaptureErrorKind::RenderError => "RENDER_ERROR",
            CaptureErrorKind::DeviceLost => "DEVICE_LOST",
            CaptureErrorKind::Unknown => "UNKNOWN",
        }
    }

    /// What the user should do before retrying
    pub fn retry_hint(&self) -> &'static str {
        match self {
            CaptureErrorKind::PermissionDenied => {
                "Allow access in your browser or system settings, then try again."
            }
            CaptureErrorKind::DeviceNotFound => "Connect a device, then try again.",
            CaptureErrorKind::DeviceBusy => "Close other apps using the device, then try again.",
            CaptureErrorKind::DeviceTimeout => "Try again.",
            CaptureErrorKind::RenderError => "Try again, or reload if the preview stays blank.",
            CaptureErrorKind::DeviceLost => "Reconnect the device, then start again.",
            CaptureErrorKind::Unknown => "Try again.",
        }
    }
}

/// Which hardware an operation was asking for; only affects wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceNoun {
    Camera,
    Microphone,
    CameraAndMicrophone,
}

impl DeviceNoun {
    pub fn for_request(video: bool, audio: bool) -> Self {
        match (video, audio) {
            (true, true) => DeviceNoun::CameraAndMicrophone,
            (false, true) => DeviceNoun::Microphone,
            _ => DeviceNoun::Camera,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            DeviceNoun::Camera => "Camera",
            DeviceNoun::Microphone => "Microphone",
            DeviceNoun::CameraAndMicrophone => "Camera and microphone",
        }
    }

    fn lower(&self) -> &'static str {
        match self {
            DeviceNoun::Camera => "camera",
            DeviceNoun::Microphone => "microphone",
            DeviceNoun::CameraAndMicrophone => "camera and microphone",
        }
    }
}

/// A failure surfaced to the user: kind plus readable cause
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct CaptureError {
    pub kind: CaptureErrorKind,
    pub message: String,
}

impl CaptureError {
    pub fn new(kind: CaptureErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Convert a raw gateway failure
    pub fn classify(error: &DeviceError, noun: DeviceNoun) -> Self {
        let prefix = format!("{} setup failed: ", noun.title());
        match error {
            DeviceError::Denied(_) => Self::new(
                CaptureErrorKind::PermissionDenied,
                format!(
                    "{}{} permission denied. Please allow {} access and try again.",
                    prefix,
                    noun.title(),
                    noun.lower()
                ),
            ),
            DeviceError::NotFound(_) => Self::new(
                CaptureErrorKind::DeviceNotFound,
                format!(
                    "{}No {} found. Please check that one is connected.",
                    prefix,
                    noun.lower()
                ),
            ),
            DeviceError::Overconstrained(_) => Self::new(
                CaptureErrorKind::DeviceNotFound,
                format!("{}{} settings not supported by your device.", prefix, noun.title()),
            ),
            DeviceError::InUse(_) => Self::new(
                CaptureErrorKind::DeviceBusy,
                format!(
                    "{}{} is being used by another application. Please close other apps using it.",
                    prefix,
                    noun.title()
                ),
            ),
            DeviceError::Other(reason) => {
                Self::new(CaptureErrorKind::Unknown, format!("{}{}", prefix, reason))
            }
        }
    }

    pub fn timeout(noun: DeviceNoun, after_secs: u64) -> Self {
        Self::new(
            CaptureErrorKind::DeviceTimeout,
            format!(
                "{} setup failed: {} took too long to start ({}s). Please try again.",
                noun.title(),
                noun.title(),
                after_secs
            ),
        )
    }

    pub fn render(fault: &RenderFault) -> Self {
        Self::new(
            CaptureErrorKind::RenderError,
            format!("Video display error occurred: {}", fault),
        )
    }

    pub fn missing_track(noun: DeviceNoun) -> Self {
        Self::new(
            CaptureErrorKind::DeviceNotFound,
            format!(
                "{} setup failed: no {} track found in the granted stream.",
                noun.title(),
                noun.lower()
            ),
        )
    }

    pub fn device_lost(reason: &str) -> Self {
        Self::new(
            CaptureErrorKind::DeviceLost,
            format!("Recording interrupted: {}. The partial take was kept.", reason),
        )
    }

    pub fn retry_hint(&self) -> &'static str {
        self.kind.retry_hint()
    }
}

/// Errors returned by session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: CaptureState,
    },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("recording {0} not found")]
    UnknownRecording(Uuid),

    #[error("operation cancelled by release")]
    Cancelled,

    #[error("playback failed: {0}")]
    Playback(RenderFault),

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl SessionError {
    pub(crate) fn invalid(operation: &'static str, state: CaptureState) -> Self {
        SessionError::InvalidState { operation, state }
    }
}
