use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::CaptureSettings;
use crate::device::PreviewOptions;

/// Which practice screen a session is serving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PracticeMode {
    /// Free-form voice notes
    #[default]
    Voice,
    /// Timed daily challenge; completion advances progress
    Challenge,
    /// Camera self-view practice
    Mirror,
}

/// Configuration for a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub mode: PracticeMode,

    /// Upper bound on device request + preview readiness
    /// Default: 10 seconds
    pub acquire_timeout: Duration,

    /// Timer period while recording
    /// Default: 1 second
    pub tick_interval: Duration,

    /// How long stop waits for the encoder to flush
    pub flush_timeout: Duration,

    /// Flags handed to the preview surface
    pub preview: PreviewOptions,

    /// Display names are "{prefix} {n}"
    pub name_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: PracticeMode::Voice,
            acquire_timeout: Duration::from_secs(10),
            tick_interval: Duration::from_secs(1),
            flush_timeout: Duration::from_secs(5),
            preview: PreviewOptions::default(),
            name_prefix: "Recording".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn from_settings(settings: &CaptureSettings, mode: PracticeMode) -> Self {
        Self {
            mode,
            acquire_timeout: Duration::from_secs(settings.acquire_timeout_secs),
            tick_interval: Duration::from_millis(settings.tick_interval_ms),
            flush_timeout: Duration::from_millis(settings.flush_timeout_ms),
            preview: PreviewOptions {
                muted: settings.preview_muted,
                mirrored: settings.preview_mirrored,
            },
            name_prefix: settings.recording_prefix.clone(),
        }
    }

    pub fn with_mode(mut self, mode: PracticeMode) -> Self {
        self.mode = mode;
        self
    }
}
