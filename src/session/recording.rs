use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// A finished take. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct Recording {
    pub id: Uuid,

    /// Display name, also the download file stem
    pub name: String,

    /// Encoder output type (e.g. "audio/wav")
    pub mime_type: String,

    /// Timer value when the take ended
    pub duration_secs: u64,

    pub created_at: DateTime<Utc>,

    /// Salvaged after the device went away mid-take
    pub interrupted: bool,

    /// Encoded payload, exactly as the encoder produced it
    #[serde(skip)]
    pub payload: Arc<[u8]>,
}

impl Recording {
    pub(crate) fn new(
        name: String,
        mime_type: String,
        duration_secs: u64,
        payload: Vec<u8>,
        interrupted: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            mime_type,
            duration_secs,
            created_at: Utc::now(),
            interrupted,
            payload: payload.into(),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.payload.len()
    }

    /// "{name}.{ext}" with the extension taken from the MIME type
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, extension_for(&self.mime_type))
    }

    pub fn summary(&self) -> RecordingSummary {
        RecordingSummary {
            id: self.id,
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            duration_secs: self.duration_secs,
            created_at: self.created_at,
            interrupted: self.interrupted,
            size_bytes: self.size_bytes(),
        }
    }
}

/// Recording metadata without the payload
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSummary {
    pub id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub duration_secs: u64,
    pub created_at: DateTime<Utc>,
    pub interrupted: bool,
    pub size_bytes: usize,
}

/// File extension for a MIME type, ignoring parameters
pub fn extension_for(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or("").trim();
    match essence {
        "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
        "audio/webm" | "video/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/mp4" | "video/mp4" => "mp4",
        "audio/mpeg" => "mp3",
        _ => "bin",
    }
}
