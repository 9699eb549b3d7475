use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file name: {0}")]
    InvalidName(String),
}

/// Where an artifact ended up
#[derive(Debug, Clone, Serialize)]
pub struct SavedArtifact {
    pub file_name: String,
    pub location: String,
    pub bytes: usize,
}

/// The host's save-file affordance
#[async_trait::async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Save `bytes` verbatim under `file_name`
    async fn save(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<SavedArtifact, ExportError>;
}

/// Saves artifacts into a directory
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// Reject names that would escape the target directory
fn checked_name(file_name: &str) -> Result<&str, ExportError> {
    let trimmed = file_name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
    {
        return Err(ExportError::InvalidName(file_name.to_string()));
    }
    Ok(trimmed)
}

#[async_trait::async_trait]
impl ArtifactSink for DirectorySink {
    async fn save(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<SavedArtifact, ExportError> {
        let name = checked_name(file_name)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes).await?;

        info!(
            "Saved {} ({}, {} bytes) to {}",
            name,
            mime_type,
            bytes.len(),
            path.display()
        );

        Ok(SavedArtifact {
            file_name: name.to_string(),
            location: path.display().to_string(),
            bytes: bytes.len(),
        })
    }
}
