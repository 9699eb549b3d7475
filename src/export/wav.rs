use anyhow::{Context, Result};
use hound::WavReader;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Header summary of an exported WAV take
#[derive(Debug, Clone, Serialize)]
pub struct WavInfo {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_count: u32,
}

impl WavInfo {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Inspecting exported take: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let sample_count = reader.len();

        let duration_seconds =
            sample_count as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Take: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds, spec.sample_rate, spec.channels, sample_count
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            sample_count,
        })
    }
}
