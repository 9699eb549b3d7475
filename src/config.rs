use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::device::SyntheticSettings;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureSettings,
    pub export: ExportConfig,
    pub progress: ProgressConfig,
    pub http: HttpConfig,
    pub synthetic: SyntheticSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub acquire_timeout_secs: u64,
    pub tick_interval_ms: u64,
    pub flush_timeout_ms: u64,
    pub preview_muted: bool,
    pub preview_mirrored: bool,
    pub recording_prefix: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            acquire_timeout_secs: 10,
            tick_interval_ms: 1000,
            flush_timeout_ms: 5000,
            preview_muted: true,
            preview_mirrored: true,
            recording_prefix: "Recording".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub download_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub store_path: PathBuf,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("data/progress.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

/// Expand a leading `~` in a configured path
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).as_ref())
}

impl Config {
    /// Load `path` (extension optional, file optional) with `PRACTICE__*` overrides,
    /// e.g. `PRACTICE__HTTP__PORT=9000`
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("PRACTICE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        let mut cfg: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        cfg.validate()?;

        cfg.export.download_dir = expand_path(&cfg.export.download_dir);
        cfg.progress.store_path = expand_path(&cfg.progress.store_path);

        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.capture.tick_interval_ms > 0,
            "capture.tick_interval_ms must be greater than zero"
        );
        ensure!(
            self.capture.acquire_timeout_secs > 0,
            "capture.acquire_timeout_secs must be greater than zero"
        );
        Ok(())
    }
}
