use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::gateway::StreamHandle;
use crate::session::Recording;

/// Failure reported by a preview or playback surface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RenderFault(pub String);

/// Presentation flags passed through to the preview surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewOptions {
    /// Suppress local echo during live preview
    pub muted: bool,
    /// Horizontal flip for camera self-view
    pub mirrored: bool,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            muted: true,
            mirrored: true,
        }
    }
}

/// Live preview surface for a granted stream
#[async_trait::async_trait]
pub trait PreviewSink: Send + Sync {
    /// Bind the stream to the surface
    async fn attach(&self, stream: &StreamHandle, options: PreviewOptions)
        -> Result<(), RenderFault>;

    /// Resolves once the surface can render a frame
    async fn ready(&self) -> Result<(), RenderFault>;

    /// Start rendering the live feed
    async fn play(&self) -> Result<(), RenderFault>;

    /// Unbind whatever stream is attached. Idempotent.
    fn detach(&self);

    fn name(&self) -> &str;
}

/// Shared playback surface for finished recordings
#[async_trait::async_trait]
pub trait PlaybackSurface: Send + Sync {
    /// Start playing `recording` from `url`
    ///
    /// The returned receiver fires once playback reaches the end. It is
    /// dropped without firing when playback is stopped early.
    async fn play(&self, url: &str, recording: &Recording)
        -> Result<oneshot::Receiver<()>, RenderFault>;

    fn pause(&self);

    fn resume(&self);

    /// Stop and unload the current source. Idempotent.
    fn stop(&self);
}

/// Preview sink with no display, ready as soon as a stream is attached.
#[derive(Default)]
pub struct HeadlessPreview {
    attached: Mutex<Option<(StreamHandle, PreviewOptions)>>,
}

impl HeadlessPreview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.lock().is_some()
    }
}

#[async_trait::async_trait]
impl PreviewSink for HeadlessPreview {
    async fn attach(
        &self,
        stream: &StreamHandle,
        options: PreviewOptions,
    ) -> Result<(), RenderFault> {
        info!(
            "Headless preview attached to stream {} (muted={}, mirrored={})",
            stream.id(),
            options.muted,
            options.mirrored
        );
        *self.attached.lock() = Some((stream.clone(), options));
        Ok(())
    }

    async fn ready(&self) -> Result<(), RenderFault> {
        match &*self.attached.lock() {
            Some((stream, _)) if stream.has_video() => Ok(()),
            Some(_) => Err(RenderFault("attached stream has no video track".to_string())),
            None => Err(RenderFault("no stream attached".to_string())),
        }
    }

    async fn play(&self) -> Result<(), RenderFault> {
        if self.attached.lock().is_none() {
            return Err(RenderFault("no stream attached".to_string()));
        }
        debug!("Headless preview rendering");
        Ok(())
    }

    fn detach(&self) {
        if self.attached.lock().take().is_some() {
            info!("Headless preview detached");
        }
    }

    fn name(&self) -> &str {
        "headless preview"
    }
}

struct HeadlessTrack {
    token: u64,
    paused: bool,
}

/// Playback surface with no output device.
///
/// Simulates real-time playback: a recording "plays" for its duration and
/// pausing holds the position.
pub struct HeadlessPlayback {
    step: Duration,
    current: Arc<Mutex<Option<HeadlessTrack>>>,
    next_token: Mutex<u64>,
}

impl HeadlessPlayback {
    pub fn new() -> Self {
        Self {
            step: Duration::from_millis(100),
            current: Arc::new(Mutex::new(None)),
            next_token: Mutex::new(0),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(&*self.current.lock(), Some(t) if !t.paused)
    }
}

impl Default for HeadlessPlayback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PlaybackSurface for HeadlessPlayback {
    async fn play(
        &self,
        url: &str,
        recording: &Recording,
    ) -> Result<oneshot::Receiver<()>, RenderFault> {
        let token = {
            let mut next = self.next_token.lock();
            *next += 1;
            *next
        };
        *self.current.lock() = Some(HeadlessTrack {
            token,
            paused: false,
        });

        info!("Headless playback of {} from {}", recording.name, url);

        let (done_tx, done_rx) = oneshot::channel();
        let current = Arc::clone(&self.current);
        let step = self.step;
        let total = Duration::from_secs(recording.duration_secs);

        tokio::spawn(async move {
            let mut position = Duration::ZERO;
            loop {
                {
                    let mut slot = current.lock();
                    // Stopped or replaced
                    if !matches!(slot.as_ref(), Some(track) if track.token == token) {
                        return;
                    }
                    if position >= total {
                        *slot = None;
                        break;
                    }
                }
                tokio::time::sleep(step).await;
                let paused = matches!(&*current.lock(), Some(t) if t.token == token && t.paused);
                if !paused {
                    position += step;
                }
            }
            let _ = done_tx.send(());
        });

        Ok(done_rx)
    }

    fn pause(&self) {
        if let Some(track) = self.current.lock().as_mut() {
            track.paused = true;
        }
    }

    fn resume(&self) {
        if let Some(track) = self.current.lock().as_mut() {
            track.paused = false;
        }
    }

    fn stop(&self) {
        self.current.lock().take();
    }
}
