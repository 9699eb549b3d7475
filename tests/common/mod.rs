// Scripted fakes for the capture session's host capabilities
//
// FakeGateway answers stream requests from a queue of outcomes (default:
// grant) and tracks every track it hands out, so tests can assert that the
// session never leaks live hardware.

#![allow(dead_code)]

use parking_lot::Mutex;
use practice_capture::device::{
    DeviceError, DeviceGateway, EncoderEvent, MediaConstraints, MediaEncoder, PlaybackSurface,
    PreviewOptions, PreviewSink, RenderFault, StreamHandle, Track, TrackKind,
};
use practice_capture::export::{ArtifactSink, ExportError, SavedArtifact};
use practice_capture::session::{
    CaptureBackends, MediaCaptureSession, Recording, SessionConfig, SessionEvent,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Encoder slice length of the fake encoder
pub const SLICE: Duration = Duration::from_millis(1000);

/// Trailer the fake encoder appends when asked to stop
pub const TRAILER: &[u8] = b"END";

pub enum Outcome {
    Grant,
    /// Grant audio only, whatever was asked
    GrantWithoutVideo,
    Fail(DeviceError),
}

#[derive(Default)]
pub struct FakeGateway {
    script: Mutex<VecDeque<(Outcome, Duration)>>,
    requests: Mutex<Vec<MediaConstraints>>,
    issued: Mutex<Vec<Track>>,
    faults: Mutex<Vec<oneshot::Sender<String>>>,
    encoder_fails: AtomicBool,
    silent: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, outcome: Outcome) {
        self.push_delayed(outcome, Duration::ZERO);
    }

    pub fn push_delayed(&self, outcome: Outcome, delay: Duration) {
        self.script.lock().push_back((outcome, delay));
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<MediaConstraints> {
        self.requests.lock().clone()
    }

    pub fn issued_count(&self) -> usize {
        self.issued.lock().len()
    }

    /// Live tracks across everything ever granted
    pub fn live_tracks(&self) -> usize {
        self.issued.lock().iter().filter(|t| t.is_live()).count()
    }

    pub fn set_encoder_fails(&self, fails: bool) {
        self.encoder_fails.store(fails, Ordering::SeqCst);
    }

    /// Encoder that never produces any data
    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }

    /// End every issued track and fault running encoders
    pub fn unplug(&self, reason: &str) {
        for track in self.issued.lock().iter() {
            track.stop();
        }
        for fault in self.faults.lock().drain(..) {
            let _ = fault.send(reason.to_string());
        }
    }

    fn issue(&self, kind: TrackKind) -> Track {
        let track = Track::new(kind, format!("fake {}", kind));
        self.issued.lock().push(track.clone());
        track
    }
}

#[async_trait::async_trait]
impl DeviceGateway for FakeGateway {
    async fn request_stream(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<StreamHandle, DeviceError> {
        self.requests.lock().push(constraints.clone());
        let (outcome, delay) = self
            .script
            .lock()
            .pop_front()
            .unwrap_or((Outcome::Grant, Duration::ZERO));

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match outcome {
            Outcome::Grant => {
                let mut tracks = Vec::new();
                if constraints.wants_video() {
                    tracks.push(self.issue(TrackKind::Video));
                }
                if constraints.audio {
                    tracks.push(self.issue(TrackKind::Audio));
                }
                Ok(StreamHandle::new(tracks))
            }
            Outcome::GrantWithoutVideo => Ok(StreamHandle::new(vec![self.issue(TrackKind::Audio)])),
            Outcome::Fail(e) => Err(e),
        }
    }

    fn open_encoder(&self, stream: &StreamHandle) -> Result<MediaEncoder, DeviceError> {
        if self.encoder_fails.load(Ordering::SeqCst) {
            return Err(DeviceError::Other("encoder unavailable".to_string()));
        }

        let (tx, rx) = mpsc::channel(16);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (fault_tx, mut fault_rx) = oneshot::channel::<String>();
        self.faults.lock().push(fault_tx);
        let silent = self.silent.load(Ordering::SeqCst);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + SLICE, SLICE);
            let mut n: u8 = 0;
            let mut faulted = false;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    reason = &mut fault_rx, if !faulted => {
                        faulted = true;
                        if let Ok(reason) = reason {
                            let _ = tx.send(EncoderEvent::Fault(reason)).await;
                        }
                    }
                    _ = ticker.tick(), if !silent => {
                        n = n.wrapping_add(1);
                        if tx.send(EncoderEvent::Chunk(vec![n; 4])).await.is_err() {
                            return;
                        }
                    }
                }
            }
            if !silent {
                let _ = tx.send(EncoderEvent::Chunk(TRAILER.to_vec())).await;
            }
        });

        let mime = if stream.has_video() {
            "video/webm;codecs=vp8,opus"
        } else {
            "audio/webm"
        };
        Ok(MediaEncoder::new(mime, rx, stop_tx))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewMode {
    Ready,
    NeverReady,
    FailReady,
}

pub struct FakePreview {
    mode: Mutex<PreviewMode>,
    attached: Mutex<Option<(StreamHandle, PreviewOptions)>>,
    attach_count: AtomicUsize,
    playing: AtomicBool,
}

impl FakePreview {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(PreviewMode::Ready),
            attached: Mutex::new(None),
            attach_count: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
        })
    }

    pub fn set_mode(&self, mode: PreviewMode) {
        *self.mode.lock() = mode;
    }

    pub fn is_attached(&self) -> bool {
        self.attached.lock().is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> Option<PreviewOptions> {
        self.attached.lock().as_ref().map(|(_, options)| *options)
    }

    pub fn attach_count(&self) -> usize {
        self.attach_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PreviewSink for FakePreview {
    async fn attach(
        &self,
        stream: &StreamHandle,
        options: PreviewOptions,
    ) -> Result<(), RenderFault> {
        self.attach_count.fetch_add(1, Ordering::SeqCst);
        *self.attached.lock() = Some((stream.clone(), options));
        Ok(())
    }

    async fn ready(&self) -> Result<(), RenderFault> {
        let mode = *self.mode.lock();
        match mode {
            PreviewMode::Ready => Ok(()),
            PreviewMode::NeverReady => std::future::pending().await,
            PreviewMode::FailReady => Err(RenderFault("decoder crashed".to_string())),
        }
    }

    async fn play(&self) -> Result<(), RenderFault> {
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn detach(&self) {
        self.attached.lock().take();
        self.playing.store(false, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "fake preview"
    }
}

#[derive(Default)]
pub struct FakePlayback {
    current: Mutex<Option<(String, oneshot::Sender<()>)>>,
    played: Mutex<Vec<String>>,
    paused: AtomicBool,
    stops: AtomicUsize,
    play_delay: Mutex<Duration>,
}

impl FakePlayback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reach the end of whatever is playing
    pub fn finish(&self) {
        if let Some((_, done)) = self.current.lock().take() {
            let _ = done.send(());
        }
    }

    pub fn current_url(&self) -> Option<String> {
        self.current.lock().as_ref().map(|(url, _)| url.clone())
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Make the surface take `delay` before it starts rendering
    pub fn set_play_delay(&self, delay: Duration) {
        *self.play_delay.lock() = delay;
    }
}

#[async_trait::async_trait]
impl PlaybackSurface for FakePlayback {
    async fn play(
        &self,
        url: &str,
        _recording: &Recording,
    ) -> Result<oneshot::Receiver<()>, RenderFault> {
        let delay = *self.play_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let (done_tx, done_rx) = oneshot::channel();
        *self.current.lock() = Some((url.to_string(), done_tx));
        self.played.lock().push(url.to_string());
        self.paused.store(false, Ordering::SeqCst);
        Ok(done_rx)
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.current.lock().take();
    }
}

/// Artifact sink that keeps everything in memory
#[derive(Default)]
pub struct MemorySink {
    saved: Mutex<Vec<(String, String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// (file name, mime type, bytes)
    pub fn saved(&self) -> Vec<(String, String, Vec<u8>)> {
        self.saved.lock().clone()
    }
}

#[async_trait::async_trait]
impl ArtifactSink for MemorySink {
    async fn save(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<SavedArtifact, ExportError> {
        self.saved
            .lock()
            .push((file_name.to_string(), mime_type.to_string(), bytes.to_vec()));
        Ok(SavedArtifact {
            file_name: file_name.to_string(),
            location: format!("memory://{}", file_name),
            bytes: bytes.len(),
        })
    }
}

/// A session wired to fakes, with handles to each fake
pub struct Harness {
    pub session: MediaCaptureSession,
    pub gateway: Arc<FakeGateway>,
    pub preview: Arc<FakePreview>,
    pub playback: Arc<FakePlayback>,
    pub sink: Arc<MemorySink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let gateway = FakeGateway::new();
        let preview = FakePreview::new();
        let playback = FakePlayback::new();
        let sink = MemorySink::new();

        let backends = CaptureBackends {
            gateway: gateway.clone(),
            preview: preview.clone(),
            playback: playback.clone(),
            artifacts: sink.clone(),
        };

        Self {
            session: MediaCaptureSession::new(config, backends),
            gateway,
            preview,
            playback,
            sink,
        }
    }

    /// Acquire camera + microphone, record for `secs` ticks and stop
    pub async fn record_take(&self, secs: u64) -> anyhow::Result<Recording> {
        if self.session.state() != practice_capture::CaptureState::Live {
            self.session.acquire(MediaConstraints::audio_video()).await?;
        }
        self.session.start_recording()?;
        tokio::time::sleep(Duration::from_secs(secs) + Duration::from_millis(500)).await;
        let recording = self.session.stop_recording().await?;
        self.session.reset()?;
        Ok(recording)
    }
}

/// Everything currently buffered on an event receiver
pub fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
