use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::error::{CaptureError, DeviceNoun, SessionError};
use super::recording::Recording;
use super::state::{CaptureState, Diagnostics, PlaybackEnd, SessionEvent};
use super::timer::{spawn_ticker, TimerHandle};
use crate::device::{
    DeviceError, DeviceGateway, EncoderEvent, HeadlessPlayback, HeadlessPreview, MediaConstraints,
    PlaybackSurface, PreviewSink, RenderFault, StreamHandle, TrackKind,
};
use crate::export::{ArtifactSink, DirectorySink, ObjectUrlRegistry, SavedArtifact};

/// Host capabilities a session drives
pub struct CaptureBackends {
    pub gateway: Arc<dyn DeviceGateway>,
    pub preview: Arc<dyn PreviewSink>,
    pub playback: Arc<dyn PlaybackSurface>,
    pub artifacts: Arc<dyn ArtifactSink>,
}

impl CaptureBackends {
    /// Headless preview/playback, downloads saved into `download_dir`
    pub fn headless(gateway: Arc<dyn DeviceGateway>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            gateway,
            preview: Arc::new(HeadlessPreview::new()),
            playback: Arc::new(HeadlessPlayback::new()),
            artifacts: Arc::new(DirectorySink::new(download_dir)),
        }
    }
}

/// One in-progress take
struct Take {
    generation: u64,
    mime_type: String,
    stop_tx: oneshot::Sender<()>,
    collector: JoinHandle<()>,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Take {
    /// Drop the take without producing a recording
    fn abandon(self) {
        drop(self.stop_tx);
        self.collector.abort();
    }
}

struct Playback {
    recording_id: Uuid,
    url: String,
    token: u64,
    paused: bool,
    watcher: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
    state: CaptureState,
    /// Bumped on every acquire/release; results from older attempts are discarded
    generation: u64,
    stream: Option<StreamHandle>,
    preview_attached: bool,
    elapsed_secs: u64,
    timer: Option<TimerHandle>,
    take: Option<Take>,
    recordings: Vec<Recording>,
    playback: Option<Playback>,
    playback_token: u64,
    last_error: Option<CaptureError>,
}

impl Inner {
    fn take_device(&mut self) -> Teardown {
        Teardown {
            stream: self.stream.take(),
            detach_preview: std::mem::take(&mut self.preview_attached),
            take: self.take.take(),
            timer: self.timer.take(),
        }
    }
}

/// Device resources pulled out of the session, released outside the lock
struct Teardown {
    stream: Option<StreamHandle>,
    detach_preview: bool,
    take: Option<Take>,
    timer: Option<TimerHandle>,
}

impl Teardown {
    fn run(self, preview: &dyn PreviewSink) {
        if let Some(timer) = self.timer {
            timer.cancel();
        }
        if let Some(take) = self.take {
            warn!("Abandoning take in progress");
            take.abandon();
        }
        if self.detach_preview {
            preview.detach();
        }
        if let Some(stream) = self.stream {
            info!(
                "Releasing stream {} ({} live tracks)",
                stream.id(),
                stream.live_track_count()
            );
            stream.stop_all();
        }
    }
}

enum BindError {
    Capture(CaptureError),
    Superseded,
}

struct Shared {
    config: SessionConfig,
    backends: CaptureBackends,
    urls: ObjectUrlRegistry,
    events: broadcast::Sender<SessionEvent>,
    /// Woken whenever the held device is given up; pending requests bail out
    released: Notify,
    inner: Mutex<Inner>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn transition(&self, inner: &mut Inner, to: CaptureState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        info!("Capture session: {} -> {}", from, to);
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn fail(&self, inner: &mut Inner, error: CaptureError) {
        warn!("Capture failed ({}): {}", error.kind.code(), error.message);
        inner.last_error = Some(error.clone());
        self.transition(inner, CaptureState::Failed);
        self.emit(SessionEvent::Error(error));
    }

    fn next_name(&self, inner: &Inner) -> String {
        format!("{} {}", self.config.name_prefix, inner.recordings.len() + 1)
    }

    /// Timer callback; returns false once the take it belongs to is over
    fn tick(&self, generation: u64) -> bool {
        let elapsed = {
            let mut inner = self.inner.lock();
            if inner.generation != generation
                || inner.state != CaptureState::Recording
                || inner.take.is_none()
            {
                return false;
            }
            inner.elapsed_secs += 1;
            inner.elapsed_secs
        };
        debug!("Recording timer: {}s", elapsed);
        self.emit(SessionEvent::Tick {
            elapsed_secs: elapsed,
        });
        true
    }

    /// The device went away mid-take: keep what was buffered, then fail.
    ///
    /// Returns false when the take is no longer active (a stop is already
    /// flushing it, or it was abandoned).
    fn salvage(&self, generation: u64, reason: &str) -> bool {
        let (take, teardown) = {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state != CaptureState::Recording {
                return false;
            }
            let Some(take) = inner.take.take() else {
                return false;
            };

            let payload = std::mem::take(&mut *take.buffer.lock());
            let recording = Recording::new(
                self.next_name(&inner),
                take.mime_type.clone(),
                inner.elapsed_secs,
                payload,
                true,
            );
            warn!(
                "Device lost during recording; kept {} ({}s, {} bytes)",
                recording.name,
                recording.duration_secs,
                recording.size_bytes()
            );
            self.emit(SessionEvent::RecordingSaved {
                id: recording.id,
                name: recording.name.clone(),
                duration_secs: recording.duration_secs,
                interrupted: true,
            });
            inner.recordings.push(recording);

            inner.generation += 1;
            let teardown = inner.take_device();
            self.fail(&mut inner, CaptureError::device_lost(reason));
            (take, teardown)
        };

        // Called from the collector itself, so the take is dropped rather than aborted
        drop(take);
        teardown.run(self.backends.preview.as_ref());
        true
    }

    fn end_playback(&self, mut playback: Playback, reason: PlaybackEnd) {
        if let Some(watcher) = playback.watcher.take() {
            watcher.abort();
        }
        if reason != PlaybackEnd::Finished {
            self.backends.playback.stop();
        }
        self.urls.revoke(&playback.url);
        debug!("Playback of {} ended ({:?})", playback.recording_id, reason);
        self.emit(SessionEvent::PlaybackStopped {
            id: playback.recording_id,
            reason,
        });
    }

    fn playback_finished(&self, token: u64) {
        let finished = {
            let mut inner = self.inner.lock();
            let current = inner.playback.as_ref().map(|p| p.token) == Some(token);
            if current {
                inner.playback.take()
            } else {
                None
            }
        };
        if let Some(mut playback) = finished {
            // Running inside the watcher; nothing to abort
            playback.watcher = None;
            self.end_playback(playback, PlaybackEnd::Finished);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(stream) = inner.stream.take() {
            stream.stop_all();
        }
        if inner.preview_attached {
            self.backends.preview.detach();
        }
        self.urls.revoke_all();
    }
}

/// Owns one camera/microphone acquisition and the takes recorded from it.
///
/// Cheap to clone; clones drive the same session. All hardware is released
/// when the last clone is dropped, but callers should `release()` or
/// `dispose()` explicitly on teardown.
#[derive(Clone)]
pub struct MediaCaptureSession {
    shared: Arc<Shared>,
}

impl MediaCaptureSession {
    pub fn new(config: SessionConfig, backends: CaptureBackends) -> Self {
        let (events, _) = broadcast::channel(256);

        info!(
            "Creating capture session ({:?}, gateway: {}, preview: {})",
            config.mode,
            backends.gateway.name(),
            backends.preview.name()
        );

        Self {
            shared: Arc::new(Shared {
                config,
                backends,
                urls: ObjectUrlRegistry::new(),
                events,
                released: Notify::new(),
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn state(&self) -> CaptureState {
        self.shared.inner.lock().state
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.shared.inner.lock().elapsed_secs
    }

    pub fn last_error(&self) -> Option<CaptureError> {
        self.shared.inner.lock().last_error.clone()
    }

    /// Snapshot of the held device handle
    pub fn stream(&self) -> Option<StreamHandle> {
        self.shared.inner.lock().stream.clone()
    }

    pub fn recordings(&self) -> Vec<Recording> {
        self.shared.inner.lock().recordings.clone()
    }

    pub fn recording(&self, id: Uuid) -> Option<Recording> {
        self.shared
            .inner
            .lock()
            .recordings
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Recording currently selected for playback, with its URL
    pub fn now_playing(&self) -> Option<(Uuid, String)> {
        self.shared
            .inner
            .lock()
            .playback
            .as_ref()
            .map(|p| (p.recording_id, p.url.clone()))
    }

    pub fn object_urls(&self) -> &ObjectUrlRegistry {
        &self.shared.urls
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let inner = self.shared.inner.lock();
        let stream = inner.stream.as_ref();
        Diagnostics {
            state: inner.state,
            gateway: self.shared.backends.gateway.name().to_string(),
            preview: self.shared.backends.preview.name().to_string(),
            attempt: inner.generation,
            stream_active: stream.map(|s| s.is_active()).unwrap_or(false),
            video_tracks: stream.map(|s| s.track_count(TrackKind::Video)).unwrap_or(0),
            audio_tracks: stream.map(|s| s.track_count(TrackKind::Audio)).unwrap_or(0),
            live_tracks: stream.map(|s| s.live_track_count()).unwrap_or(0),
            elapsed_secs: inner.elapsed_secs,
            recordings: inner.recordings.len(),
            playing: inner.playback.as_ref().map(|p| p.recording_id),
            live_object_urls: self.shared.urls.live_count(),
            last_error: inner.last_error.clone(),
        }
    }

    /// Acquire devices for `constraints` and bring the preview up
    ///
    /// Any handle already held is released before the new request is made.
    /// Completes once the preview can render (video) or the grant arrives
    /// (audio only), bounded by the configured timeout.
    pub async fn acquire(&self, constraints: MediaConstraints) -> Result<(), SessionError> {
        let noun = DeviceNoun::for_request(constraints.wants_video(), constraints.audio);

        let (generation, teardown) = {
            let mut inner = self.shared.inner.lock();
            if matches!(
                inner.state,
                CaptureState::Acquiring | CaptureState::Recording
            ) {
                return Err(SessionError::invalid("acquire", inner.state));
            }
            let teardown = inner.take_device();
            inner.generation += 1;
            inner.last_error = None;
            self.shared.transition(&mut inner, CaptureState::Acquiring);
            (inner.generation, teardown)
        };
        self.shared.released.notify_waiters();
        teardown.run(self.shared.backends.preview.as_ref());

        info!(
            "Acquiring {} via {} (attempt {})",
            describe(&constraints),
            self.shared.backends.gateway.name(),
            generation
        );

        let timeout = self.shared.config.acquire_timeout;
        let result =
            match tokio::time::timeout(timeout, self.open_and_bind(generation, &constraints, noun))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(BindError::Capture(CaptureError::timeout(
                    noun,
                    timeout.as_secs(),
                ))),
            };

        let (error, teardown) = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                info!("Acquisition attempt {} was superseded", generation);
                return Err(SessionError::Cancelled);
            }
            match result {
                Ok(()) => {
                    self.shared.transition(&mut inner, CaptureState::Live);
                    return Ok(());
                }
                Err(BindError::Superseded) => return Err(SessionError::Cancelled),
                Err(BindError::Capture(error)) => {
                    let teardown = inner.take_device();
                    self.shared.fail(&mut inner, error.clone());
                    (error, teardown)
                }
            }
        };
        teardown.run(self.shared.backends.preview.as_ref());

        Err(error.into())
    }

    async fn open_and_bind(
        &self,
        generation: u64,
        constraints: &MediaConstraints,
        noun: DeviceNoun,
    ) -> Result<(), BindError> {
        let stream = request_with_reaper(
            Arc::clone(&self.shared.backends.gateway),
            constraints.clone(),
        )
        .await
        .map_err(|e| BindError::Capture(CaptureError::classify(&e, noun)))?;

        let missing = if constraints.wants_video() && !stream.has_video() {
            Some(DeviceNoun::Camera)
        } else if constraints.audio && !stream.has_audio() {
            Some(DeviceNoun::Microphone)
        } else {
            None
        };
        if let Some(missing) = missing {
            stream.stop_all();
            return Err(BindError::Capture(CaptureError::missing_track(missing)));
        }

        let wants_preview = constraints.wants_video();
        {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                warn!(
                    "Stream {} granted after attempt {} was abandoned; stopping it",
                    stream.id(),
                    generation
                );
                stream.stop_all();
                return Err(BindError::Superseded);
            }
            inner.stream = Some(stream.clone());
            inner.preview_attached = wants_preview;
        }

        if wants_preview {
            let preview = self.shared.backends.preview.as_ref();
            let render = |fault: RenderFault| BindError::Capture(CaptureError::render(&fault));
            preview
                .attach(&stream, self.shared.config.preview)
                .await
                .map_err(render)?;
            preview.ready().await.map_err(render)?;
            preview.play().await.map_err(render)?;
            debug!("Preview live on {}", preview.name());
        }

        Ok(())
    }

    /// Stop every held track and detach the preview. Safe from any state.
    pub fn release(&self) {
        let teardown = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            let teardown = inner.take_device();
            inner.last_error = None;
            self.shared.transition(&mut inner, CaptureState::Idle);
            teardown
        };
        self.shared.released.notify_waiters();
        teardown.run(self.shared.backends.preview.as_ref());
    }

    /// Release devices, stop playback and revoke every outstanding URL
    pub fn dispose(&self) {
        self.release();
        let playback = self.shared.inner.lock().playback.take();
        if let Some(playback) = playback {
            self.shared.end_playback(playback, PlaybackEnd::Disposed);
        }
        let revoked = self.shared.urls.revoke_all();
        if revoked > 0 {
            debug!("Revoked {} object URLs on dispose", revoked);
        }
    }

    /// Merge a separately granted microphone track into the held handle
    ///
    /// A failure leaves the existing handle and state untouched. The request
    /// shares the acquisition timeout and is abandoned on release.
    pub async fn add_audio_track(&self) -> Result<(), SessionError> {
        let released = self.shared.released.notified();
        tokio::pin!(released);

        let generation = {
            let inner = self.shared.inner.lock();
            if !matches!(inner.state, CaptureState::Live | CaptureState::Stopped) {
                return Err(SessionError::invalid("add audio", inner.state));
            }
            match &inner.stream {
                Some(stream) if stream.has_audio() => return Ok(()),
                Some(_) => {}
                None => return Err(SessionError::invalid("add audio", inner.state)),
            }
            inner.generation
        };

        info!("Requesting microphone for stream");

        let timeout = self.shared.config.acquire_timeout;
        let request = tokio::time::timeout(
            timeout,
            request_with_reaper(
                Arc::clone(&self.shared.backends.gateway),
                MediaConstraints::audio_only(),
            ),
        );
        let result = tokio::select! {
            biased;
            _ = &mut released => {
                info!("Microphone request abandoned: session released");
                return Err(SessionError::Cancelled);
            }
            result = request => match result {
                Ok(granted) => {
                    granted.map_err(|e| CaptureError::classify(&e, DeviceNoun::Microphone))
                }
                Err(_) => Err(CaptureError::timeout(
                    DeviceNoun::Microphone,
                    timeout.as_secs(),
                )),
            },
        };

        let mut granted = match result {
            Ok(stream) => stream,
            Err(error) => {
                warn!("Microphone request failed: {}", error);
                {
                    let mut inner = self.shared.inner.lock();
                    if inner.generation == generation {
                        inner.last_error = Some(error.clone());
                    }
                }
                self.shared.emit(SessionEvent::Error(error.clone()));
                return Err(error.into());
            }
        };

        let audio = granted.take_tracks(TrackKind::Audio);
        granted.stop_all();
        if audio.is_empty() {
            return Err(CaptureError::missing_track(DeviceNoun::Microphone).into());
        }

        let mut inner = self.shared.inner.lock();
        let state = inner.state;
        let current = inner.generation == generation;
        let accepting = matches!(state, CaptureState::Live | CaptureState::Stopped);
        match inner.stream.as_mut() {
            Some(stream) if current && accepting => {
                for track in audio {
                    stream.add_track(track);
                }
            }
            _ => {
                for track in &audio {
                    track.stop();
                }
                return Err(if current {
                    SessionError::invalid("add audio", state)
                } else {
                    SessionError::Cancelled
                });
            }
        }
        inner.last_error = None;
        info!("Microphone track merged into held stream");
        self.shared.emit(SessionEvent::AudioTrackAdded);
        Ok(())
    }

    /// Stop and drop the microphone tracks of the held handle
    pub fn remove_audio_track(&self) -> Result<(), SessionError> {
        let mut inner = self.shared.inner.lock();
        let state = inner.state;
        if !matches!(state, CaptureState::Live | CaptureState::Stopped) {
            return Err(SessionError::invalid("remove audio", state));
        }
        let Some(stream) = inner.stream.as_mut() else {
            return Err(SessionError::invalid("remove audio", state));
        };
        if stream.stop_tracks(TrackKind::Audio) > 0 {
            info!("Microphone track removed");
            self.shared.emit(SessionEvent::AudioTrackRemoved);
        }
        Ok(())
    }

    /// Begin a take. Only valid while `Live`.
    pub fn start_recording(&self) -> Result<(), SessionError> {
        let mut inner = self.shared.inner.lock();
        if inner.state != CaptureState::Live {
            return Err(SessionError::invalid("start recording", inner.state));
        }
        let Some(stream) = inner.stream.clone() else {
            return Err(SessionError::invalid("start recording", inner.state));
        };

        let encoder = match self.shared.backends.gateway.open_encoder(&stream) {
            Ok(encoder) => encoder,
            Err(e) => {
                let noun = DeviceNoun::for_request(stream.has_video(), stream.has_audio());
                let error = CaptureError::classify(&e, noun);
                warn!("Failed to open encoder: {}", error);
                inner.last_error = Some(error.clone());
                self.shared.emit(SessionEvent::Error(error.clone()));
                return Err(error.into());
            }
        };

        let generation = inner.generation;
        let (mime_type, events, stop_tx) = encoder.into_parts();
        let buffer = Arc::new(Mutex::new(Vec::new()));

        let collector = tokio::spawn(collect_chunks(
            Arc::downgrade(&self.shared),
            generation,
            events,
            Arc::clone(&buffer),
        ));

        let weak = Arc::downgrade(&self.shared);
        let timer = spawn_ticker(self.shared.config.tick_interval, move || {
            weak.upgrade()
                .map(|shared| shared.tick(generation))
                .unwrap_or(false)
        });

        info!("Recording started ({})", mime_type);

        inner.elapsed_secs = 0;
        inner.timer = Some(timer);
        inner.take = Some(Take {
            generation,
            mime_type,
            stop_tx,
            collector,
            buffer,
        });
        inner.last_error = None;
        self.shared.transition(&mut inner, CaptureState::Recording);
        Ok(())
    }

    /// Finish the take and append it to the collection
    ///
    /// The recording is produced even when no data arrived.
    pub async fn stop_recording(&self) -> Result<Recording, SessionError> {
        let (take, elapsed) = {
            let mut inner = self.shared.inner.lock();
            if inner.state != CaptureState::Recording {
                return Err(SessionError::invalid("stop recording", inner.state));
            }
            // None here means another stop is already flushing
            let Some(take) = inner.take.take() else {
                return Err(SessionError::invalid("stop recording", inner.state));
            };
            if let Some(timer) = inner.timer.take() {
                timer.cancel();
            }
            (take, inner.elapsed_secs)
        };

        let Take {
            generation,
            mime_type,
            stop_tx,
            mut collector,
            buffer,
        } = take;

        let _ = stop_tx.send(());
        let flush_timeout = self.shared.config.flush_timeout;
        match tokio::time::timeout(flush_timeout, &mut collector).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Chunk collector ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Encoder did not flush within {:?}; keeping what was buffered",
                    flush_timeout
                );
                collector.abort();
            }
        }

        let payload = std::mem::take(&mut *buffer.lock());

        let recording = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation || inner.state != CaptureState::Recording {
                info!("Take discarded: session released while flushing");
                return Err(SessionError::Cancelled);
            }
            let recording = Recording::new(
                self.shared.next_name(&inner),
                mime_type,
                elapsed,
                payload,
                false,
            );
            inner.recordings.push(recording.clone());
            self.shared.transition(&mut inner, CaptureState::Stopped);
            recording
        };

        info!(
            "Saved {} ({}s, {} bytes)",
            recording.name,
            recording.duration_secs,
            recording.size_bytes()
        );

        self.shared.emit(SessionEvent::RecordingSaved {
            id: recording.id,
            name: recording.name.clone(),
            duration_secs: recording.duration_secs,
            interrupted: false,
        });
        // A take stopped before the first tick does not count as practice
        if recording.duration_secs > 0 {
            self.shared.emit(SessionEvent::SessionCompleted {
                mode: self.shared.config.mode,
                recording_id: recording.id,
                duration_secs: recording.duration_secs,
            });
        }

        Ok(recording)
    }

    /// Go back to `Live` after a take to record again
    pub fn reset(&self) -> Result<(), SessionError> {
        let mut inner = self.shared.inner.lock();
        if inner.state != CaptureState::Stopped {
            return Err(SessionError::invalid("reset", inner.state));
        }
        inner.elapsed_secs = 0;
        self.shared.transition(&mut inner, CaptureState::Live);
        Ok(())
    }

    /// Zero the timer. Not allowed mid-take.
    pub fn reset_timer(&self) -> Result<(), SessionError> {
        let mut inner = self.shared.inner.lock();
        if inner.state == CaptureState::Recording {
            return Err(SessionError::invalid("reset timer", inner.state));
        }
        inner.elapsed_secs = 0;
        Ok(())
    }

    /// Play a recording on the shared surface
    ///
    /// Whatever was playing stops first and its URL is revoked. Playing the
    /// paused recording again resumes it.
    pub async fn play(&self, id: Uuid) -> Result<(), SessionError> {
        let (recording, url, token) = {
            let mut inner = self.shared.inner.lock();
            let Some(recording) = inner.recordings.iter().find(|r| r.id == id).cloned() else {
                return Err(SessionError::UnknownRecording(id));
            };

            if let Some(current) = inner.playback.as_mut() {
                if current.recording_id == id {
                    if current.paused {
                        current.paused = false;
                        self.shared.backends.playback.resume();
                        debug!("Resumed {}", recording.name);
                    }
                    return Ok(());
                }
            }

            if let Some(previous) = inner.playback.take() {
                self.shared.end_playback(previous, PlaybackEnd::Replaced);
            }

            inner.playback_token += 1;
            let token = inner.playback_token;
            let url = self
                .shared
                .urls
                .create(Arc::clone(&recording.payload), &recording.mime_type);
            inner.playback = Some(Playback {
                recording_id: id,
                url: url.clone(),
                token,
                paused: false,
                watcher: None,
            });
            (recording, url, token)
        };

        let done = match self.shared.backends.playback.play(&url, &recording).await {
            Ok(done) => done,
            Err(fault) => {
                warn!("Playback of {} failed: {}", recording.name, fault);
                let failed = {
                    let mut inner = self.shared.inner.lock();
                    let current = inner.playback.as_ref().map(|p| p.token) == Some(token);
                    if current {
                        inner.playback.take()
                    } else {
                        None
                    }
                };
                if failed.is_some() {
                    self.shared.urls.revoke(&url);
                }
                return Err(SessionError::Playback(fault));
            }
        };

        let weak = Arc::downgrade(&self.shared);
        let watcher = tokio::spawn(async move {
            if done.await.is_ok() {
                if let Some(shared) = weak.upgrade() {
                    shared.playback_finished(token);
                }
            }
        });

        let current = {
            let mut inner = self.shared.inner.lock();
            match inner.playback.as_mut() {
                Some(p) if p.token == token => {
                    p.watcher = Some(watcher);
                    true
                }
                // Replaced, deleted or finished in the meantime
                _ => {
                    watcher.abort();
                    false
                }
            }
        };
        if current {
            info!("Playing {}", recording.name);
            self.shared.emit(SessionEvent::PlaybackStarted { id });
        }
        Ok(())
    }

    pub fn pause(&self) {
        let mut inner = self.shared.inner.lock();
        if let Some(playback) = inner.playback.as_mut() {
            if !playback.paused {
                playback.paused = true;
                self.shared.backends.playback.pause();
                debug!("Paused {}", playback.recording_id);
            }
        }
    }

    pub fn resume(&self) {
        let mut inner = self.shared.inner.lock();
        if let Some(playback) = inner.playback.as_mut() {
            if playback.paused {
                playback.paused = false;
                self.shared.backends.playback.resume();
                debug!("Resumed {}", playback.recording_id);
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared
            .inner
            .lock()
            .playback
            .as_ref()
            .map(|p| p.paused)
            .unwrap_or(false)
    }

    /// Hand the payload, untouched, to the artifact sink
    pub async fn download(&self, id: Uuid) -> Result<SavedArtifact, SessionError> {
        let recording = self
            .recording(id)
            .ok_or(SessionError::UnknownRecording(id))?;

        let url = self
            .shared
            .urls
            .create(Arc::clone(&recording.payload), &recording.mime_type);
        let result = self
            .shared
            .backends
            .artifacts
            .save(&recording.file_name(), &recording.mime_type, &recording.payload)
            .await;
        self.shared.urls.revoke(&url);

        let saved = result?;
        info!("Downloaded {} to {}", recording.name, saved.location);
        Ok(saved)
    }

    /// Remove a recording; stops its playback if it is selected
    pub fn delete(&self, id: Uuid) -> Result<Recording, SessionError> {
        let (removed, playback) = {
            let mut inner = self.shared.inner.lock();
            let Some(pos) = inner.recordings.iter().position(|r| r.id == id) else {
                return Err(SessionError::UnknownRecording(id));
            };
            let removed = inner.recordings.remove(pos);
            let playing = matches!(&inner.playback, Some(p) if p.recording_id == id);
            let playback = if playing { inner.playback.take() } else { None };
            (removed, playback)
        };

        if let Some(playback) = playback {
            self.shared.end_playback(playback, PlaybackEnd::Deleted);
        }

        info!("Deleted {}", removed.name);
        self.shared.emit(SessionEvent::RecordingDeleted { id });
        Ok(removed)
    }
}

/// Request a stream on a detached task so a grant that lands after the
/// caller gave up (timeout, release) is stopped instead of leaked.
async fn request_with_reaper(
    gateway: Arc<dyn DeviceGateway>,
    constraints: MediaConstraints,
) -> Result<StreamHandle, DeviceError> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let result = negotiate(gateway.as_ref(), &constraints).await;
        if let Err(Ok(stream)) = tx.send(result) {
            warn!(
                "Stream {} granted after the request was abandoned; stopping it",
                stream.id()
            );
            stream.stop_all();
        }
    });

    rx.await
        .unwrap_or_else(|_| Err(DeviceError::Other("device request task ended".to_string())))
}

/// One request, plus a single retry without camera preferences when the
/// gateway cannot satisfy them
async fn negotiate(
    gateway: &dyn DeviceGateway,
    constraints: &MediaConstraints,
) -> Result<StreamHandle, DeviceError> {
    match gateway.request_stream(constraints).await {
        Err(DeviceError::Overconstrained(reason)) if constraints.is_relaxable() => {
            warn!(
                "Constraints rejected ({}); retrying with relaxed constraints",
                reason
            );
            gateway.request_stream(&constraints.relaxed()).await
        }
        other => other,
    }
}

async fn collect_chunks(
    shared: Weak<Shared>,
    generation: u64,
    mut events: mpsc::Receiver<EncoderEvent>,
    buffer: Arc<Mutex<Vec<u8>>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            EncoderEvent::Chunk(bytes) => {
                buffer.lock().extend_from_slice(&bytes);
            }
            EncoderEvent::Fault(reason) => {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                if shared.salvage(generation, &reason) {
                    return;
                }
                debug!("Encoder fault after stop ({}); finishing flush", reason);
            }
        }
    }
}

fn describe(constraints: &MediaConstraints) -> &'static str {
    match (constraints.wants_video(), constraints.audio) {
        (true, true) => "camera + microphone",
        (true, false) => "camera",
        (false, true) => "microphone",
        (false, false) => "nothing",
    }
}
