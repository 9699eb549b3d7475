// Software camera/microphone for headless runs
//
// Stands in for real hardware: grants streams according to the configured
// availability of each device, and encodes takes as 16-bit mono WAV (a sine
// tone while a microphone track is present, silence otherwise). Video tracks
// carry no pixels; they exist so preview and handle bookkeeping behave as
// they would with a camera.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::gateway::{
    DeviceError, DeviceGateway, EncoderEvent, MediaConstraints, MediaEncoder, StreamHandle, Track,
    TrackKind,
};

/// How a synthetic device answers access requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceAvailability {
    Available,
    Missing,
    Denied,
    Busy,
}

/// Synthetic device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSettings {
    /// Encoder slice length in milliseconds
    pub chunk_interval_ms: u64,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Test tone frequency in Hz
    pub tone_hz: f32,
    /// Simulated permission-prompt latency in milliseconds
    pub grant_delay_ms: u64,
    pub camera: DeviceAvailability,
    pub microphone: DeviceAvailability,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            chunk_interval_ms: 250,
            sample_rate: 16000,
            tone_hz: 440.0,
            grant_delay_ms: 0,
            camera: DeviceAvailability::Available,
            microphone: DeviceAvailability::Available,
        }
    }
}

/// Software device gateway
pub struct SyntheticGateway {
    settings: SyntheticSettings,
    issued: Mutex<Vec<Track>>,
}

impl SyntheticGateway {
    pub fn new(settings: SyntheticSettings) -> Self {
        info!(
            "Synthetic gateway initialized (camera={:?}, microphone={:?}, {}Hz)",
            settings.camera, settings.microphone, settings.sample_rate
        );

        Self {
            settings,
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Tracks granted so far that are still live
    pub fn live_track_count(&self) -> usize {
        self.issued.lock().iter().filter(|t| t.is_live()).count()
    }

    /// Simulate the device of `kind` being unplugged
    pub fn unplug(&self, kind: TrackKind) -> usize {
        let mut unplugged = 0;
        for track in self.issued.lock().iter() {
            if track.kind() == kind && track.is_live() {
                track.stop();
                unplugged += 1;
            }
        }
        warn!("Synthetic {} device unplugged ({} live tracks ended)", kind, unplugged);
        unplugged
    }

    fn check(&self, availability: DeviceAvailability, noun: &str) -> Result<(), DeviceError> {
        match availability {
            DeviceAvailability::Available => Ok(()),
            DeviceAvailability::Missing => Err(DeviceError::NotFound(format!("no {} connected", noun))),
            DeviceAvailability::Denied => {
                Err(DeviceError::Denied(format!("{} access was blocked", noun)))
            }
            DeviceAvailability::Busy => Err(DeviceError::InUse(format!(
                "{} is held by another application",
                noun
            ))),
        }
    }

    fn issue(&self, kind: TrackKind, label: &str) -> Track {
        let track = Track::new(kind, label);
        let mut issued = self.issued.lock();
        // Forget tracks that are long gone
        issued.retain(|t| t.is_live());
        issued.push(track.clone());
        track
    }
}

impl Default for SyntheticGateway {
    fn default() -> Self {
        Self::new(SyntheticSettings::default())
    }
}

#[async_trait::async_trait]
impl DeviceGateway for SyntheticGateway {
    async fn request_stream(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<StreamHandle, DeviceError> {
        if constraints.is_empty() {
            return Err(DeviceError::Other("no capabilities requested".to_string()));
        }

        if self.settings.grant_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.grant_delay_ms)).await;
        }

        if constraints.wants_video() {
            self.check(self.settings.camera, "camera")?;
        }
        if constraints.audio {
            self.check(self.settings.microphone, "microphone")?;
        }

        let mut tracks = Vec::new();
        if constraints.wants_video() {
            tracks.push(self.issue(TrackKind::Video, "Synthetic Camera"));
        }
        if constraints.audio {
            tracks.push(self.issue(TrackKind::Audio, "Synthetic Microphone"));
        }

        let stream = StreamHandle::new(tracks);
        info!(
            "Synthetic stream {} granted ({} video, {} audio)",
            stream.id(),
            stream.track_count(TrackKind::Video),
            stream.track_count(TrackKind::Audio)
        );

        Ok(stream)
    }

    fn open_encoder(&self, stream: &StreamHandle) -> Result<MediaEncoder, DeviceError> {
        if !stream.is_active() {
            return Err(DeviceError::Other("stream has no live tracks".to_string()));
        }

        let (event_tx, event_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = oneshot::channel();

        let encoder = ToneEncoder {
            stream: stream.clone(),
            sample_rate: self.settings.sample_rate,
            tone_hz: self.settings.tone_hz,
            slice: Duration::from_millis(self.settings.chunk_interval_ms.max(10)),
        };

        tokio::spawn(encoder.run(event_tx, stop_rx));

        Ok(MediaEncoder::new("audio/wav", event_rx, stop_tx))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

struct ToneEncoder {
    stream: StreamHandle,
    sample_rate: u32,
    tone_hz: f32,
    slice: Duration,
}

impl ToneEncoder {
    async fn run(self, events: mpsc::Sender<EncoderEvent>, mut stop_rx: oneshot::Receiver<()>) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        let mut writer = match hound::WavWriter::new(&mut cursor, spec) {
            Ok(w) => w,
            Err(e) => {
                let _ = events.send(EncoderEvent::Fault(format!("encoder init failed: {}", e))).await;
                return;
            }
        };

        let samples_per_slice =
            (self.sample_rate as u64 * self.slice.as_millis() as u64 / 1000) as usize;
        let has_audio = self.stream.has_audio();
        let mut sample_index: u64 = 0;
        let mut fault = None;

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + self.slice, self.slice);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    if let Some(ended) = self.stream.tracks().iter().find(|t| !t.is_live()) {
                        fault = Some(format!("{} track '{}' ended", ended.kind(), ended.label()));
                        break;
                    }

                    for _ in 0..samples_per_slice {
                        let sample = if has_audio {
                            let t = sample_index as f32 / self.sample_rate as f32;
                            ((2.0 * PI * self.tone_hz * t).sin() * i16::MAX as f32 * 0.3) as i16
                        } else {
                            0
                        };
                        if let Err(e) = writer.write_sample(sample) {
                            fault = Some(format!("encoder write failed: {}", e));
                            break;
                        }
                        sample_index += 1;
                    }
                    if fault.is_some() {
                        break;
                    }
                }
            }
        }

        if let Err(e) = writer.finalize() {
            warn!("Failed to finalize synthetic WAV: {}", e);
        }

        let bytes = cursor.into_inner();
        debug!(
            "Synthetic encoder flushing {} bytes ({} samples)",
            bytes.len(),
            sample_index
        );

        // Receiver may already be gone if the take was abandoned
        let _ = events.send(EncoderEvent::Chunk(bytes)).await;
        if let Some(reason) = fault {
            let _ = events.send(EncoderEvent::Fault(reason)).await;
        }
    }
}
