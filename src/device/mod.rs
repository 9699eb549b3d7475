//! Device abstraction layer
//!
//! Provides the capabilities a capture session drives:
//! - `DeviceGateway`: stream requests and encoders
//! - `PreviewSink`: live preview surface
//! - `PlaybackSurface`: playback of finished recordings
//!
//! plus headless/synthetic implementations for running without hardware.

mod gateway;
mod preview;
mod synthetic;

pub use gateway::{
    DeviceError, DeviceGateway, EncoderEvent, FacingMode, MediaConstraints, MediaEncoder,
    StreamHandle, Track, TrackKind, VideoConstraints,
};
pub use preview::{
    HeadlessPlayback, HeadlessPreview, PlaybackSurface, PreviewOptions, PreviewSink, RenderFault,
};
pub use synthetic::{DeviceAvailability, SyntheticGateway, SyntheticSettings};
