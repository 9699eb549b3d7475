//! Artifact export
//!
//! Everything a recording needs once it exists:
//! - transient object URLs for playback/download (`ObjectUrlRegistry`)
//! - the save-file affordance (`ArtifactSink`, `DirectorySink`)
//! - reading an exported WAV back for a summary (`WavInfo`)

mod sink;
mod urls;
mod wav;

pub use sink::{ArtifactSink, DirectorySink, ExportError, SavedArtifact};
pub use urls::ObjectUrlRegistry;
pub use wav::WavInfo;
