//! Domain types for Resound

mod audio;
mod format;
mod ids;
mod job;

pub use audio::AudioStreamDescriptor;
pub use format::{EncodingOptions, FormatTag};
pub use ids::JobId;
pub use job::{ArtifactInfo, ConversionJob, JobState};
