//! Resound Audio
//!
//! The transcoding core: everything between source bytes and artifact bytes.
//!
//! This crate provides:
//! - The format registry (what can be decoded, what can be encoded)
//! - Probing and packet-by-packet decoding via Symphonia
//! - Channel remixing and length-exact resampling via rubato
//! - WAV and FLAC encoders
//! - [`TranscodePipeline`], which runs those stages one chunk at a time
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use resound_audio::{FormatRegistry, PipelineConfig, TranscodePipeline};
//! use resound_core::{EncodingOptions, FormatTag};
//!
//! # fn example(source: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let registry = FormatRegistry::new();
//! let pipeline = TranscodePipeline::new(
//!     Bytes::from(source),
//!     registry.decodable(FormatTag::Wav)?,
//!     registry.encodable(FormatTag::Flac)?,
//!     &EncodingOptions::default().with_sample_rate(48_000),
//!     PipelineConfig::default(),
//! )?;
//! let flac = pipeline.run()?;
//! # Ok(())
//! # }
//! ```

mod decoder;
pub mod encoder;
mod error;
mod pipeline;
mod registry;
mod remix;
pub mod resampling;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use decoder::{probe, PcmChunk, StreamDecoder};
pub use encoder::{create_encoder, EncodedTail, Encoder, PcmSpec};
pub use error::{AudioError, Result};
pub use pipeline::{resolve_target, PipelineConfig, PipelineStep, TranscodePipeline};
pub use registry::{FormatDescriptor, FormatRegistry};
pub use remix::remix;
pub use resampling::{Resampler, ResamplingQuality};
