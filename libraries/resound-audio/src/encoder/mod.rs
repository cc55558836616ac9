//! Encoders for the license-free target formats
//!
//! An encoder is fed interleaved f32 frames chunk by chunk and returns the
//! bytes to append for each chunk. Container fields that depend on the total
//! length (RIFF sizes, FLAC total samples) are written as placeholders in
//! `header()` and handed back, corrected, by `finish()`; the caller
//! overwrites the first `header.len()` bytes of the artifact with them.

mod bitwriter;
mod flac;
mod staging;
mod wav;

use crate::error::{AudioError, Result};
use resound_core::FormatTag;

pub use flac::FlacEncoder;
pub use wav::WavEncoder;

/// PCM layout an encoder is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl PcmSpec {
    pub fn new(sample_rate: u32, channels: u16, bit_depth: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bit_depth / 8)
    }
}

/// What an encoder emits once the last chunk has been encoded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedTail {
    /// Bytes to append after everything already emitted
    pub trailer: Vec<u8>,
    /// Replacement for the header returned by `Encoder::header`, same length
    pub header: Vec<u8>,
}

/// Chunked encoder for one output stream
pub trait Encoder: Send {
    /// Stream header with placeholder length fields
    fn header(&mut self) -> Result<Vec<u8>>;

    /// Encode interleaved samples; `samples.len()` must be a whole number of frames
    fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>>;

    /// Flush buffered frames and produce the corrected header
    fn finish(&mut self) -> Result<EncodedTail>;

    fn spec(&self) -> PcmSpec;
}

/// Create the encoder for a target format
pub fn create_encoder(tag: FormatTag, spec: PcmSpec) -> Result<Box<dyn Encoder>> {
    if spec.channels == 0 || spec.channels > 8 {
        return Err(AudioError::InvalidInput(format!(
            "cannot encode {} channels",
            spec.channels
        )));
    }

    match tag {
        FormatTag::Wav => Ok(Box::new(WavEncoder::new(spec)?)),
        FormatTag::Flac => Ok(Box::new(FlacEncoder::new(spec)?)),
        other => Err(AudioError::UnsupportedFormat(format!(
            "no license-free encoder for {}",
            other
        ))),
    }
}

/// Convert a float sample to a signed integer of `bits` width
pub(crate) fn quantize(sample: f32, bits: u16) -> i32 {
    let scale = (1i64 << (bits - 1)) as f64;
    let max = (1i64 << (bits - 1)) - 1;
    let min = -(1i64 << (bits - 1));
    let value = (f64::from(sample.clamp(-1.0, 1.0)) * scale).round() as i64;
    value.clamp(min, max) as i32
}

fn check_frames(samples: &[f32], channels: u16) -> Result<()> {
    if samples.len() % usize::from(channels) != 0 {
        return Err(AudioError::EncodeError(format!(
            "{} samples is not a whole number of {}-channel frames",
            samples.len(),
            channels
        )));
    }
    Ok(())
}
