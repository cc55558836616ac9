/// Audio stream description
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Properties of a source stream, derived by probing before any work starts.
///
/// Never mutated after the probe; jobs carry a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStreamDescriptor {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo, etc.)
    pub channels: u16,

    /// Bits per sample; lossy codecs usually do not declare one
    pub bit_depth: Option<u16>,

    /// Duration estimate in milliseconds, when the container exposes a frame count
    pub duration_ms: Option<u64>,
}

impl AudioStreamDescriptor {
    pub fn new(sample_rate: u32, channels: u16, bit_depth: Option<u16>) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth,
            duration_ms: None,
        }
    }

    /// Attach a duration derived from a frame count
    #[must_use]
    pub fn with_frames(mut self, frames: u64) -> Self {
        if self.sample_rate > 0 {
            self.duration_ms = Some(frames * 1000 / u64::from(self.sample_rate));
        }
        self
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }

    /// Calculate the byte rate of the stream as uncompressed PCM
    pub fn pcm_byte_rate(&self) -> u64 {
        let bits = u64::from(self.bit_depth.unwrap_or(16));
        u64::from(self.sample_rate) * u64::from(self.channels) * bits / 8
    }
}
