//! Sample rate conversion
//!
//! Wraps a backend (currently rubato) and makes the output length exact:
//! the filter's output delay is trimmed from the front and the tail is
//! flushed and cut so that `frames_out == round(frames_in * ratio)`.
//!
//! ## Example
//!
//! ```rust
//! use resound_audio::resampling::{Resampler, ResamplingQuality};
//!
//! // 44.1kHz -> 48kHz stereo
//! let mut resampler = Resampler::new(44100, 48000, 2, ResamplingQuality::Fast).unwrap();
//!
//! let mut output = resampler.process(&vec![0.0; 2 * 4410]).unwrap();
//! output.extend(resampler.finish().unwrap());
//! assert_eq!(output.len(), 2 * 4800);
//! ```

mod rubato_backend;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use rubato_backend::RubatoResampler;

/// Resampling errors
#[derive(Error, Debug)]
pub enum ResamplingError {
    #[error("Invalid sample rate: {0} Hz (must be > 0 and < 1MHz)")]
    InvalidSampleRate(u32),

    #[error("Invalid channel count: {0} (must be 1-8)")]
    InvalidChannelCount(usize),

    #[error("Resampler initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

pub type Result<T> = std::result::Result<T, ResamplingError>;

/// Resampling quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingQuality {
    /// Linear polynomial interpolation, lowest CPU
    Fast,

    /// Sinc, 128 taps
    #[default]
    Balanced,

    /// Sinc, 256 taps
    High,

    /// Sinc, 512 taps
    Maximum,
}

/// Trait for resampler implementations
pub trait ResamplerImpl: Send {
    /// Process interleaved audio samples
    ///
    /// May buffer input internally and return fewer frames than the ratio
    /// implies; buffered frames come out of `flush`.
    fn process(&mut self, input: &[f32]) -> Result<Vec<f32>>;

    /// Process whatever input is still buffered
    fn flush(&mut self) -> Result<Vec<f32>>;

    /// Push one chunk of silence through to drain the filter delay line
    fn drain(&mut self) -> Result<Vec<f32>>;

    /// Output frames of delay introduced by the filter
    fn latency(&self) -> usize;

    fn input_rate(&self) -> u32;

    fn output_rate(&self) -> u32;

    fn channels(&self) -> usize;

    /// Reset internal state
    fn reset(&mut self);
}

/// Length-exact resampler
pub struct Resampler {
    backend: Box<dyn ResamplerImpl>,
    frames_in: u64,
    frames_out: u64,
    /// Output frames still to drop to compensate filter delay
    delay_remaining: usize,
}

impl Resampler {
    /// Create a new resampler
    ///
    /// # Arguments
    /// - `input_rate`: Input sample rate (Hz)
    /// - `output_rate`: Output sample rate (Hz)
    /// - `channels`: Number of channels (1-8)
    /// - `quality`: Quality preset
    pub fn new(
        input_rate: u32,
        output_rate: u32,
        channels: usize,
        quality: ResamplingQuality,
    ) -> Result<Self> {
        // Validate inputs
        if input_rate == 0 || input_rate > 1_000_000 {
            return Err(ResamplingError::InvalidSampleRate(input_rate));
        }
        if output_rate == 0 || output_rate > 1_000_000 {
            return Err(ResamplingError::InvalidSampleRate(output_rate));
        }
        if channels == 0 || channels > 8 {
            return Err(ResamplingError::InvalidChannelCount(channels));
        }

        let backend = RubatoResampler::new(input_rate, output_rate, channels, quality)?;
        let delay_remaining = backend.latency();

        Ok(Self {
            backend: Box::new(backend),
            frames_in: 0,
            frames_out: 0,
            delay_remaining,
        })
    }

    /// Process interleaved audio samples
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let channels = self.channels();
        if input.len() % channels != 0 {
            return Err(ResamplingError::ProcessingFailed(format!(
                "Input buffer size {} is not a multiple of channel count {}",
                input.len(),
                channels
            )));
        }
        self.frames_in += (input.len() / channels) as u64;

        let output = self.backend.process(input)?;
        Ok(self.emit(output, u64::MAX))
    }

    /// Flush buffered input and return the remaining output, so that the
    /// total emitted matches the rate ratio exactly.
    pub fn finish(&mut self) -> Result<Vec<f32>> {
        let expected = self.expected_frames();
        let mut tail = Vec::new();

        let flushed = self.backend.flush()?;
        tail.extend(self.emit(flushed, expected));

        // Filter delay still holds real signal; push silence until it is out
        let mut rounds = 0;
        while self.frames_out < expected && rounds < 16 {
            let drained = self.backend.drain()?;
            if drained.is_empty() {
                break;
            }
            tail.extend(self.emit(drained, expected));
            rounds += 1;
        }

        Ok(tail)
    }

    /// Output frames implied by the input seen so far
    pub fn expected_frames(&self) -> u64 {
        let ratio = f64::from(self.output_rate()) / f64::from(self.input_rate());
        (self.frames_in as f64 * ratio).round() as u64
    }

    /// Drop pending delay frames and cap at `limit` total output frames
    fn emit(&mut self, mut output: Vec<f32>, limit: u64) -> Vec<f32> {
        let channels = self.channels();

        if self.delay_remaining > 0 {
            let frames = output.len() / channels;
            let skip = self.delay_remaining.min(frames);
            output.drain(..skip * channels);
            self.delay_remaining -= skip;
        }

        let room = limit.saturating_sub(self.frames_out);
        let frames = (output.len() / channels) as u64;
        if frames > room {
            output.truncate(room as usize * channels);
        }

        self.frames_out += (output.len() / channels) as u64;
        output
    }

    /// Get input sample rate
    pub fn input_rate(&self) -> u32 {
        self.backend.input_rate()
    }

    /// Get output sample rate
    pub fn output_rate(&self) -> u32 {
        self.backend.output_rate()
    }

    /// Get channel count
    pub fn channels(&self) -> usize {
        self.backend.channels()
    }

    /// Reset internal state
    pub fn reset(&mut self) {
        self.backend.reset();
        self.frames_in = 0;
        self.frames_out = 0;
        self.delay_remaining = self.backend.latency();
    }
}
