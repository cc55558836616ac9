//! Rubato resampler backend
//!
//! Fixed-input-size resamplers from the rubato crate. Input is buffered
//! until a whole chunk is available; `flush` pads the last partial chunk.

use super::{ResamplerImpl, ResamplingError, ResamplingQuality, Result};
use rubato::{
    FastFixedIn, PolynomialDegree, Resampler as RubatoResamplerTrait, SincFixedIn,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::collections::VecDeque;

/// Enum to hold different rubato resampler types
enum RubatoResamplerType {
    Fast(FastFixedIn<f32>),
    Sinc(SincFixedIn<f32>),
}

/// Rubato-based resampler implementation
pub struct RubatoResampler {
    resampler: RubatoResamplerType,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Buffer for accumulating input samples when they don't fill a complete chunk
    input_buffer: VecDeque<f32>,
}

impl RubatoResampler {
    /// Create a new rubato resampler
    pub fn new(
        input_rate: u32,
        output_rate: u32,
        channels: usize,
        quality: ResamplingQuality,
    ) -> Result<Self> {
        let ratio = f64::from(output_rate) / f64::from(input_rate);

        let chunk_size = match quality {
            ResamplingQuality::Fast | ResamplingQuality::Balanced => 1024,
            ResamplingQuality::High => 2048,
            ResamplingQuality::Maximum => 4096,
        };

        let resampler = match quality {
            ResamplingQuality::Fast => RubatoResamplerType::Fast(
                FastFixedIn::new(ratio, 2.0, PolynomialDegree::Linear, chunk_size, channels)
                    .map_err(|e| {
                        ResamplingError::InitializationFailed(format!(
                            "FastFixedIn creation failed: {}",
                            e
                        ))
                    })?,
            ),
            _ => RubatoResamplerType::Sinc(
                SincFixedIn::<f32>::new(
                    ratio,
                    2.0,
                    Self::quality_to_params(quality),
                    chunk_size,
                    channels,
                )
                .map_err(|e| {
                    ResamplingError::InitializationFailed(format!(
                        "SincFixedIn creation failed: {}",
                        e
                    ))
                })?,
            ),
        };

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels,
            input_buffer: VecDeque::new(),
        })
    }

    /// Convert quality preset to rubato parameters
    fn quality_to_params(quality: ResamplingQuality) -> SincInterpolationParameters {
        match quality {
            ResamplingQuality::Fast | ResamplingQuality::Balanced => SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris,
            },
            ResamplingQuality::High => SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.99,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 512,
                window: WindowFunction::BlackmanHarris,
            },
            ResamplingQuality::Maximum => SincInterpolationParameters {
                sinc_len: 512,
                f_cutoff: 0.995,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 1024,
                window: WindowFunction::BlackmanHarris2,
            },
        }
    }

    fn input_frames_next(&self) -> usize {
        match &self.resampler {
            RubatoResamplerType::Fast(r) => r.input_frames_next(),
            RubatoResamplerType::Sinc(r) => r.input_frames_next(),
        }
    }

    /// Deinterleave samples from [L, R, L, R, ...] to [[L, L, ...], [R, R, ...]]
    fn deinterleave(&self, interleaved: &[f32], frames: usize) -> Vec<Vec<f32>> {
        let mut channels = vec![Vec::with_capacity(frames); self.channels];

        for frame in interleaved.chunks_exact(self.channels).take(frames) {
            for (ch, sample) in frame.iter().enumerate() {
                channels[ch].push(*sample);
            }
        }

        channels
    }

    /// Interleave samples from [[L, L, ...], [R, R, ...]] to [L, R, L, R, ...]
    fn interleave(&self, channels: &[Vec<f32>]) -> Vec<f32> {
        if channels.is_empty() {
            return Vec::new();
        }

        let frames = channels[0].len();
        let mut interleaved = Vec::with_capacity(frames * self.channels);

        for frame_idx in 0..frames {
            for channel in channels {
                interleaved.push(channel[frame_idx]);
            }
        }

        interleaved
    }

    fn process_partial(&mut self, input: Option<&[Vec<f32>]>) -> Result<Vec<f32>> {
        let output_channels = match &mut self.resampler {
            RubatoResamplerType::Fast(r) => r.process_partial(input, None),
            RubatoResamplerType::Sinc(r) => r.process_partial(input, None),
        }
        .map_err(|e| ResamplingError::ProcessingFailed(format!("partial chunk failed: {}", e)))?;

        Ok(self.interleave(&output_channels))
    }
}

impl ResamplerImpl for RubatoResampler {
    fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        // 1:1 passthrough - avoid resampling overhead when rates match
        if self.input_rate == self.output_rate {
            return Ok(input.to_vec());
        }

        self.input_buffer.extend(input.iter().copied());

        let mut output = Vec::new();

        // Only call process() with exactly the expected number of input frames
        loop {
            let needed_frames = self.input_frames_next();
            let needed_samples = needed_frames * self.channels;

            if self.input_buffer.len() < needed_samples {
                break;
            }

            let chunk: Vec<f32> = self.input_buffer.drain(..needed_samples).collect();
            let input_channels = self.deinterleave(&chunk, needed_frames);

            let output_channels = match &mut self.resampler {
                RubatoResamplerType::Fast(r) => r.process(&input_channels, None),
                RubatoResamplerType::Sinc(r) => r.process(&input_channels, None),
            }
            .map_err(|e| ResamplingError::ProcessingFailed(format!("resampling failed: {}", e)))?;

            output.extend(self.interleave(&output_channels));
        }

        Ok(output)
    }

    fn flush(&mut self) -> Result<Vec<f32>> {
        // 1:1 passthrough - just drain the buffer
        if self.input_rate == self.output_rate {
            return Ok(self.input_buffer.drain(..).collect());
        }

        let remaining: Vec<f32> = self.input_buffer.drain(..).collect();
        let frames = remaining.len() / self.channels;
        if frames == 0 {
            return Ok(Vec::new());
        }

        let input_channels = self.deinterleave(&remaining, frames);
        self.process_partial(Some(input_channels.as_slice()))
    }

    fn drain(&mut self) -> Result<Vec<f32>> {
        if self.input_rate == self.output_rate {
            return Ok(Vec::new());
        }
        self.process_partial(None)
    }

    fn latency(&self) -> usize {
        match &self.resampler {
            RubatoResamplerType::Fast(r) => r.output_delay(),
            RubatoResamplerType::Sinc(r) => r.output_delay(),
        }
    }

    fn input_rate(&self) -> u32 {
        self.input_rate
    }

    fn output_rate(&self) -> u32 {
        self.output_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn reset(&mut self) {
        self.input_buffer.clear();
        match &mut self.resampler {
            RubatoResamplerType::Fast(r) => r.reset(),
            RubatoResamplerType::Sinc(r) => r.reset(),
        }
    }
}
