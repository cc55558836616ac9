//! Chunked transcode pipeline
//!
//! decode -> remix -> resample -> encode, one bounded chunk per `step()`.
//! Every stage is synchronous; callers decide where steps run and check
//! for cancellation between them.

use crate::decoder::StreamDecoder;
use crate::encoder::{create_encoder, EncodedTail, Encoder, PcmSpec};
use crate::error::Result;
use crate::registry::FormatDescriptor;
use crate::remix::remix;
use crate::resampling::{Resampler, ResamplingQuality};
use bytes::Bytes;
use resound_core::{AudioStreamDescriptor, EncodingOptions};
use tracing::debug;

/// Tuning shared by every pipeline a process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Decoded frames per step (a step may overshoot by one packet)
    pub chunk_frames: usize,
    pub quality: ResamplingQuality,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 8192,
            quality: ResamplingQuality::Balanced,
        }
    }
}

/// Result of one pipeline step
#[derive(Debug)]
pub enum PipelineStep {
    /// Bytes to append to the artifact, and source progress in [0, 0.99]
    Output { bytes: Vec<u8>, progress: f32 },
    /// Source exhausted; append the trailer and rewrite the header
    Finished(EncodedTail),
}

/// Work out the output PCM layout from the probed source and the options.
///
/// Explicit options win. Otherwise rate and channel count follow the source
/// (channels capped at what the target can hold) and the bit depth is the
/// source's when the target can write it, else the nearest the target offers.
pub fn resolve_target(
    source: &AudioStreamDescriptor,
    target: &FormatDescriptor,
    options: &EncodingOptions,
) -> PcmSpec {
    let sample_rate = options.sample_rate.unwrap_or(source.sample_rate);
    let channels = options
        .channels
        .unwrap_or_else(|| source.channels.clamp(1, target.max_channels));

    let bit_depth = options.bit_depth.unwrap_or_else(|| match source.bit_depth {
        Some(bits) if target.supports_bit_depth(bits) => bits,
        Some(bits) if bits > 16 => target
            .bit_depths
            .iter()
            .copied()
            .filter(|b| *b <= bits)
            .max()
            .unwrap_or(16),
        _ => 16,
    });

    PcmSpec::new(sample_rate, channels, bit_depth)
}

pub struct TranscodePipeline {
    decoder: StreamDecoder,
    resampler: Option<Resampler>,
    encoder: Box<dyn Encoder>,
    target: PcmSpec,
    config: PipelineConfig,
    finished: bool,
}

impl TranscodePipeline {
    /// Open the source and set up every stage for the target layout
    pub fn new(
        source: Bytes,
        source_format: &FormatDescriptor,
        target_format: &FormatDescriptor,
        options: &EncodingOptions,
        config: PipelineConfig,
    ) -> Result<Self> {
        let decoder = StreamDecoder::open(source, source_format)?;
        let descriptor = decoder.descriptor();
        let target = resolve_target(&descriptor, target_format, options);

        let resampler = if descriptor.sample_rate == target.sample_rate {
            None
        } else {
            Some(Resampler::new(
                descriptor.sample_rate,
                target.sample_rate,
                usize::from(target.channels),
                config.quality,
            )?)
        };

        let encoder = create_encoder(target_format.tag, target)?;

        debug!(
            "Pipeline {}Hz/{}ch -> {} {}Hz/{}ch/{}bit",
            descriptor.sample_rate,
            descriptor.channels,
            target_format.tag,
            target.sample_rate,
            target.channels,
            target.bit_depth
        );

        Ok(Self {
            decoder,
            resampler,
            encoder,
            target,
            config,
            finished: false,
        })
    }

    pub fn source(&self) -> AudioStreamDescriptor {
        self.decoder.descriptor()
    }

    pub fn target(&self) -> PcmSpec {
        self.target
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Container header with placeholder lengths
    pub fn start(&mut self) -> Result<Vec<u8>> {
        self.encoder.header()
    }

    /// Run one chunk through every stage
    pub fn step(&mut self) -> Result<PipelineStep> {
        if self.finished {
            return Ok(PipelineStep::Finished(EncodedTail::default()));
        }

        let target_channels = usize::from(self.target.channels);

        if let Some(chunk) = self.decoder.next_chunk(self.config.chunk_frames)? {
            let remixed = remix(&chunk.samples, usize::from(chunk.channels), target_channels);
            let pcm = match self.resampler.as_mut() {
                Some(resampler) => resampler.process(&remixed)?,
                None => remixed,
            };
            let bytes = self.encoder.encode(&pcm)?;

            return Ok(PipelineStep::Output {
                bytes,
                progress: self.decoder.progress().min(0.99),
            });
        }

        let mut trailer = match self.resampler.as_mut() {
            Some(resampler) => {
                let tail = resampler.finish()?;
                self.encoder.encode(&tail)?
            }
            None => Vec::new(),
        };

        let mut tail = self.encoder.finish()?;
        trailer.append(&mut tail.trailer);
        tail.trailer = trailer;
        self.finished = true;

        Ok(PipelineStep::Finished(tail))
    }

    /// Drive the pipeline to the end and assemble the artifact in memory
    pub fn run(mut self) -> Result<Vec<u8>> {
        let mut out = self.start()?;
        loop {
            match self.step()? {
                PipelineStep::Output { bytes, .. } => out.extend(bytes),
                PipelineStep::Finished(tail) => {
                    out.extend(tail.trailer);
                    out[..tail.header.len()].copy_from_slice(&tail.header);
                    return Ok(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FormatRegistry;
    use crate::test_utils::{sine_wave, wav_bytes};
    use resound_core::FormatTag;
    use std::io::Cursor;

    fn config() -> PipelineConfig {
        PipelineConfig {
            chunk_frames: 1024,
            quality: ResamplingQuality::Fast,
        }
    }

    #[test]
    fn target_follows_source_unless_overridden() {
        let registry = FormatRegistry::new();
        let flac = registry.get(FormatTag::Flac);

        let lossy = AudioStreamDescriptor::new(44_100, 2, None);
        assert_eq!(
            resolve_target(&lossy, flac, &EncodingOptions::default()),
            PcmSpec::new(44_100, 2, 16)
        );

        let float = AudioStreamDescriptor::new(96_000, 1, Some(32));
        assert_eq!(
            resolve_target(&float, flac, &EncodingOptions::default()),
            PcmSpec::new(96_000, 1, 24)
        );

        let options = EncodingOptions::default()
            .with_sample_rate(48_000)
            .with_channels(1)
            .with_bit_depth(16);
        assert_eq!(
            resolve_target(&float, flac, &options),
            PcmSpec::new(48_000, 1, 16)
        );
    }

    #[test]
    fn wav_to_wav_with_remix_and_resample() {
        let registry = FormatRegistry::new();
        let samples = sine_wave(440.0, 44_100, 1.0, 1);
        let source = Bytes::from(wav_bytes(&samples, 44_100, 1, 16));

        let options = EncodingOptions::default()
            .with_sample_rate(48_000)
            .with_channels(2);
        let pipeline = TranscodePipeline::new(
            source,
            registry.get(FormatTag::Wav),
            registry.get(FormatTag::Wav),
            &options,
            config(),
        )
        .unwrap();

        let bytes = pipeline.run().unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 48_000);
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.duration(), 48_000);
    }

    #[test]
    fn wav_to_flac_and_back_keeps_duration() {
        let registry = FormatRegistry::new();
        let samples = sine_wave(440.0, 22_050, 0.5, 2);
        let source = Bytes::from(wav_bytes(&samples, 22_050, 2, 16));

        let flac = TranscodePipeline::new(
            source,
            registry.get(FormatTag::Wav),
            registry.get(FormatTag::Flac),
            &EncodingOptions::default(),
            config(),
        )
        .unwrap()
        .run()
        .unwrap();

        let wav = TranscodePipeline::new(
            Bytes::from(flac),
            registry.get(FormatTag::Flac),
            registry.get(FormatTag::Wav),
            &EncodingOptions::default(),
            config(),
        )
        .unwrap()
        .run()
        .unwrap();

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.duration() as usize, samples.len() / 2);
    }

    #[test]
    fn progress_is_monotonic_and_capped() {
        let registry = FormatRegistry::new();
        let samples = sine_wave(440.0, 8_000, 2.0, 1);
        let source = Bytes::from(wav_bytes(&samples, 8_000, 1, 16));

        let mut pipeline = TranscodePipeline::new(
            source,
            registry.get(FormatTag::Wav),
            registry.get(FormatTag::Flac),
            &EncodingOptions::default(),
            config(),
        )
        .unwrap();

        pipeline.start().unwrap();
        let mut last = 0.0;
        let mut steps = 0;
        loop {
            match pipeline.step().unwrap() {
                PipelineStep::Output { progress, .. } => {
                    assert!(progress >= last && progress <= 0.99);
                    last = progress;
                    steps += 1;
                }
                PipelineStep::Finished(tail) => {
                    assert_eq!(tail.header.len(), 42);
                    break;
                }
            }
        }
        assert!(steps >= 2);
        assert!(pipeline.is_finished());
    }
}
