//! RIFF/WAVE writer on top of hound
//!
//! hound writes the header and patches its length fields on finalize; the
//! staging sink underneath drains the sample data chunk by chunk and keeps
//! the header so the patched copy can be handed back from `finish`.

use super::staging::StagingSink;
use super::{check_frames, quantize, EncodedTail, Encoder, PcmSpec};
use crate::error::{AudioError, Result};
use hound::{SampleFormat, WavSpec, WavWriter};

fn encode_error(err: hound::Error) -> AudioError {
    AudioError::EncodeError(format!("WAV writer failed: {}", err))
}

pub struct WavEncoder {
    spec: PcmSpec,
    /// `None` once finalized
    writer: Option<WavWriter<StagingSink>>,
    sink: StagingSink,
    header: Vec<u8>,
    data_bytes: u64,
}

impl WavEncoder {
    pub fn new(spec: PcmSpec) -> Result<Self> {
        let sample_format = match spec.bit_depth {
            16 | 24 => SampleFormat::Int,
            32 => SampleFormat::Float,
            other => {
                return Err(AudioError::InvalidInput(format!(
                    "WAV cannot be written at {} bits",
                    other
                )))
            }
        };

        let sink = StagingSink::default();
        let writer = WavWriter::new(
            sink.clone(),
            WavSpec {
                channels: spec.channels,
                sample_rate: spec.sample_rate,
                bits_per_sample: spec.bit_depth,
                sample_format,
            },
        )
        .map_err(encode_error)?;
        let header = sink.take_header();

        Ok(Self {
            spec,
            writer: Some(writer),
            sink,
            header,
            data_bytes: 0,
        })
    }

    /// RIFF sizes are 32-bit; leave room for the header and a pad byte
    fn max_data_bytes(&self) -> u64 {
        u64::from(u32::MAX) - self.header.len() as u64 - 1
    }
}

impl Encoder for WavEncoder {
    fn header(&mut self) -> Result<Vec<u8>> {
        Ok(self.header.clone())
    }

    fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>> {
        check_frames(samples, self.spec.channels)?;

        let chunk_bytes = (samples.len() * self.spec.bytes_per_sample()) as u64;
        let total = self
            .data_bytes
            .checked_add(chunk_bytes)
            .filter(|total| *total <= self.max_data_bytes())
            .ok_or_else(|| AudioError::EncodeError("WAV output exceeds 4 GiB".to_string()))?;

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| AudioError::EncodeError("WAV stream already finished".to_string()))?;

        for &sample in samples {
            match self.spec.bit_depth {
                16 => writer.write_sample(quantize(sample, 16) as i16),
                24 => writer.write_sample(quantize(sample, 24)),
                _ => writer.write_sample(sample.clamp(-1.0, 1.0)),
            }
            .map_err(encode_error)?;
        }

        self.data_bytes = total;
        Ok(self.sink.take())
    }

    fn finish(&mut self) -> Result<EncodedTail> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(encode_error)?;
        }

        let mut trailer = self.sink.take();
        // RIFF chunks are word aligned
        if self.sink.len() % 2 == 1 {
            trailer.push(0);
        }

        Ok(EncodedTail {
            trailer,
            header: self.sink.header(),
        })
    }

    fn spec(&self) -> PcmSpec {
        self.spec
    }
}
