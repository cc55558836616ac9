/// Streaming decoder over in-memory source bytes, using Symphonia
use crate::error::{AudioError, Result};
use crate::registry::FormatDescriptor;
use bytes::Bytes;
use resound_core::AudioStreamDescriptor;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Lossy codecs may legitimately decode slightly fewer frames than the
/// container declares (priming and padding); this covers the largest
/// Vorbis block.
const LOSSY_LENGTH_TOLERANCE: u64 = 8192;

/// A run of decoded PCM frames
///
/// Samples are interleaved f32 in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct PcmChunk {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl PcmChunk {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Probe source bytes without decoding any audio.
///
/// Fails with `InvalidInput` when the bytes do not carry a well-formed
/// stream header for the declared format.
pub fn probe(source: Bytes, format: &FormatDescriptor) -> Result<AudioStreamDescriptor> {
    StreamDecoder::open(source, format).map(|decoder| decoder.descriptor())
}

/// Packet-by-packet decoder
///
/// Keeps the source channel layout; remixing is a separate stage.
pub struct StreamDecoder {
    /// Format reader (container parser)
    format: Box<dyn FormatReader>,
    /// Audio decoder
    decoder: Box<dyn Decoder>,
    /// Track ID
    track_id: u32,
    descriptor: AudioStreamDescriptor,
    /// Packet payload bytes handed to the decoder so far
    bytes_consumed: u64,
    total_bytes: u64,
    /// Frame count declared by the stream header, if any
    expected_frames: Option<u64>,
    frames_decoded: u64,
    length_tolerance: u64,
    finished: bool,
}

impl StreamDecoder {
    /// Open source bytes declared as `format`
    pub fn open(source: Bytes, format: &FormatDescriptor) -> Result<Self> {
        if !format.signature_matches(&source) {
            return Err(AudioError::InvalidInput(format!(
                "source does not start with a valid {} header",
                format.tag
            )));
        }

        let total_bytes = source.len() as u64;

        // Create media source
        let mss = MediaSourceStream::new(Box::new(Cursor::new(source)), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        hint.with_extension(format.tag.extension());
        hint.mime_type(format.mime_type);

        // Probe the media source
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                AudioError::InvalidInput(format!("malformed {} stream: {}", format.tag, e))
            })?;

        let reader = probed.format;

        // Find the default track
        let track = reader
            .default_track()
            .ok_or_else(|| AudioError::InvalidInput("no audio track found".to_string()))?;

        let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
            AudioError::InvalidInput("stream header does not declare a sample rate".to_string())
        })?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2);
        let bit_depth = track.codec_params.bits_per_sample.map(|b| b as u16);
        let track_id = track.id;
        let expected_frames = track.codec_params.n_frames;

        let mut descriptor = AudioStreamDescriptor::new(sample_rate, channels, bit_depth);
        if let Some(n_frames) = track.codec_params.n_frames {
            descriptor = descriptor.with_frames(n_frames);
        }

        // Create decoder
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::UnsupportedFormat(format!("no decoder for stream: {}", e)))?;

        Ok(Self {
            format: reader,
            decoder,
            track_id,
            descriptor,
            bytes_consumed: 0,
            total_bytes,
            expected_frames,
            frames_decoded: 0,
            length_tolerance: if format.lossless {
                0
            } else {
                LOSSY_LENGTH_TOLERANCE
            },
            finished: false,
        })
    }

    /// Frames decoded so far
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Fail if the stream ended short of the frame count its header declared.
    ///
    /// Readers resync past frames that fail their checksum and treat an
    /// early end of data as a normal end of stream; both show up here.
    fn check_complete(&self) -> Result<()> {
        match self.expected_frames {
            Some(expected) if self.frames_decoded + self.length_tolerance < expected => {
                Err(AudioError::DecodeError(format!(
                    "stream ended after {} of {} declared frames (truncated or corrupt source)",
                    self.frames_decoded, expected
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn descriptor(&self) -> AudioStreamDescriptor {
        self.descriptor
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fraction of source bytes consumed, in [0, 1]
    pub fn progress(&self) -> f32 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_consumed as f64 / self.total_bytes as f64).min(1.0) as f32
    }

    /// Decode packets until at least `max_frames` frames are buffered or the
    /// stream ends. Returns `None` once the stream is exhausted.
    ///
    /// A chunk may overshoot `max_frames` by up to one packet; no decoded
    /// frame is ever dropped.
    pub fn next_chunk(&mut self, max_frames: usize) -> Result<Option<PcmChunk>> {
        if self.finished {
            return Ok(None);
        }

        let mut samples = Vec::new();
        let mut chunk_channels: Option<u16> = None;

        loop {
            // Get the next packet
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.finished = true;
                    self.check_complete()?;
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    return Err(AudioError::DecodeError(format!(
                        "error reading packet: {}",
                        e
                    )));
                }
            };

            // Skip packets that are not for our track
            if packet.track_id() != self.track_id {
                continue;
            }

            self.bytes_consumed += packet.data.len() as u64;

            let decoded = self.decoder.decode(&packet).map_err(|e| {
                AudioError::DecodeError(format!(
                    "corrupt frame near byte {}: {}",
                    self.bytes_consumed, e
                ))
            })?;

            let spec = *decoded.spec();
            if spec.rate != self.descriptor.sample_rate {
                return Err(AudioError::DecodeError(format!(
                    "sample rate changed mid-stream from {} to {} Hz",
                    self.descriptor.sample_rate, spec.rate
                )));
            }

            let channels = spec.channels.count() as u16;
            match chunk_channels {
                Some(existing) if existing != channels => {
                    return Err(AudioError::DecodeError(format!(
                        "channel count changed mid-stream from {} to {}",
                        existing, channels
                    )));
                }
                _ => chunk_channels = Some(channels),
            }

            if decoded.frames() == 0 {
                continue;
            }

            self.frames_decoded += decoded.frames() as u64;

            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buffer.samples());

            if samples.len() / channels.max(1) as usize >= max_frames {
                break;
            }
        }

        if samples.is_empty() {
            self.finished = true;
            return Ok(None);
        }

        let channels = chunk_channels.unwrap_or(self.descriptor.channels);
        // Headers may under-report; the decoded layout is authoritative
        self.descriptor.channels = channels;

        Ok(Some(PcmChunk {
            samples,
            channels,
            sample_rate: self.descriptor.sample_rate,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FormatRegistry;
    use resound_core::FormatTag;

    #[test]
    fn truncated_mp3_header_is_invalid_input() {
        let registry = FormatRegistry::new();
        let result = probe(
            Bytes::from_static(b"ID3\x04\x00"),
            registry.get(FormatTag::Mp3),
        );
        assert!(matches!(result, Err(AudioError::InvalidInput(_))));
    }

    #[test]
    fn wav_bytes_declared_as_flac_are_rejected() {
        let registry = FormatRegistry::new();
        let wav = crate::test_utils::wav_bytes(&[0.0; 200], 8_000, 1, 16);
        let result = probe(Bytes::from(wav), registry.get(FormatTag::Flac));
        assert!(matches!(result, Err(AudioError::InvalidInput(_))));
    }

    #[test]
    fn probe_reads_wav_header() {
        let registry = FormatRegistry::new();
        let samples = crate::test_utils::sine_wave(440.0, 8_000, 0.5, 2);
        let wav = crate::test_utils::wav_bytes(&samples, 8_000, 2, 16);

        let descriptor = probe(Bytes::from(wav), registry.get(FormatTag::Wav)).unwrap();
        assert_eq!(descriptor.sample_rate, 8_000);
        assert_eq!(descriptor.channels, 2);
        assert_eq!(descriptor.bit_depth, Some(16));
        assert_eq!(descriptor.duration_ms, Some(500));
    }

    #[test]
    fn decodes_every_frame_in_chunks() {
        let registry = FormatRegistry::new();
        let samples = crate::test_utils::sine_wave(440.0, 8_000, 1.0, 1);
        let wav = crate::test_utils::wav_bytes(&samples, 8_000, 1, 16);

        let mut decoder = StreamDecoder::open(Bytes::from(wav), registry.get(FormatTag::Wav)).unwrap();
        let mut frames = 0;
        while let Some(chunk) = decoder.next_chunk(1_000).unwrap() {
            assert_eq!(chunk.channels, 1);
            frames += chunk.frames();
            assert!(decoder.progress() <= 1.0);
        }
        assert_eq!(frames, 8_000);
        assert_eq!(decoder.frames_decoded(), 8_000);
        assert!(decoder.is_finished());
        assert!(decoder.progress() > 0.9);
    }

    #[test]
    fn truncated_wav_data_is_a_decode_error() {
        let registry = FormatRegistry::new();
        let samples = crate::test_utils::sine_wave(440.0, 8_000, 2.0, 1);
        let mut wav = crate::test_utils::wav_bytes(&samples, 8_000, 1, 16);
        wav.truncate(wav.len() / 2);

        // The header still declares 16000 frames
        let mut decoder = StreamDecoder::open(Bytes::from(wav), registry.get(FormatTag::Wav)).unwrap();
        let err = loop {
            match decoder.next_chunk(1_000) {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("truncated stream decoded without error"),
                Err(e) => break e,
            }
        };
        assert!(matches!(err, AudioError::DecodeError(_)), "{:?}", err);
        assert!(decoder.frames_decoded() < 16_000);
    }
}
