//! FLAC writer
//!
//! Fixed 4096-frame blocks, independent channels, and per channel the
//! cheapest of the FIXED predictors (orders 0-4, Rice coded residual) or
//! VERBATIM. No LPC search; compression is modest but every stream is a
//! valid, losslessly decodable FLAC file.

use super::bitwriter::BitWriter;
use super::{check_frames, quantize, EncodedTail, Encoder, PcmSpec};
use crate::error::{AudioError, Result};

const BLOCK_SIZE: usize = 4096;

/// "fLaC" + metadata block header + STREAMINFO
const HEADER_LEN: usize = 4 + 4 + 34;

const MAX_RICE_PARAMETER: u32 = 14;

pub struct FlacEncoder {
    spec: PcmSpec,
    /// Quantized interleaved samples waiting for a full block
    pending: Vec<i32>,
    frame_number: u64,
    total_frames: u64,
    min_frame_bytes: u32,
    max_frame_bytes: u32,
}

impl FlacEncoder {
    pub fn new(spec: PcmSpec) -> Result<Self> {
        if !matches!(spec.bit_depth, 16 | 24) {
            return Err(AudioError::InvalidInput(format!(
                "FLAC cannot be written at {} bits",
                spec.bit_depth
            )));
        }
        if spec.sample_rate == 0 || spec.sample_rate > 655_350 {
            return Err(AudioError::InvalidInput(format!(
                "FLAC cannot carry a {} Hz stream",
                spec.sample_rate
            )));
        }
        Ok(Self {
            spec,
            pending: Vec::with_capacity(BLOCK_SIZE * usize::from(spec.channels)),
            frame_number: 0,
            total_frames: 0,
            min_frame_bytes: 0,
            max_frame_bytes: 0,
        })
    }

    fn stream_header(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        for byte in b"fLaC" {
            w.write(u64::from(*byte), 8);
        }

        // Last metadata block, type 0 (STREAMINFO), 34 bytes
        w.write(1, 1);
        w.write(0, 7);
        w.write(34, 24);

        w.write(BLOCK_SIZE as u64, 16);
        w.write(BLOCK_SIZE as u64, 16);
        w.write(u64::from(self.min_frame_bytes), 24);
        w.write(u64::from(self.max_frame_bytes), 24);
        w.write(u64::from(self.spec.sample_rate), 20);
        w.write(u64::from(self.spec.channels - 1), 3);
        w.write(u64::from(self.spec.bit_depth - 1), 5);
        // 36-bit total sample count, split to stay within one write
        w.write(self.total_frames >> 32, 4);
        w.write(self.total_frames & 0xFFFF_FFFF, 32);
        // MD5 unknown
        for _ in 0..4 {
            w.write(0, 32);
        }

        let bytes = w.into_bytes();
        debug_assert_eq!(bytes.len(), HEADER_LEN);
        bytes
    }

    /// Encode `pending[..frames * channels]` as one frame
    fn encode_block(&mut self, frames: usize) -> Vec<u8> {
        let channels = usize::from(self.spec.channels);
        let bps = u32::from(self.spec.bit_depth);

        let mut w = BitWriter::new();
        self.write_frame_header(&mut w, frames);

        let mut channel = Vec::with_capacity(frames);
        for ch in 0..channels {
            channel.clear();
            channel.extend(
                self.pending[..frames * channels]
                    .iter()
                    .skip(ch)
                    .step_by(channels)
                    .copied(),
            );
            write_subframe(&mut w, &channel, bps);
        }

        w.align();
        let crc = crc16(w.bytes());
        w.write(u64::from(crc), 16);
        let frame = w.into_bytes();

        self.pending.drain(..frames * channels);
        self.frame_number += 1;
        self.total_frames += frames as u64;

        let len = frame.len() as u32;
        self.min_frame_bytes = if self.min_frame_bytes == 0 {
            len
        } else {
            self.min_frame_bytes.min(len)
        };
        self.max_frame_bytes = self.max_frame_bytes.max(len);

        frame
    }

    fn write_frame_header(&self, w: &mut BitWriter, frames: usize) {
        // Sync code, reserved bit, fixed block size strategy
        w.write(0x3FFE, 14);
        w.write(0, 1);
        w.write(0, 1);

        // Block size as 16-bit (n - 1) at the end of the header
        w.write(0b0111, 4);
        w.write(u64::from(sample_rate_code(self.spec.sample_rate)), 4);

        // Independent channels
        w.write(u64::from(self.spec.channels - 1), 4);
        w.write(if self.spec.bit_depth == 24 { 0b110 } else { 0b100 }, 3);
        w.write(0, 1);

        for byte in utf8_number(self.frame_number) {
            w.write(u64::from(byte), 8);
        }
        w.write((frames - 1) as u64, 16);

        let crc = crc8(w.bytes());
        w.write(u64::from(crc), 8);
    }
}

impl Encoder for FlacEncoder {
    fn header(&mut self) -> Result<Vec<u8>> {
        Ok(self.stream_header())
    }

    fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>> {
        check_frames(samples, self.spec.channels)?;

        let bits = self.spec.bit_depth;
        self.pending
            .extend(samples.iter().map(|&s| quantize(s, bits)));

        let block_samples = BLOCK_SIZE * usize::from(self.spec.channels);
        let mut out = Vec::new();
        while self.pending.len() >= block_samples {
            out.extend(self.encode_block(BLOCK_SIZE));
        }
        Ok(out)
    }

    fn finish(&mut self) -> Result<EncodedTail> {
        let frames = self.pending.len() / usize::from(self.spec.channels);
        let trailer = if frames > 0 {
            self.encode_block(frames)
        } else {
            Vec::new()
        };

        if self.total_frames >= 1 << 36 {
            return Err(AudioError::EncodeError(
                "FLAC stream exceeds 2^36 samples".to_string(),
            ));
        }

        Ok(EncodedTail {
            trailer,
            header: self.stream_header(),
        })
    }

    fn spec(&self) -> PcmSpec {
        self.spec
    }
}

/// Pick and write the cheapest subframe for one channel of a block
fn write_subframe(w: &mut BitWriter, samples: &[i32], bps: u32) {
    let verbatim_bits = samples.len() as u64 * u64::from(bps);

    let mut best: Option<(usize, u32, u64, Vec<u32>)> = None;
    for order in 0..=4usize {
        if samples.len() <= order {
            break;
        }
        let residual = fixed_residual(samples, order);
        let (parameter, rice_bits) = best_rice_parameter(&residual);
        let bits = order as u64 * u64::from(bps) + 4 + 4 + rice_bits;
        let better = match &best {
            Some((_, _, best_bits, _)) => bits < *best_bits,
            None => true,
        };
        if better {
            best = Some((order, parameter, bits, residual));
        }
    }

    match best {
        Some((order, parameter, bits, residual)) if bits < verbatim_bits => {
            // Zero pad bit, type 001xxx (FIXED, order xxx), no wasted bits
            w.write(0, 1);
            w.write(0b001000 | order as u64, 6);
            w.write(0, 1);
            for &warmup in &samples[..order] {
                w.write_signed(i64::from(warmup), bps);
            }
            // Rice coding method 0, partition order 0
            w.write(0, 2);
            w.write(0, 4);
            w.write(u64::from(parameter), 4);
            for &u in &residual {
                w.write_unary(u64::from(u >> parameter));
                w.write(u64::from(u), parameter);
            }
        }
        _ => {
            w.write(0, 1);
            w.write(0b000001, 6);
            w.write(0, 1);
            for &sample in samples {
                w.write_signed(i64::from(sample), bps);
            }
        }
    }
}

/// Zigzag-folded residual of the FIXED predictor of `order`
fn fixed_residual(samples: &[i32], order: usize) -> Vec<u32> {
    let s = |i: usize| i64::from(samples[i]);
    (order..samples.len())
        .map(|i| {
            let predicted = match order {
                0 => 0,
                1 => s(i - 1),
                2 => 2 * s(i - 1) - s(i - 2),
                3 => 3 * s(i - 1) - 3 * s(i - 2) + s(i - 3),
                _ => 4 * s(i - 1) - 6 * s(i - 2) + 4 * s(i - 3) - s(i - 4),
            };
            let e = s(i) - predicted;
            ((e << 1) ^ (e >> 63)) as u32
        })
        .collect()
}

/// Rice parameter minimising the coded size, and that size in bits
fn best_rice_parameter(residual: &[u32]) -> (u32, u64) {
    let n = residual.len() as u64;
    (0..=MAX_RICE_PARAMETER)
        .map(|k| {
            let quotients: u64 = residual.iter().map(|&u| u64::from(u >> k)).sum();
            (k, n * (u64::from(k) + 1) + quotients)
        })
        .min_by_key(|&(_, bits)| bits)
        .unwrap_or((0, 0))
}

fn sample_rate_code(hz: u32) -> u8 {
    match hz {
        88_200 => 0b0001,
        176_400 => 0b0010,
        192_000 => 0b0011,
        8_000 => 0b0100,
        16_000 => 0b0101,
        22_050 => 0b0110,
        24_000 => 0b0111,
        32_000 => 0b1000,
        44_100 => 0b1001,
        48_000 => 0b1010,
        96_000 => 0b1011,
        // Taken from STREAMINFO
        _ => 0b0000,
    }
}

/// FLAC's UTF-8-like variable length integer
fn utf8_number(value: u64) -> Vec<u8> {
    if value < 0x80 {
        return vec![value as u8];
    }

    let len = match value {
        v if v < 0x800 => 2,
        v if v < 0x1_0000 => 3,
        v if v < 0x20_0000 => 4,
        v if v < 0x400_0000 => 5,
        _ => 6,
    };

    let mut out = vec![0u8; len];
    let mut v = value;
    for byte in out.iter_mut().skip(1).rev() {
        *byte = 0x80 | (v & 0x3F) as u8;
        v >>= 6;
    }
    let lead_mask = !(0xFFu8 >> len);
    out[0] = lead_mask | v as u8;
    out
}

fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |mut crc, &byte| {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
        }
        crc
    })
}

fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |mut crc, &byte| {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
        }
        crc
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::StreamDecoder;
    use crate::registry::FormatRegistry;
    use bytes::Bytes;
    use resound_core::FormatTag;

    fn encode_all(spec: PcmSpec, samples: &[f32], chunk_frames: usize) -> Vec<u8> {
        let mut encoder = FlacEncoder::new(spec).unwrap();
        let mut out = encoder.header().unwrap();
        for chunk in samples.chunks(spec.channels as usize * chunk_frames) {
            out.extend(encoder.encode(chunk).unwrap());
        }
        let tail = encoder.finish().unwrap();
        out.extend(tail.trailer);
        out[..tail.header.len()].copy_from_slice(&tail.header);
        out
    }

    fn decode_all(bytes: Vec<u8>) -> (Vec<f32>, u16, u32) {
        let registry = FormatRegistry::new();
        let mut decoder =
            StreamDecoder::open(Bytes::from(bytes), registry.get(FormatTag::Flac)).unwrap();
        let rate = decoder.descriptor().sample_rate;
        let mut samples = Vec::new();
        let mut channels = 0;
        while let Some(chunk) = decoder.next_chunk(4096).unwrap() {
            channels = chunk.channels;
            samples.extend(chunk.samples);
        }
        (samples, channels, rate)
    }

    #[test]
    fn crc_reference_values() {
        // CRC-8/SMBUS and CRC-16/UMTS check values for "123456789"
        assert_eq!(crc8(b"123456789"), 0xF4);
        assert_eq!(crc16(b"123456789"), 0xFEE8);
    }

    #[test]
    fn utf8_frame_numbers() {
        assert_eq!(utf8_number(0x7F), vec![0x7F]);
        assert_eq!(utf8_number(0x80), vec![0xC2, 0x80]);
        assert_eq!(utf8_number(0x800), vec![0xE0, 0xA0, 0x80]);
    }

    #[test]
    fn fixed_predictor_shrinks_a_ramp() {
        let ramp: Vec<i32> = (0..64).collect();
        let order2 = fixed_residual(&ramp, 2);
        assert!(order2.iter().all(|&u| u == 0));
        assert_eq!(best_rice_parameter(&order2), (0, 62));
    }

    #[test]
    fn streaminfo_is_rewritten_on_finish() {
        let samples = crate::test_utils::sine_wave(440.0, 44_100, 0.2, 2);
        let bytes = encode_all(PcmSpec::new(44_100, 2, 16), &samples, 1000);

        assert_eq!(&bytes[..4], b"fLaC");
        assert_eq!(bytes[4], 0x80);
        // Total samples live in the low 36 bits of bytes 21..26
        let total = (u64::from(bytes[21] & 0x0F) << 32)
            | u64::from(u32::from_be_bytes([bytes[22], bytes[23], bytes[24], bytes[25]]));
        assert_eq!(total, 8820);
    }

    #[test]
    fn sixteen_bit_round_trip_is_lossless() {
        let samples = crate::test_utils::sine_wave(1000.0, 48_000, 0.3, 2);
        let bytes = encode_all(PcmSpec::new(48_000, 2, 16), &samples, 700);

        let (decoded, channels, rate) = decode_all(bytes);
        assert_eq!(channels, 2);
        assert_eq!(rate, 48_000);
        assert_eq!(decoded.len(), samples.len());
        for (original, decoded) in samples.iter().zip(&decoded) {
            assert_eq!(quantize(*original, 16), quantize(*decoded, 16));
        }
    }

    #[test]
    fn twenty_four_bit_mono_at_odd_rate() {
        let samples = crate::test_utils::sine_wave(300.0, 11_025, 0.5, 1);
        let bytes = encode_all(PcmSpec::new(11_025, 1, 24), &samples, 4096);

        let (decoded, channels, rate) = decode_all(bytes);
        assert_eq!(channels, 1);
        assert_eq!(rate, 11_025);
        assert_eq!(decoded.len(), samples.len());
        let err = samples
            .iter()
            .zip(&decoded)
            .fold(0.0f32, |acc, (a, b)| acc.max((a - b).abs()));
        assert!(err < 1e-6, "max error {}", err);
    }

    #[test]
    fn empty_stream_has_only_a_header() {
        let bytes = encode_all(PcmSpec::new(44_100, 1, 16), &[], 100);
        assert_eq!(bytes.len(), HEADER_LEN);
    }
}
