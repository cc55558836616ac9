//! Test signal generation
//!
//! Everything here is interleaved f32; fixtures are written with hound so
//! the bytes come from an encoder other than ours.

use std::f32::consts::PI;
use std::io::Cursor;

/// Generate a sine wave at amplitude 0.5
///
/// # Arguments
/// * `frequency` - Frequency in Hz
/// * `sample_rate` - Sample rate in Hz
/// * `duration` - Duration in seconds
/// * `channels` - Every channel carries the same signal
pub fn sine_wave(frequency: f32, sample_rate: u32, duration: f32, channels: u16) -> Vec<f32> {
    let num_frames = (sample_rate as f32 * duration) as usize;
    let mut samples = Vec::with_capacity(num_frames * channels as usize);

    for i in 0..num_frames {
        let t = i as f32 / sample_rate as f32;
        let sample = (2.0 * PI * frequency * t).sin() * 0.5;
        for _ in 0..channels {
            samples.push(sample);
        }
    }

    samples
}

/// Generate silence
pub fn silence(frames: usize, channels: u16) -> Vec<f32> {
    vec![0.0; frames * channels as usize]
}

/// Encode interleaved samples as a WAV file in memory
///
/// `bits` of 16 or 24 write integer PCM, 32 writes IEEE float.
pub fn wav_bytes(samples: &[f32], sample_rate: u32, channels: u16, bits: u16) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: bits,
        sample_format: if bits == 32 {
            hound::SampleFormat::Float
        } else {
            hound::SampleFormat::Int
        },
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        let scale = (1i64 << (bits - 1)) as f32;
        let max = (1i64 << (bits - 1)) - 1;
        for &sample in samples {
            if bits == 32 {
                writer.write_sample(sample).expect("write sample");
            } else {
                let value = (sample.clamp(-1.0, 1.0) * scale) as i64;
                writer
                    .write_sample(value.min(max) as i32)
                    .expect("write sample");
            }
        }
        writer.finalize().expect("finalize wav");
    }
    cursor.into_inner()
}

/// Peak absolute value of a signal
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}
