//! Channel remixing
//!
//! Converts interleaved frames between channel layouts:
//! - same count: passthrough
//! - mono to N: mono copied to the first two channels, the rest silent
//! - N to mono: average of all channels
//! - surround to stereo: ITU-R BS.775-1 downmix
//! - other widenings keep existing channels and add silence; other
//!   narrowings keep the leading channels

/// ITU-R BS.775-1 coefficient for center and surround channels (-3dB)
const CENTER_MIX: f32 = 0.707;

/// Remix interleaved `samples` from `from` channels to `to` channels
pub fn remix(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut output = Vec::with_capacity(frames * to);

    for frame in samples.chunks_exact(from) {
        match (from, to) {
            (1, _) => {
                output.push(frame[0]);
                output.push(frame[0]);
                output.extend(std::iter::repeat(0.0).take(to - 2));
            }
            (_, 1) => {
                let sum: f32 = frame.iter().sum();
                output.push(sum / from as f32);
            }
            (_, 2) => {
                let (l, r) = downmix_to_stereo(frame);
                output.push(l);
                output.push(r);
            }
            _ if to > from => {
                output.extend_from_slice(frame);
                output.extend(std::iter::repeat(0.0).take(to - from));
            }
            _ => output.extend_from_slice(&frame[..to]),
        }
    }

    output
}

/// Downmix one frame of 3+ channels to stereo.
///
/// Layouts follow WAV/FLAC channel order:
/// - 3: L, R, C
/// - 4: L, R, SL, SR
/// - 5: L, R, C, SL, SR
/// - 6+: L, R, C, LFE, SL, SR (extra channels ignored)
fn downmix_to_stereo(frame: &[f32]) -> (f32, f32) {
    let (l, r) = (frame[0], frame[1]);
    let (l, r) = match frame.len() {
        3 => {
            let c = frame[2] * CENTER_MIX;
            (l + c, r + c)
        }
        4 => (l + frame[2] * CENTER_MIX, r + frame[3] * CENTER_MIX),
        5 => {
            let c = frame[2] * CENTER_MIX;
            (l + c + frame[3] * CENTER_MIX, r + c + frame[4] * CENTER_MIX)
        }
        _ => {
            let c = frame[2] * CENTER_MIX;
            let lfe = frame[3] * CENTER_MIX;
            (
                l + c + lfe + frame[4] * CENTER_MIX,
                r + c + lfe + frame[5] * CENTER_MIX,
            )
        }
    };
    (l.clamp(-1.0, 1.0), r.clamp(-1.0, 1.0))
}
