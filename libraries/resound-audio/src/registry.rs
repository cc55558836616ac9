//! Format registry
//!
//! Static table of what the service can read and write. Built once at
//! startup and shared read-only between request handlers and workers.

use resound_core::{EncodingOptions, FormatTag, ResoundError};
use serde::Serialize;
use std::collections::HashMap;

/// Sample rates a client may request for lossless targets
const PCM_SAMPLE_RATES: &[u32] = &[
    8_000, 11_025, 16_000, 22_050, 24_000, 32_000, 44_100, 48_000, 88_200, 96_000, 176_400,
    192_000,
];

/// MPEG-1/2/2.5 layer III sample rates
const MPEG_SAMPLE_RATES: &[u32] = &[
    8_000, 11_025, 12_000, 16_000, 22_050, 24_000, 32_000, 44_100, 48_000,
];

/// Rates shared by the AAC family and Vorbis in practice
const LOSSY_SAMPLE_RATES: &[u32] = &[
    8_000, 11_025, 16_000, 22_050, 24_000, 32_000, 44_100, 48_000, 96_000,
];

/// Capability descriptor for one format tag
#[derive(Debug, Clone, Serialize)]
pub struct FormatDescriptor {
    pub tag: FormatTag,
    pub mime_type: &'static str,
    pub lossless: bool,
    /// Source bytes in this format can be decoded
    pub decode: bool,
    /// A license-free encoder for this format is available
    pub encode: bool,
    /// Sample rates a client may request explicitly
    pub sample_rates: &'static [u32],
    /// Channel layouts supported are 1..=max_channels
    pub max_channels: u16,
    /// Bit depths the encoder can write; empty for lossy formats
    pub bit_depths: &'static [u16],
    /// Accepted bitrate range in kbps, lossy formats only
    pub bitrate_kbps: Option<(u32, u32)>,
}

impl FormatDescriptor {
    pub fn supports_sample_rate(&self, hz: u32) -> bool {
        self.sample_rates.contains(&hz)
    }

    pub fn supports_channels(&self, channels: u16) -> bool {
        (1..=self.max_channels).contains(&channels)
    }

    pub fn supports_bit_depth(&self, bits: u16) -> bool {
        self.bit_depths.contains(&bits)
    }

    /// Check that `bytes` start the way a stream of this format must.
    ///
    /// Cheap sniffing only; the probe does the real header parse.
    pub fn signature_matches(&self, bytes: &[u8]) -> bool {
        match self.tag {
            FormatTag::Mp3 => {
                (bytes.len() >= 10 && bytes.starts_with(b"ID3"))
                    || (bytes.len() >= 4
                        && bytes[0] == 0xFF
                        && bytes[1] & 0xE0 == 0xE0
                        && bytes[1] & 0x06 != 0)
            }
            FormatTag::Wav => bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE",
            // "fLaC" + metadata block header + 34-byte STREAMINFO
            FormatTag::Flac => bytes.len() >= 42 && bytes.starts_with(b"fLaC"),
            FormatTag::Ogg => bytes.len() >= 27 && bytes.starts_with(b"OggS"),
            FormatTag::Aac => {
                (bytes.len() >= 7 && bytes[0] == 0xFF && bytes[1] & 0xF6 == 0xF0)
                    || (bytes.len() >= 4 && bytes.starts_with(b"ADIF"))
            }
            FormatTag::M4a => bytes.len() >= 12 && &bytes[4..8] == b"ftyp",
            FormatTag::Wma => {
                bytes.len() >= 16
                    && bytes.starts_with(&[0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11])
            }
        }
    }
}

/// Maps a format tag to its capability descriptor
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: HashMap<FormatTag, FormatDescriptor>,
}

impl FormatRegistry {
    /// Create the registry with every format the service knows about
    pub fn new() -> Self {
        let formats = FormatTag::ALL
            .into_iter()
            .map(|tag| (tag, Self::describe(tag)))
            .collect();
        Self { formats }
    }

    fn describe(tag: FormatTag) -> FormatDescriptor {
        let mime_type = tag.mime_type();
        match tag {
            FormatTag::Wav => FormatDescriptor {
                tag,
                mime_type,
                lossless: true,
                decode: true,
                encode: true,
                sample_rates: PCM_SAMPLE_RATES,
                max_channels: 8,
                bit_depths: &[16, 24, 32],
                bitrate_kbps: None,
            },
            FormatTag::Flac => FormatDescriptor {
                tag,
                mime_type,
                lossless: true,
                decode: true,
                encode: true,
                sample_rates: PCM_SAMPLE_RATES,
                max_channels: 8,
                bit_depths: &[16, 24],
                bitrate_kbps: None,
            },
            FormatTag::Mp3 => FormatDescriptor {
                tag,
                mime_type,
                lossless: false,
                decode: true,
                encode: false,
                sample_rates: MPEG_SAMPLE_RATES,
                max_channels: 2,
                bit_depths: &[],
                bitrate_kbps: Some((8, 320)),
            },
            FormatTag::Ogg => FormatDescriptor {
                tag,
                mime_type,
                lossless: false,
                decode: true,
                encode: false,
                sample_rates: LOSSY_SAMPLE_RATES,
                max_channels: 8,
                bit_depths: &[],
                bitrate_kbps: Some((45, 500)),
            },
            FormatTag::Aac | FormatTag::M4a => FormatDescriptor {
                tag,
                mime_type,
                lossless: false,
                decode: true,
                encode: false,
                sample_rates: LOSSY_SAMPLE_RATES,
                max_channels: 8,
                bit_depths: &[],
                bitrate_kbps: Some((16, 512)),
            },
            // Recognised so clients get a precise error, but no codec either way
            FormatTag::Wma => FormatDescriptor {
                tag,
                mime_type,
                lossless: false,
                decode: false,
                encode: false,
                sample_rates: LOSSY_SAMPLE_RATES,
                max_channels: 2,
                bit_depths: &[],
                bitrate_kbps: Some((32, 320)),
            },
        }
    }

    /// Resolve a client-supplied tag string
    pub fn resolve(&self, tag: &str) -> Result<&FormatDescriptor, ResoundError> {
        let tag: FormatTag = tag.parse()?;
        Ok(self.get(tag))
    }

    /// Look up a parsed tag; every `FormatTag` has an entry
    pub fn get(&self, tag: FormatTag) -> &FormatDescriptor {
        &self.formats[&tag]
    }

    /// Resolve a source format, requiring a decoder
    pub fn decodable(&self, tag: FormatTag) -> Result<&FormatDescriptor, ResoundError> {
        let descriptor = self.get(tag);
        if descriptor.decode {
            Ok(descriptor)
        } else {
            Err(ResoundError::unsupported(format!(
                "no decoder available for {}",
                tag
            )))
        }
    }

    /// Resolve a target format, requiring a license-free encoder
    pub fn encodable(&self, tag: FormatTag) -> Result<&FormatDescriptor, ResoundError> {
        let descriptor = self.get(tag);
        if descriptor.encode {
            Ok(descriptor)
        } else {
            Err(ResoundError::unsupported(format!(
                "no license-free encoder available for {}",
                tag
            )))
        }
    }

    /// Check explicit encoding options against a target descriptor
    pub fn validate_options(
        &self,
        target: &FormatDescriptor,
        options: &EncodingOptions,
    ) -> Result<(), ResoundError> {
        if let Some(hz) = options.sample_rate {
            if !target.supports_sample_rate(hz) {
                return Err(ResoundError::invalid_input(format!(
                    "sample rate {} Hz is not supported by {}",
                    hz, target.tag
                )));
            }
        }

        if let Some(channels) = options.channels {
            if !target.supports_channels(channels) {
                return Err(ResoundError::invalid_input(format!(
                    "{} channels not supported by {} (max {})",
                    channels, target.tag, target.max_channels
                )));
            }
        }

        if let Some(bits) = options.bit_depth {
            if !target.supports_bit_depth(bits) {
                return Err(ResoundError::invalid_input(format!(
                    "bit depth {} not supported by {}",
                    bits, target.tag
                )));
            }
        }

        if let Some(kbps) = options.bitrate_kbps {
            match target.bitrate_kbps {
                None => {
                    return Err(ResoundError::invalid_input(format!(
                        "bitrate does not apply to lossless format {}",
                        target.tag
                    )));
                }
                Some((min, max)) if !(min..=max).contains(&kbps) => {
                    return Err(ResoundError::invalid_input(format!(
                        "bitrate {} kbps outside {}..={} for {}",
                        kbps, min, max, target.tag
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// All descriptors, in the order clients list them
    pub fn formats(&self) -> Vec<&FormatDescriptor> {
        FormatTag::ALL.iter().map(|tag| self.get(*tag)).collect()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tag_resolves() {
        let registry = FormatRegistry::new();
        for tag in FormatTag::ALL {
            assert_eq!(registry.resolve(tag.extension()).unwrap().tag, tag);
        }
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let registry = FormatRegistry::new();
        let err = registry.resolve("opus").unwrap_err();
        assert!(matches!(err, ResoundError::UnsupportedFormat(_)));
    }

    #[test]
    fn only_license_free_targets_are_encodable() {
        let registry = FormatRegistry::new();
        assert!(registry.encodable(FormatTag::Wav).is_ok());
        assert!(registry.encodable(FormatTag::Flac).is_ok());
        assert!(registry.encodable(FormatTag::Mp3).is_err());
        assert!(registry.encodable(FormatTag::Aac).is_err());
        assert!(registry.decodable(FormatTag::Wma).is_err());
        assert!(registry.decodable(FormatTag::Mp3).is_ok());
    }

    #[test]
    fn options_are_checked_against_target() {
        let registry = FormatRegistry::new();
        let flac = registry.get(FormatTag::Flac);

        let ok = EncodingOptions::default()
            .with_sample_rate(48_000)
            .with_channels(2)
            .with_bit_depth(24);
        assert!(registry.validate_options(flac, &ok).is_ok());

        let bad_rate = EncodingOptions::default().with_sample_rate(12_345);
        assert!(registry.validate_options(flac, &bad_rate).is_err());

        let bad_bits = EncodingOptions::default().with_bit_depth(32);
        assert!(registry.validate_options(flac, &bad_bits).is_err());

        let bitrate = EncodingOptions::default().with_bitrate_kbps(192);
        assert!(registry.validate_options(flac, &bitrate).is_err());

        let mp3 = registry.get(FormatTag::Mp3);
        assert!(registry.validate_options(mp3, &bitrate).is_ok());
        let too_fast = EncodingOptions::default().with_bitrate_kbps(640);
        assert!(registry.validate_options(mp3, &too_fast).is_err());
    }

    #[test]
    fn signatures() {
        let registry = FormatRegistry::new();
        let mp3 = registry.get(FormatTag::Mp3);
        assert!(mp3.signature_matches(&[0xFF, 0xFB, 0x90, 0x64]));
        assert!(!mp3.signature_matches(b"ID3\x04"));
        // ADTS sync has layer bits 00 and must not pass as MP3
        assert!(!mp3.signature_matches(&[0xFF, 0xF1, 0x50, 0x80]));

        let wav = registry.get(FormatTag::Wav);
        assert!(wav.signature_matches(b"RIFF\x24\x00\x00\x00WAVEfmt "));
        assert!(!wav.signature_matches(b"RIFF\x24\x00\x00\x00AVI "));
    }
}
