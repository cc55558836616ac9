/// Format tags and encoding parameters
use crate::error::ResoundError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Audio container/codec tag as chosen by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatTag {
    Mp3,
    Wav,
    Ogg,
    Aac,
    Flac,
    M4a,
    Wma,
}

impl FormatTag {
    /// Every tag the service recognises, in the order clients list them
    pub const ALL: [FormatTag; 7] = [
        FormatTag::Mp3,
        FormatTag::Wav,
        FormatTag::Ogg,
        FormatTag::Aac,
        FormatTag::Flac,
        FormatTag::M4a,
        FormatTag::Wma,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            FormatTag::Mp3 => "mp3",
            FormatTag::Wav => "wav",
            FormatTag::Ogg => "ogg",
            FormatTag::Aac => "aac",
            FormatTag::Flac => "flac",
            FormatTag::M4a => "m4a",
            FormatTag::Wma => "wma",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            FormatTag::Mp3 => "audio/mpeg",
            FormatTag::Wav => "audio/wav",
            FormatTag::Ogg => "audio/ogg",
            FormatTag::Aac => "audio/aac",
            FormatTag::Flac => "audio/flac",
            FormatTag::M4a => "audio/mp4",
            FormatTag::Wma => "audio/x-ms-wma",
        }
    }

    /// Swap the extension of a client file name for this format's.
    ///
    /// `"song.final.mp3"` becomes `"song.final.wav"`; a name without an
    /// extension keeps its whole stem.
    pub fn rename_file(&self, original: &str) -> String {
        let stem = match original.rfind('.') {
            Some(idx) if idx > 0 => &original[..idx],
            _ => original,
        };
        format!("{}.{}", stem, self.extension())
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FormatTag {
    type Err = ResoundError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches('.').to_ascii_lowercase();
        FormatTag::ALL
            .into_iter()
            .find(|tag| tag.extension() == normalized)
            .ok_or_else(|| ResoundError::unsupported(format!("unknown format tag '{}'", s)))
    }
}

/// Optional target parameters; anything left `None` follows the source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingOptions {
    #[serde(default)]
    pub sample_rate: Option<u32>,

    #[serde(default)]
    pub channels: Option<u16>,

    #[serde(default)]
    pub bit_depth: Option<u16>,

    /// Target bitrate in kbps, only meaningful for lossy targets
    #[serde(default)]
    pub bitrate_kbps: Option<u32>,
}

impl EncodingOptions {
    #[must_use]
    pub fn with_sample_rate(mut self, hz: u32) -> Self {
        self.sample_rate = Some(hz);
        self
    }

    #[must_use]
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = Some(channels);
        self
    }

    #[must_use]
    pub fn with_bit_depth(mut self, bits: u16) -> Self {
        self.bit_depth = Some(bits);
        self
    }

    #[must_use]
    pub fn with_bitrate_kbps(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = Some(kbps);
        self
    }
}
