/// Audio-specific errors
use crate::resampling::ResamplingError;
use resound_core::ResoundError;
use thiserror::Error;

/// Result type alias using `AudioError`
pub type Result<T> = std::result::Result<T, AudioError>;

/// Audio error types
#[derive(Error, Debug)]
pub enum AudioError {
    /// Format known to the registry but lacking the needed codec
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Source bytes do not look like the declared format, or bad options
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Decoding error
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Encoding error
    #[error("Encode error: {0}")]
    EncodeError(String),

    /// Resampling error
    #[error(transparent)]
    Resampling(#[from] ResamplingError),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<AudioError> for ResoundError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::UnsupportedFormat(msg) => ResoundError::UnsupportedFormat(msg),
            AudioError::InvalidInput(msg) => ResoundError::InvalidInput(msg),
            AudioError::DecodeError(msg) => ResoundError::Decode(msg),
            AudioError::EncodeError(msg) => ResoundError::Encode(msg),
            AudioError::Resampling(e) => ResoundError::Encode(format!("resampling failed: {}", e)),
            AudioError::Io(e) => ResoundError::Internal(e.to_string()),
        }
    }
}
