/// Core error types for Resound
use crate::types::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using `ResoundError`
pub type Result<T> = std::result::Result<T, ResoundError>;

/// Stable classification of every failure the service can report.
///
/// The kind is what clients branch on; the message is for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Format tag unknown, or known but not decodable/encodable
    UnsupportedFormat,
    /// Malformed source bytes or out-of-range encoding options
    InvalidInput,
    /// Queue is full; retry after a backoff
    Backpressure,
    /// Unknown, expired or evicted job or artifact
    NotFound,
    /// Artifact requested before the job finished
    NotReady,
    /// A pipeline step exceeded its time budget
    Timeout,
    /// Corrupt or unsupported source stream content
    DecodeError,
    /// Target encoder rejected the audio
    EncodeError,
    /// Job was cancelled by the client
    Cancelled,
    /// Anything that is a bug rather than a property of the input
    Internal,
}

impl ErrorKind {
    /// Whether a client may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backpressure | Self::NotReady)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat => "unsupported_format",
            Self::InvalidInput => "invalid_input",
            Self::Backpressure => "backpressure",
            Self::NotFound => "not_found",
            Self::NotReady => "not_ready",
            Self::Timeout => "timeout",
            Self::DecodeError => "decode_error",
            Self::EncodeError => "encode_error",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type for Resound
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResoundError {
    /// Unknown format tag, or a format without the needed codec
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Admission control rejected the submission
    #[error("Queue is full ({depth} jobs waiting), retry later")]
    Backpressure { depth: usize },

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Artifact requested before completion
    #[error("Job {0} has not finished yet")]
    NotReady(JobId),

    /// Time budget exceeded
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Decoding errors
    #[error("Decode error: {0}")]
    Decode(String),

    /// Encoding errors
    #[error("Encode error: {0}")]
    Encode(String),

    /// Job cancelled
    #[error("Job {0} was cancelled")]
    Cancelled(JobId),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResoundError {
    /// Create an unsupported format error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create an encode error
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Backpressure { .. } => ErrorKind::Backpressure,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NotReady(_) => ErrorKind::NotReady,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Decode(_) => ErrorKind::DecodeError,
            Self::Encode(_) => ErrorKind::EncodeError,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Failure cause recorded on a job that ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&ResoundError> for JobError {
    fn from(err: &ResoundError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<ResoundError> for JobError {
    fn from(err: ResoundError) -> Self {
        Self::from(&err)
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(
            ResoundError::unsupported("wma").kind(),
            ErrorKind::UnsupportedFormat
        );
        assert_eq!(
            ResoundError::Backpressure { depth: 4 }.kind(),
            ErrorKind::Backpressure
        );
        assert_eq!(ResoundError::decode("bad frame").kind(), ErrorKind::DecodeError);
        assert_eq!(ResoundError::timeout("probe").kind(), ErrorKind::Timeout);
    }

    #[test]
    fn only_backpressure_and_not_ready_are_retryable() {
        assert!(ErrorKind::Backpressure.is_retryable());
        assert!(ErrorKind::NotReady.is_retryable());
        assert!(!ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::DecodeError.is_retryable());
    }

    #[test]
    fn job_error_keeps_human_readable_cause() {
        let err = ResoundError::encode("bit depth 12 not supported by wav");
        let job_error = JobError::from(&err);
        assert_eq!(job_error.kind, ErrorKind::EncodeError);
        assert!(job_error.message.contains("bit depth 12"));
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnsupportedFormat).unwrap();
        assert_eq!(json, "\"unsupported_format\"");
    }
}
