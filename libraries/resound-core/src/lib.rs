//! Resound Core
//!
//! Shared domain types and error handling for the Resound transcoding service.
//!
//! This crate provides the foundational building blocks used by the audio
//! pipeline and the job service:
//! - **Identifiers**: `JobId`
//! - **Domain Types**: `FormatTag`, `EncodingOptions`, `AudioStreamDescriptor`,
//!   `ConversionJob`, `JobState`
//! - **Error Handling**: unified `ResoundError`, its `ErrorKind` taxonomy and
//!   the `Result` alias
//!
//! # Example
//!
//! ```rust
//! use resound_core::{ConversionJob, EncodingOptions, FormatTag, JobId, JobState};
//!
//! let mut job = ConversionJob::new(
//!     JobId::generate(),
//!     FormatTag::Mp3,
//!     FormatTag::Wav,
//!     EncodingOptions::default(),
//! );
//! assert_eq!(job.state, JobState::Queued);
//!
//! job.transition(JobState::Running).unwrap();
//! assert!(job.transition(JobState::Queued).is_err());
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod types;

pub use error::{ErrorKind, JobError, ResoundError, Result};
pub use types::{
    ArtifactInfo, AudioStreamDescriptor, ConversionJob, EncodingOptions, FormatTag, JobId,
    JobState,
};
