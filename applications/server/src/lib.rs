//! Resound Server Library
//!
//! Job-oriented audio transcoding service: clients submit source bytes with
//! a source and target format, poll the job, and fetch the artifact.
//!
//! This library exposes the core components for testing purposes.

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use services::{Artifact, ResultStore, TranscodingService};
pub use state::AppState;
