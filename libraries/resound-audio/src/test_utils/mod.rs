//! Test utilities for audio testing
//!
//! Signal generators and in-memory fixture builders shared by unit tests,
//! integration tests and downstream crates (behind the `test-utils` feature).

pub mod signals;

pub use signals::*;
