/// Background job processing
pub mod manager;
pub mod transcoder;

pub use manager::{JobHandle, JobManager, JobWork};
pub use transcoder::{run_bounded, WorkerPool, WorkerSettings};
