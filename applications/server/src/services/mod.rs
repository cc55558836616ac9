/// Service layer modules
pub mod result_store;
pub mod transcoding;

pub use result_store::{Artifact, ResultStore};
pub use transcoding::TranscodingService;
