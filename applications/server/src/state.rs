/// Shared application state
use crate::config::ServerConfig;
use crate::services::TranscodingService;
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub transcoding: Arc<TranscodingService>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(transcoding: Arc<TranscodingService>, config: Arc<ServerConfig>) -> Self {
        Self {
            transcoding,
            config,
        }
    }
}
