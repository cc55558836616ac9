/// Server configuration
use crate::error::{Result, ServerError};
use resound_audio::{PipelineConfig, ResamplingQuality};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_server")]
    pub server: ServerSettings,

    #[serde(default = "default_transcoding")]
    pub transcoding: TranscodingSettings,

    #[serde(default = "default_retention")]
    pub retention: RetentionSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body (source upload)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodingSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Queued jobs beyond this are rejected with backpressure
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,

    /// Decoded frames per pipeline step
    #[serde(default = "default_chunk_frames")]
    pub chunk_frames: usize,

    /// Time budget for one pipeline step
    #[serde(default = "default_chunk_timeout_ms")]
    pub chunk_timeout_ms: u64,

    /// Time budget for probing a source at submission
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default)]
    pub resampling_quality: ResamplingQuality,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionSettings {
    /// How long a finished artifact stays fetchable
    #[serde(default = "default_artifact_ttl_secs")]
    pub artifact_ttl_secs: u64,

    /// How long a terminal job record stays visible to `status`
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Drop an artifact as soon as it has been fetched once
    #[serde(default)]
    pub evict_on_fetch: bool,
}

impl TranscodingSettings {
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            chunk_frames: self.chunk_frames,
            quality: self.resampling_quality,
        }
    }
}

impl RetentionSettings {
    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifact_ttl_secs)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl ServerConfig {
    /// Load configuration from `config.toml` (if present) and environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an explicit file and environment
    ///
    /// An explicit path must exist; the default `config.toml` is optional.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let config_path = PathBuf::from("config.toml");
                if config_path.exists() {
                    settings = settings.add_source(config::File::from(config_path));
                }
            }
        }

        // Override with environment variables, e.g. RESOUND_TRANSCODING__WORKERS=4
        settings = settings.add_source(
            config::Environment::with_prefix("RESOUND")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let t = &self.transcoding;
        let r = &self.retention;

        let zeros = [
            ("transcoding.workers", t.workers as u64),
            ("transcoding.max_queue_depth", t.max_queue_depth as u64),
            ("transcoding.chunk_frames", t.chunk_frames as u64),
            ("transcoding.chunk_timeout_ms", t.chunk_timeout_ms),
            ("transcoding.probe_timeout_ms", t.probe_timeout_ms),
            ("retention.artifact_ttl_secs", r.artifact_ttl_secs),
            ("retention.sweep_interval_secs", r.sweep_interval_secs),
            ("server.max_upload_bytes", self.server.max_upload_bytes as u64),
        ];
        if let Some((name, _)) = zeros.iter().find(|(_, value)| *value == 0) {
            return Err(ServerError::Config(format!("{} must be greater than 0", name)));
        }

        if r.job_retention_secs < r.artifact_ttl_secs {
            return Err(ServerError::Config(
                "retention.job_retention_secs must be at least retention.artifact_ttl_secs"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

// Default values
fn default_server() -> ServerSettings {
    ServerSettings {
        host: default_host(),
        port: default_port(),
        max_upload_bytes: default_max_upload_bytes(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_transcoding() -> TranscodingSettings {
    TranscodingSettings {
        workers: default_workers(),
        max_queue_depth: default_max_queue_depth(),
        chunk_frames: default_chunk_frames(),
        chunk_timeout_ms: default_chunk_timeout_ms(),
        probe_timeout_ms: default_probe_timeout_ms(),
        resampling_quality: ResamplingQuality::default(),
    }
}

fn default_workers() -> usize {
    2
}

fn default_max_queue_depth() -> usize {
    64
}

fn default_chunk_frames() -> usize {
    8192
}

fn default_chunk_timeout_ms() -> u64 {
    10_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_retention() -> RetentionSettings {
    RetentionSettings {
        artifact_ttl_secs: default_artifact_ttl_secs(),
        job_retention_secs: default_job_retention_secs(),
        sweep_interval_secs: default_sweep_interval_secs(),
        evict_on_fetch: false,
    }
}

fn default_artifact_ttl_secs() -> u64 {
    3600
}

fn default_job_retention_secs() -> u64 {
    2 * 3600
}

fn default_sweep_interval_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            transcoding: default_transcoding(),
            retention: default_retention(),
        }
    }
}
