//! Common test utilities and fixtures
#![allow(dead_code)]

use bytes::Bytes;
use resound_audio::test_utils::{sine_wave, wav_bytes};
use resound_core::{ConversionJob, JobId};
use resound_server::{ServerConfig, TranscodingService};
use std::time::Duration;

/// Configuration with small, fast settings for tests
pub fn test_config(workers: usize, max_queue_depth: usize) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.transcoding.workers = workers;
    config.transcoding.max_queue_depth = max_queue_depth;
    config.transcoding.chunk_frames = 2048;
    config.transcoding.chunk_timeout_ms = 30_000;
    config.transcoding.probe_timeout_ms = 10_000;
    config.retention.artifact_ttl_secs = 60;
    config.retention.job_retention_secs = 600;
    config
}

/// 16-bit WAV with a 440 Hz tone
pub fn wav_source(sample_rate: u32, seconds: f32, channels: u16) -> Bytes {
    let samples = sine_wave(440.0, sample_rate, seconds, channels);
    Bytes::from(wav_bytes(&samples, sample_rate, channels, 16))
}

/// Poll until the job reaches a terminal state
pub async fn wait_for_terminal(service: &TranscodingService, id: &JobId) -> ConversionJob {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let job = service.status(id).expect("job should exist");
            if job.state.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}

/// Test data
pub mod fixtures {
    /// An ID3v2 tag header cut off before its size field
    pub const TRUNCATED_MP3: &[u8] = b"ID3\x04\x00";
}
