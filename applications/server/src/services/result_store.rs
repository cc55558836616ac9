/// Result store - in-memory artifacts with TTL eviction
///
/// Workers stream encoded bytes into a per-job staging buffer; `commit`
/// turns the buffer into an immutable artifact. Staged bytes are never
/// visible through `get`.
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use resound_core::{ArtifactInfo, FormatTag, JobId, ResoundError, Result};
use std::time::{Duration, Instant};

/// A finished transcode output
///
/// Cloning shares the underlying buffer.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Bytes,
    pub format: FormatTag,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(bytes: Bytes, format: FormatTag) -> Self {
        Self {
            bytes,
            format,
            created_at: Utc::now(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            format: self.format,
            size: self.size(),
        }
    }
}

struct StoredArtifact {
    artifact: Artifact,
    stored_at: Instant,
}

pub struct ResultStore {
    artifacts: DashMap<JobId, StoredArtifact>,
    staging: DashMap<JobId, Vec<u8>>,
    ttl: Duration,
}

impl ResultStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            artifacts: DashMap::new(),
            staging: DashMap::new(),
            ttl,
        }
    }

    /// Store a complete artifact
    pub fn put(&self, job_id: JobId, artifact: Artifact) {
        self.artifacts.insert(
            job_id,
            StoredArtifact {
                artifact,
                stored_at: Instant::now(),
            },
        );
    }

    /// Fetch an artifact; the bytes are shared, not copied
    pub fn get(&self, job_id: &JobId) -> Result<Artifact> {
        self.artifacts
            .get(job_id)
            .map(|stored| stored.artifact.clone())
            .ok_or_else(|| ResoundError::not_found("artifact", job_id.as_str()))
    }

    /// Remove an artifact; returns whether one was present
    pub fn evict(&self, job_id: &JobId) -> bool {
        self.artifacts.remove(job_id).is_some()
    }

    /// Open an empty staging buffer for a job
    pub fn begin(&self, job_id: &JobId) {
        self.staging.insert(job_id.clone(), Vec::new());
    }

    /// Append encoded bytes to a job's staging buffer
    pub fn append(&self, job_id: &JobId, bytes: &[u8]) -> Result<()> {
        let mut buffer = self
            .staging
            .get_mut(job_id)
            .ok_or_else(|| ResoundError::not_found("staging buffer", job_id.as_str()))?;
        buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Turn the staged bytes into an artifact.
    ///
    /// `header` overwrites the start of the buffer; encoders only know
    /// container lengths once the stream is complete.
    pub fn commit(&self, job_id: &JobId, format: FormatTag, header: &[u8]) -> Result<ArtifactInfo> {
        let (_, mut buffer) = self
            .staging
            .remove(job_id)
            .ok_or_else(|| ResoundError::not_found("staging buffer", job_id.as_str()))?;

        if header.len() > buffer.len() {
            return Err(ResoundError::internal(format!(
                "header of {} bytes longer than staged output of {} bytes",
                header.len(),
                buffer.len()
            )));
        }
        buffer[..header.len()].copy_from_slice(header);

        let artifact = Artifact::new(Bytes::from(buffer), format);
        let info = artifact.info();
        self.put(job_id.clone(), artifact);
        Ok(info)
    }

    /// Drop a job's staging buffer, if any
    pub fn discard(&self, job_id: &JobId) {
        self.staging.remove(job_id);
    }

    /// Evict every artifact stored at least `ttl` before `now`
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.artifacts.len();
        self.artifacts
            .retain(|_, stored| now.saturating_duration_since(stored.stored_at) < self.ttl);
        before.saturating_sub(self.artifacts.len())
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Number of jobs currently streaming into staging
    pub fn staged(&self) -> usize {
        self.staging.len()
    }
}
