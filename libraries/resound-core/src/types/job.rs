/// Conversion job record
use super::{AudioStreamDescriptor, EncodingOptions, FormatTag, JobId};
use crate::error::{JobError, ResoundError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a conversion job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Queued -> Running -> {Succeeded | Failed | Cancelled}, plus Queued -> Cancelled
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match (self, next) {
            (Self::Queued, Self::Running | Self::Cancelled) => true,
            (Self::Running, Self::Succeeded | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Size and format of a committed artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub format: FormatTag,
    pub size: u64,
}

/// Snapshot of a conversion job as reported by `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: JobId,
    pub source_format: FormatTag,
    pub target_format: FormatTag,
    pub options: EncodingOptions,
    pub state: JobState,
    /// Fraction of work done, in [0, 1]
    pub progress: f32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Present only when `state` is `Failed`
    pub error: Option<JobError>,
    /// Probed source properties
    pub source: Option<AudioStreamDescriptor>,
    /// Present only when `state` is `Succeeded`
    pub artifact: Option<ArtifactInfo>,
}

impl ConversionJob {
    /// Create a new queued job
    pub fn new(
        id: JobId,
        source_format: FormatTag,
        target_format: FormatTag,
        options: EncodingOptions,
    ) -> Self {
        Self {
            id,
            source_format,
            target_format,
            options,
            state: JobState::Queued,
            progress: 0.0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            source: None,
            artifact: None,
        }
    }

    /// Move to `next`, stamping timestamps; illegal transitions are rejected
    pub fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ResoundError::internal(format!(
                "job {} cannot move from {} to {}",
                self.id, self.state, next
            )));
        }

        self.state = next;
        match next {
            JobState::Running => self.started_at = Some(Utc::now()),
            JobState::Succeeded => {
                self.progress = 1.0;
                self.completed_at = Some(Utc::now());
            }
            JobState::Failed | JobState::Cancelled => self.completed_at = Some(Utc::now()),
            JobState::Queued => {}
        }
        Ok(())
    }

    /// Record a failure cause and move to `Failed`
    pub fn fail(&mut self, error: JobError) -> Result<()> {
        self.transition(JobState::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Update progress while running; capped below 1.0 until success
    pub fn set_progress(&mut self, fraction: f32) {
        if self.state == JobState::Running && fraction.is_finite() {
            self.progress = fraction.clamp(self.progress, 0.99);
        }
    }
}
