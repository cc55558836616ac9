/// Job manager - job table, FIFO queue and admission control
///
/// The table is a sharded map so status and cancel never contend with each
/// other; the queue is a short critical section plus a `Notify` that wakes
/// idle workers.
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use resound_core::{
    ArtifactInfo, ConversionJob, EncodingOptions, ErrorKind, FormatTag, JobError, JobId, JobState,
    ResoundError, Result,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// What a worker needs to run a job; handed over exactly once, on claim
#[derive(Debug, Clone)]
pub struct JobWork {
    pub source: Bytes,
    pub source_format: FormatTag,
    pub target_format: FormatTag,
    pub options: EncodingOptions,
}

struct JobEntry {
    job: ConversionJob,
    cancel: CancellationToken,
    /// Present while queued
    work: Option<JobWork>,
    /// Set on entering a terminal state, drives retention
    finished_at: Option<Instant>,
}

impl JobEntry {
    fn finish(&mut self) {
        self.finished_at = Some(Instant::now());
    }
}

pub struct JobManager {
    jobs: DashMap<JobId, JobEntry>,
    queue: Mutex<VecDeque<JobId>>,
    notify: Notify,
    max_queue_depth: usize,
    job_retention: Duration,
}

impl JobManager {
    pub fn new(max_queue_depth: usize, job_retention: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            max_queue_depth,
            job_retention,
        }
    }

    /// Fail fast before expensive validation when the queue is already full
    pub fn check_capacity(&self) -> Result<()> {
        let depth = self.queue.lock().len();
        if depth >= self.max_queue_depth {
            return Err(ResoundError::Backpressure { depth });
        }
        Ok(())
    }

    /// Admit a validated job, or reject it with `Backpressure`
    pub fn enqueue(&self, job: ConversionJob, work: JobWork) -> Result<JobId> {
        let id = job.id.clone();

        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.max_queue_depth {
                return Err(ResoundError::Backpressure { depth: queue.len() });
            }

            self.jobs.insert(
                id.clone(),
                JobEntry {
                    job,
                    cancel: CancellationToken::new(),
                    work: Some(work),
                    finished_at: None,
                },
            );
            queue.push_back(id.clone());
        }

        self.notify.notify_one();
        tracing::info!("Enqueued job {}", id);
        Ok(id)
    }

    /// Snapshot of a job
    pub fn status(&self, id: &JobId) -> Result<ConversionJob> {
        self.jobs
            .get(id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| ResoundError::not_found("job", id.as_str()))
    }

    /// Cancel a job and return the state it is in afterwards.
    ///
    /// A running job stays `Running` until its worker reaches the next chunk
    /// boundary; terminal jobs are left untouched.
    pub fn cancel(&self, id: &JobId) -> Result<JobState> {
        let state = {
            let mut entry = self
                .jobs
                .get_mut(id)
                .ok_or_else(|| ResoundError::not_found("job", id.as_str()))?;

            match entry.job.state {
                JobState::Queued => {
                    entry.job.transition(JobState::Cancelled)?;
                    entry.work = None;
                    entry.cancel.cancel();
                    entry.finish();
                    JobState::Cancelled
                }
                JobState::Running => {
                    entry.cancel.cancel();
                    JobState::Running
                }
                terminal => return Ok(terminal),
            }
        };

        if state == JobState::Cancelled {
            self.queue.lock().retain(|queued| queued != id);
            tracing::info!("Cancelled queued job {}", id);
        } else {
            tracing::info!("Cancellation requested for running job {}", id);
        }

        Ok(state)
    }

    /// Claim the oldest queued job, moving it to `Running`
    pub fn claim(self: &Arc<Self>) -> Option<(JobHandle, JobWork)> {
        loop {
            let id = self.queue.lock().pop_front()?;

            let Some(mut entry) = self.jobs.get_mut(&id) else {
                continue;
            };
            // Cancelled between pop and lookup
            if entry.job.state != JobState::Queued {
                continue;
            }
            let Some(work) = entry.work.take() else {
                continue;
            };
            if entry.job.transition(JobState::Running).is_err() {
                continue;
            }

            let handle = JobHandle {
                id: id.clone(),
                cancel: entry.cancel.clone(),
                manager: Arc::clone(self),
                done: false,
            };
            return Some((handle, work));
        }
    }

    /// Wait for a job to claim, or `None` once `shutdown` fires
    pub async fn next_job(
        self: &Arc<Self>,
        shutdown: &CancellationToken,
    ) -> Option<(JobHandle, JobWork)> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the queue so an enqueue in between is not missed
            notified.as_mut().enable();

            if let Some(claimed) = self.claim() {
                return Some(claimed);
            }

            tokio::select! {
                () = &mut notified => {}
                () = shutdown.cancelled() => return None,
            }
        }
    }

    /// Drop terminal job records older than the retention window
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, entry| match entry.finished_at {
            Some(finished) => now.saturating_duration_since(finished) < self.job_retention,
            None => true,
        });
        before.saturating_sub(self.jobs.len())
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Apply a terminal outcome under the job's entry lock
    fn finish_with<F>(&self, id: &JobId, cancel: &CancellationToken, outcome: F) -> JobState
    where
        F: FnOnce(&mut ConversionJob) -> Result<()>,
    {
        let Some(mut entry) = self.jobs.get_mut(id) else {
            return JobState::Cancelled;
        };

        let result = if cancel.is_cancelled() {
            entry.job.transition(JobState::Cancelled)
        } else {
            outcome(&mut entry.job)
        };

        if let Err(e) = result {
            tracing::error!("Job {} could not be finalised: {}", id, e);
            if !entry.job.state.is_terminal() {
                let _ = entry.job.fail(JobError::from(e));
            }
        }

        entry.finish();
        entry.job.state
    }
}

/// A worker's exclusive write access to one running job.
///
/// Terminal methods consume the handle; dropping it unfinished fails the job.
pub struct JobHandle {
    id: JobId,
    cancel: CancellationToken,
    manager: Arc<JobManager>,
    done: bool,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn report_progress(&self, fraction: f32) {
        if let Some(mut entry) = self.manager.jobs.get_mut(&self.id) {
            entry.job.set_progress(fraction);
        }
    }

    /// Commit the artifact and mark the job `Succeeded`, atomically with
    /// respect to `cancel`.
    ///
    /// `commit` runs under the job's entry lock and only if no cancellation
    /// has been requested. Returns the final state; on `Cancelled` nothing
    /// was committed.
    pub fn succeed<F>(mut self, commit: F) -> JobState
    where
        F: FnOnce() -> Result<ArtifactInfo>,
    {
        self.done = true;
        self.manager
            .finish_with(&self.id, &self.cancel, |job| match commit() {
                Ok(info) => {
                    job.transition(JobState::Succeeded)?;
                    job.artifact = Some(info);
                    Ok(())
                }
                Err(e) => job.fail(JobError::from(e)),
            })
    }

    /// Mark the job `Failed`, unless a cancellation got there first
    pub fn fail(mut self, error: JobError) -> JobState {
        self.done = true;
        self.manager
            .finish_with(&self.id, &self.cancel, |job| job.fail(error))
    }

    /// Acknowledge a cancellation observed at a chunk boundary
    pub fn cancelled(mut self) -> JobState {
        self.done = true;
        self.manager
            .finish_with(&self.id, &self.cancel, |job| job.transition(JobState::Cancelled))
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        if !self.done {
            self.manager.finish_with(&self.id, &self.cancel, |job| {
                job.fail(JobError::new(
                    ErrorKind::Internal,
                    "worker stopped before the job finished",
                ))
            });
        }
    }
}
