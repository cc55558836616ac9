/// Transcode worker pool
///
/// A fixed number of tasks claim queued jobs and drive the pipeline one
/// chunk at a time. Each step runs on the blocking pool under a time budget,
/// so a stuck decoder costs one blocking thread but never a worker slot.
use crate::jobs::manager::{JobHandle, JobManager, JobWork};
use crate::services::ResultStore;
use resound_audio::{FormatRegistry, PipelineConfig, PipelineStep, TranscodePipeline};
use resound_core::{JobError, JobState, ResoundError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Run blocking work on the blocking pool with a time budget.
///
/// On timeout the work keeps running to completion on its thread and its
/// result is dropped.
pub async fn run_bounded<T, F>(budget: Duration, work: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(budget, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_error)) => Err(ResoundError::internal(format!(
            "pipeline step panicked: {}",
            join_error
        ))),
        Err(_) => Err(ResoundError::timeout(format!(
            "step exceeded its {} ms budget",
            budget.as_millis()
        ))),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub workers: usize,
    pub chunk_timeout: Duration,
    pub pipeline: PipelineConfig,
}

enum Outcome {
    /// Stream complete; carries the corrected container header
    Finished(Vec<u8>),
    Cancelled,
}

pub struct WorkerPool {
    manager: Arc<JobManager>,
    store: Arc<ResultStore>,
    registry: Arc<FormatRegistry>,
    settings: WorkerSettings,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        manager: Arc<JobManager>,
        store: Arc<ResultStore>,
        registry: Arc<FormatRegistry>,
        settings: WorkerSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            manager,
            store,
            registry,
            settings,
            shutdown,
        }
    }

    /// Start worker tasks
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.settings.workers)
            .map(|worker_id| {
                let pool = Arc::clone(&self);
                tokio::spawn(async move {
                    tracing::info!("Transcoding worker {} started", worker_id);
                    pool.worker_loop(worker_id).await;
                    tracing::info!("Transcoding worker {} stopped", worker_id);
                })
            })
            .collect()
    }

    /// Worker loop - processes jobs until shutdown
    async fn worker_loop(&self, worker_id: usize) {
        while let Some((handle, work)) = self.manager.next_job(&self.shutdown).await {
            tracing::info!(
                "Worker {} processing job {} ({} -> {})",
                worker_id,
                handle.id(),
                work.source_format,
                work.target_format
            );
            self.process(worker_id, handle, work).await;
        }
    }

    async fn process(&self, worker_id: usize, handle: JobHandle, work: JobWork) {
        let id = handle.id().clone();
        let target = work.target_format;

        self.store.begin(&id);

        match self.transcode(&handle, work).await {
            Ok(Outcome::Finished(header)) => {
                let store = &self.store;
                let state = handle.succeed(|| store.commit(&id, target, &header));
                if state == JobState::Succeeded {
                    tracing::info!("Worker {} completed job {}", worker_id, id);
                } else {
                    store.discard(&id);
                    tracing::info!("Worker {} finished job {} as {}", worker_id, id, state);
                }
            }
            Ok(Outcome::Cancelled) => {
                self.store.discard(&id);
                handle.cancelled();
                tracing::info!("Worker {} cancelled job {}", worker_id, id);
            }
            Err(e) => {
                self.store.discard(&id);
                tracing::error!("Worker {} failed job {}: {}", worker_id, id, e);
                handle.fail(JobError::from(e));
            }
        }
    }

    /// Drive the pipeline, appending output to the job's staging buffer
    async fn transcode(&self, handle: &JobHandle, work: JobWork) -> Result<Outcome> {
        let id = handle.id();
        let budget = self.settings.chunk_timeout;
        let config = self.settings.pipeline;
        let registry = Arc::clone(&self.registry);

        let (mut pipeline, header) = run_bounded(budget, move || {
            let mut pipeline = TranscodePipeline::new(
                work.source,
                registry.decodable(work.source_format)?,
                registry.encodable(work.target_format)?,
                &work.options,
                config,
            )
            .map_err(ResoundError::from)?;
            let header = pipeline.start().map_err(ResoundError::from)?;
            Ok::<_, ResoundError>((pipeline, header))
        })
        .await??;

        self.store.append(id, &header)?;

        let mut chunks = 0usize;
        loop {
            if handle.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }

            let (returned, step) = run_bounded(budget, move || {
                let step = pipeline.step();
                (pipeline, step)
            })
            .await?;
            pipeline = returned;

            match step.map_err(ResoundError::from)? {
                PipelineStep::Output { bytes, progress } => {
                    self.store.append(id, &bytes)?;
                    handle.report_progress(progress);
                    chunks += 1;
                    tracing::debug!(
                        "Job {} chunk {} ({} bytes, {:.0}%)",
                        id,
                        chunks,
                        bytes.len(),
                        progress * 100.0
                    );
                }
                PipelineStep::Finished(tail) => {
                    self.store.append(id, &tail.trailer)?;
                    return Ok(Outcome::Finished(tail.header));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resound_core::ErrorKind;

    #[tokio::test]
    async fn run_bounded_returns_the_value() {
        let value = run_bounded(Duration::from_secs(5), || 21 * 2).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn run_bounded_times_out_without_waiting_for_the_work() {
        let started = std::time::Instant::now();
        let err = run_bounded(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(500));
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn run_bounded_reports_panics_as_internal() {
        let err = run_bounded(Duration::from_secs(5), || -> u8 { panic!("decoder bug") })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
