/// Transcoding service - the client-facing facade
///
/// `submit`, `status`, `cancel` and `fetch` are all the HTTP layer (or any
/// other client) needs; workers and the retention sweep run behind it.
use crate::config::ServerConfig;
use crate::jobs::{run_bounded, JobManager, JobWork, WorkerPool, WorkerSettings};
use crate::services::result_store::{Artifact, ResultStore};
use bytes::Bytes;
use resound_audio::{probe, FormatRegistry};
use resound_core::{
    ConversionJob, EncodingOptions, FormatTag, JobId, JobState, ResoundError, Result,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct TranscodingService {
    registry: Arc<FormatRegistry>,
    manager: Arc<JobManager>,
    store: Arc<ResultStore>,
    workers: WorkerSettings,
    probe_timeout: Duration,
    sweep_interval: Duration,
    evict_on_fetch: bool,
    shutdown: CancellationToken,
}

impl TranscodingService {
    pub fn new(config: &ServerConfig) -> Self {
        let transcoding = &config.transcoding;
        let retention = &config.retention;

        Self {
            registry: Arc::new(FormatRegistry::new()),
            manager: Arc::new(JobManager::new(
                transcoding.max_queue_depth,
                retention.job_retention(),
            )),
            store: Arc::new(ResultStore::new(retention.artifact_ttl())),
            workers: WorkerSettings {
                workers: transcoding.workers,
                chunk_timeout: transcoding.chunk_timeout(),
                pipeline: transcoding.pipeline(),
            },
            probe_timeout: transcoding.probe_timeout(),
            sweep_interval: retention.sweep_interval(),
            evict_on_fetch: retention.evict_on_fetch,
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn the worker pool and the retention sweep
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            self.workers,
            self.shutdown.clone(),
        ));
        let mut tasks = pool.start();

        let manager = Arc::clone(&self.manager);
        let store = Arc::clone(&self.store);
        let shutdown = self.shutdown.clone();
        let interval = self.sweep_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Instant::now();
                        let artifacts = store.sweep(now);
                        let jobs = manager.sweep(now);
                        if artifacts + jobs > 0 {
                            tracing::info!(
                                "Retention sweep evicted {} artifacts, dropped {} jobs",
                                artifacts,
                                jobs
                            );
                        }
                    }
                    () = shutdown.cancelled() => break,
                }
            }
        }));

        tracing::info!("Transcoding started with {} workers", self.workers.workers);
        tasks
    }

    /// Stop workers after their current step and end the sweep
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Validate, probe and enqueue a conversion request
    pub async fn submit(
        &self,
        source: Bytes,
        source_format: &str,
        target_format: &str,
        options: EncodingOptions,
    ) -> Result<JobId> {
        let result = self
            .admit(source, source_format, target_format, options)
            .await;
        if let Err(e) = &result {
            tracing::warn!(
                "Rejected {} -> {} submission: {}",
                source_format,
                target_format,
                e
            );
        }
        result
    }

    async fn admit(
        &self,
        source: Bytes,
        source_format: &str,
        target_format: &str,
        options: EncodingOptions,
    ) -> Result<JobId> {
        let source_tag: FormatTag = source_format.parse()?;
        let target_tag: FormatTag = target_format.parse()?;

        let source_descriptor = self.registry.decodable(source_tag)?.clone();
        let target_descriptor = self.registry.encodable(target_tag)?;
        self.registry.validate_options(target_descriptor, &options)?;

        self.manager.check_capacity()?;

        let probed = {
            let source = source.clone();
            run_bounded(self.probe_timeout, move || {
                probe(source, &source_descriptor)
            })
            .await?
            .map_err(ResoundError::from)?
        };

        let mut job = ConversionJob::new(JobId::generate(), source_tag, target_tag, options);
        job.source = Some(probed);

        let work = JobWork {
            source,
            source_format: source_tag,
            target_format: target_tag,
            options,
        };
        self.manager.enqueue(job, work)
    }

    pub fn status(&self, id: &JobId) -> Result<ConversionJob> {
        self.manager.status(id)
    }

    pub fn cancel(&self, id: &JobId) -> Result<JobState> {
        self.manager.cancel(id)
    }

    /// Hand out the artifact of a succeeded job
    pub fn fetch(&self, id: &JobId) -> Result<Artifact> {
        let job = self.manager.status(id)?;
        match job.state {
            JobState::Queued | JobState::Running => Err(ResoundError::NotReady(id.clone())),
            JobState::Failed | JobState::Cancelled => {
                Err(ResoundError::not_found("artifact", id.as_str()))
            }
            JobState::Succeeded => {
                let artifact = self.store.get(id)?;
                if self.evict_on_fetch {
                    self.store.evict(id);
                }
                Ok(artifact)
            }
        }
    }

    /// Run one retention pass as of `now`
    pub fn sweep(&self, now: Instant) -> (usize, usize) {
        (self.store.sweep(now), self.manager.sweep(now))
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn queue_depth(&self) -> usize {
        self.manager.queue_depth()
    }

    pub fn job_count(&self) -> usize {
        self.manager.len()
    }

    pub fn artifact_count(&self) -> usize {
        self.store.len()
    }
}

impl Drop for TranscodingService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
