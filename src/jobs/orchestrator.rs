use std::sync::Arc;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info};

use crate::engine::ProcessingEngine;
use crate::jobs::error::JobError;
use crate::jobs::recovery::RecoveryScanner;
use crate::jobs::registry::JobRegistry;
use crate::jobs::runner::PipelineRunner;
use crate::jobs::types::{Job, JobStatus, PipelineSpec, SubmitOutcome};
use crate::storage::artifact::ArtifactStore;
use crate::storage::job::JobStore;

/// Public contract of the job system: submit, query, cancel, retry, delete.
/// Admission errors are rejected here synchronously and never touch a job's
/// persisted status.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    registry: Arc<JobRegistry>,
    engine: Arc<dyn ProcessingEngine>,
    artifacts: Arc<ArtifactStore>,
    /// Bounds simultaneously running pipelines; the engine is one shared
    /// accelerator. Fair, so queued submissions start in submit order.
    gate: Arc<Semaphore>,
    recovered: Mutex<Vec<String>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        engine: Arc<dyn ProcessingEngine>,
        artifacts: Arc<ArtifactStore>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            registry: Arc::new(JobRegistry::new()),
            engine,
            artifacts,
            gate: Arc::new(Semaphore::new(max_concurrent.max(1))),
            recovered: Mutex::new(Vec::new()),
        }
    }

    /// Reconciles persisted state against the (empty) registry. Must run
    /// before the first submission is accepted.
    pub async fn recover(&self) -> anyhow::Result<usize> {
        let recovered = RecoveryScanner::new(self.store.clone()).scan().await?;
        let count = recovered.len();
        self.recovered.lock().await.extend(recovered);
        Ok(count)
    }

    /// One-time set of jobs the last boot found interrupted; cleared on read
    /// so startup notices are not repeated on every poll.
    pub async fn take_recovered(&self) -> Vec<String> {
        std::mem::take(&mut *self.recovered.lock().await)
    }

    /// Starts a new run for the key, or reports the finished job as-is.
    /// Callers wanting to re-run a finished job must use `retry`.
    pub async fn submit(&self, key: &str, pipeline: PipelineSpec) -> Result<SubmitOutcome, JobError> {
        if self.registry.is_active(key).await {
            return Err(JobError::AlreadyRunning);
        }

        let existing = self.store.load(key).await.map_err(JobError::from)?.map(Job::from);
        if let Some(job) = &existing {
            if job.status.is_terminal() {
                return Ok(SubmitOutcome::AlreadyDone(job.clone()));
            }
        }

        let generation = self
            .registry
            .try_acquire(key)
            .await
            .ok_or(JobError::AlreadyRunning)?;

        let mut job = Job::new(key, generation, pipeline);
        if let Some(previous) = existing {
            job.created_at = previous.created_at;
        }

        if let Err(e) = self.store.save(&job.clone().into()).await {
            self.registry.release(key, generation).await;
            return Err(JobError::from(e));
        }

        info!("Submitted {} (generation {})", key, generation);
        self.spawn_run(job.clone());
        Ok(SubmitOutcome::Started(job))
    }

    /// Runs the job again from any finished state, reusing its stored step
    /// sequence. The previous result is discarded when the new run starts.
    pub async fn retry(&self, key: &str) -> Result<Job, JobError> {
        if self.registry.is_active(key).await {
            return Err(JobError::AlreadyRunning);
        }

        let record = self.store.load(key).await.map_err(JobError::from)?;
        let mut job = record.map(Job::from).ok_or(JobError::NotFound)?;

        let generation = self
            .registry
            .try_acquire(key)
            .await
            .ok_or(JobError::AlreadyRunning)?;
        job.generation = generation;

        if let Err(e) = self.store.save(&job.clone().into()).await {
            self.registry.release(key, generation).await;
            return Err(JobError::from(e));
        }

        info!("Retrying {} (generation {})", key, generation);
        self.spawn_run(job.clone());
        Ok(job)
    }

    /// Latest persisted snapshot; safe to poll at any frequency.
    pub async fn status(&self, key: &str) -> Result<Job, JobError> {
        self.store
            .load(key)
            .await
            .map_err(JobError::from)?
            .map(Job::from)
            .ok_or(JobError::NotFound)
    }

    pub async fn list(&self) -> Result<Vec<Job>, JobError> {
        Ok(self
            .store
            .load_all()
            .await
            .map_err(JobError::from)?
            .into_iter()
            .map(Job::from)
            .collect())
    }

    /// Sets the cooperative stop flag and returns immediately; the runner
    /// observes it at the next step boundary.
    pub async fn cancel(&self, key: &str) -> Result<(), JobError> {
        if self.registry.request_cancel(key).await {
            info!("Cancel requested for {}", key);
            Ok(())
        } else {
            Err(JobError::NotRunning)
        }
    }

    /// Removes the job record and its artifact. Rejected while a run is
    /// active; cancel first.
    pub async fn delete(&self, key: &str) -> Result<(), JobError> {
        if self.registry.is_active(key).await {
            return Err(JobError::Busy);
        }

        self.store
            .load(key)
            .await
            .map_err(JobError::from)?
            .ok_or(JobError::NotFound)?;

        self.store.delete(key).await.map_err(JobError::from)?;
        self.artifacts.delete(key).map_err(JobError::from)?;
        info!("Deleted job {}", key);
        Ok(())
    }

    /// The finished transcript for a complete job.
    pub async fn result(&self, key: &str) -> Result<Value, JobError> {
        let job = self.status(key).await?;
        if job.status != JobStatus::Complete || job.result.is_none() {
            return Err(JobError::NotFound);
        }
        self.artifacts.load(key).map_err(JobError::from)
    }

    fn spawn_run(&self, job: Job) {
        let runner = PipelineRunner::new(
            self.store.clone(),
            self.registry.clone(),
            self.engine.clone(),
            self.artifacts.clone(),
        );
        let registry = self.registry.clone();
        let gate = self.gate.clone();

        tokio::spawn(async move {
            let key = job.key.clone();
            let generation = job.generation;

            // queued submissions wait here, FIFO; the gate is never closed
            let _permit = gate.acquire_owned().await.ok();

            if let Err(e) = runner.run(job).await {
                error!("Run for {} failed: {}", key, e);
            }
            registry.release(&key, generation).await;
        });
    }
}
