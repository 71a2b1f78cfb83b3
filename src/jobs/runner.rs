use std::sync::Arc;
use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::engine::{EngineError, ProcessingEngine, StepInput};
use crate::jobs::registry::JobRegistry;
use crate::jobs::types::{FailurePolicy, Job, JobFailure, JobStatus};
use crate::storage::artifact::ArtifactStore;
use crate::storage::job::JobStore;

/// Executes one job's steps in order against the engine, persisting progress
/// between steps and honoring cancellation at step boundaries. The runner
/// never touches the registry slot itself; whoever spawned the run releases
/// it exactly once after `run` returns, whatever the exit path was.
pub struct PipelineRunner {
    store: Arc<dyn JobStore>,
    registry: Arc<JobRegistry>,
    engine: Arc<dyn ProcessingEngine>,
    artifacts: Arc<ArtifactStore>,
}

impl PipelineRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<JobRegistry>,
        engine: Arc<dyn ProcessingEngine>,
        artifacts: Arc<ArtifactStore>,
    ) -> Self {
        Self { store, registry, engine, artifacts }
    }

    pub async fn run(&self, mut job: Job) -> Result<()> {
        let total = job.steps.len();
        info!("Starting run for {} (generation {}, {} steps)", job.key, job.generation, total);

        // fresh run: progress, warnings and any previous outcome reset
        job.status = JobStatus::Processing;
        job.current_step = 0;
        job.progress = 0;
        job.warnings.clear();
        job.error = None;
        job.result = None;
        job.cancel_requested = false;
        job.started_at = Some(Utc::now());
        job.finished_at = None;
        if !self.persist(&mut job).await? {
            return Ok(());
        }

        let mut payload = Value::Null;
        for i in 0..total {
            let step = job.steps[i].clone();

            // cancellation is cooperative: checked here, between steps, so an
            // in-flight engine call always finishes before it takes effect
            if self.registry.cancel_requested(&job.key, job.generation).await {
                info!("Run for {} cancelled before step {}", job.key, step.name);
                job.status = JobStatus::Stopped;
                job.cancel_requested = true;
                job.finished_at = Some(Utc::now());
                self.persist(&mut job).await?;
                return Ok(());
            }

            let input = StepInput::next(&job.key, payload.clone());
            match self.engine.run_step(&step.name, input).await {
                Ok(output) => {
                    job.warnings.extend(output.warnings);
                    payload = output.payload;
                    job.current_step = i + 1;
                    job.progress = progress_after(i + 1, total);
                    if !self.persist(&mut job).await? {
                        return Ok(());
                    }
                }
                Err(err) => match step.on_failure {
                    FailurePolicy::SkipWithWarning => {
                        warn!("Step {} failed softly for {}: {}", step.name, job.key, err);
                        job.warnings.push(format!(
                            "{} unavailable, continuing without it: {}",
                            step.name, err.message
                        ));
                        job.current_step = i + 1;
                        job.progress = progress_after(i + 1, total);
                        if !self.persist(&mut job).await? {
                            return Ok(());
                        }
                        // the previous step's payload flows on to the next step
                    }
                    FailurePolicy::Abort => {
                        error!("Step {} failed for {}: {}", step.name, job.key, err);
                        job.status = JobStatus::Error;
                        job.error = Some(failure_from(err));
                        job.finished_at = Some(Utc::now());
                        self.persist(&mut job).await?;
                        return Ok(());
                    }
                },
            }
        }

        match self.artifacts.save(&job.key, &payload) {
            Ok(path) => {
                job.result = Some(path.display().to_string());
            }
            Err(e) => {
                error!("Failed to save result for {}: {}", job.key, e);
                job.status = JobStatus::Error;
                job.error = Some(failure_from(
                    EngineError::new("finalize", "failed to save the finished result")
                        .with_details(e.to_string()),
                ));
                job.finished_at = Some(Utc::now());
                self.persist(&mut job).await?;
                return Ok(());
            }
        }

        job.status = JobStatus::Complete;
        job.progress = 100;
        job.finished_at = Some(Utc::now());
        self.persist(&mut job).await?;
        info!("Run for {} complete (generation {})", job.key, job.generation);

        Ok(())
    }

    /// Persists the snapshot unless this run has been superseded. The store
    /// repeats the generation check inside its upsert, so even a race between
    /// the check and the write cannot clobber a newer run's state.
    async fn persist(&self, job: &mut Job) -> Result<bool> {
        if !self.registry.is_current(&job.key, job.generation).await {
            warn!(
                "Discarding status write for {}: generation {} superseded",
                job.key, job.generation
            );
            return Ok(false);
        }
        job.updated_at = Utc::now();
        self.store.save(&job.clone().into()).await?;
        Ok(true)
    }
}

fn progress_after(completed: usize, total: usize) -> u8 {
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

/// Normalizes an engine failure into the structured record kept on the job.
/// Nothing from the engine escapes un-annotated.
fn failure_from(err: EngineError) -> JobFailure {
    let suggestions = suggestions_for(&err);
    JobFailure {
        step: err.step,
        message: err.message,
        details: err.details,
        suggestions,
    }
}

fn suggestions_for(err: &EngineError) -> Vec<String> {
    let text = format!("{} {}", err.message, err.details.as_deref().unwrap_or(""))
        .to_lowercase();

    if text.contains("token") || text.contains("credential") || text.contains("unauthorized") {
        vec![
            "Check the engine's service credentials (for diarization, the model access token)"
                .to_string(),
            "Restart the engine after updating its configuration".to_string(),
        ]
    } else if text.contains("connect") || text.contains("request failed") || text.contains("timed out")
    {
        vec![
            "Check that the processing engine is running and reachable".to_string(),
            "Retry the job once the engine is back".to_string(),
        ]
    } else {
        vec!["Retry the job; if the error persists, delete and re-upload the file".to_string()]
    }
}
