use std::sync::Arc;
use tracing::info;

pub mod types;
pub mod error;
pub mod registry;
pub mod recovery;
pub mod runner;
pub mod orchestrator;
#[cfg(test)]
mod tests;

pub use types::{
    FailurePolicy, Job, JobFailure, JobStatus, PipelineSpec, StepSpec, SubmitOutcome,
};
pub use error::JobError;
pub use registry::JobRegistry;
pub use recovery::RecoveryScanner;
pub use runner::PipelineRunner;
pub use orchestrator::Orchestrator;

use crate::engine::ProcessingEngine;
use crate::storage::artifact::ArtifactStore;
use crate::storage::job::JobStore;

/// Builds the orchestrator and runs boot-time recovery, in that order, so no
/// submission can race the scan.
pub async fn bootstrap(
    store: Arc<dyn JobStore>,
    engine: Arc<dyn ProcessingEngine>,
    artifacts: Arc<ArtifactStore>,
    max_concurrent: usize,
) -> anyhow::Result<Arc<Orchestrator>> {
    let orchestrator = Arc::new(Orchestrator::new(store, engine, artifacts, max_concurrent));

    let recovered = orchestrator.recover().await?;
    if recovered > 0 {
        info!("{} job(s) were interrupted by the last shutdown", recovered);
    }

    Ok(orchestrator)
}
