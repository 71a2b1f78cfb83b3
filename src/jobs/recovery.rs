use std::sync::Arc;
use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::jobs::types::{Job, JobStatus};
use crate::storage::job::JobStore;

/// Boot-time reconciliation. The process just started, so no worker can be
/// alive; any record still marked processing was orphaned by a crash or
/// restart and is moved to stopped so the interruption is visible instead of
/// the job looking forever in-flight.
pub struct RecoveryScanner {
    store: Arc<dyn JobStore>,
}

impl RecoveryScanner {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Runs once, before any submission is accepted. Returns the keys that
    /// were recovered so the interface layer can surface a one-time notice.
    pub async fn scan(&self) -> Result<Vec<String>> {
        let mut recovered = Vec::new();

        for record in self.store.load_all().await? {
            let mut job = Job::from(record);
            if job.status != JobStatus::Processing {
                continue;
            }

            warn!(
                "Job {} was processing when the server stopped; marking it stopped",
                job.key
            );
            job.status = JobStatus::Stopped;
            job.warnings
                .push("processing was interrupted by a server restart".to_string());
            job.updated_at = Utc::now();
            job.finished_at = Some(Utc::now());
            self.store.save(&job.clone().into()).await?;
            recovered.push(job.key);
        }

        if !recovered.is_empty() {
            info!("Recovered {} interrupted job(s): {:?}", recovered.len(), recovered);
        }

        Ok(recovered)
    }
}
