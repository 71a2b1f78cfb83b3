use crate::storage::job::entity::Model as JobRecord;
use crate::jobs::types::Job;

impl From<JobRecord> for Job {
    fn from(record: JobRecord) -> Self {
        Job {
            key: record.key,
            status: record.status.try_into().unwrap(),
            generation: record.generation as u64,
            steps: serde_json::from_str(&record.steps).unwrap(),
            current_step: record.current_step as usize,
            progress: record.progress as u8,
            warnings: serde_json::from_str(&record.warnings).unwrap(),
            error: record.error.map(|e| serde_json::from_str(&e).unwrap()),
            result: record.result,
            cancel_requested: record.cancel_requested,
            created_at: record.created_at,
            started_at: record.started_at,
            updated_at: record.updated_at,
            finished_at: record.finished_at,
        }
    }
}

impl From<Job> for JobRecord {
    fn from(job: Job) -> Self {
        JobRecord {
            key: job.key,
            generation: job.generation as i64,
            status: job.status.to_string(),
            steps: serde_json::to_string(&job.steps).unwrap(),
            current_step: job.current_step as i32,
            progress: job.progress as i32,
            warnings: serde_json::to_string(&job.warnings).unwrap(),
            error: job.error.map(|e| serde_json::to_string(&e).unwrap()),
            result: job.result,
            cancel_requested: job.cancel_requested,
            created_at: job.created_at,
            started_at: job.started_at,
            updated_at: job.updated_at,
            finished_at: job.finished_at,
        }
    }
}
