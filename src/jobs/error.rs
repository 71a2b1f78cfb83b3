use std::fmt::Display;

#[derive(Debug)]
pub enum JobError {
    /// A run for this key is already active; the duplicate is rejected.
    AlreadyRunning,
    /// No job record exists for this key.
    NotFound,
    /// Cancel was requested but nothing is running for this key.
    NotRunning,
    /// The job is processing; it must be cancelled before deletion.
    Busy,
    StorageError(String),
}

impl Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::AlreadyRunning => write!(f, "a job for this file is already running"),
            JobError::NotFound => write!(f, "no job found for this file"),
            JobError::NotRunning => write!(f, "no job is currently running for this file"),
            JobError::Busy => write!(f, "the job is still processing; cancel it first"),
            JobError::StorageError(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for JobError {}

impl From<anyhow::Error> for JobError {
    fn from(error: anyhow::Error) -> Self {
        JobError::StorageError(error.to_string())
    }
}
