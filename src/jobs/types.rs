use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    NotStarted,
    Processing,
    Complete,
    Error,
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error | JobStatus::Stopped)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl TryFrom<String> for JobStatus {
    type Error = String;
    fn try_from(status: String) -> Result<Self, String> {
        match status.as_str() {
            "NotStarted" => Ok(JobStatus::NotStarted),
            "Processing" => Ok(JobStatus::Processing),
            "Complete" => Ok(JobStatus::Complete),
            "Error" => Ok(JobStatus::Error),
            "Stopped" => Ok(JobStatus::Stopped),
            _ => Err(format!("Invalid job status: {}", status)),
        }
    }
}

/// What the runner does when a step's engine call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Fail the whole job with a structured error record.
    Abort,
    /// Record a warning and continue with the next step.
    SkipWithWarning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    pub on_failure: FailurePolicy,
}

impl StepSpec {
    pub fn hard(name: &str) -> Self {
        Self { name: name.to_string(), on_failure: FailurePolicy::Abort }
    }

    pub fn soft(name: &str) -> Self {
        Self { name: name.to_string(), on_failure: FailurePolicy::SkipWithWarning }
    }
}

/// Ordered step sequence a job runs through, fixed at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub steps: Vec<StepSpec>,
}

impl PipelineSpec {
    pub fn new(steps: Vec<StepSpec>) -> Self {
        Self { steps }
    }

    /// The standard transcription pipeline. Diarization degrades to a warning
    /// when the engine cannot provide speaker labels; which steps are soft is
    /// deployment configuration, not a rule of the runner.
    pub fn transcription() -> Self {
        Self::new(vec![
            StepSpec::hard("preprocess"),
            StepSpec::hard("transcribe"),
            StepSpec::soft("diarize"),
            StepSpec::hard("assemble"),
        ])
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Structured failure record kept on a job until the next retry or delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub step: String,
    pub message: String,
    pub details: Option<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub key: String,
    pub status: JobStatus,
    /// Run token; stale generations must never overwrite newer state.
    pub generation: u64,
    pub steps: Vec<StepSpec>,
    pub current_step: usize,
    pub progress: u8,
    pub warnings: Vec<String>,
    pub error: Option<JobFailure>,
    pub result: Option<String>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(key: &str, generation: u64, pipeline: PipelineSpec) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            status: JobStatus::NotStarted,
            generation,
            steps: pipeline.steps,
            current_step: 0,
            progress: 0,
            warnings: Vec::new(),
            error: None,
            result: None,
            cancel_requested: false,
            created_at: now,
            started_at: None,
            updated_at: now,
            finished_at: None,
        }
    }
}

/// What a submit call did.
#[derive(Debug, Clone, Serialize)]
pub enum SubmitOutcome {
    /// A new run was started for this key.
    Started(Job),
    /// The job already finished; callers must retry to run it again.
    AlreadyDone(Job),
}

impl SubmitOutcome {
    pub fn job(&self) -> &Job {
        match self {
            SubmitOutcome::Started(job) | SubmitOutcome::AlreadyDone(job) => job,
        }
    }

    pub fn started(&self) -> bool {
        matches!(self, SubmitOutcome::Started(_))
    }
}
