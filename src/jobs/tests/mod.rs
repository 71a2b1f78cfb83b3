use super::*;
use crate::engine::{EngineError, ProcessingEngine, StepInput, StepOutput};
use crate::storage::artifact::ArtifactStore;
use crate::storage::job::sqlite::SqliteJobStore;
use crate::storage::job::JobStore;

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};

/// Test double for the external engine: per-step behavior, a release valve
/// for steps that should block until the test says so, and a call log.
struct ScriptedEngine {
    behaviors: StdMutex<HashMap<String, StepBehavior>>,
    release: Semaphore,
    calls: StdMutex<Vec<String>>,
}

#[derive(Clone)]
enum StepBehavior {
    Succeed,
    SucceedWithWarnings(Vec<String>),
    Fail(&'static str),
    /// Blocks until the test calls `release_one`, then succeeds.
    Hold,
}

impl ScriptedEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            behaviors: StdMutex::new(HashMap::new()),
            release: Semaphore::new(0),
            calls: StdMutex::new(Vec::new()),
        })
    }

    fn set(&self, step: &str, behavior: StepBehavior) {
        self.behaviors.lock().unwrap().insert(step.to_string(), behavior);
    }

    fn release_one(&self) {
        self.release.add_permits(1);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessingEngine for ScriptedEngine {
    async fn run_step(&self, step: &str, input: StepInput) -> Result<StepOutput, EngineError> {
        self.calls.lock().unwrap().push(step.to_string());
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(step)
            .cloned()
            .unwrap_or(StepBehavior::Succeed);

        let done = |warnings: Vec<String>| StepOutput {
            payload: json!({ "step": step, "key": input.key }),
            warnings,
        };

        match behavior {
            StepBehavior::Succeed => Ok(done(Vec::new())),
            StepBehavior::SucceedWithWarnings(warnings) => Ok(done(warnings)),
            StepBehavior::Fail(message) => Err(EngineError::new(step, message)),
            StepBehavior::Hold => {
                self.release.acquire().await.unwrap().forget();
                Ok(done(Vec::new()))
            }
        }
    }
}

struct TestEnv {
    orchestrator: Arc<Orchestrator>,
    engine: Arc<ScriptedEngine>,
    store: Arc<SqliteJobStore>,
    artifacts: Arc<ArtifactStore>,
    _dir: TempDir,
}

async fn setup(max_concurrent: usize) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("jobs.db").display());
    let store = Arc::new(SqliteJobStore::new(&url).await.unwrap());
    let artifacts = Arc::new(ArtifactStore::new(dir.path().join("data")).unwrap());
    let engine = ScriptedEngine::new();

    let orchestrator = bootstrap(
        store.clone(),
        engine.clone(),
        artifacts.clone(),
        max_concurrent,
    )
    .await
    .unwrap();

    TestEnv { orchestrator, engine, store, artifacts, _dir: dir }
}

async fn wait_until(
    orchestrator: &Orchestrator,
    key: &str,
    pred: impl Fn(&Job) -> bool,
) -> Job {
    for _ in 0..250 {
        if let Ok(job) = orchestrator.status(key).await {
            if pred(&job) {
                return job;
            }
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("job {} never reached the expected state", key);
}

#[tokio::test]
async fn test_full_pipeline_completes() {
    let env = setup(1).await;

    let outcome = env
        .orchestrator
        .submit("meeting.wav", PipelineSpec::transcription())
        .await
        .unwrap();
    assert!(outcome.started());

    let job = wait_until(&env.orchestrator, "meeting.wav", |j| {
        j.status == JobStatus::Complete
    })
    .await;

    assert_eq!(job.current_step, 4);
    assert_eq!(job.progress, 100);
    assert!(job.warnings.is_empty());
    assert!(job.error.is_none());
    assert!(job.result.is_some());
    assert!(job.started_at.is_some());
    assert!(job.finished_at.is_some());
    assert!(env.artifacts.exists("meeting.wav"));
    assert_eq!(
        env.engine.calls(),
        vec!["preprocess", "transcribe", "diarize", "assemble"]
    );
}

#[tokio::test]
async fn test_step_warnings_are_merged_into_the_job() {
    let env = setup(1).await;
    env.engine.set(
        "preprocess",
        StepBehavior::SucceedWithWarnings(vec!["low audio bitrate detected".to_string()]),
    );

    env.orchestrator
        .submit("noisy.wav", PipelineSpec::transcription())
        .await
        .unwrap();

    let job = wait_until(&env.orchestrator, "noisy.wav", |j| {
        j.status == JobStatus::Complete
    })
    .await;

    assert_eq!(job.warnings, vec!["low audio bitrate detected".to_string()]);
}

#[tokio::test]
async fn test_soft_step_failure_degrades_to_warning() {
    let env = setup(1).await;
    env.engine.set("diarize", StepBehavior::Fail("missing diarization token"));

    let pipeline = PipelineSpec::new(vec![
        StepSpec::hard("transcribe"),
        StepSpec::soft("diarize"),
        StepSpec::hard("assemble"),
    ]);
    env.orchestrator.submit("a.wav", pipeline).await.unwrap();

    let job = wait_until(&env.orchestrator, "a.wav", |j| j.status == JobStatus::Complete).await;

    assert_eq!(job.current_step, 3);
    assert_eq!(job.progress, 100);
    assert_eq!(job.warnings.len(), 1);
    assert!(job.warnings[0].contains("diarize unavailable"));
    assert!(job.error.is_none());
    assert!(job.result.is_some());
    // the run continued past the failed optional step
    assert_eq!(env.engine.calls(), vec!["transcribe", "diarize", "assemble"]);
}

#[tokio::test]
async fn test_hard_step_failure_aborts_the_run() {
    let env = setup(1).await;
    env.engine.set("transcribe", StepBehavior::Fail("model crashed"));

    env.orchestrator
        .submit("broken.wav", PipelineSpec::transcription())
        .await
        .unwrap();

    let job = wait_until(&env.orchestrator, "broken.wav", |j| j.status == JobStatus::Error).await;

    let failure = job.error.unwrap();
    assert_eq!(failure.step, "transcribe");
    assert_eq!(failure.message, "model crashed");
    assert!(!failure.suggestions.is_empty());
    assert!(job.result.is_none());
    // nothing after the failed hard step ran
    assert_eq!(env.engine.calls(), vec!["preprocess", "transcribe"]);
}

#[tokio::test]
async fn test_cancel_stops_before_the_next_step() {
    let env = setup(1).await;
    env.engine.set("preprocess", StepBehavior::Hold);

    env.orchestrator
        .submit("b.wav", PipelineSpec::transcription())
        .await
        .unwrap();

    // wait for the engine to be inside step 1, then cancel mid-step
    wait_until(&env.orchestrator, "b.wav", |j| j.status == JobStatus::Processing).await;
    while !env.engine.calls().contains(&"preprocess".to_string()) {
        sleep(Duration::from_millis(10)).await;
    }
    env.orchestrator.cancel("b.wav").await.unwrap();

    // the in-flight step finishes, then the runner observes the flag
    env.engine.release_one();
    let job = wait_until(&env.orchestrator, "b.wav", |j| j.status == JobStatus::Stopped).await;

    assert!(job.cancel_requested);
    assert!(job.current_step <= 1);
    assert!(job.result.is_none());
    assert!(!env.artifacts.exists("b.wav"));
    // transcribe never ran
    assert_eq!(env.engine.calls(), vec!["preprocess"]);
}

#[tokio::test]
async fn test_concurrent_submits_admit_exactly_one() {
    let env = setup(1).await;
    env.engine.set("preprocess", StepBehavior::Hold);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let orchestrator = env.orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.submit("same.wav", PipelineSpec::transcription()).await
        }));
    }

    let mut started = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) if outcome.started() => started += 1,
            Ok(_) => {}
            Err(JobError::AlreadyRunning) => rejected += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(rejected, 3);

    env.orchestrator.cancel("same.wav").await.unwrap();
    env.engine.release_one();
    wait_until(&env.orchestrator, "same.wav", |j| j.status == JobStatus::Stopped).await;
}

#[tokio::test]
async fn test_submit_on_finished_job_is_a_noop() {
    let env = setup(1).await;

    env.orchestrator
        .submit("done.wav", PipelineSpec::transcription())
        .await
        .unwrap();
    let finished =
        wait_until(&env.orchestrator, "done.wav", |j| j.status == JobStatus::Complete).await;

    let outcome = env
        .orchestrator
        .submit("done.wav", PipelineSpec::transcription())
        .await
        .unwrap();

    assert!(!outcome.started());
    assert_eq!(outcome.job().generation, finished.generation);
    assert_eq!(outcome.job().status, JobStatus::Complete);
}

#[tokio::test]
async fn test_retry_after_error_starts_a_fresh_run() {
    let env = setup(1).await;
    env.engine.set("transcribe", StepBehavior::Fail("model crashed"));

    env.orchestrator
        .submit("flaky.wav", PipelineSpec::transcription())
        .await
        .unwrap();
    let failed =
        wait_until(&env.orchestrator, "flaky.wav", |j| j.status == JobStatus::Error).await;

    env.engine.set("transcribe", StepBehavior::Succeed);
    let retried = env.orchestrator.retry("flaky.wav").await.unwrap();
    assert!(retried.generation > failed.generation);

    let job = wait_until(&env.orchestrator, "flaky.wav", |j| j.status == JobStatus::Complete).await;
    assert!(job.error.is_none());
    assert!(job.warnings.is_empty());
    assert!(job.result.is_some());
    assert_eq!(job.current_step, 4);
}

#[tokio::test]
async fn test_retry_unknown_key_is_not_found() {
    let env = setup(1).await;
    assert!(matches!(
        env.orchestrator.retry("ghost.wav").await,
        Err(JobError::NotFound)
    ));
}

#[tokio::test]
async fn test_cancel_without_active_run_is_rejected() {
    let env = setup(1).await;
    assert!(matches!(
        env.orchestrator.cancel("idle.wav").await,
        Err(JobError::NotRunning)
    ));
}

#[tokio::test]
async fn test_delete_complete_job_removes_everything() {
    let env = setup(1).await;

    env.orchestrator
        .submit("c.wav", PipelineSpec::transcription())
        .await
        .unwrap();
    wait_until(&env.orchestrator, "c.wav", |j| j.status == JobStatus::Complete).await;
    assert!(env.artifacts.exists("c.wav"));

    env.orchestrator.delete("c.wav").await.unwrap();

    assert!(matches!(
        env.orchestrator.status("c.wav").await,
        Err(JobError::NotFound)
    ));
    assert!(!env.artifacts.exists("c.wav"));
}

#[tokio::test]
async fn test_delete_while_processing_is_busy() {
    let env = setup(1).await;
    env.engine.set("preprocess", StepBehavior::Hold);

    env.orchestrator
        .submit("busy.wav", PipelineSpec::transcription())
        .await
        .unwrap();
    wait_until(&env.orchestrator, "busy.wav", |j| j.status == JobStatus::Processing).await;

    assert!(matches!(
        env.orchestrator.delete("busy.wav").await,
        Err(JobError::Busy)
    ));

    env.orchestrator.cancel("busy.wav").await.unwrap();
    env.engine.release_one();
    wait_until(&env.orchestrator, "busy.wav", |j| j.status == JobStatus::Stopped).await;
    env.orchestrator.delete("busy.wav").await.unwrap();
}

#[tokio::test]
async fn test_admission_gate_queues_excess_submissions() {
    let env = setup(1).await;
    env.engine.set("preprocess", StepBehavior::Hold);

    let pipeline = PipelineSpec::new(vec![StepSpec::hard("preprocess")]);
    env.orchestrator.submit("first.wav", pipeline.clone()).await.unwrap();
    wait_until(&env.orchestrator, "first.wav", |j| j.status == JobStatus::Processing).await;

    // with one engine slot the second job waits its turn
    env.orchestrator.submit("second.wav", pipeline).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    let queued = env.orchestrator.status("second.wav").await.unwrap();
    assert_eq!(queued.status, JobStatus::NotStarted);

    env.engine.release_one();
    let first =
        wait_until(&env.orchestrator, "first.wav", |j| j.status == JobStatus::Complete).await;

    env.engine.release_one();
    let second =
        wait_until(&env.orchestrator, "second.wav", |j| j.status == JobStatus::Complete).await;

    assert!(second.started_at.unwrap() >= first.finished_at.unwrap());
}

#[tokio::test]
async fn test_progress_is_monotonic_within_a_run() {
    let env = setup(1).await;
    for step in ["preprocess", "transcribe", "diarize", "assemble"] {
        env.engine.set(step, StepBehavior::Hold);
    }

    env.orchestrator
        .submit("steady.wav", PipelineSpec::transcription())
        .await
        .unwrap();

    let mut last_progress = 0u8;
    for expected_step in 1..=4usize {
        env.engine.release_one();
        let job = wait_until(&env.orchestrator, "steady.wav", move |j| {
            j.current_step >= expected_step
        })
        .await;
        assert!(job.progress >= last_progress);
        last_progress = job.progress;
    }

    let job =
        wait_until(&env.orchestrator, "steady.wav", |j| j.status == JobStatus::Complete).await;
    assert_eq!(job.progress, 100);
}

#[tokio::test]
async fn test_recovery_marks_interrupted_jobs_once() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("jobs.db").display());
    let store = Arc::new(SqliteJobStore::new(&url).await.unwrap());

    // simulate a crash: a record persisted mid-run, no worker alive anymore
    let mut interrupted = Job::new("orphan.wav", 7, PipelineSpec::transcription());
    interrupted.status = JobStatus::Processing;
    interrupted.current_step = 1;
    interrupted.progress = 25;
    store.save(&interrupted.clone().into()).await.unwrap();

    let mut untouched = Job::new("done.wav", 3, PipelineSpec::transcription());
    untouched.status = JobStatus::Complete;
    store.save(&untouched.into()).await.unwrap();

    let artifacts = Arc::new(ArtifactStore::new(dir.path().join("data")).unwrap());
    let orchestrator = bootstrap(store, ScriptedEngine::new(), artifacts, 1)
        .await
        .unwrap();

    let job = orchestrator.status("orphan.wav").await.unwrap();
    assert_eq!(job.status, JobStatus::Stopped);
    assert!(job.warnings.iter().any(|w| w.contains("restart")));
    // partial state from the interrupted run survives
    assert_eq!(job.current_step, 1);

    let done = orchestrator.status("done.wav").await.unwrap();
    assert_eq!(done.status, JobStatus::Complete);

    // the notice is reported exactly once
    assert_eq!(orchestrator.take_recovered().await, vec!["orphan.wav".to_string()]);
    assert!(orchestrator.take_recovered().await.is_empty());
}

#[tokio::test]
async fn test_stale_generation_never_clobbers_a_newer_run() {
    let env = setup(1).await;

    env.orchestrator
        .submit("raced.wav", PipelineSpec::transcription())
        .await
        .unwrap();
    let first =
        wait_until(&env.orchestrator, "raced.wav", |j| j.status == JobStatus::Complete).await;

    let second = env.orchestrator.retry("raced.wav").await.unwrap();
    let newer =
        wait_until(&env.orchestrator, "raced.wav", |j| {
            j.status == JobStatus::Complete && j.generation == second.generation
        })
        .await;

    // a worker from the superseded first run attempts a late write
    let mut stale = first.clone();
    stale.status = JobStatus::Processing;
    stale.progress = 10;
    env.store.save(&stale.into()).await.unwrap();

    let job = env.orchestrator.status("raced.wav").await.unwrap();
    assert_eq!(job.generation, newer.generation);
    assert_eq!(job.status, JobStatus::Complete);
}
