pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

pub use http::HttpEngine;

/// Input handed to one pipeline step: the job key (the engine resolves the
/// audio bytes from it) and the previous step's output payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInput {
    pub key: String,
    pub payload: Value,
}

impl StepInput {
    pub fn next(key: &str, payload: Value) -> Self {
        Self { key: key.to_string(), payload }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutput {
    pub payload: Value,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineError {
    pub step: String,
    pub message: String,
    pub details: Option<String>,
}

impl EngineError {
    pub fn new(step: &str, message: impl Into<String>) -> Self {
        Self { step: step.to_string(), message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.details {
            Some(details) => write!(f, "step {} failed: {} ({})", self.step, self.message, details),
            None => write!(f, "step {} failed: {}", self.step, self.message),
        }
    }
}

impl std::error::Error for EngineError {}

/// Capability interface to the external audio-processing engine. Calls must be
/// safe to repeat; the engine keeps no cross-call state the orchestrator needs
/// to know about.
#[async_trait]
pub trait ProcessingEngine: Send + Sync + 'static {
    async fn run_step(&self, step: &str, input: StepInput) -> Result<StepOutput, EngineError>;
}
