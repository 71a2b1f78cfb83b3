use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{EngineError, ProcessingEngine, StepInput, StepOutput};

/// Engine adapter for a processing service reachable over HTTP. Each step is
/// one POST to `<base>/steps/<name>`; the service reads the audio for the key
/// itself, so only the key and the previous payload travel on the wire.
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct StepRequest<'a> {
    key: &'a str,
    input: &'a Value,
}

#[derive(Debug, Deserialize)]
struct StepResponse {
    output: Value,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StepErrorBody {
    message: String,
    details: Option<String>,
}

impl HttpEngine {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ProcessingEngine for HttpEngine {
    async fn run_step(&self, step: &str, input: StepInput) -> Result<StepOutput, EngineError> {
        let url = format!("{}/steps/{}", self.base_url, step);
        debug!("running step {} for {} via {}", step, input.key, url);

        let response = self
            .client
            .post(&url)
            .json(&StepRequest { key: &input.key, input: &input.payload })
            .send()
            .await
            .map_err(|e| {
                EngineError::new(step, "engine request failed").with_details(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            // the engine reports failures as a JSON body; fall back to the
            // raw text when it does not
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<StepErrorBody>(&body) {
                Ok(err) => EngineError {
                    step: step.to_string(),
                    message: err.message,
                    details: err.details,
                },
                Err(_) => EngineError::new(step, format!("engine returned {}", status))
                    .with_details(body),
            });
        }

        let parsed: StepResponse = response.json().await.map_err(|e| {
            EngineError::new(step, "invalid engine response").with_details(e.to_string())
        })?;

        Ok(StepOutput { payload: parsed.output, warnings: parsed.warnings })
    }
}
