use axum::{
    routing::{get, post},
    Router,
    extract::{Path, State},
    response::IntoResponse,
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use serde::Serialize;

use crate::jobs::{JobError, Orchestrator, PipelineSpec};
use tracing::error;

pub fn jobs_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/", get(list_jobs))
        .route("/:key", post(submit_job).get(get_job).delete(delete_job))
        .route("/:key/result", get(get_result))
        .route("/:key/retry", post(retry_job))
        .route("/:key/cancel", post(cancel_job))
        .with_state(orchestrator)
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

fn error_status(error: &JobError) -> StatusCode {
    match error {
        JobError::NotFound => StatusCode::NOT_FOUND,
        JobError::AlreadyRunning | JobError::NotRunning | JobError::Busy => StatusCode::CONFLICT,
        JobError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// Submit endpoint; a finished job is returned as-is (use retry to re-run)
async fn submit_job(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match orchestrator.submit(&key, PipelineSpec::transcription()).await {
        Ok(outcome) => {
            let status = if outcome.started() { StatusCode::CREATED } else { StatusCode::OK };
            (status, Json(ApiResponse::success(outcome.job().clone())))
        }
        Err(e) => {
            error!("Failed to submit job {}: {}", key, e);
            (error_status(&e), Json(ApiResponse::error(e.to_string())))
        }
    }
}

// Status endpoint, polled by the UI
async fn get_job(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match orchestrator.status(&key).await {
        Ok(job) => (StatusCode::OK, Json(ApiResponse::success(job))),
        Err(e) => (error_status(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

async fn list_jobs(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> impl IntoResponse {
    match orchestrator.list().await {
        Ok(jobs) => (StatusCode::OK, Json(ApiResponse::success(jobs))),
        Err(e) => {
            error!("Failed to list jobs: {}", e);
            (error_status(&e), Json(ApiResponse::error(e.to_string())))
        }
    }
}

// Finished transcript endpoint
async fn get_result(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match orchestrator.result(&key).await {
        Ok(result) => (StatusCode::OK, Json(ApiResponse::success(result))),
        Err(e) => (error_status(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

async fn retry_job(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match orchestrator.retry(&key).await {
        Ok(job) => (StatusCode::CREATED, Json(ApiResponse::success(job))),
        Err(e) => {
            error!("Failed to retry job {}: {}", key, e);
            (error_status(&e), Json(ApiResponse::error(e.to_string())))
        }
    }
}

async fn cancel_job(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match orchestrator.cancel(&key).await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::<()>::success(()))),
        Err(e) => (error_status(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

async fn delete_job(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match orchestrator.delete(&key).await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::<()>::success(()))),
        Err(e) => {
            error!("Failed to delete job {}: {}", key, e);
            (error_status(&e), Json(ApiResponse::error(e.to_string())))
        }
    }
}
