use axum::{
    routing::get,
    Router,
    extract::State,
    response::IntoResponse,
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::jobs::ApiResponse;
use crate::jobs::Orchestrator;

pub fn recovery_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/jobs", get(recovered_jobs))
        .with_state(orchestrator)
}

// One-time startup notice: jobs found interrupted at boot. The set is cleared
// on read, so polling clients only see it once.
async fn recovered_jobs(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> impl IntoResponse {
    let recovered = orchestrator.take_recovered().await;
    (StatusCode::OK, Json(ApiResponse::success(recovered)))
}
