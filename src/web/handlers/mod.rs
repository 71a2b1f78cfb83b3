use axum::Router;
use std::sync::Arc;
use crate::AppContext;

pub mod jobs;
pub mod recovery;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .nest("/jobs", jobs::jobs_router(ctx.orchestrator.clone()))
        .nest("/recovery", recovery::recovery_router(ctx.orchestrator.clone()))
}
