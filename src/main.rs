#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use tracing::info;
use std::sync::Arc;
use std::net::SocketAddr;
use std::fs;
use scribe_rs::{engine::HttpEngine, jobs, utils::logger, AppContext};
use scribe_rs::storage::artifact::ArtifactStore;
use scribe_rs::storage::job::sqlite::SqliteJobStore;

#[tokio::main]
async fn main() -> Result<()> {
    fs::create_dir_all("./logs")?;
    let _guard = logger::init("./logs".to_string())?;
    scribe_rs::init_env();

    info!("Starting transcription job service...");

    info!("Initializing Storage...");
    let store = Arc::new(SqliteJobStore::new(&scribe_rs::SQLITE_PATH).await?);
    let artifacts = Arc::new(ArtifactStore::new(scribe_rs::DATA_PATH.as_str())?);

    info!("Initializing Processing Engine client at {}...", *scribe_rs::ENGINE_URL);
    let engine = Arc::new(HttpEngine::new(scribe_rs::ENGINE_URL.clone()));

    // recovery runs before the listener starts, so no submission can observe
    // a stale in-progress record
    info!("Reconciling persisted jobs...");
    let orchestrator =
        jobs::bootstrap(store, engine, artifacts, *scribe_rs::MAX_CONCURRENT_JOBS).await?;

    let ctx = Arc::new(AppContext { orchestrator });

    let addr = SocketAddr::from(([127, 0, 0, 1], 7100));
    info!("Starting HTTP server at http://{}", addr);

    match scribe_rs::web::start_server(ctx, addr).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            tracing::error!("Server error: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
