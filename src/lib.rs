pub mod engine;
pub mod jobs;
pub mod storage;
pub mod utils;
pub mod web;

use std::{env, sync::Arc};
use jobs::Orchestrator;
use once_cell::sync::Lazy;

pub struct AppContext {
    pub orchestrator: Arc<Orchestrator>,
}

const SCRIBE_SQLITE_PATH: &str = "sqlite://./scribe_data/database/jobs.db?mode=rwc";
const SCRIBE_DATA_PATH: &str = "./scribe_data/transcriptions/";
const SCRIBE_ENGINE_URL: &str = "http://127.0.0.1:9200";

pub static SQLITE_PATH: Lazy<String> = Lazy::new(|| {
    match env::var("SCRIBE_SQLITE_PATH") {
        Ok(path) => path,
        Err(_) => {
            dotenv::var("SCRIBE_SQLITE_PATH").unwrap_or_else(|_| SCRIBE_SQLITE_PATH.to_string())
        }
    }
});

pub static DATA_PATH: Lazy<String> = Lazy::new(|| {
    match env::var("SCRIBE_DATA_PATH") {
        Ok(path) => path,
        Err(_) => {
            dotenv::var("SCRIBE_DATA_PATH").unwrap_or_else(|_| SCRIBE_DATA_PATH.to_string())
        }
    }
});

pub static ENGINE_URL: Lazy<String> = Lazy::new(|| {
    match env::var("SCRIBE_ENGINE_URL") {
        Ok(url) => url,
        Err(_) => {
            dotenv::var("SCRIBE_ENGINE_URL").unwrap_or_else(|_| SCRIBE_ENGINE_URL.to_string())
        }
    }
});

/// Total simultaneously running pipelines; the engine usually has a single
/// accelerator, so the default is 1.
pub static MAX_CONCURRENT_JOBS: Lazy<usize> = Lazy::new(|| {
    env::var("SCRIBE_MAX_CONCURRENT_JOBS")
        .or_else(|_| dotenv::var("SCRIBE_MAX_CONCURRENT_JOBS"))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1)
});

pub fn init_env() {
    dotenv::dotenv().ok();

    if let Some(db_path) = SQLITE_PATH.strip_prefix("sqlite://") {
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        if let Some(dir) = std::path::Path::new(db_path).parent() {
            std::fs::create_dir_all(dir).unwrap_or_else(|e| {
                eprintln!("Failed to create database directory: {}", e);
            });
        }
    }
}
