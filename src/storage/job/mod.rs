use async_trait::async_trait;
use anyhow::Result;
use crate::storage::job::entity::Model as JobRecord;
pub mod sqlite;
pub mod entity;
pub mod mapping;

pub use sqlite::SqliteJobStore;

#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Atomic full-record overwrite; writes from a superseded generation are
    /// discarded.
    async fn save(&self, record: &JobRecord) -> Result<()>;
    async fn load(&self, key: &str) -> Result<Option<JobRecord>>;
    async fn load_all(&self) -> Result<Vec<JobRecord>>;
    async fn delete(&self, key: &str) -> Result<()>;
}
