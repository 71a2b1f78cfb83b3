use async_trait::async_trait;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::JobStore;
use crate::storage::job::entity::Model as JobRecord;

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Initializing SQLite job store at {}", database_url);
        let pool = SqlitePool::connect(database_url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                key TEXT PRIMARY KEY,
                generation INTEGER NOT NULL,
                status TEXT NOT NULL,
                steps TEXT NOT NULL,
                current_step INTEGER NOT NULL DEFAULT 0,
                progress INTEGER NOT NULL DEFAULT 0,
                warnings TEXT NOT NULL,
                error TEXT,
                result TEXT,
                cancel_requested INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                started_at TEXT,
                updated_at TEXT NOT NULL,
                finished_at TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    fn row_to_record(&self, row: sqlx::sqlite::SqliteRow) -> Result<JobRecord> {
        Ok(JobRecord {
            key: row.get("key"),
            generation: row.get("generation"),
            status: row.get("status"),
            steps: row.get("steps"),
            current_step: row.get("current_step"),
            progress: row.get("progress"),
            warnings: row.get("warnings"),
            error: row.get("error"),
            result: row.get("result"),
            cancel_requested: row.get("cancel_requested"),
            created_at: DateTime::parse_from_rfc3339(row.get("created_at"))?.with_timezone(&Utc),
            started_at: row.get::<Option<String>, _>("started_at")
                .map(|t| DateTime::parse_from_rfc3339(&t))
                .transpose()?
                .map(|t| t.with_timezone(&Utc)),
            updated_at: DateTime::parse_from_rfc3339(row.get("updated_at"))?.with_timezone(&Utc),
            finished_at: row.get::<Option<String>, _>("finished_at")
                .map(|t| DateTime::parse_from_rfc3339(&t))
                .transpose()?
                .map(|t| t.with_timezone(&Utc)),
        })
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn save(&self, record: &JobRecord) -> Result<()> {
        // full-record upsert, guarded so a write stamped with a superseded
        // generation leaves the row untouched
        sqlx::query(
            r#"
            INSERT INTO jobs
            (key, generation, status, steps, current_step, progress, warnings,
             error, result, cancel_requested, created_at, started_at, updated_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                generation = excluded.generation,
                status = excluded.status,
                steps = excluded.steps,
                current_step = excluded.current_step,
                progress = excluded.progress,
                warnings = excluded.warnings,
                error = excluded.error,
                result = excluded.result,
                cancel_requested = excluded.cancel_requested,
                started_at = excluded.started_at,
                updated_at = excluded.updated_at,
                finished_at = excluded.finished_at
            WHERE excluded.generation >= jobs.generation
            "#,
        )
        .bind(&record.key)
        .bind(record.generation)
        .bind(&record.status)
        .bind(&record.steps)
        .bind(record.current_step)
        .bind(record.progress)
        .bind(&record.warnings)
        .bind(&record.error)
        .bind(&record.result)
        .bind(record.cancel_requested)
        .bind(record.created_at.to_rfc3339())
        .bind(record.started_at.map(|t| t.to_rfc3339()))
        .bind(record.updated_at.to_rfc3339())
        .bind(record.finished_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<JobRecord>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(self.row_to_record(row)?),
            None => None,
        })
    }

    async fn load_all(&self) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query("SELECT * FROM jobs ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::new();
        for row in rows {
            records.push(self.row_to_record(row)?);
        }
        Ok(records)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
