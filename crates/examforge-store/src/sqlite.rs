//! SQLite-backed exam store.
//!
//! Each exam aggregate is one row: its id, its version and the record as
//! JSON. A commit is a single `UPDATE ... WHERE version = ?`, so the database
//! decides compare-and-swap races, including races between processes sharing
//! the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};
use uuid::Uuid;

use examforge_core::error::{ExamError, Result};
use examforge_core::model::{Exam, ExamRecord};
use examforge_core::traits::ExamStore;

/// How long a writer waits for another process's transaction.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS exams (
    id TEXT PRIMARY KEY NOT NULL,
    version INTEGER NOT NULL,
    record TEXT NOT NULL
)";

fn db_err(e: sqlx::Error) -> ExamError {
    ExamError::Store(e.to_string())
}

fn encode(record: &ExamRecord) -> Result<String> {
    serde_json::to_string(record)
        .map_err(|e| ExamError::Store(format!("failed to serialize exam {}: {e}", record.exam.id)))
}

fn decode(json: &str) -> Result<ExamRecord> {
    serde_json::from_str(json).map_err(|e| ExamError::Store(format!("corrupt exam row: {e}")))
}

fn version(v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| ExamError::Store(format!("exam version {v} out of range")))
}

pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                ExamError::Store(format!("failed to create {}: {e}", dir.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| ExamError::Store(format!("failed to open {}: {e}", path.display())))?;
        sqlx::query(SCHEMA).execute(&pool).await.map_err(db_err)?;

        info!(path = %path.display(), "exam store opened");
        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ExamStore for SqliteStore {
    async fn insert(&self, record: ExamRecord) -> Result<()> {
        let id = record.exam.id;
        let result = sqlx::query("INSERT INTO exams (id, version, record) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(version(record.exam.version)?)
            .bind(encode(&record)?)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(ExamError::Store(format!("exam {id} already exists")))
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn load(&self, exam_id: Uuid) -> Result<ExamRecord> {
        let row = sqlx::query_scalar::<_, String>("SELECT record FROM exams WHERE id = ?")
            .bind(exam_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(json) => decode(&json),
            None => Err(ExamError::NotFound(format!("exam {exam_id}"))),
        }
    }

    async fn commit(&self, mut record: ExamRecord) -> Result<ExamRecord> {
        let id = record.exam.id;
        let expected = record.exam.version;
        record.exam.version += 1;

        let updated =
            sqlx::query("UPDATE exams SET version = ?, record = ? WHERE id = ? AND version = ?")
                .bind(version(record.exam.version)?)
                .bind(encode(&record)?)
                .bind(id.to_string())
                .bind(version(expected)?)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        if updated.rows_affected() == 1 {
            return Ok(record);
        }

        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM exams WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        if exists == 0 {
            return Err(ExamError::NotFound(format!("exam {id}")));
        }
        debug!(exam_id = %id, offered = expected, "stale commit");
        Err(ExamError::Conflict(id))
    }

    async fn delete(&self, exam_id: Uuid) -> Result<Option<ExamRecord>> {
        let row = sqlx::query_scalar::<_, String>("DELETE FROM exams WHERE id = ? RETURNING record")
            .bind(exam_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_deref().map(decode).transpose()
    }

    async fn list(&self) -> Result<Vec<Exam>> {
        let rows = sqlx::query_scalar::<_, String>("SELECT record FROM exams")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let mut exams = rows
            .iter()
            .map(|json| decode(json).map(|r| r.exam))
            .collect::<Result<Vec<_>>>()?;
        exams.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(exams)
    }
}
