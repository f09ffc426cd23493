//! In-memory exam store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use examforge_core::error::{ExamError, Result};
use examforge_core::model::{Exam, ExamRecord};
use examforge_core::traits::ExamStore;

/// Exam store guarded by one lock. Every write is a compare-and-swap on the
/// exam version. Exams live as long as the store.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Uuid, ExamRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn insert(&self, record: ExamRecord) -> Result<()> {
        let id = record.exam.id;
        let mut records = self.records.lock().await;
        if records.contains_key(&id) {
            return Err(ExamError::Store(format!("exam {id} already exists")));
        }
        records.insert(id, record);
        Ok(())
    }

    async fn load(&self, exam_id: Uuid) -> Result<ExamRecord> {
        self.records
            .lock()
            .await
            .get(&exam_id)
            .cloned()
            .ok_or_else(|| ExamError::NotFound(format!("exam {exam_id}")))
    }

    async fn commit(&self, mut record: ExamRecord) -> Result<ExamRecord> {
        let id = record.exam.id;
        let mut records = self.records.lock().await;
        let stored = records
            .get(&id)
            .ok_or_else(|| ExamError::NotFound(format!("exam {id}")))?;
        if stored.exam.version != record.exam.version {
            debug!(exam_id = %id, stored = stored.exam.version, offered = record.exam.version, "stale commit");
            return Err(ExamError::Conflict(id));
        }

        record.exam.version += 1;
        records.insert(id, record.clone());
        Ok(record)
    }

    async fn delete(&self, exam_id: Uuid) -> Result<Option<ExamRecord>> {
        Ok(self.records.lock().await.remove(&exam_id))
    }

    async fn list(&self) -> Result<Vec<Exam>> {
        let records = self.records.lock().await;
        let mut exams: Vec<Exam> = records.values().map(|r| r.exam.clone()).collect();
        exams.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(exams)
    }
}
