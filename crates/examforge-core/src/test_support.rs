//! Shared fixtures for unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{ExamError, Result};
use crate::model::{
    Board, Difficulty, Exam, ExamRecord, ExamStatus, Question, QuestionType, Student,
};
use crate::progress::{ExamProgress, UploadPolicy};
use crate::traits::{
    BlobStore, ExamStore, GenerateRequest, GenerateResponse, GenerationBackend, Modality,
    ModelInfo,
};

#[derive(Default)]
pub struct TestStore {
    records: Mutex<HashMap<Uuid, ExamRecord>>,
    /// Number of upcoming commits to fail with a conflict.
    pub conflicts: AtomicU32,
}

#[async_trait]
impl ExamStore for TestStore {
    async fn insert(&self, record: ExamRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.exam.id, record);
        Ok(())
    }

    async fn load(&self, exam_id: Uuid) -> Result<ExamRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&exam_id)
            .cloned()
            .ok_or_else(|| ExamError::NotFound(format!("exam {exam_id}")))
    }

    async fn commit(&self, mut record: ExamRecord) -> Result<ExamRecord> {
        let id = record.exam.id;
        if self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            // Simulate another writer winning the race.
            let mut records = self.records.lock().unwrap();
            if let Some(stored) = records.get_mut(&id) {
                stored.exam.version += 1;
            }
            return Err(ExamError::Conflict(id));
        }
        let mut records = self.records.lock().unwrap();
        let stored = records
            .get_mut(&id)
            .ok_or_else(|| ExamError::NotFound(format!("exam {id}")))?;
        if stored.exam.version != record.exam.version {
            return Err(ExamError::Conflict(id));
        }
        record.exam.version += 1;
        *stored = record.clone();
        Ok(record)
    }

    async fn delete(&self, exam_id: Uuid) -> Result<Option<ExamRecord>> {
        Ok(self.records.lock().unwrap().remove(&exam_id))
    }

    async fn list(&self) -> Result<Vec<Exam>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .map(|r| r.exam.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct TestBlobs {
    pub blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

#[async_trait]
impl BlobStore for TestBlobs {
    async fn save(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
        self.blobs
            .lock()
            .unwrap()
            .insert(suggested_name.to_string(), bytes.to_vec());
        Ok(suggested_name.to_string())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ExamError::Blob(format!("{path} not found")))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.blobs.lock().unwrap().remove(path);
        Ok(())
    }
}

/// Backend answering from a queue of canned results; listing is one model.
#[derive(Default)]
pub struct CannedBackend {
    pub replies: Mutex<VecDeque<anyhow::Result<String>>>,
    pub requests: Mutex<Vec<GenerateRequest>>,
}

impl CannedBackend {
    pub fn with_replies(replies: Vec<anyhow::Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationBackend for CannedBackend {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no canned reply left")));
        reply.map(|text| GenerateResponse {
            text,
            model: request.model.clone(),
            credential_index: Some(0),
            latency_ms: 1,
        })
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "models/gemini-2.5-flash".into(),
            supports_generation: true,
            modality: Modality::Text,
        }])
    }
}

pub fn question(seq: u32, question_type: QuestionType) -> Question {
    let mut q = Question {
        id: Uuid::new_v4(),
        section: if question_type == QuestionType::Mcq { "A" } else { "B" }.into(),
        sequence_number: seq,
        text: format!("Question {seq}"),
        question_type,
        marks: if question_type == QuestionType::Mcq { 1 } else { 5 },
        has_internal_choice: false,
        alternative_text: None,
        options: None,
        correct_answer: None,
    };
    if question_type == QuestionType::Mcq {
        q.options = Some(
            ["A", "B", "C", "D"]
                .iter()
                .map(|l| (l.to_string(), format!("option {l}")))
                .collect(),
        );
        q.correct_answer = Some("B".into());
    }
    q
}

/// A CREATED exam with one MCQ, one internal-choice long answer and one
/// short answer.
pub fn record() -> ExamRecord {
    let now = Utc::now();
    let mut choice = question(2, QuestionType::LongAnswer);
    choice.has_internal_choice = true;
    choice.alternative_text = Some("Alternative to question 2".into());
    ExamRecord {
        exam: Exam {
            id: Uuid::new_v4(),
            student: Student {
                name: "Meera".into(),
                email: "meera@example.com".into(),
            },
            board: Board::Cbse,
            class_num: 10,
            subject: "Mathematics".into(),
            chapter_focus: None,
            difficulty: Difficulty::Medium,
            duration_minutes: 180,
            total_marks: 80,
            status: ExamStatus::Created,
            started_at: None,
            submitted_at: None,
            evaluated_at: None,
            current_question_index: 0,
            time_remaining_snapshot: None,
            paper: serde_json::json!({"instructions": ["Answer all questions."]}),
            evaluation_report: None,
            created_at: now,
            updated_at: now,
            version: 0,
        },
        questions: vec![
            question(1, QuestionType::Mcq),
            choice,
            question(3, QuestionType::ShortAnswer),
        ],
        answers: vec![],
    }
}

pub struct Harness {
    pub store: Arc<TestStore>,
    pub blobs: Arc<TestBlobs>,
    pub progress: Arc<ExamProgress>,
    pub record: ExamRecord,
}

pub async fn harness() -> Harness {
    let store = Arc::new(TestStore::default());
    let blobs = Arc::new(TestBlobs::default());
    let record = record();
    store.insert(record.clone()).await.unwrap();
    let progress = Arc::new(ExamProgress::new(
        store.clone(),
        blobs.clone(),
        UploadPolicy::default(),
    ));
    Harness {
        store,
        blobs,
        progress,
        record,
    }
}
