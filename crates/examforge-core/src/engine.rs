//! Exam engine.
//!
//! Wires the pattern catalog, model resolver, progress state machine and
//! evaluation orchestrator together behind one entry point. Front ends hold
//! an `ExamEngine` and call into it; nothing here knows about HTTP or the
//! terminal.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::PatternCatalog;
use crate::error::{ExamError, Result};
use crate::evaluation::{Evaluation, EvaluationOrchestrator, EvaluationPolicy};
use crate::model::{Exam, ExamRecord, ExamStatus, Student};
use crate::parser::parse_paper;
use crate::progress::{ExamProgress, UploadPolicy};
use crate::prompt::{build_generation_prompt, PaperRequest};
use crate::report::ExamSummary;
use crate::resolver::{FallbackPolicy, ModelResolver, RuntimeInfo};
use crate::traits::{BlobStore, ExamStore, GenerationBackend};

/// Everything needed to generate a new exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExamRequest {
    pub student: Student,
    #[serde(flatten)]
    pub paper: PaperRequest,
    /// Custom duration. Never extends the pattern's duration.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

/// Engine tuning, usually built from the configuration file.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub fallback: FallbackPolicy,
    pub uploads: UploadPolicy,
    pub evaluation: EvaluationPolicy,
}

/// The duration an exam actually runs for.
///
/// A shorter request is honoured, a longer one is clamped to the pattern's
/// default, and zero is rejected.
pub fn effective_duration(default_minutes: u32, requested: Option<u32>) -> Result<u32> {
    match requested {
        None => Ok(default_minutes),
        Some(0) => Err(ExamError::InvalidRequest(
            "duration must be at least one minute".into(),
        )),
        Some(minutes) => Ok(minutes.min(default_minutes)),
    }
}

fn validate_request(request: &CreateExamRequest) -> Result<()> {
    if request.student.name.trim().is_empty() {
        return Err(ExamError::InvalidRequest("student name is required".into()));
    }
    let email = request.student.email.trim();
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(ExamError::InvalidRequest(format!(
            "invalid student email {email:?}"
        )));
    }
    if request.paper.subject.trim().is_empty() {
        return Err(ExamError::InvalidRequest("subject is required".into()));
    }
    Ok(())
}

pub struct ExamEngine {
    catalog: Arc<PatternCatalog>,
    resolver: Arc<ModelResolver>,
    progress: Arc<ExamProgress>,
    evaluator: EvaluationOrchestrator,
}

impl ExamEngine {
    pub fn new(
        catalog: PatternCatalog,
        backend: Arc<dyn GenerationBackend>,
        store: Arc<dyn ExamStore>,
        blobs: Arc<dyn BlobStore>,
        config: EngineConfig,
    ) -> Self {
        let resolver = Arc::new(ModelResolver::new(backend, config.fallback));
        let progress = Arc::new(ExamProgress::new(store, blobs, config.uploads));
        let evaluator =
            EvaluationOrchestrator::new(progress.clone(), resolver.clone(), config.evaluation);
        Self {
            catalog: Arc::new(catalog),
            resolver,
            progress,
            evaluator,
        }
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    /// Lifecycle operations: start, answer, upload, next, submit, timer.
    pub fn progress(&self) -> &ExamProgress {
        &self.progress
    }

    pub fn runtime_info(&self) -> RuntimeInfo {
        self.resolver.runtime_info()
    }

    /// Generate a paper for the request and persist it as a CREATED exam.
    pub async fn create_exam(&self, request: CreateExamRequest) -> Result<ExamRecord> {
        validate_request(&request)?;
        let paper_request = &request.paper;
        let pattern = self
            .catalog
            .lookup(paper_request.board, paper_request.class_num)?;
        let duration_minutes = effective_duration(pattern.duration_minutes, request.duration_minutes)?;

        let prompt = build_generation_prompt(paper_request, pattern);
        let response = self.resolver.generate(&prompt, &[]).await?;
        let parsed = parse_paper(&response.text, pattern)?;

        let now = Utc::now();
        let record = ExamRecord {
            exam: Exam {
                id: Uuid::new_v4(),
                student: request.student,
                board: paper_request.board,
                class_num: paper_request.class_num,
                subject: paper_request.subject.trim().to_string(),
                chapter_focus: paper_request.chapter_focus.clone(),
                difficulty: paper_request.difficulty,
                duration_minutes,
                total_marks: parsed.total_marks,
                status: ExamStatus::Created,
                started_at: None,
                submitted_at: None,
                evaluated_at: None,
                current_question_index: 0,
                time_remaining_snapshot: None,
                paper: parsed.paper,
                evaluation_report: None,
                created_at: now,
                updated_at: now,
                version: 0,
            },
            questions: parsed.questions,
            answers: Vec::new(),
        };
        record.check_invariants()?;
        self.progress.store().insert(record.clone()).await?;

        info!(
            exam_id = %record.exam.id,
            board = %record.exam.board,
            class = record.exam.class_num,
            subject = %record.exam.subject,
            questions = record.question_count(),
            model = %response.model,
            "exam created"
        );
        Ok(record)
    }

    /// Evaluate an exam, submitting it first when needed.
    pub async fn evaluate(&self, exam_id: Uuid) -> Result<Evaluation> {
        self.evaluator.evaluate(exam_id).await
    }

    pub async fn summary(&self, exam_id: Uuid) -> Result<ExamSummary> {
        let record = self.progress.load(exam_id).await?;
        Ok(ExamSummary::from_record(&record))
    }

    /// The stored evaluation report.
    pub async fn report(&self, exam_id: Uuid) -> Result<String> {
        self.progress
            .load(exam_id)
            .await?
            .exam
            .evaluation_report
            .ok_or_else(|| ExamError::NotFound(format!("evaluation report for exam {exam_id}")))
    }

    /// Delete an exam with its questions, answers and uploaded files.
    pub async fn delete_exam(&self, exam_id: Uuid) -> Result<ExamRecord> {
        let record = self
            .progress
            .store()
            .delete(exam_id)
            .await?
            .ok_or_else(|| ExamError::NotFound(format!("exam {exam_id}")))?;

        let blobs = self.progress.blobs();
        for file in record.answers.iter().flat_map(|a| a.files.iter()) {
            if let Err(e) = blobs.remove(&file.storage_path).await {
                warn!(path = %file.storage_path, "failed to remove uploaded file: {e}");
            }
        }
        info!(exam_id = %exam_id, "exam deleted");
        Ok(record)
    }

    /// Every stored exam, newest first.
    pub async fn list_exams(&self) -> Result<Vec<Exam>> {
        self.progress.store().list().await
    }
}
