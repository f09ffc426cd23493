//! Evaluation orchestrator.
//!
//! Turns a submitted exam into an evaluation report: builds the examiner
//! prompt, gathers uploaded documents as inline attachments, calls the model
//! through the resolver with bounded retries, and persists the report.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ExamError, Result};
use crate::model::{ExamRecord, ExamStatus};
use crate::progress::ExamProgress;
use crate::prompt::build_evaluation_prompt;
use crate::report::{extract_marks, Marks};
use crate::resolver::ModelResolver;
use crate::traits::{Attachment, GenerateResponse};

/// How hard to try before giving up on an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationPolicy {
    /// Full model calls, including the first.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
}

impl Default for EvaluationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Outcome of [`EvaluationOrchestrator::evaluate`].
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub exam_id: Uuid,
    /// Report markdown, verbatim.
    pub report: String,
    pub evaluated_at: Option<DateTime<Utc>>,
    /// Model that wrote the report; `None` when it was already stored.
    pub model: Option<String>,
    /// True when no model call was made.
    pub cached: bool,
    pub marks: Option<Marks>,
}

impl Evaluation {
    fn stored(record: &ExamRecord) -> Self {
        let report = record.exam.evaluation_report.clone().unwrap_or_default();
        Self {
            exam_id: record.exam.id,
            marks: extract_marks(&report),
            report,
            evaluated_at: record.exam.evaluated_at,
            model: None,
            cached: true,
        }
    }
}

/// MIME type sent with an uploaded document.
pub fn mime_for(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

pub struct EvaluationOrchestrator {
    progress: Arc<ExamProgress>,
    resolver: Arc<ModelResolver>,
    policy: EvaluationPolicy,
}

impl EvaluationOrchestrator {
    pub fn new(
        progress: Arc<ExamProgress>,
        resolver: Arc<ModelResolver>,
        policy: EvaluationPolicy,
    ) -> Self {
        Self {
            progress,
            resolver,
            policy,
        }
    }

    pub fn policy(&self) -> &EvaluationPolicy {
        &self.policy
    }

    /// Evaluate an exam, submitting it first if the student never did.
    ///
    /// An already evaluated exam returns its stored report without calling
    /// the model. If another evaluation persists first, its report is kept
    /// and returned.
    pub async fn evaluate(&self, exam_id: Uuid) -> Result<Evaluation> {
        let record = self.progress.load(exam_id).await?;
        if record.exam.status == ExamStatus::Evaluated {
            return Ok(Evaluation::stored(&record));
        }

        let record = self.progress.ensure_submitted(exam_id).await?;
        if record.exam.status == ExamStatus::Evaluated {
            return Ok(Evaluation::stored(&record));
        }

        let prompt = build_evaluation_prompt(&record);
        let attachments = self.collect_attachments(&record).await;
        info!(
            exam_id = %exam_id,
            questions = record.question_count(),
            attachments = attachments.len(),
            "evaluating exam"
        );

        let response = self.call_with_retries(exam_id, &prompt, &attachments).await?;
        let report = response.text;

        let (record, persisted) = self
            .progress
            .mutate(exam_id, |rec, now| match rec.exam.status {
                ExamStatus::Evaluated => Ok(false),
                ExamStatus::Submitted => {
                    rec.exam.status = ExamStatus::Evaluated;
                    rec.exam.evaluation_report = Some(report.clone());
                    rec.exam.evaluated_at = Some(now);
                    Ok(true)
                }
                status => Err(ExamError::StateTransition {
                    action: "evaluate",
                    status,
                }),
            })
            .await?;

        if !persisted {
            info!(exam_id = %exam_id, "exam was evaluated concurrently, keeping stored report");
            return Ok(Evaluation::stored(&record));
        }

        let marks = extract_marks(&report);
        info!(
            exam_id = %exam_id,
            model = %response.model,
            marks = ?marks.map(|m| m.achieved),
            "exam evaluated"
        );
        Ok(Evaluation {
            exam_id,
            report,
            evaluated_at: record.exam.evaluated_at,
            model: Some(response.model),
            cached: false,
            marks,
        })
    }

    /// Read every uploaded document in question order. Unreadable files are
    /// skipped; the prompt still names them.
    async fn collect_attachments(&self, record: &ExamRecord) -> Vec<Attachment> {
        let files: Vec<_> = record
            .questions
            .iter()
            .filter_map(|q| record.answer_for(q.id))
            .flat_map(|a| a.files.iter())
            .collect();

        let blobs = self.progress.blobs();
        let reads = join_all(files.iter().map(|f| blobs.read(&f.storage_path))).await;

        files
            .into_iter()
            .zip(reads)
            .filter_map(|(file, read)| match read {
                Ok(bytes) => Some(Attachment {
                    filename: file.filename.clone(),
                    mime_type: mime_for(&file.filename).to_string(),
                    bytes,
                }),
                Err(e) => {
                    warn!(path = %file.storage_path, "skipping unreadable attachment: {e}");
                    None
                }
            })
            .collect()
    }

    async fn call_with_retries(
        &self,
        exam_id: Uuid,
        prompt: &str,
        attachments: &[Attachment],
    ) -> Result<GenerateResponse> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
            match self.resolver.generate(prompt, attachments).await {
                Ok(response) if !response.text.trim().is_empty() => return Ok(response),
                Ok(response) => {
                    last_error = format!("{} returned an empty report", response.model);
                }
                Err(e) => last_error = e.to_string(),
            }
            warn!(exam_id = %exam_id, attempt, "evaluation attempt failed: {last_error}");
        }

        Err(ExamError::EvaluationFailed {
            attempts,
            last_error,
        })
    }
}
