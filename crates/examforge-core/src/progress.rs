//! Exam progress state machine.
//!
//! CREATED → IN_PROGRESS → SUBMITTED → EVALUATED. While in progress the
//! student moves forward through the questions one at a time; the pointer
//! only advances once the current question has an answer.
//!
//! Every mutation is load → validate → mutate → invariant check → commit,
//! where the commit is a compare-and-swap on the exam version. Conflicts are
//! retried from a fresh load a bounded number of times.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ExamError, Result};
use crate::model::{
    Answer, Board, ChoiceSelection, Exam, ExamRecord, ExamStatus, Question, QuestionType,
    UploadedFile,
};
use crate::traits::{BlobStore, ExamStore};

/// Commit attempts before a version conflict is surfaced.
pub const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Default maximum upload size (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Which files may be attached to answers.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPolicy {
    /// Lowercase extensions including the dot (".pdf").
    pub allowed_extensions: Vec<String>,
    pub max_file_size: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: vec![".pdf".to_string()],
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl UploadPolicy {
    /// Validate a file and return its sanitized name.
    pub fn check(&self, filename: &str, size: u64) -> Result<String> {
        let name = Path::new(filename.trim())
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| {
                n.chars()
                    .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
                    .collect::<String>()
            })
            .filter(|n| !n.trim_matches(['.', '_']).is_empty())
            .ok_or_else(|| ExamError::UploadRejected(format!("invalid filename {filename:?}")))?;

        let extension = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();
        if !self.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&extension)) {
            return Err(ExamError::UploadRejected(format!(
                "{name}: only {} files are accepted",
                self.allowed_extensions.join(", ")
            )));
        }
        if size == 0 {
            return Err(ExamError::UploadRejected(format!("{name} is empty")));
        }
        if size > self.max_file_size {
            return Err(ExamError::UploadRejected(format!(
                "{name} is {size} bytes, limit is {} bytes",
                self.max_file_size
            )));
        }
        Ok(name)
    }
}

/// Seconds left on the clock. Never negative.
pub fn remaining_seconds(duration_minutes: u32, started_at: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let total = i64::from(duration_minutes) * 60;
    let elapsed = (now - started_at).num_seconds().max(0);
    (total - elapsed).clamp(0, total) as u32
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// A question as shown to the student (no correct answer).
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: Uuid,
    pub sequence_number: u32,
    pub section: String,
    pub question_type: QuestionType,
    pub marks: u32,
    pub text: String,
    pub has_internal_choice: bool,
    pub alternative_text: Option<String>,
    pub options: Option<std::collections::BTreeMap<String, String>>,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            sequence_number: q.sequence_number,
            section: q.section.clone(),
            question_type: q.question_type,
            marks: q.marks,
            text: q.text.clone(),
            has_internal_choice: q.has_internal_choice,
            alternative_text: q.alternative_text.clone(),
            options: q.options.clone(),
        }
    }
}

/// The pointer's question with its answer and gating state.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentQuestion {
    pub exam_id: Uuid,
    pub status: ExamStatus,
    /// 0-based pointer.
    pub question_index: usize,
    pub total_questions: usize,
    /// `None` once every question has been passed.
    pub question: Option<QuestionView>,
    pub answer: Option<Answer>,
    pub can_proceed: bool,
    pub is_last_question: bool,
    pub time_remaining_seconds: u32,
}

/// Countdown state of an exam.
#[derive(Debug, Clone, Serialize)]
pub struct TimerState {
    pub exam_id: Uuid,
    pub status: ExamStatus,
    pub duration_minutes: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub remaining_seconds: u32,
    /// The clock ran out while the exam is still open. Advisory: the caller
    /// decides whether to submit.
    pub auto_submit: bool,
    /// Last value reported by a client.
    pub snapshot_seconds: Option<u32>,
}

/// Fields of an answer to change; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct AnswerUpdate {
    pub typed_answer: Option<String>,
    pub selected_option: Option<String>,
    pub selected_choice: Option<ChoiceSelection>,
}

/// One question of the full paper with the student's answer.
#[derive(Debug, Clone, Serialize)]
pub struct PaperEntry {
    pub question: Question,
    pub answer: Option<Answer>,
}

/// The complete paper, available once the exam is submitted.
#[derive(Debug, Clone, Serialize)]
pub struct FullPaper {
    pub exam_id: Uuid,
    pub board: Board,
    pub class_num: u8,
    pub subject: String,
    pub duration_minutes: u32,
    pub total_marks: u32,
    pub instructions: Vec<String>,
    pub entries: Vec<PaperEntry>,
}

fn timer_state(exam: &Exam, now: DateTime<Utc>) -> TimerState {
    let full = exam.duration_minutes * 60;
    let remaining = match (exam.status, exam.started_at) {
        (ExamStatus::Created, _) | (_, None) => full,
        (ExamStatus::InProgress, Some(started)) => {
            remaining_seconds(exam.duration_minutes, started, now)
        }
        (_, Some(started)) => {
            remaining_seconds(exam.duration_minutes, started, exam.submitted_at.unwrap_or(now))
        }
    };
    TimerState {
        exam_id: exam.id,
        status: exam.status,
        duration_minutes: exam.duration_minutes,
        started_at: exam.started_at,
        remaining_seconds: remaining,
        auto_submit: exam.status == ExamStatus::InProgress && remaining == 0,
        snapshot_seconds: exam.time_remaining_snapshot,
    }
}

fn current_view(record: &ExamRecord, now: DateTime<Utc>) -> CurrentQuestion {
    let exam = &record.exam;
    let question = record.current_question();
    let answer = question.and_then(|q| record.answer_for(q.id)).cloned();
    let total = record.question_count();
    CurrentQuestion {
        exam_id: exam.id,
        status: exam.status,
        question_index: exam.current_question_index,
        total_questions: total,
        can_proceed: exam.status == ExamStatus::InProgress
            && question.is_some()
            && answer.as_ref().is_some_and(Answer::is_satisfying),
        is_last_question: exam.current_question_index + 1 >= total,
        question: question.map(QuestionView::from),
        answer,
        time_remaining_seconds: timer_state(exam, now).remaining_seconds,
    }
}

fn instructions(paper: &serde_json::Value) -> Vec<String> {
    match paper.get("instructions") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|i| i.as_str().map(str::to_string))
            .collect(),
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Drives an exam through its lifecycle.
pub struct ExamProgress {
    store: Arc<dyn ExamStore>,
    blobs: Arc<dyn BlobStore>,
    uploads: UploadPolicy,
}

impl ExamProgress {
    pub fn new(store: Arc<dyn ExamStore>, blobs: Arc<dyn BlobStore>, uploads: UploadPolicy) -> Self {
        Self {
            store,
            blobs,
            uploads,
        }
    }

    pub fn store(&self) -> &Arc<dyn ExamStore> {
        &self.store
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn upload_policy(&self) -> &UploadPolicy {
        &self.uploads
    }

    /// Apply `change` to a fresh copy of the exam and commit it.
    ///
    /// `change` may run more than once when another writer commits first, so
    /// it must not have side effects outside the record.
    pub async fn mutate<T, F>(&self, exam_id: Uuid, mut change: F) -> Result<(ExamRecord, T)>
    where
        F: FnMut(&mut ExamRecord, DateTime<Utc>) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let before = self.store.load(exam_id).await?;
            let mut after = before.clone();
            let now = Utc::now();
            let out = change(&mut after, now)?;
            after.exam.updated_at = now;
            after.check_invariants()?;
            after.check_transition_from(&before)?;

            match self.store.commit(after).await {
                Ok(committed) => return Ok((committed, out)),
                Err(ExamError::Conflict(_)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    debug!(exam_id = %exam_id, attempt, "version conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn load(&self, exam_id: Uuid) -> Result<ExamRecord> {
        self.store.load(exam_id).await
    }

    /// CREATED → IN_PROGRESS.
    pub async fn start(&self, exam_id: Uuid) -> Result<Exam> {
        let (record, _) = self
            .mutate(exam_id, |rec, now| {
                let exam = &mut rec.exam;
                if exam.status != ExamStatus::Created {
                    return Err(ExamError::StateTransition {
                        action: "start",
                        status: exam.status,
                    });
                }
                exam.status = ExamStatus::InProgress;
                exam.started_at = Some(now);
                exam.current_question_index = 0;
                exam.time_remaining_snapshot = Some(exam.duration_minutes * 60);
                Ok(())
            })
            .await?;
        info!(exam_id = %exam_id, duration_minutes = record.exam.duration_minutes, "exam started");
        Ok(record.exam)
    }

    /// The question under the pointer.
    pub async fn current(&self, exam_id: Uuid) -> Result<CurrentQuestion> {
        let record = self.store.load(exam_id).await?;
        Ok(current_view(&record, Utc::now()))
    }

    /// Advance the pointer by one. The current question must be answered.
    pub async fn next(&self, exam_id: Uuid) -> Result<CurrentQuestion> {
        let (record, _) = self
            .mutate(exam_id, |rec, _| {
                if rec.exam.status != ExamStatus::InProgress {
                    return Err(ExamError::StateTransition {
                        action: "advance",
                        status: rec.exam.status,
                    });
                }
                let question = rec.current_question().ok_or_else(|| {
                    ExamError::ProgressionBlocked("every question has been answered".into())
                })?;
                let answered = rec
                    .answer_for(question.id)
                    .is_some_and(Answer::is_satisfying);
                if !answered {
                    return Err(ExamError::ProgressionBlocked(format!(
                        "question {} needs a typed answer, a selected option or an uploaded file",
                        question.sequence_number
                    )));
                }
                rec.exam.current_question_index += 1;
                Ok(())
            })
            .await?;
        debug!(
            exam_id = %exam_id,
            pointer = record.exam.current_question_index,
            "advanced to next question"
        );
        Ok(current_view(&record, Utc::now()))
    }

    /// Save or edit the answer to any question of an exam in progress.
    pub async fn save_answer(
        &self,
        exam_id: Uuid,
        question_id: Uuid,
        update: AnswerUpdate,
    ) -> Result<Answer> {
        let (_, answer) = self
            .mutate(exam_id, |rec, now| {
                ensure_answerable(&rec.exam, "answer")?;
                let question = rec
                    .question(question_id)
                    .ok_or_else(|| ExamError::NotFound(format!("question {question_id}")))?;

                let option = match update.selected_option.as_deref().map(str::trim) {
                    None => None,
                    Some("") => Some(None),
                    Some(label) => {
                        let label = label.to_uppercase();
                        if let Some(options) = &question.options {
                            if !options.contains_key(&label) {
                                let valid: Vec<&str> = options.keys().map(String::as_str).collect();
                                return Err(ExamError::InvalidAnswer(format!(
                                    "option {label} is not one of {}",
                                    valid.join(", ")
                                )));
                            }
                        }
                        Some(Some(label))
                    }
                };
                if update.selected_choice == Some(ChoiceSelection::Alternative)
                    && !question.has_internal_choice
                {
                    return Err(ExamError::InvalidAnswer(format!(
                        "question {} has no alternative",
                        question.sequence_number
                    )));
                }

                let status = rec.exam.status;
                let answer = rec.answer_entry(question_id, now);
                if answer.is_locked {
                    return Err(ExamError::AnswerLocked(status));
                }
                if let Some(typed) = &update.typed_answer {
                    answer.typed_answer = Some(typed.clone());
                }
                if let Some(option) = option {
                    answer.selected_option = option;
                }
                if let Some(choice) = update.selected_choice {
                    answer.selected_choice = Some(choice);
                }
                answer.last_edited_at = now;
                Ok(answer.clone())
            })
            .await?;
        Ok(answer)
    }

    /// Attach a document to an answer.
    pub async fn upload_file(
        &self,
        exam_id: Uuid,
        question_id: Uuid,
        filename: &str,
        bytes: &[u8],
    ) -> Result<UploadedFile> {
        let name = self.uploads.check(filename, bytes.len() as u64)?;

        // Reject early so nothing is written for a closed exam.
        let record = self.store.load(exam_id).await?;
        ensure_answerable(&record.exam, "upload to")?;
        let question = record
            .question(question_id)
            .ok_or_else(|| ExamError::NotFound(format!("question {question_id}")))?;

        let unique = Uuid::new_v4().simple().to_string();
        let suggested = format!(
            "exam_{exam_id}/q{}_{}_{name}",
            question.sequence_number,
            &unique[..8]
        );
        let storage_path = self.blobs.save(bytes, &suggested).await?;

        let file = UploadedFile {
            id: Uuid::new_v4(),
            filename: name,
            storage_path: storage_path.clone(),
            size_bytes: bytes.len() as u64,
            uploaded_at: Utc::now(),
        };

        let committed = self
            .mutate(exam_id, |rec, now| {
                ensure_answerable(&rec.exam, "upload to")?;
                let status = rec.exam.status;
                let answer = rec.answer_entry(question_id, now);
                if answer.is_locked {
                    return Err(ExamError::AnswerLocked(status));
                }
                answer.files.push(file.clone());
                answer.last_edited_at = now;
                Ok(())
            })
            .await;

        if let Err(e) = committed {
            if let Err(cleanup) = self.blobs.remove(&storage_path).await {
                warn!(path = %storage_path, "failed to remove orphaned upload: {cleanup}");
            }
            return Err(e);
        }
        info!(exam_id = %exam_id, file = %file.filename, bytes = file.size_bytes, "file uploaded");
        Ok(file)
    }

    /// IN_PROGRESS → SUBMITTED, locking every answer in the same commit.
    /// Unanswered questions are allowed.
    pub async fn submit(&self, exam_id: Uuid) -> Result<Exam> {
        let (record, _) = self
            .mutate(exam_id, |rec, now| {
                if rec.exam.status != ExamStatus::InProgress {
                    return Err(ExamError::StateTransition {
                        action: "submit",
                        status: rec.exam.status,
                    });
                }
                lock_and_submit(rec, now);
                Ok(())
            })
            .await?;
        let unanswered = record
            .questions
            .iter()
            .filter(|q| !record.answer_for(q.id).is_some_and(Answer::is_satisfying))
            .count();
        info!(exam_id = %exam_id, unanswered, "exam submitted");
        Ok(record.exam)
    }

    /// Submit an exam that has not been submitted yet, from CREATED or
    /// IN_PROGRESS. A no-op for exams already submitted.
    pub async fn ensure_submitted(&self, exam_id: Uuid) -> Result<ExamRecord> {
        let (record, submitted) = self
            .mutate(exam_id, |rec, now| {
                if rec.exam.status.locks_answers() {
                    return Ok(false);
                }
                lock_and_submit(rec, now);
                Ok(true)
            })
            .await?;
        if submitted {
            warn!(exam_id = %exam_id, "exam was not submitted; submitted implicitly");
        }
        Ok(record)
    }

    /// Remaining time. Never changes the exam.
    pub async fn timer(&self, exam_id: Uuid) -> Result<TimerState> {
        let record = self.store.load(exam_id).await?;
        Ok(timer_state(&record.exam, Utc::now()))
    }

    /// Store a client-reported remaining time, clamped to the duration.
    pub async fn snapshot_timer(&self, exam_id: Uuid, remaining: u32) -> Result<TimerState> {
        let (record, _) = self
            .mutate(exam_id, |rec, _| {
                if rec.exam.status != ExamStatus::InProgress {
                    return Err(ExamError::StateTransition {
                        action: "update the timer of",
                        status: rec.exam.status,
                    });
                }
                rec.exam.time_remaining_snapshot =
                    Some(remaining.min(rec.exam.duration_minutes * 60));
                Ok(())
            })
            .await?;
        Ok(timer_state(&record.exam, Utc::now()))
    }

    pub async fn exam(&self, exam_id: Uuid) -> Result<Exam> {
        Ok(self.store.load(exam_id).await?.exam)
    }

    /// Every question in order, without correct answers.
    pub async fn questions(&self, exam_id: Uuid) -> Result<Vec<QuestionView>> {
        let record = self.store.load(exam_id).await?;
        Ok(record.questions.iter().map(QuestionView::from).collect())
    }

    /// Every saved answer, in question order.
    pub async fn answers(&self, exam_id: Uuid) -> Result<Vec<Answer>> {
        let record = self.store.load(exam_id).await?;
        Ok(record
            .questions
            .iter()
            .filter_map(|q| record.answer_for(q.id).cloned())
            .collect())
    }

    pub async fn answer(&self, exam_id: Uuid, question_id: Uuid) -> Result<Option<Answer>> {
        let record = self.store.load(exam_id).await?;
        if record.question(question_id).is_none() {
            return Err(ExamError::NotFound(format!("question {question_id}")));
        }
        Ok(record.answer_for(question_id).cloned())
    }

    pub async fn question_by_number(&self, exam_id: Uuid, sequence_number: u32) -> Result<QuestionView> {
        let record = self.store.load(exam_id).await?;
        record
            .question_by_number(sequence_number)
            .map(QuestionView::from)
            .ok_or_else(|| ExamError::NotFound(format!("question {sequence_number}")))
    }

    pub async fn files(&self, exam_id: Uuid, question_id: Uuid) -> Result<Vec<UploadedFile>> {
        Ok(self
            .answer(exam_id, question_id)
            .await?
            .map(|a| a.files)
            .unwrap_or_default())
    }

    /// The paper with correct answers and the student's responses. Only
    /// available after submission.
    pub async fn full_paper(&self, exam_id: Uuid) -> Result<FullPaper> {
        let record = self.store.load(exam_id).await?;
        let exam = &record.exam;
        if !exam.status.locks_answers() {
            return Err(ExamError::StateTransition {
                action: "view the full paper of",
                status: exam.status,
            });
        }
        Ok(FullPaper {
            exam_id: exam.id,
            board: exam.board,
            class_num: exam.class_num,
            subject: exam.subject.clone(),
            duration_minutes: exam.duration_minutes,
            total_marks: exam.total_marks,
            instructions: instructions(&exam.paper),
            entries: record
                .questions
                .iter()
                .map(|q| PaperEntry {
                    question: q.clone(),
                    answer: record.answer_for(q.id).cloned(),
                })
                .collect(),
        })
    }
}

fn ensure_answerable(exam: &Exam, action: &'static str) -> Result<()> {
    match exam.status {
        ExamStatus::InProgress => Ok(()),
        ExamStatus::Created => Err(ExamError::StateTransition {
            action,
            status: exam.status,
        }),
        status => Err(ExamError::AnswerLocked(status)),
    }
}

fn lock_and_submit(rec: &mut ExamRecord, now: DateTime<Utc>) {
    rec.exam.status = ExamStatus::Submitted;
    rec.exam.submitted_at = Some(now);
    for answer in &mut rec.answers {
        answer.is_locked = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;
    use std::sync::atomic::Ordering;

    fn typed(text: &str) -> AnswerUpdate {
        AnswerUpdate {
            typed_answer: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn option(label: &str) -> AnswerUpdate {
        AnswerUpdate {
            selected_option: Some(label.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn start_sets_clock_and_pointer() {
        let h = harness().await;
        let exam = h.progress.start(h.record.exam.id).await.unwrap();
        assert_eq!(exam.status, ExamStatus::InProgress);
        assert!(exam.started_at.is_some());
        assert_eq!(exam.time_remaining_snapshot, Some(180 * 60));
        assert_eq!(exam.current_question_index, 0);

        let err = h.progress.start(h.record.exam.id).await.unwrap_err();
        assert!(matches!(
            err,
            ExamError::StateTransition { action: "start", status: ExamStatus::InProgress }
        ));
    }

    #[tokio::test]
    async fn next_is_gated_on_an_answer() {
        let h = harness().await;
        let id = h.record.exam.id;
        h.progress.start(id).await.unwrap();

        let err = h.progress.next(id).await.unwrap_err();
        assert!(matches!(err, ExamError::ProgressionBlocked(_)));

        let current = h.progress.current(id).await.unwrap();
        assert!(!current.can_proceed);

        let q1 = h.record.questions[0].id;
        h.progress.save_answer(id, q1, typed("   ")).await.unwrap();
        assert!(matches!(
            h.progress.next(id).await,
            Err(ExamError::ProgressionBlocked(_))
        ));

        h.progress.save_answer(id, q1, option("b")).await.unwrap();
        assert!(h.progress.current(id).await.unwrap().can_proceed);
        let after = h.progress.next(id).await.unwrap();
        assert_eq!(after.question_index, 1);
        assert_eq!(after.question.unwrap().sequence_number, 2);
    }

    #[tokio::test]
    async fn walking_past_the_last_question_completes() {
        let h = harness().await;
        let id = h.record.exam.id;
        h.progress.start(id).await.unwrap();
        for q in &h.record.questions {
            h.progress.save_answer(id, q.id, typed("done")).await.unwrap();
            let before = h.progress.current(id).await.unwrap();
            assert_eq!(before.is_last_question, q.sequence_number == 3);
            h.progress.next(id).await.unwrap();
        }
        let done = h.progress.current(id).await.unwrap();
        assert_eq!(done.question_index, 3);
        assert!(done.question.is_none());
        assert!(!done.can_proceed);
        assert!(done.is_last_question);
        assert!(matches!(
            h.progress.next(id).await,
            Err(ExamError::ProgressionBlocked(_))
        ));
    }

    #[tokio::test]
    async fn file_upload_satisfies_gating() {
        let h = harness().await;
        let id = h.record.exam.id;
        h.progress.start(id).await.unwrap();
        let q1 = h.record.questions[0].id;
        let file = h
            .progress
            .upload_file(id, q1, "../../answer sheet.PDF", b"%PDF-1.4")
            .await
            .unwrap();
        assert_eq!(file.filename, "answer_sheet.PDF");
        assert!(file.storage_path.starts_with(&format!("exam_{id}/q1_")));
        assert!(file.storage_path.ends_with("_answer_sheet.PDF"));
        assert!(h.blobs.blobs.lock().unwrap().contains_key(&file.storage_path));

        assert_eq!(h.progress.files(id, q1).await.unwrap().len(), 1);
        h.progress.next(id).await.unwrap();
    }

    #[tokio::test]
    async fn upload_policy_rejects_bad_files() {
        let h = harness().await;
        let id = h.record.exam.id;
        h.progress.start(id).await.unwrap();
        let q1 = h.record.questions[0].id;

        let err = h.progress.upload_file(id, q1, "notes.docx", b"x").await.unwrap_err();
        assert!(matches!(err, ExamError::UploadRejected(_)));

        let huge = vec![0u8; (DEFAULT_MAX_FILE_SIZE + 1) as usize];
        let err = h.progress.upload_file(id, q1, "big.pdf", &huge).await.unwrap_err();
        assert!(matches!(err, ExamError::UploadRejected(ref m) if m.contains("limit")));

        assert!(h.blobs.blobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn answers_are_edited_field_by_field() {
        let h = harness().await;
        let id = h.record.exam.id;
        h.progress.start(id).await.unwrap();
        let q2 = h.record.questions[1].id;

        let raw = r"Let $x = \frac{a}{b}$\n\\";
        h.progress.save_answer(id, q2, typed(raw)).await.unwrap();
        let answer = h
            .progress
            .save_answer(
                id,
                q2,
                AnswerUpdate {
                    selected_choice: Some(ChoiceSelection::Alternative),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(answer.typed_answer.as_deref(), Some(raw));
        assert_eq!(answer.selected_choice, Some(ChoiceSelection::Alternative));
        assert!(answer.last_edited_at >= answer.first_saved_at);
        assert_eq!(h.progress.answers(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn answers_are_validated() {
        let h = harness().await;
        let id = h.record.exam.id;
        h.progress.start(id).await.unwrap();

        let q1 = h.record.questions[0].id;
        let err = h.progress.save_answer(id, q1, option("E")).await.unwrap_err();
        assert!(matches!(err, ExamError::InvalidAnswer(_)));

        let q3 = h.record.questions[2].id;
        let err = h
            .progress
            .save_answer(
                id,
                q3,
                AnswerUpdate {
                    selected_choice: Some(ChoiceSelection::Alternative),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExamError::InvalidAnswer(_)));

        let err = h
            .progress
            .save_answer(id, Uuid::new_v4(), typed("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExamError::NotFound(_)));
    }

    #[tokio::test]
    async fn answering_before_start_is_rejected() {
        let h = harness().await;
        let id = h.record.exam.id;
        let q1 = h.record.questions[0].id;
        let err = h.progress.save_answer(id, q1, typed("early")).await.unwrap_err();
        assert!(matches!(
            err,
            ExamError::StateTransition { status: ExamStatus::Created, .. }
        ));
    }

    #[tokio::test]
    async fn submit_locks_everything() {
        let h = harness().await;
        let id = h.record.exam.id;
        h.progress.start(id).await.unwrap();
        let q1 = h.record.questions[0].id;
        h.progress.save_answer(id, q1, option("B")).await.unwrap();

        // Early submission: pointer still on the first question.
        let exam = h.progress.submit(id).await.unwrap();
        assert_eq!(exam.status, ExamStatus::Submitted);
        assert_eq!(exam.current_question_index, 0);
        assert!(h.progress.answers(id).await.unwrap().iter().all(|a| a.is_locked));

        let err = h.progress.save_answer(id, q1, option("C")).await.unwrap_err();
        assert!(matches!(err, ExamError::AnswerLocked(ExamStatus::Submitted)));
        let err = h.progress.upload_file(id, q1, "late.pdf", b"%PDF").await.unwrap_err();
        assert!(matches!(err, ExamError::AnswerLocked(_)));
        assert!(matches!(
            h.progress.next(id).await,
            Err(ExamError::StateTransition { .. })
        ));
        assert!(matches!(
            h.progress.submit(id).await,
            Err(ExamError::StateTransition { action: "submit", .. })
        ));
    }

    #[tokio::test]
    async fn conflicts_are_retried() {
        let h = harness().await;
        let id = h.record.exam.id;
        h.store.conflicts.store(2, Ordering::SeqCst);
        let exam = h.progress.start(id).await.unwrap();
        assert_eq!(exam.status, ExamStatus::InProgress);
    }

    #[tokio::test]
    async fn persistent_conflicts_surface() {
        let h = harness().await;
        let id = h.record.exam.id;
        h.store.conflicts.store(MAX_COMMIT_ATTEMPTS, Ordering::SeqCst);
        let err = h.progress.start(id).await.unwrap_err();
        assert!(matches!(err, ExamError::Conflict(c) if c == id));
    }

    #[tokio::test]
    async fn concurrent_next_advances_once() {
        let h = harness().await;
        let id = h.record.exam.id;
        h.progress.start(id).await.unwrap();
        let q1 = h.record.questions[0].id;
        h.progress.save_answer(id, q1, option("A")).await.unwrap();

        let (a, b) = tokio::join!(h.progress.next(id), h.progress.next(id));
        // One advances; the other then sees an unanswered question 2.
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(h.progress.current(id).await.unwrap().question_index, 1);
    }

    #[test]
    fn remaining_time_is_clamped() {
        let start = Utc::now();
        assert_eq!(remaining_seconds(10, start, start), 600);
        assert_eq!(
            remaining_seconds(10, start, start + chrono::Duration::seconds(90)),
            510
        );
        assert_eq!(
            remaining_seconds(10, start, start + chrono::Duration::hours(2)),
            0
        );
        assert_eq!(
            remaining_seconds(10, start, start - chrono::Duration::seconds(30)),
            600
        );
    }

    #[tokio::test]
    async fn timer_reports_auto_submit_without_submitting() {
        let h = harness().await;
        let id = h.record.exam.id;
        h.progress.start(id).await.unwrap();
        // Pretend the exam started four hours ago.
        let (_, _) = h
            .progress
            .mutate(id, |rec, now| {
                rec.exam.started_at = Some(now - chrono::Duration::hours(4));
                Ok(())
            })
            .await
            .unwrap();
        let timer = h.progress.timer(id).await.unwrap();
        assert_eq!(timer.remaining_seconds, 0);
        assert!(timer.auto_submit);
        assert_eq!(h.progress.exam(id).await.unwrap().status, ExamStatus::InProgress);
    }

    #[tokio::test]
    async fn timer_snapshot_is_clamped_and_needs_progress() {
        let h = harness().await;
        let id = h.record.exam.id;
        assert!(matches!(
            h.progress.snapshot_timer(id, 100).await,
            Err(ExamError::StateTransition { .. })
        ));
        h.progress.start(id).await.unwrap();
        let timer = h.progress.snapshot_timer(id, 999_999).await.unwrap();
        assert_eq!(timer.snapshot_seconds, Some(180 * 60));
        let timer = h.progress.snapshot_timer(id, 42).await.unwrap();
        assert_eq!(timer.snapshot_seconds, Some(42));
    }

    #[tokio::test]
    async fn full_paper_only_after_submission() {
        let h = harness().await;
        let id = h.record.exam.id;
        h.progress.start(id).await.unwrap();
        assert!(matches!(
            h.progress.full_paper(id).await,
            Err(ExamError::StateTransition { .. })
        ));
        h.progress.submit(id).await.unwrap();
        let paper = h.progress.full_paper(id).await.unwrap();
        assert_eq!(paper.entries.len(), 3);
        assert_eq!(paper.instructions, vec!["Answer all questions."]);
        assert_eq!(paper.entries[0].question.correct_answer.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn read_helpers() {
        let h = harness().await;
        let id = h.record.exam.id;
        let q = h.progress.question_by_number(id, 2).await.unwrap();
        assert!(q.has_internal_choice);
        assert!(matches!(
            h.progress.question_by_number(id, 9).await,
            Err(ExamError::NotFound(_))
        ));
        assert_eq!(h.progress.questions(id).await.unwrap().len(), 3);
        assert!(h.progress.answer(id, q.id).await.unwrap().is_none());
        assert!(matches!(
            h.progress.exam(Uuid::new_v4()).await,
            Err(ExamError::NotFound(_))
        ));
    }
}
