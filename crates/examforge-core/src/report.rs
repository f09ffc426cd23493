//! Marks extraction and exam summaries.
//!
//! Evaluation reports are free-form markdown. The only contract is the closing
//! `Total Marks Achieved: X/Y` line, which is matched leniently.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::model::{Answer, Board, Difficulty, ExamRecord, ExamStatus};

/// Marks pulled out of a report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Marks {
    pub achieved: f64,
    pub total: f64,
}

impl Marks {
    /// Percentage of `out_of`, rounded to two decimals.
    pub fn percentage_of(&self, out_of: f64) -> Option<f64> {
        (out_of > 0.0).then(|| (self.achieved / out_of * 10_000.0).round() / 100.0)
    }
}

fn marks_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(total\s*marks\s*achieved|marks\s*obtained|score)\s*:?\s*(\d+(?:\.\d+)?)\s*(?:/|out\s*of)\s*(\d+(?:\.\d+)?)",
        )
        .ok()
    })
    .as_ref()
}

/// Extract `achieved/total` from a report.
///
/// The last "Total Marks Achieved" line wins; otherwise the last
/// "Marks Obtained" or "Score" line. Markdown emphasis is ignored.
pub fn extract_marks(report: &str) -> Option<Marks> {
    let plain = report.replace("**", "").replace("__", "");
    let mut best: Option<(bool, Marks)> = None;
    for caps in marks_regex()?.captures_iter(&plain) {
        let is_total = caps[1].to_lowercase().starts_with("total");
        let (Ok(achieved), Ok(total)) = (caps[2].parse::<f64>(), caps[3].parse::<f64>()) else {
            continue;
        };
        let marks = Marks { achieved, total };
        match best {
            Some((true, _)) if !is_total => {}
            _ => best = Some((is_total, marks)),
        }
    }
    best.map(|(_, marks)| marks)
}

/// Post-exam overview.
#[derive(Debug, Clone, Serialize)]
pub struct ExamSummary {
    pub exam_id: Uuid,
    pub student_name: String,
    pub board: Board,
    pub class_num: u8,
    pub subject: String,
    pub difficulty: Difficulty,
    pub status: ExamStatus,
    pub total_questions: usize,
    pub answered_questions: usize,
    pub unanswered_questions: usize,
    pub uploaded_files: usize,
    pub total_marks: u32,
    pub marks_achieved: Option<f64>,
    pub percentage: Option<f64>,
    pub duration_minutes: u32,
    pub time_taken_minutes: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl ExamSummary {
    pub fn from_record(record: &ExamRecord) -> Self {
        let exam = &record.exam;
        let total_questions = record.question_count();
        let answered = record
            .questions
            .iter()
            .filter(|q| record.answer_for(q.id).is_some_and(Answer::is_satisfying))
            .count();
        let uploaded_files = record.answers.iter().map(|a| a.files.len()).sum();

        let marks = match exam.status {
            ExamStatus::Evaluated => exam.evaluation_report.as_deref().and_then(extract_marks),
            _ => None,
        };

        Self {
            exam_id: exam.id,
            student_name: exam.student.name.clone(),
            board: exam.board,
            class_num: exam.class_num,
            subject: exam.subject.clone(),
            difficulty: exam.difficulty,
            status: exam.status,
            total_questions,
            answered_questions: answered,
            unanswered_questions: total_questions - answered,
            uploaded_files,
            total_marks: exam.total_marks,
            marks_achieved: marks.map(|m| m.achieved),
            percentage: marks.and_then(|m| m.percentage_of(f64::from(exam.total_marks))),
            duration_minutes: exam.duration_minutes,
            time_taken_minutes: exam
                .started_at
                .zip(exam.submitted_at)
                .map(|(start, end)| (end - start).num_minutes()),
            started_at: exam.started_at,
            submitted_at: exam.submitted_at,
            evaluated_at: exam.evaluated_at,
        }
    }
}
