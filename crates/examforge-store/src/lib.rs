//! examforge-store: persistence for exams and uploaded documents.
//!
//! `SqliteStore` keeps exam aggregates in a SQLite database, so exams survive
//! restarts and concurrent processes serialize through its compare-and-swap
//! commits. `MemoryStore` is the same contract without durability.
//! `FsBlobStore` keeps uploaded documents under a root directory.

pub mod blob;
pub mod memory;
pub mod sqlite;

pub use blob::FsBlobStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{Duration, Utc};
    use examforge_core::model::{
        Board, Difficulty, Exam, ExamRecord, ExamStatus, Question, QuestionType, Student,
    };
    use uuid::Uuid;

    /// A single-question exam created `age_minutes` ago.
    pub(crate) fn record(subject: &str, age_minutes: i64) -> ExamRecord {
        let created = Utc::now() - Duration::minutes(age_minutes);
        ExamRecord {
            exam: Exam {
                id: Uuid::new_v4(),
                student: Student {
                    name: "Riya".into(),
                    email: "riya@example.com".into(),
                },
                board: Board::Icse,
                class_num: 9,
                subject: subject.into(),
                chapter_focus: None,
                difficulty: Difficulty::Easy,
                duration_minutes: 150,
                total_marks: 80,
                status: ExamStatus::Created,
                started_at: None,
                submitted_at: None,
                evaluated_at: None,
                current_question_index: 0,
                time_remaining_snapshot: None,
                paper: serde_json::json!({"sections": []}),
                evaluation_report: None,
                created_at: created,
                updated_at: created,
                version: 0,
            },
            questions: vec![Question {
                id: Uuid::new_v4(),
                section: "A".into(),
                sequence_number: 1,
                text: r"Solve $\frac{x}{2} = 3$".into(),
                question_type: QuestionType::ShortAnswer,
                marks: 2,
                has_internal_choice: false,
                alternative_text: None,
                options: None,
                correct_answer: None,
            }],
            answers: vec![],
        }
    }
}
