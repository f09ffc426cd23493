//! Core data model types for examforge.
//!
//! An exam is persisted as one aggregate, [`ExamRecord`]: the exam row, its
//! ordered questions and the answers given so far (each answer owning its
//! uploaded files). The aggregate is the unit of every store transaction.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ExamError, Result};

/// Supported education boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Board {
    Cbse,
    Icse,
    Wbbse,
}

impl Board {
    pub const ALL: [Board; 3] = [Board::Cbse, Board::Icse, Board::Wbbse];
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Board::Cbse => write!(f, "CBSE"),
            Board::Icse => write!(f, "ICSE"),
            Board::Wbbse => write!(f, "WBBSE"),
        }
    }
}

impl FromStr for Board {
    type Err = ExamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "CBSE" => Ok(Board::Cbse),
            "ICSE" => Ok(Board::Icse),
            "WBBSE" => Ok(Board::Wbbse),
            _ => Err(ExamError::UnsupportedBoard(s.trim().to_string())),
        }
    }
}

/// Class bands sharing one exam pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassBand {
    #[serde(rename = "class_6_to_8")]
    Middle,
    #[serde(rename = "class_9_to_10")]
    Secondary,
    #[serde(rename = "class_11_to_12")]
    Senior,
}

impl ClassBand {
    pub const ALL: [ClassBand; 3] = [ClassBand::Middle, ClassBand::Secondary, ClassBand::Senior];

    pub fn from_class(class_num: u8) -> Result<Self> {
        match class_num {
            6..=8 => Ok(ClassBand::Middle),
            9..=10 => Ok(ClassBand::Secondary),
            11..=12 => Ok(ClassBand::Senior),
            other => Err(ExamError::UnsupportedClass(other)),
        }
    }
}

impl fmt::Display for ClassBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassBand::Middle => write!(f, "6-8"),
            ClassBand::Secondary => write!(f, "9-10"),
            ClassBand::Senior => write!(f, "11-12"),
        }
    }
}

/// Requested paper difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Extreme,
    UltraExtreme,
}

impl Difficulty {
    /// Guidance line rendered into the generation prompt.
    pub fn guidance(&self) -> &'static str {
        match self {
            Difficulty::Easy => {
                "Keep questions direct and textbook-level; favour recall and single-step application."
            }
            Difficulty::Medium => {
                "Match a standard board paper: a balanced mix of recall, application and reasoning."
            }
            Difficulty::Hard => {
                "Lean towards multi-step application questions and less familiar contexts."
            }
            Difficulty::Extreme => {
                "Use competition-style questions that combine several concepts in each problem."
            }
            Difficulty::UltraExtreme => {
                "Use olympiad-level questions demanding non-obvious insight and rigorous justification."
            }
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
            Difficulty::Extreme => write!(f, "extreme"),
            Difficulty::UltraExtreme => write!(f, "ultra_extreme"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            "extreme" => Ok(Difficulty::Extreme),
            "ultra_extreme" => Ok(Difficulty::UltraExtreme),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// Question types a paper may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "MCQ")]
    Mcq,
    #[serde(rename = "Short Answer")]
    ShortAnswer,
    #[serde(rename = "Long Answer")]
    LongAnswer,
    #[serde(rename = "Case Study")]
    CaseStudy,
    #[serde(rename = "Numerical")]
    Numerical,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::Mcq => write!(f, "MCQ"),
            QuestionType::ShortAnswer => write!(f, "Short Answer"),
            QuestionType::LongAnswer => write!(f, "Long Answer"),
            QuestionType::CaseStudy => write!(f, "Case Study"),
            QuestionType::Numerical => write!(f, "Numerical"),
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    /// Lenient parse of the labels models and pattern tables use
    /// ("Long Answer II", "short_answer", "Descriptive", ...).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        let mut words: Vec<&str> = normalized.split_whitespace().collect();
        // Drop numbering suffixes such as "Long Answer II" or "Case Study 1".
        while let Some(last) = words.last() {
            let is_roman = last.chars().all(|c| matches!(c, 'i' | 'v' | 'x'));
            let is_digit = last.chars().all(|c| c.is_ascii_digit());
            if words.len() > 1 && (is_roman || is_digit) {
                words.pop();
            } else {
                break;
            }
        }
        match words.join(" ").as_str() {
            "mcq" | "mcqs" | "multiple choice" | "objective" => Ok(QuestionType::Mcq),
            "short answer" | "very short answer" | "short" => Ok(QuestionType::ShortAnswer),
            "long answer" | "long" | "descriptive" | "essay" => Ok(QuestionType::LongAnswer),
            "case study" | "case based" | "source based" | "case" => Ok(QuestionType::CaseStudy),
            "numerical" | "numeric" | "problem" => Ok(QuestionType::Numerical),
            _ => Err(format!("unknown question type: {}", s.trim())),
        }
    }
}

/// Exam lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamStatus {
    Created,
    InProgress,
    Submitted,
    Evaluated,
}

impl ExamStatus {
    /// Position in the lifecycle; transitions never decrease it.
    pub fn rank(&self) -> u8 {
        match self {
            ExamStatus::Created => 0,
            ExamStatus::InProgress => 1,
            ExamStatus::Submitted => 2,
            ExamStatus::Evaluated => 3,
        }
    }

    /// Whether answers of an exam in this state are frozen.
    pub fn locks_answers(&self) -> bool {
        matches!(self, ExamStatus::Submitted | ExamStatus::Evaluated)
    }
}

impl fmt::Display for ExamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExamStatus::Created => write!(f, "CREATED"),
            ExamStatus::InProgress => write!(f, "IN_PROGRESS"),
            ExamStatus::Submitted => write!(f, "SUBMITTED"),
            ExamStatus::Evaluated => write!(f, "EVALUATED"),
        }
    }
}

/// Which alternative of an internal-choice question the student answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChoiceSelection {
    Main,
    Alternative,
}

impl fmt::Display for ChoiceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChoiceSelection::Main => write!(f, "main"),
            ChoiceSelection::Alternative => write!(f, "alternative"),
        }
    }
}

impl FromStr for ChoiceSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "main" => Ok(ChoiceSelection::Main),
            "alternative" | "alt" | "or" => Ok(ChoiceSelection::Alternative),
            other => Err(format!("unknown choice: {other} (expected main or alternative)")),
        }
    }
}

/// The student an exam belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub name: String,
    pub email: String,
}

/// One exam session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exam {
    pub id: Uuid,
    pub student: Student,
    pub board: Board,
    pub class_num: u8,
    pub subject: String,
    #[serde(default)]
    pub chapter_focus: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Effective duration; never longer than the pattern default.
    pub duration_minutes: u32,
    pub total_marks: u32,
    pub status: ExamStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evaluated_at: Option<DateTime<Utc>>,
    /// 0-based pointer into the ordered question list. Equal to the question
    /// count once every question has been passed.
    pub current_question_index: usize,
    /// Last remaining-time value reported by a client. Informational only.
    #[serde(default)]
    pub time_remaining_snapshot: Option<u32>,
    /// The generated paper as returned by the model (after repair).
    pub paper: serde_json::Value,
    #[serde(default)]
    pub evaluation_report: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by every committed change.
    #[serde(default)]
    pub version: u64,
}

/// A question of an exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub section: String,
    /// 1-based, contiguous; defines navigation order.
    pub sequence_number: u32,
    /// Question markup, stored exactly as generated.
    pub text: String,
    pub question_type: QuestionType,
    pub marks: u32,
    #[serde(default)]
    pub has_internal_choice: bool,
    #[serde(default)]
    pub alternative_text: Option<String>,
    /// MCQ options keyed by label ("A", "B", ...).
    #[serde(default)]
    pub options: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub correct_answer: Option<String>,
}

/// A file attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: Uuid,
    pub filename: String,
    pub storage_path: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// A student's answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: Uuid,
    pub question_id: Uuid,
    /// Typed response, stored verbatim (backslashes included).
    #[serde(default)]
    pub typed_answer: Option<String>,
    #[serde(default)]
    pub selected_option: Option<String>,
    #[serde(default)]
    pub selected_choice: Option<ChoiceSelection>,
    #[serde(default)]
    pub is_locked: bool,
    pub first_saved_at: DateTime<Utc>,
    pub last_edited_at: DateTime<Utc>,
    #[serde(default)]
    pub files: Vec<UploadedFile>,
}

impl Answer {
    pub fn new(question_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question_id,
            typed_answer: None,
            selected_option: None,
            selected_choice: None,
            is_locked: false,
            first_saved_at: now,
            last_edited_at: now,
            files: Vec::new(),
        }
    }

    /// Non-blank typed text, a selected option, or at least one file.
    pub fn is_satisfying(&self) -> bool {
        let typed = self
            .typed_answer
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        typed || self.selected_option.is_some() || !self.files.is_empty()
    }

    fn same_content(&self, other: &Answer) -> bool {
        self.typed_answer == other.typed_answer
            && self.selected_option == other.selected_option
            && self.selected_choice == other.selected_choice
            && self.files == other.files
    }
}

/// Whether the pointer has passed every question.
pub fn is_complete(pointer: usize, question_count: usize) -> bool {
    pointer >= question_count
}

/// The persisted aggregate: exam, ordered questions, answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamRecord {
    pub exam: Exam,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

impl ExamRecord {
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn is_complete(&self) -> bool {
        is_complete(self.exam.current_question_index, self.questions.len())
    }

    /// The question the pointer is on, if any remain.
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.exam.current_question_index)
    }

    pub fn question(&self, question_id: Uuid) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn question_by_number(&self, sequence_number: u32) -> Option<&Question> {
        self.questions
            .iter()
            .find(|q| q.sequence_number == sequence_number)
    }

    pub fn answer_for(&self, question_id: Uuid) -> Option<&Answer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }

    /// The answer for a question, created empty if the student has none yet.
    pub fn answer_entry(&mut self, question_id: Uuid, now: DateTime<Utc>) -> &mut Answer {
        let pos = match self.answers.iter().position(|a| a.question_id == question_id) {
            Some(pos) => pos,
            None => {
                self.answers.push(Answer::new(question_id, now));
                self.answers.len() - 1
            }
        };
        &mut self.answers[pos]
    }

    /// Check the record is internally consistent.
    pub fn check_invariants(&self) -> Result<()> {
        let exam = &self.exam;
        for (index, question) in self.questions.iter().enumerate() {
            if question.sequence_number as usize != index + 1 {
                return Err(violation(format!(
                    "question at index {index} has sequence number {}",
                    question.sequence_number
                )));
            }
        }
        if exam.current_question_index > self.questions.len() {
            return Err(violation(format!(
                "pointer {} beyond question count {}",
                exam.current_question_index,
                self.questions.len()
            )));
        }
        for answer in &self.answers {
            if self.question(answer.question_id).is_none() {
                return Err(violation(format!(
                    "answer {} refers to a question outside this exam",
                    answer.id
                )));
            }
        }
        match exam.status {
            ExamStatus::Created => {
                if exam.started_at.is_some() || exam.current_question_index != 0 {
                    return Err(violation("CREATED exam has progress".into()));
                }
            }
            ExamStatus::InProgress => {
                if exam.started_at.is_none() {
                    return Err(violation("IN_PROGRESS exam has no start time".into()));
                }
            }
            ExamStatus::Submitted | ExamStatus::Evaluated => {
                if exam.submitted_at.is_none() {
                    return Err(violation(format!("{} exam has no submit time", exam.status)));
                }
                if self.answers.iter().any(|a| !a.is_locked) {
                    return Err(violation(format!("{} exam has unlocked answers", exam.status)));
                }
            }
        }
        if exam.status == ExamStatus::Evaluated
            && (exam.evaluation_report.is_none() || exam.evaluated_at.is_none())
        {
            return Err(violation("EVALUATED exam has no report".into()));
        }
        Ok(())
    }

    /// Check that `self` is a legal successor of `previous`.
    pub fn check_transition_from(&self, previous: &ExamRecord) -> Result<()> {
        let (before, after) = (&previous.exam, &self.exam);
        if after.status.rank() < before.status.rank() {
            return Err(violation(format!(
                "status moved backwards from {} to {}",
                before.status, after.status
            )));
        }
        if before.status == ExamStatus::InProgress
            && after.current_question_index < before.current_question_index
        {
            return Err(violation(format!(
                "pointer moved backwards from {} to {}",
                before.current_question_index, after.current_question_index
            )));
        }
        for locked in previous.answers.iter().filter(|a| a.is_locked) {
            let unchanged = self
                .answer_for(locked.question_id)
                .is_some_and(|a| a.is_locked && a.same_content(locked));
            if !unchanged {
                return Err(violation(format!("locked answer {} was modified", locked.id)));
            }
        }
        Ok(())
    }
}

fn violation(message: String) -> ExamError {
    ExamError::InvariantViolation(message)
}
