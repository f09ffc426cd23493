//! Mock backend for testing.
//!
//! Besides fixed and prompt-matched replies, `MockBackend::exam_fixture`
//! plays both roles of the real model: it writes a paper that follows the
//! section lines of a generation prompt and a short report for an examiner
//! prompt. This lets the CLI run an exam end to end without network access.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use examforge_core::error::ProviderError;
use examforge_core::resolver::normalize_model_id;
use examforge_core::traits::{
    GenerateRequest, GenerateResponse, GenerationBackend, Modality, ModelInfo,
};

const EXAM_TOTAL_MARKER: &str = "Total Marks Achieved: X/";

/// A scripted generation backend.
pub struct MockBackend {
    /// Prompt substring → reply, checked in order.
    responses: Vec<(String, String)>,
    default_response: String,
    /// Answer generation and evaluation prompts like a real model.
    exam_mode: bool,
    models: Vec<String>,
    quota_exhausted: HashSet<String>,
    missing: HashSet<String>,
    call_count: AtomicU32,
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockBackend {
    /// Create a mock with prompt→response mappings.
    pub fn new(responses: Vec<(String, String)>) -> Self {
        Self {
            responses,
            default_response: String::new(),
            exam_mode: false,
            models: vec![
                "models/gemini-2.5-flash".to_string(),
                "models/gemini-2.5-pro".to_string(),
                "models/gemini-2.0-flash".to_string(),
            ],
            quota_exhausted: HashSet::new(),
            missing: HashSet::new(),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            ..Self::new(Vec::new())
        }
    }

    /// Create a mock that writes papers and evaluation reports.
    pub fn exam_fixture() -> Self {
        Self {
            exam_mode: true,
            ..Self::new(Vec::new())
        }
    }

    /// Model ids returned by `list_models`.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Models that always fail with a quota error.
    pub fn with_quota_exhausted(mut self, models: impl IntoIterator<Item = String>) -> Self {
        self.quota_exhausted = models.into_iter().collect();
        self
    }

    /// Models that always fail as unknown.
    pub fn with_missing(mut self, models: impl IntoIterator<Item = String>) -> Self {
        self.missing = models.into_iter().collect();
        self
    }

    /// Get the number of calls made to this backend.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this backend.
    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn reply(&self, prompt: &str) -> String {
        if let Some((_, reply)) = self.responses.iter().find(|(key, _)| prompt.contains(key.as_str())) {
            return reply.clone();
        }
        if self.exam_mode {
            return match exam_total(prompt) {
                Some(total) => mock_report(prompt, total),
                None => mock_paper(prompt),
            };
        }
        self.default_response.clone()
    }
}

/// Total marks named by an examiner prompt.
fn exam_total(prompt: &str) -> Option<u32> {
    let start = prompt.find(EXAM_TOTAL_MARKER)? + EXAM_TOTAL_MARKER.len();
    let digits: String = prompt[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// A section line of a generation prompt:
/// `  - Section A: 20 questions x 1 marks each (MCQ)`.
fn parse_section_line(line: &str) -> Option<(String, u32, u32, String)> {
    let rest = line.trim().strip_prefix("- Section ")?;
    let (label, rest) = rest.split_once(": ")?;
    let (count, rest) = rest.split_once(" questions x ")?;
    let (marks, rest) = rest.split_once(" marks each (")?;
    let type_label = rest.strip_suffix(')')?;
    Some((
        label.to_string(),
        count.parse().ok()?,
        marks.parse().ok()?,
        type_label.to_string(),
    ))
}

fn mock_paper(prompt: &str) -> String {
    let mut sections = Vec::new();
    let mut number = 0;
    for (label, count, marks, type_label) in prompt.lines().filter_map(parse_section_line) {
        let questions: Vec<Value> = (0..count)
            .map(|i| {
                number += 1;
                let mut q = json!({
                    "question_number": number,
                    "question_text": format!("Simplify $\\frac{{{}}}{{{}}}$ and justify each step.", number, number + 1),
                    "question_type": type_label,
                    "marks": marks,
                    "has_internal_choice": false,
                    "alternative_question_text": null,
                });
                if type_label == "MCQ" {
                    q["question_text"] = json!(format!("Which value equals $\\sqrt{{{}}}$?", number * number));
                    q["options"] = json!({"A": "0", "B": number.to_string(), "C": "-1", "D": "None of these"});
                    q["correct_answer"] = json!("B");
                } else if i == 0 {
                    q["has_internal_choice"] = json!(true);
                    q["alternative_question_text"] =
                        json!(format!("Prove the identity for $n = {number}$."));
                }
                q
            })
            .collect();
        sections.push(json!({
            "section": label,
            "title": format!("Section {label}"),
            "questions": questions,
        }));
    }
    let paper = json!({
        "duration_minutes": 0,
        "total_marks": 0,
        "instructions": [
            "All questions are compulsory.",
            "Marks are indicated against each question."
        ],
        "sections": sections,
    });
    format!("```json\n{paper:#}\n```")
}

fn mock_report(prompt: &str, total: u32) -> String {
    let questions = prompt
        .lines()
        .filter(|l| l.starts_with("Question ") && l.contains(" (Section "))
        .count() as u32;
    let skipped = prompt.matches("**NOT ATTEMPTED**").count() as u32;
    let achieved = questions.saturating_sub(skipped).min(total);
    format!(
        "# Evaluation Report\n\n\
         | Questions | Attempted |\n|---|---|\n| {questions} | {} |\n\n\
         Each attempted question was awarded one mark.\n\n\
         Total Marks Achieved: {achieved}/{total}",
        questions - skipped.min(questions)
    )
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());

        let model = normalize_model_id(&request.model);
        if self.missing.contains(model) {
            return Err(ProviderError::ModelNotFound(model.to_string()).into());
        }
        if self.quota_exhausted.contains(model) {
            return Err(ProviderError::QuotaExceeded {
                model: model.to_string(),
                message: "mock quota exhausted".into(),
            }
            .into());
        }

        Ok(GenerateResponse {
            text: self.reply(&request.prompt),
            model: model.to_string(),
            credential_index: Some(0),
            latency_ms: 1,
        })
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        Ok(self
            .models
            .iter()
            .map(|id| ModelInfo {
                id: id.clone(),
                supports_generation: true,
                modality: Modality::infer(id, ""),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examforge_core::catalog::PatternCatalog;
    use examforge_core::model::{Board, Difficulty};
    use examforge_core::parser::parse_paper;
    use examforge_core::prompt::{build_generation_prompt, PaperRequest};

    #[tokio::test]
    async fn fixed_response() {
        let backend = MockBackend::with_fixed_response("Total Marks Achieved: 1/80");
        let response = backend
            .generate(&GenerateRequest::new("gemini-2.5-flash", "anything"))
            .await
            .unwrap();
        assert_eq!(response.text, "Total Marks Achieved: 1/80");
        assert_eq!(backend.call_count(), 1);
        assert_eq!(backend.last_request().unwrap().prompt, "anything");
    }

    #[tokio::test]
    async fn prompt_matching() {
        let backend = MockBackend::new(vec![
            ("Physics".to_string(), "physics paper".to_string()),
            ("Chemistry".to_string(), "chemistry paper".to_string()),
        ]);
        let reply = backend
            .generate(&GenerateRequest::new("m", "Subject: Chemistry"))
            .await
            .unwrap();
        assert_eq!(reply.text, "chemistry paper");
    }

    #[tokio::test]
    async fn scripted_failures_are_typed() {
        let backend = MockBackend::exam_fixture()
            .with_quota_exhausted(["gemini-2.5-flash".to_string()])
            .with_missing(["gemini-2.5-pro".to_string()]);

        let err = backend
            .generate(&GenerateRequest::new("models/gemini-2.5-flash", "x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::QuotaExceeded { .. })
        ));
        let err = backend
            .generate(&GenerateRequest::new("gemini-2.5-pro", "x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::ModelNotFound(_))
        ));
    }

    #[tokio::test]
    async fn fixture_paper_follows_the_pattern() {
        let catalog = PatternCatalog::builtin().unwrap();
        let pattern = catalog.lookup(Board::Cbse, 10).unwrap();
        let prompt = build_generation_prompt(
            &PaperRequest {
                board: Board::Cbse,
                class_num: 10,
                subject: "Mathematics".into(),
                chapter_focus: None,
                difficulty: Difficulty::Medium,
                syllabus: None,
            },
            pattern,
        );

        let backend = MockBackend::exam_fixture();
        let response = backend
            .generate(&GenerateRequest::new("gemini-2.5-flash", prompt))
            .await
            .unwrap();
        let paper = parse_paper(&response.text, pattern).unwrap();

        assert_eq!(paper.questions.len() as u32, pattern.question_count());
        let marks: u32 = paper.questions.iter().map(|q| q.marks).sum();
        assert_eq!(marks, pattern.total_marks);
        assert_eq!(paper.questions[0].correct_answer.as_deref(), Some("B"));
        assert_eq!(paper.duration_minutes, 180);
    }

    #[test]
    fn fixture_report_ends_with_total() {
        let prompt = "Question 1 (Section A) - 1 marks\n**Selected Option:** B\n---\n\
                      Question 2 (Section B) - 2 marks\n**NOT ATTEMPTED**\n---\n\
                      **MUST END WITH: \"Total Marks Achieved: X/80\"**";
        assert_eq!(exam_total(prompt), Some(80));
        let report = mock_report(prompt, 80);
        assert!(report.ends_with("Total Marks Achieved: 1/80"), "{report}");
    }

    #[test]
    fn section_lines() {
        assert_eq!(
            parse_section_line("  - Section C: 8 questions x 3 marks each (Short Answer II)"),
            Some(("C".into(), 8, 3, "Short Answer II".into()))
        );
        assert_eq!(parse_section_line("- Board: CBSE"), None);
    }
}
