//! Prompt construction for paper generation and answer evaluation.
//!
//! Both builders are pure: the same inputs always render byte-identical text.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::catalog::ExamPattern;
use crate::model::{Board, ChoiceSelection, Difficulty, ExamRecord};

/// Maximum number of characters of syllabus text rendered into a prompt.
pub const SYLLABUS_EXCERPT_CHARS: usize = 6000;

/// Marker rendered for questions the student left untouched.
pub const NOT_ATTEMPTED: &str = "NOT ATTEMPTED";

/// What the student asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRequest {
    pub board: Board,
    pub class_num: u8,
    pub subject: String,
    #[serde(default)]
    pub chapter_focus: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Syllabus text extracted from an uploaded document, if any.
    #[serde(default)]
    pub syllabus: Option<String>,
}

/// Truncate to at most `max_chars` characters, never splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Render the paper generation prompt.
pub fn build_generation_prompt(request: &PaperRequest, pattern: &ExamPattern) -> String {
    let board = request.board;
    let class_num = request.class_num;
    let mut p = String::new();

    let _ = writeln!(p, "You are an expert Indian education board examiner for {board}.");
    p.push('\n');
    p.push_str("Generate a COMPLETE question paper for:\n");
    let _ = writeln!(p, "- Board: {board}");
    let _ = writeln!(p, "- Class: {class_num}");
    let _ = writeln!(p, "- Subject: {}", request.subject.trim());
    let _ = writeln!(p, "- Total Marks: {}", pattern.total_marks);
    let _ = writeln!(p, "- Duration: {} minutes", pattern.duration_minutes);
    let _ = writeln!(p, "- Difficulty: {}", request.difficulty);
    if let Some(focus) = request.chapter_focus.as_deref().map(str::trim) {
        if !focus.is_empty() {
            let _ = writeln!(p, "- Focus on these chapters/topics: {focus}");
        }
    }

    p.push_str("\nSTRICT REQUIREMENTS:\n");
    let _ = writeln!(p, "1. Follow the EXACT {board} Class {class_num} pattern:");
    for section in &pattern.sections {
        let _ = writeln!(
            p,
            "  - Section {}: {} questions x {} marks each ({})",
            section.label, section.question_count, section.marks_each, section.type_label
        );
    }
    let choice = &pattern.internal_choice;
    if choice.questions_with_choice > 0 {
        let _ = writeln!(
            p,
            "  - Internal Choice: {} questions in sections {} must offer an \"OR\" alternative",
            choice.questions_with_choice,
            choice.sections.join(", ")
        );
    }

    let _ = writeln!(p, "\n2. Difficulty: {}", request.difficulty.guidance());

    p.push_str(
        "\n3. For Mathematics and Science subjects:\n\
         \x20  - Use LaTeX for every mathematical expression: \\frac{}{}, \\sqrt{}, ^{}, _{}, \\int, \\sum, \\lim\n\
         \x20  - Enclose inline math in $ and display math in $$\n\
         \x20  - Escape every backslash inside JSON strings (write \\\\frac, not \\frac)\n",
    );

    p.push_str(
        "\n4. Question types:\n\
         \x20  - MCQ: exactly 4 options (A, B, C, D) and the correct option label\n\
         \x20  - Short Answer: focused questions answerable in a few steps\n\
         \x20  - Long Answer: multi-step problems requiring detailed working\n\
         \x20  - Case Study: a real-world passage followed by sub-questions\n",
    );

    p.push_str(
        "\n5. Internal choice: put the alternative in \"alternative_question_text\"; \
         both alternatives carry the same marks and difficulty.\n",
    );
    p.push_str("\n6. Marks distribution must match the pattern EXACTLY.\n");

    if let Some(syllabus) = request.syllabus.as_deref().map(str::trim) {
        if !syllabus.is_empty() {
            let excerpt = truncate_chars(syllabus, SYLLABUS_EXCERPT_CHARS);
            p.push_str("\nSYLLABUS (draw every question from this content):\n");
            p.push_str(excerpt);
            if excerpt.len() < syllabus.len() {
                p.push_str("\n[syllabus truncated]");
            }
            p.push('\n');
        }
    }

    p.push_str("\nOUTPUT FORMAT (STRICT JSON):\n");
    let _ = write!(
        p,
        r#"{{
  "duration_minutes": {duration},
  "total_marks": {total},
  "instructions": ["Instruction 1", "Instruction 2"],
  "sections": [
    {{
      "section": "A",
      "title": "Section A Title",
      "questions": [
        {{
          "question_number": 1,
          "question_text": "Question with LaTeX if needed: $x^2$",
          "question_type": "MCQ",
          "marks": 1,
          "has_internal_choice": false,
          "alternative_question_text": null,
          "options": {{"A": "Option A", "B": "Option B", "C": "Option C", "D": "Option D"}},
          "correct_answer": "B"
        }}
      ]
    }}
  ]
}}"#,
        duration = pattern.duration_minutes,
        total = pattern.total_marks,
    );
    p.push_str("\n\nGenerate the complete paper now. Output ONLY valid JSON, no additional text.");
    p
}

/// Render the examiner prompt for a submitted exam. Uploaded documents are
/// named per question; their bytes travel as request attachments.
pub fn build_evaluation_prompt(record: &ExamRecord) -> String {
    let exam = &record.exam;
    let total = exam.total_marks;
    let mut p = String::new();

    let _ = writeln!(
        p,
        "You are a highly experienced examiner for the {} board, evaluating a Class {} {} examination.",
        exam.board, exam.class_num, exam.subject
    );
    p.push_str("\nSTUDENT INFORMATION:\n");
    let _ = writeln!(p, "- Name: {}", exam.student.name);
    let _ = writeln!(p, "- Email: {}", exam.student.email);

    p.push_str(
        "\nEXAMINER RULES:\n\
         1. Evaluate step by step. Award partial marks for correct method even when the final answer is wrong. \
         If a step is missing, say \"Step X is missing\".\n\
         2. Do NOT hallucinate. Evaluate only what is provided and never invent missing steps.\n\
         3. Treat every LaTeX expression as intentional. Do not reformat or reinterpret equations.\n\
         4. Uploaded PDF answer sheets are attached to this request. Evaluate their content, and do not penalize \
         brief typed answers when a sheet exists (\"Detailed working referenced in uploaded answer sheet\").\n\
         5. For internal-choice questions, evaluate only the alternative the student chose.\n\
         6. Use a formal board-examination tone, address the student by name, and format the report in Markdown \
         with a section-wise marks table.\n",
    );
    let _ = writeln!(
        p,
        "7. The report MUST end with the line \"Total Marks Achieved: X/{total}\"."
    );

    p.push_str("\n---\n\nEXAM DETAILS:\n");
    let _ = writeln!(p, "- Board: {}", exam.board);
    let _ = writeln!(p, "- Class: {}", exam.class_num);
    let _ = writeln!(p, "- Subject: {}", exam.subject);
    let _ = writeln!(p, "- Total Marks: {total}");
    let _ = writeln!(p, "- Duration: {} minutes", exam.duration_minutes);

    p.push_str("\n---\n\nQUESTIONS AND STUDENT ANSWERS:\n");
    for question in &record.questions {
        let _ = write!(
            p,
            "\nQuestion {} (Section {}) - {} marks\nType: {}\n{}\n",
            question.sequence_number,
            question.section,
            question.marks,
            question.question_type,
            question.text
        );
        if let Some(options) = &question.options {
            for (label, text) in options {
                let _ = writeln!(p, "  ({label}) {text}");
            }
        }
        if question.has_internal_choice {
            if let Some(alt) = &question.alternative_text {
                let _ = write!(p, "OR\n{alt}\n");
            }
        }
        p.push('\n');

        let answer = record.answer_for(question.id);
        let attempted = answer.is_some_and(|a| a.is_satisfying());
        match answer.filter(|_| attempted) {
            None => {
                let _ = writeln!(p, "**{NOT_ATTEMPTED}**");
            }
            Some(answer) => {
                if question.has_internal_choice {
                    let chosen = match answer.selected_choice.unwrap_or(ChoiceSelection::Main) {
                        ChoiceSelection::Main => "the main question",
                        ChoiceSelection::Alternative => "the OR alternative",
                    };
                    let _ = writeln!(p, "**Internal choice:** the student answered {chosen}.");
                }
                if let Some(option) = &answer.selected_option {
                    let _ = writeln!(p, "**Selected Option:** {option}");
                }
                match answer.typed_answer.as_deref().filter(|t| !t.trim().is_empty()) {
                    Some(typed) => {
                        let _ = write!(p, "**Typed Answer:**\n{typed}\n");
                    }
                    None if answer.selected_option.is_none() => {
                        p.push_str("**NO TYPED ANSWER**\n");
                    }
                    None => {}
                }
                if !answer.files.is_empty() {
                    let names: Vec<&str> = answer.files.iter().map(|f| f.filename.as_str()).collect();
                    let _ = writeln!(
                        p,
                        "**[{} PDF answer sheet(s) uploaded for this question: {}]**",
                        answer.files.len(),
                        names.join(", ")
                    );
                }
            }
        }
        p.push_str("---\n");
    }

    let _ = write!(
        p,
        "\nProvide a comprehensive evaluation report in Markdown. Include a greeting, section-wise marks, \
         feedback per section, strengths and weaknesses, and a percentage with a grade recommendation.\n\
         **MUST END WITH: \"Total Marks Achieved: X/{total}\"**"
    );
    p
}
