//! Read-only views of a finished exam: `report`, `summary` and `paper`.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Table};
use uuid::Uuid;

use examforge_core::model::Answer;

use super::{engine, print_json};

pub async fn report(exam_id: Uuid, config_path: Option<&Path>, json: bool) -> Result<()> {
    let engine = engine(config_path).await?;
    let report = engine.report(exam_id).await?;
    if json {
        return print_json(&serde_json::json!({
            "exam_id": exam_id,
            "report": report,
        }));
    }
    println!("{}", report.trim_end());
    Ok(())
}

pub async fn summary(exam_id: Uuid, config_path: Option<&Path>, json: bool) -> Result<()> {
    let engine = engine(config_path).await?;
    let summary = engine.summary(exam_id).await?;
    if json {
        return print_json(&summary);
    }

    let dash = || "-".to_string();
    let exam_id = summary.exam_id.to_string();
    let mut table = Table::new();
    table.set_header(vec!["Exam", exam_id.as_str()]);
    let rows = [
        ("Student", summary.student_name.clone()),
        (
            "Paper",
            format!(
                "{} class {} {} ({})",
                summary.board, summary.class_num, summary.subject, summary.difficulty
            ),
        ),
        ("Status", summary.status.to_string()),
        (
            "Answered",
            format!(
                "{} of {} ({} unanswered)",
                summary.answered_questions, summary.total_questions, summary.unanswered_questions
            ),
        ),
        ("Uploaded files", summary.uploaded_files.to_string()),
        (
            "Marks",
            summary.marks_achieved.map_or_else(dash, |m| {
                format!("{m}/{}", summary.total_marks)
            }),
        ),
        (
            "Percentage",
            summary.percentage.map_or_else(dash, |p| format!("{p:.2}%")),
        ),
        (
            "Time taken",
            summary.time_taken_minutes.map_or_else(dash, |m| {
                format!("{m} of {} minutes", summary.duration_minutes)
            }),
        ),
    ];
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    println!("{table}");
    Ok(())
}

pub async fn paper(exam_id: Uuid, config_path: Option<&Path>, json: bool) -> Result<()> {
    let engine = engine(config_path).await?;
    let paper = engine.progress().full_paper(exam_id).await?;
    if json {
        return print_json(&paper);
    }

    println!(
        "{} class {} {}: {} minutes, {} marks",
        paper.board, paper.class_num, paper.subject, paper.duration_minutes, paper.total_marks
    );
    for instruction in &paper.instructions {
        println!("  * {instruction}");
    }

    let mut section = "";
    for entry in &paper.entries {
        let q = &entry.question;
        if q.section != section {
            section = &q.section;
            println!("\nSection {section}");
        }
        println!("\n{}. [{} marks] {}", q.sequence_number, q.marks, q.text);
        if let Some(options) = &q.options {
            for (key, value) in options {
                println!("    {key}) {value}");
            }
        }
        if let Some(alternative) = q.alternative_text.as_deref().filter(|_| q.has_internal_choice) {
            println!("  OR {alternative}");
        }
        if let Some(correct) = &q.correct_answer {
            println!("  Correct answer: {correct}");
        }
        println!("  Your answer: {}", describe(entry.answer.as_ref()));
    }
    Ok(())
}

fn describe(answer: Option<&Answer>) -> String {
    let Some(answer) = answer.filter(|a| a.is_satisfying()) else {
        return "not attempted".to_string();
    };
    let mut parts = Vec::new();
    if let Some(choice) = answer.selected_choice {
        parts.push(format!("({choice})"));
    }
    if let Some(option) = &answer.selected_option {
        parts.push(format!("option {option}"));
    }
    if let Some(text) = answer.typed_answer.as_deref().filter(|t| !t.trim().is_empty()) {
        parts.push(text.to_string());
    }
    if !answer.files.is_empty() {
        let names: Vec<&str> = answer.files.iter().map(|f| f.filename.as_str()).collect();
        parts.push(format!("[files: {}]", names.join(", ")));
    }
    parts.join(" ")
}
