//! The `examforge list` and `examforge delete` commands.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Table};
use uuid::Uuid;

use super::{engine, print_json};

pub async fn list(config_path: Option<&Path>, json: bool) -> Result<()> {
    let engine = engine(config_path).await?;
    let exams = engine.list_exams().await?;
    if json {
        return print_json(&exams);
    }
    if exams.is_empty() {
        println!("No exams yet. Create one with `examforge create`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Exam", "Student", "Board", "Class", "Subject", "Status", "Created",
    ]);
    for exam in &exams {
        table.add_row(vec![
            Cell::new(exam.id),
            Cell::new(&exam.student.name),
            Cell::new(exam.board),
            Cell::new(exam.class_num),
            Cell::new(&exam.subject),
            Cell::new(exam.status),
            Cell::new(exam.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub async fn delete(exam_id: Uuid, config_path: Option<&Path>, json: bool) -> Result<()> {
    let engine = engine(config_path).await?;
    let record = engine.delete_exam(exam_id).await?;
    if json {
        return print_json(&serde_json::json!({
            "deleted": exam_id,
            "questions": record.questions.len(),
            "answers": record.answers.len(),
        }));
    }
    println!(
        "Deleted exam {exam_id} ({} questions, {} answers).",
        record.questions.len(),
        record.answers.len()
    );
    Ok(())
}
