//! The `examforge create` command.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use serde::Serialize;

use examforge_core::engine::CreateExamRequest;
use examforge_core::model::{Board, Difficulty, Exam, Student};
use examforge_core::progress::QuestionView;
use examforge_core::prompt::PaperRequest;

use super::{engine, print_json};

pub struct CreateArgs {
    pub name: String,
    pub email: String,
    pub board: Board,
    pub class: u8,
    pub subject: String,
    pub chapter: Option<String>,
    pub difficulty: Difficulty,
    pub duration: Option<u32>,
    pub syllabus: Option<PathBuf>,
}

/// A freshly created exam as the student may see it.
#[derive(Serialize)]
struct CreatedExam {
    exam: Exam,
    questions: Vec<QuestionView>,
}

pub async fn execute(args: CreateArgs, config_path: Option<&Path>, json: bool) -> Result<()> {
    let syllabus = args
        .syllabus
        .as_deref()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read syllabus: {}", path.display()))
        })
        .transpose()?;

    let engine = engine(config_path).await?;
    let request = CreateExamRequest {
        student: Student {
            name: args.name,
            email: args.email,
        },
        paper: PaperRequest {
            board: args.board,
            class_num: args.class,
            subject: args.subject,
            chapter_focus: args.chapter.filter(|c| !c.trim().is_empty()),
            difficulty: args.difficulty,
            syllabus,
        },
        duration_minutes: args.duration,
    };
    let record = engine.create_exam(request).await?;

    if json {
        return print_json(&CreatedExam {
            questions: record.questions.iter().map(QuestionView::from).collect(),
            exam: record.exam,
        });
    }

    let exam = &record.exam;
    println!("Created exam {}", exam.id);
    println!(
        "{} class {} {} ({}), {} minutes, {} marks",
        exam.board, exam.class_num, exam.subject, exam.difficulty, exam.duration_minutes, exam.total_marks
    );

    let mut sections: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for q in &record.questions {
        let entry = sections.entry(q.section.as_str()).or_default();
        entry.0 += 1;
        entry.1 += q.marks;
    }
    let mut table = Table::new();
    table.set_header(vec!["Section", "Questions", "Marks"]);
    for (label, (count, marks)) in &sections {
        table.add_row(vec![Cell::new(label), Cell::new(count), Cell::new(marks)]);
    }
    println!("{table}");
    println!("\nStart with: examforge start {}", exam.id);
    Ok(())
}
