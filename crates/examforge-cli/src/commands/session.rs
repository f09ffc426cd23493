//! Exam-taking commands: `start`, `current`, `answer`, `upload`, `next`,
//! `submit` and `timer`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use examforge_core::model::{ChoiceSelection, Exam};
use examforge_core::progress::{AnswerUpdate, CurrentQuestion, QuestionView};

use super::{clock, engine, print_json};

pub async fn start(exam_id: Uuid, config_path: Option<&Path>, json: bool) -> Result<()> {
    let engine = engine(config_path).await?;
    let exam = engine.progress().start(exam_id).await?;
    if json {
        return print_json(&exam);
    }
    println!(
        "Exam {} started: {} minutes, {} marks.",
        exam.id, exam.duration_minutes, exam.total_marks
    );
    let current = engine.progress().current(exam_id).await?;
    print_current(&current);
    Ok(())
}

pub async fn current(exam_id: Uuid, config_path: Option<&Path>, json: bool) -> Result<()> {
    let engine = engine(config_path).await?;
    let current = engine.progress().current(exam_id).await?;
    if json {
        return print_json(&current);
    }
    print_current(&current);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn answer(
    exam_id: Uuid,
    question: u32,
    text: Option<String>,
    option: Option<String>,
    choice: Option<ChoiceSelection>,
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    if text.is_none() && option.is_none() && choice.is_none() {
        bail!("nothing to save: pass --text, --option or --choice");
    }
    let engine = engine(config_path).await?;
    let progress = engine.progress();
    let target = progress.question_by_number(exam_id, question).await?;
    let answer = progress
        .save_answer(
            exam_id,
            target.id,
            AnswerUpdate {
                typed_answer: text,
                selected_option: option,
                selected_choice: choice,
            },
        )
        .await?;

    if json {
        return print_json(&answer);
    }
    println!("Saved answer to question {question}.");
    if let Some(option) = &answer.selected_option {
        println!("  Selected option: {option}");
    }
    if let Some(choice) = answer.selected_choice {
        println!("  Answering: {choice}");
    }
    if let Some(typed) = &answer.typed_answer {
        println!("  Answer: {typed}");
    }
    Ok(())
}

pub async fn upload(
    exam_id: Uuid,
    question: u32,
    file: PathBuf,
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("not a file name: {}", file.display()))?
        .to_string();
    let bytes =
        std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;

    let engine = engine(config_path).await?;
    let progress = engine.progress();
    let target = progress.question_by_number(exam_id, question).await?;
    let uploaded = progress
        .upload_file(exam_id, target.id, &filename, &bytes)
        .await?;

    if json {
        return print_json(&uploaded);
    }
    println!(
        "Uploaded {} ({} bytes) to question {question}.",
        uploaded.filename, uploaded.size_bytes
    );
    Ok(())
}

pub async fn next(exam_id: Uuid, config_path: Option<&Path>, json: bool) -> Result<()> {
    let engine = engine(config_path).await?;
    let current = engine.progress().next(exam_id).await?;
    if json {
        return print_json(&current);
    }
    print_current(&current);
    Ok(())
}

pub async fn submit(exam_id: Uuid, config_path: Option<&Path>, json: bool) -> Result<()> {
    let engine = engine(config_path).await?;
    let exam = engine.progress().submit(exam_id).await?;
    if json {
        return print_json(&exam);
    }
    print_submitted(&exam);
    Ok(())
}

pub async fn timer(
    exam_id: Uuid,
    snapshot: Option<u32>,
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let engine = engine(config_path).await?;
    let progress = engine.progress();
    let state = match snapshot {
        Some(seconds) => progress.snapshot_timer(exam_id, seconds).await?,
        None => progress.timer(exam_id).await?,
    };
    if json {
        return print_json(&state);
    }
    println!(
        "{}: {} remaining of {} minutes",
        state.status,
        clock(state.remaining_seconds),
        state.duration_minutes
    );
    if state.auto_submit {
        println!("Time is up. Submit with: examforge submit {exam_id}");
    }
    Ok(())
}

fn print_submitted(exam: &Exam) {
    println!("Exam {} submitted. Answers are locked.", exam.id);
    println!("Evaluate with: examforge evaluate {}", exam.id);
}

fn print_question(q: &QuestionView) {
    println!(
        "Question {} (Section {}, {}, {} marks)",
        q.sequence_number, q.section, q.question_type, q.marks
    );
    println!("  {}", q.text);
    if let Some(options) = &q.options {
        for (key, value) in options {
            println!("    {key}) {value}");
        }
    }
    if let Some(alternative) = q.alternative_text.as_deref().filter(|_| q.has_internal_choice) {
        println!("  OR");
        println!("  {alternative}");
    }
}

fn print_current(current: &CurrentQuestion) {
    let Some(question) = &current.question else {
        println!(
            "All {} questions visited. Submit with: examforge submit {}",
            current.total_questions, current.exam_id
        );
        return;
    };
    println!(
        "[{}/{}] {} remaining",
        current.question_index + 1,
        current.total_questions,
        clock(current.time_remaining_seconds)
    );
    print_question(question);
    match &current.answer {
        Some(answer) if answer.is_satisfying() => println!("  (answered)"),
        _ => println!("  (not answered yet)"),
    }
    if current.is_last_question {
        println!("This is the last question.");
    }
}
