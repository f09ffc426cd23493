//! The `examforge evaluate` command.

use std::path::Path;

use anyhow::Result;
use uuid::Uuid;

use super::{engine, print_json};

pub async fn execute(exam_id: Uuid, config_path: Option<&Path>, json: bool) -> Result<()> {
    let engine = engine(config_path).await?;
    let evaluation = engine.evaluate(exam_id).await?;
    if json {
        return print_json(&evaluation);
    }

    println!("{}", evaluation.report.trim_end());
    println!();
    match (&evaluation.model, evaluation.cached) {
        (_, true) => println!("(stored report, no model call made)"),
        (Some(model), false) => println!("(evaluated by {model})"),
        (None, false) => {}
    }
    if let Some(marks) = evaluation.marks {
        println!("Marks: {}/{}", marks.achieved, marks.total);
    }
    Ok(())
}
