//! The `examforge patterns` command.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Table};

use examforge_core::catalog::ExamPattern;
use examforge_core::model::Board;
use examforge_providers::load_config_from;

use super::print_json;

pub fn execute(board: Option<Board>, config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config_from(config_path)?;
    let catalog = config.pattern_catalog()?;
    let patterns: Vec<&ExamPattern> = catalog
        .entries()
        .filter(|p| board.map_or(true, |b| p.board == b))
        .collect();

    if json {
        return print_json(&patterns);
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Board", "Classes", "Duration", "Marks", "Questions", "Sections", "Choice",
    ]);
    for pattern in &patterns {
        let sections = pattern
            .sections
            .iter()
            .map(|s| {
                format!(
                    "{}: {} x {} ({})",
                    s.label, s.question_count, s.marks_each, s.type_label
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let choice = if pattern.internal_choice.sections.is_empty() {
            "-".to_string()
        } else {
            format!(
                "{} in {}",
                pattern.internal_choice.questions_with_choice,
                pattern.internal_choice.sections.join(", ")
            )
        };
        table.add_row(vec![
            Cell::new(pattern.board),
            Cell::new(pattern.band),
            Cell::new(format!("{} min", pattern.duration_minutes)),
            Cell::new(pattern.total_marks),
            Cell::new(pattern.question_count()),
            Cell::new(sections),
            Cell::new(choice),
        ]);
    }
    println!("{table}");
    Ok(())
}
