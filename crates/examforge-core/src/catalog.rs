//! Board exam pattern catalog.
//!
//! Patterns are loaded once from a TOML table (embedded by default,
//! overridable by a file) and validated as a whole before use: every
//! board/band pair must be present and every pattern's section marks must add
//! up to its total.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ExamError, Result};
use crate::model::{Board, ClassBand, QuestionType};

const BUILTIN_PATTERNS: &str = include_str!("../data/patterns.toml");

/// One section of a paper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionSpec {
    pub label: String,
    /// Type label as written in the pattern table ("Long Answer II").
    pub type_label: String,
    pub question_type: QuestionType,
    pub question_count: u32,
    pub marks_each: u32,
}

impl SectionSpec {
    pub fn total_marks(&self) -> u32 {
        self.question_count * self.marks_each
    }
}

/// Which sections offer an "OR" alternative, and how many questions do.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct InternalChoice {
    pub sections: Vec<String>,
    pub questions_with_choice: u32,
}

/// The fixed structure of a paper for one board and class band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamPattern {
    pub board: Board,
    pub band: ClassBand,
    pub duration_minutes: u32,
    pub total_marks: u32,
    pub sections: Vec<SectionSpec>,
    pub internal_choice: InternalChoice,
}

impl ExamPattern {
    pub fn question_count(&self) -> u32 {
        self.sections.iter().map(|s| s.question_count).sum()
    }

    pub fn section(&self, label: &str) -> Option<&SectionSpec> {
        self.sections.iter().find(|s| s.label == label)
    }
}

// Intermediate TOML shape.

#[derive(Debug, Deserialize)]
struct RawPattern {
    duration_minutes: u32,
    total_marks: u32,
    sections: Vec<RawSection>,
    #[serde(default)]
    internal_choice: Option<RawChoice>,
}

#[derive(Debug, Deserialize)]
struct RawSection {
    label: String,
    question_type: String,
    question_count: u32,
    marks_each: u32,
}

#[derive(Debug, Deserialize)]
struct RawChoice {
    #[serde(default)]
    sections: Vec<String>,
    #[serde(default)]
    questions_with_choice: u32,
}

fn band_from_key(key: &str) -> Option<ClassBand> {
    match key {
        "class_6_to_8" => Some(ClassBand::Middle),
        "class_9_to_10" => Some(ClassBand::Secondary),
        "class_11_to_12" => Some(ClassBand::Senior),
        _ => None,
    }
}

/// Immutable, validated set of exam patterns.
#[derive(Debug, Clone)]
pub struct PatternCatalog {
    patterns: BTreeMap<(Board, ClassBand), ExamPattern>,
}

impl PatternCatalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_PATTERNS)
    }

    /// Load a catalog from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExamError::InvalidPattern(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a catalog from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, RawPattern>> = toml::from_str(content)
            .map_err(|e| ExamError::InvalidPattern(format!("failed to parse TOML: {e}")))?;

        let mut patterns = BTreeMap::new();
        for (board_key, bands) in raw {
            let board: Board = board_key
                .parse()
                .map_err(|_| ExamError::InvalidPattern(format!("unknown board '{board_key}'")))?;
            for (band_key, raw_pattern) in bands {
                let band = band_from_key(&band_key).ok_or_else(|| {
                    ExamError::InvalidPattern(format!("{board}: unknown class band '{band_key}'"))
                })?;
                let pattern = build_pattern(board, band, raw_pattern)?;
                patterns.insert((board, band), pattern);
            }
        }

        for board in Board::ALL {
            for band in ClassBand::ALL {
                if !patterns.contains_key(&(board, band)) {
                    return Err(ExamError::InvalidPattern(format!(
                        "missing pattern for {board} class {band}"
                    )));
                }
            }
        }

        Ok(Self { patterns })
    }

    /// The pattern for a board and class number.
    pub fn lookup(&self, board: Board, class_num: u8) -> Result<&ExamPattern> {
        let band = ClassBand::from_class(class_num)?;
        self.patterns
            .get(&(board, band))
            .ok_or_else(|| ExamError::InvalidPattern(format!("missing pattern for {board} {band}")))
    }

    /// Like [`lookup`](Self::lookup), parsing the board name first.
    pub fn lookup_str(&self, board: &str, class_num: u8) -> Result<&ExamPattern> {
        self.lookup(board.parse()?, class_num)
    }

    /// Every pattern, ordered by board then band.
    pub fn entries(&self) -> impl Iterator<Item = &ExamPattern> {
        self.patterns.values()
    }
}

fn build_pattern(board: Board, band: ClassBand, raw: RawPattern) -> Result<ExamPattern> {
    let ctx = format!("{board} class {band}");
    let invalid = |msg: String| ExamError::InvalidPattern(format!("{ctx}: {msg}"));

    if raw.duration_minutes == 0 {
        return Err(invalid("duration must be positive".into()));
    }
    if raw.sections.is_empty() {
        return Err(invalid("no sections".into()));
    }

    let mut seen = HashSet::new();
    let mut sections = Vec::with_capacity(raw.sections.len());
    for s in raw.sections {
        if !seen.insert(s.label.clone()) {
            return Err(invalid(format!("duplicate section '{}'", s.label)));
        }
        if s.question_count == 0 || s.marks_each == 0 {
            return Err(invalid(format!("section {} is empty", s.label)));
        }
        let question_type = s
            .question_type
            .parse()
            .map_err(|e: String| invalid(format!("section {}: {e}", s.label)))?;
        sections.push(SectionSpec {
            label: s.label,
            type_label: s.question_type,
            question_type,
            question_count: s.question_count,
            marks_each: s.marks_each,
        });
    }

    let sum: u32 = sections.iter().map(SectionSpec::total_marks).sum();
    if sum != raw.total_marks {
        return Err(invalid(format!(
            "section marks add up to {sum}, expected {}",
            raw.total_marks
        )));
    }

    let internal_choice = match raw.internal_choice {
        Some(choice) => {
            let mut eligible = 0;
            for label in &choice.sections {
                let section = sections
                    .iter()
                    .find(|s| &s.label == label)
                    .ok_or_else(|| invalid(format!("internal choice names unknown section {label}")))?;
                eligible += section.question_count;
            }
            if choice.questions_with_choice > eligible {
                return Err(invalid(format!(
                    "{} questions with choice but only {eligible} questions in {}",
                    choice.questions_with_choice,
                    choice.sections.join(", ")
                )));
            }
            InternalChoice {
                sections: choice.sections,
                questions_with_choice: choice.questions_with_choice,
            }
        }
        None => InternalChoice::default(),
    };

    Ok(ExamPattern {
        board,
        band,
        duration_minutes: raw.duration_minutes,
        total_marks: raw.total_marks,
        sections,
        internal_choice,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_BAND: &str = r#"
duration_minutes = 60
total_marks = 10
sections = [
    { label = "A", question_type = "MCQ", question_count = 10, marks_each = 1 },
]
"#;

    fn full_table_with(override_section: &str) -> String {
        let mut s = String::new();
        for board in ["CBSE", "ICSE", "WBBSE"] {
            for band in ["class_6_to_8", "class_9_to_10", "class_11_to_12"] {
                s.push_str(&format!("[{board}.{band}]\n"));
                if board == "ICSE" && band == "class_9_to_10" {
                    s.push_str(override_section);
                } else {
                    s.push_str(MINIMAL_BAND);
                }
                s.push('\n');
            }
        }
        s
    }

    #[test]
    fn builtin_marks_add_up_for_every_class() {
        let catalog = PatternCatalog::builtin().unwrap();
        for board in Board::ALL {
            for class_num in 6..=12 {
                let pattern = catalog.lookup(board, class_num).unwrap();
                let sum: u32 = pattern.sections.iter().map(|s| s.total_marks()).sum();
                assert_eq!(sum, pattern.total_marks, "{board} class {class_num}");
            }
        }
        assert_eq!(catalog.entries().count(), 9);
    }

    #[test]
    fn cbse_class_10_pattern() {
        let catalog = PatternCatalog::builtin().unwrap();
        let pattern = catalog.lookup_str("CBSE", 10).unwrap();
        assert_eq!(pattern.duration_minutes, 180);
        assert_eq!(pattern.total_marks, 80);
        let labels: Vec<&str> = pattern.sections.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["A", "B", "C", "D"]);
        assert_eq!(pattern.sections[0].question_type, QuestionType::Mcq);
        assert_eq!(pattern.internal_choice.sections, ["C", "D"]);
    }

    #[test]
    fn lenient_type_labels_are_kept() {
        let catalog = PatternCatalog::builtin().unwrap();
        let pattern = catalog.lookup(Board::Cbse, 12).unwrap();
        let d = pattern.section("D").unwrap();
        assert_eq!(d.type_label, "Long Answer II");
        assert_eq!(d.question_type, QuestionType::LongAnswer);

        let wb = catalog.lookup(Board::Wbbse, 7).unwrap();
        assert_eq!(wb.section("C").unwrap().question_type, QuestionType::LongAnswer);
    }

    #[test]
    fn unsupported_inputs_are_errors() {
        let catalog = PatternCatalog::builtin().unwrap();
        assert!(matches!(
            catalog.lookup_str("IB", 10),
            Err(ExamError::UnsupportedBoard(_))
        ));
        assert!(matches!(
            catalog.lookup(Board::Icse, 5),
            Err(ExamError::UnsupportedClass(5))
        ));
        assert!(matches!(
            catalog.lookup(Board::Icse, 13),
            Err(ExamError::UnsupportedClass(13))
        ));
    }

    #[test]
    fn mismatched_marks_rejected() {
        let table = full_table_with(
            r#"
duration_minutes = 60
total_marks = 12
sections = [
    { label = "A", question_type = "MCQ", question_count = 10, marks_each = 1 },
]
"#,
        );
        let err = PatternCatalog::from_toml_str(&table).unwrap_err();
        assert!(err.to_string().contains("add up to 10"), "got: {err}");
    }

    #[test]
    fn choice_on_unknown_section_rejected() {
        let table = full_table_with(
            r#"
duration_minutes = 60
total_marks = 10
internal_choice = { sections = ["Z"], questions_with_choice = 1 }
sections = [
    { label = "A", question_type = "MCQ", question_count = 10, marks_each = 1 },
]
"#,
        );
        assert!(matches!(
            PatternCatalog::from_toml_str(&table),
            Err(ExamError::InvalidPattern(_))
        ));
    }

    #[test]
    fn missing_band_rejected() {
        let table = format!("[CBSE.class_6_to_8]\n{MINIMAL_BAND}");
        let err = PatternCatalog::from_toml_str(&table).unwrap_err();
        assert!(err.to_string().contains("missing pattern"), "got: {err}");
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("examforge-patterns-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, full_table_with(MINIMAL_BAND)).unwrap();
        let catalog = PatternCatalog::load(&path).unwrap();
        assert_eq!(catalog.lookup(Board::Wbbse, 11).unwrap().total_marks, 10);
        std::fs::remove_file(&path).ok();
    }
}
