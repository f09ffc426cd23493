//! Tolerant parsing of model responses into structured papers.
//!
//! Models wrap JSON in markdown, leave trailing commas, use typographic
//! quotes, truncate output and, above all, write LaTeX with single
//! backslashes. Parsing runs in stages, each tried only when the previous one
//! failed:
//!
//! 1. strip code fences;
//! 2. parse directly, unless the text holds LaTeX commands that JSON would
//!    silently read as control escapes (`\frac` as form feed + "rac");
//! 3. lexical repair: isolate the outermost object, normalize quotes, drop
//!    trailing commas, escape stray backslashes and raw control characters;
//! 4. structural repair: close strings and brackets, insert missing commas,
//!    map Python literals;
//! 5. give up with a [`ExamError::ResponseParse`] carrying an excerpt.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::ExamPattern;
use crate::error::{ExamError, Result};
use crate::model::{Question, QuestionType};

/// LaTeX commands starting with a letter JSON treats as a control escape
/// (`b`, `f`, `n`, `r`, `t`).
const LATEX_COMMANDS: &[&str] = &[
    // b
    "bar", "beta", "begin", "big", "bigcap", "bigcup", "bigg", "binom", "bmod", "bot",
    "boxed", "bullet", "because", "bf", "breve",
    // f
    "forall", "frac", "flat", "frown", "footnotesize", "fbox",
    // n
    "nabla", "natural", "ne", "nearrow", "neg", "neq", "newline", "ngeq", "ni", "nleq",
    "nmid", "not", "notin", "nsubseteq", "nu", "nwarrow", "nexists",
    // r
    "rangle", "rbrace", "rceil", "rfloor", "rho", "right", "rightarrow", "rightharpoonup",
    "rightleftharpoons", "rm", "root",
    // t
    "tan", "tanh", "tau", "text", "textbf", "textit", "textrm", "tfrac", "therefore", "theta",
    "tilde", "times", "to", "top", "triangle", "triangleleft", "triangleright", "tt",
];

/// Longest command name only trusted inside `$...$` math.
const AMBIGUOUS_COMMAND_LEN: usize = 3;

/// Number of characters shown on each side of a parse error.
const EXCERPT_RADIUS: usize = 120;

// ---------------------------------------------------------------------------
// Stage 1: code fences
// ---------------------------------------------------------------------------

/// Extract JSON from a markdown-formatted response.
///
/// Prefers ```json blocks, then bare ``` blocks, and accepts an unclosed
/// trailing block. Text without fences is returned as-is.
pub fn extract_json_from_markdown(response: &str) -> String {
    let mut json_blocks = Vec::new();
    let mut generic_blocks = Vec::new();
    let mut in_block = false;
    let mut is_json_block = false;
    let mut is_generic_block = false;
    let mut current = String::new();

    for line in response.lines() {
        let trimmed = line.trim();

        if !in_block && trimmed.starts_with("```") {
            in_block = true;
            let lang = trimmed.trim_start_matches('`').trim().to_lowercase();
            is_json_block = lang == "json" || lang == "json5" || lang == "jsonc";
            is_generic_block = lang.is_empty();
            current.clear();
            continue;
        }

        if in_block && trimmed.starts_with("```") && trimmed.trim_start_matches('`').is_empty() {
            in_block = false;
            if is_json_block {
                json_blocks.push(std::mem::take(&mut current));
            } else if is_generic_block {
                generic_blocks.push(std::mem::take(&mut current));
            }
            current.clear();
            continue;
        }

        if in_block {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }

    // Truncated response: keep whatever the open block accumulated.
    if in_block && !current.is_empty() {
        if is_json_block {
            json_blocks.push(current);
        } else if is_generic_block {
            generic_blocks.push(current);
        }
    }

    if let Some(block) = json_blocks.into_iter().next() {
        return block;
    }
    if let Some(block) = generic_blocks.into_iter().next() {
        return block;
    }
    response.trim().to_string()
}

// ---------------------------------------------------------------------------
// Stage 2: LaTeX detection
// ---------------------------------------------------------------------------

/// Length of the math delimiter (`$` or `$$`) at `i`, or 0.
fn math_delimiter(chars: &[char], i: usize) -> usize {
    match (chars.get(i), chars.get(i + 1)) {
        (Some('$'), Some('$')) => 2,
        (Some('$'), _) => 1,
        _ => 0,
    }
}

/// Whether the letters at `start` spell a LaTeX command. Commands this short
/// also spell a real escape followed by prose (`\ni.e.`, `\tan entry`), so
/// outside math they are read as JSON escapes.
fn latex_command_at(chars: &[char], start: usize, in_math: bool) -> bool {
    let run: String = chars[start..]
        .iter()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    LATEX_COMMANDS.contains(&run.as_str()) && (in_math || run.len() > AMBIGUOUS_COMMAND_LEN)
}

/// Whether a direct JSON parse would turn a LaTeX command into a control
/// character.
pub fn has_latex_control_escape(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let mut in_math = false;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => match chars.get(i + 1).copied() {
                Some('b' | 'f' | 'n' | 'r' | 't') if latex_command_at(&chars, i + 1, in_math) => {
                    return true
                }
                Some(_) => i += 2,
                None => i += 1,
            },
            // Math never spans strings.
            '"' => {
                in_math = false;
                i += 1;
            }
            '$' => {
                in_math = !in_math;
                i += math_delimiter(&chars, i);
            }
            _ => i += 1,
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Stage 3: lexical repair
// ---------------------------------------------------------------------------

fn isolate_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from.min(chars.len())..]
        .iter()
        .copied()
        .find(|c| !c.is_whitespace())
}

/// Copy the escape sequence starting at `chars[i] == '\\'`, doubling the
/// backslash when it does not start a valid JSON escape. Returns the number
/// of characters consumed.
fn push_escape(chars: &[char], i: usize, in_math: bool, out: &mut String) -> usize {
    match chars.get(i + 1).copied() {
        Some(c @ ('"' | '\\' | '/')) => {
            out.push('\\');
            out.push(c);
            2
        }
        Some('u')
            if chars.len() >= i + 6 && chars[i + 2..i + 6].iter().all(|c| c.is_ascii_hexdigit()) =>
        {
            out.push('\\');
            1
        }
        Some(c @ ('b' | 'f' | 'n' | 'r' | 't')) if !latex_command_at(chars, i + 1, in_math) => {
            out.push('\\');
            out.push(c);
            2
        }
        // A literal dollar never opens math.
        Some('$') => {
            out.push_str("\\\\$");
            2
        }
        _ => {
            out.push_str("\\\\");
            1
        }
    }
}

fn is_curly_quote(c: char) -> bool {
    matches!(c, '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}')
}

/// Normalize quotes, drop trailing commas and escape stray backslashes and
/// raw control characters inside strings.
pub fn repair_lexical(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 32);
    let mut in_string = false;
    // Strings opened with a typographic quote close on one too.
    let mut curly = false;
    let mut in_math = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            match c {
                '\\' => {
                    i += push_escape(&chars, i, in_math, &mut out);
                    continue;
                }
                '$' => {
                    in_math = !in_math;
                    let len = math_delimiter(&chars, i);
                    out.extend(&chars[i..i + len]);
                    i += len;
                    continue;
                }
                '"' if !curly => {
                    in_string = false;
                    in_math = false;
                    out.push('"');
                }
                c if curly && is_curly_quote(c) => {
                    in_string = false;
                    curly = false;
                    in_math = false;
                    out.push('"');
                }
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
        } else {
            match c {
                '"' => {
                    in_string = true;
                    curly = false;
                    out.push('"');
                }
                c if is_curly_quote(c) => {
                    in_string = true;
                    curly = true;
                    out.push('"');
                }
                ',' if matches!(next_significant(&chars, i + 1), Some('}' | ']')) => {}
                c => out.push(c),
            }
        }
        i += 1;
    }
    out
}

// ---------------------------------------------------------------------------
// Stage 4: structural repair
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prev {
    Start,
    Open,
    Colon,
    Comma,
    Value,
}

fn trim_trailing_comma(out: &mut String) {
    let len = out.trim_end().len();
    if out[..len].ends_with(',') {
        out.truncate(len - 1);
    }
}

fn close_dangling(out: &mut String, prev: Prev) {
    match prev {
        Prev::Comma => trim_trailing_comma(out),
        Prev::Colon => out.push_str("null"),
        _ => {}
    }
}

/// Copy a string token starting at `chars[start] == '"'`. Returns the index
/// after the token and whether it was terminated.
fn scan_string(chars: &[char], start: usize) -> (usize, bool) {
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 2,
            '"' => return (j + 1, true),
            _ => j += 1,
        }
    }
    (chars.len(), false)
}

/// Close unterminated strings and containers, insert missing commas, quote
/// bare keys and map Python literals. Stops once the root value is closed.
pub fn repair_structure(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut stack: Vec<char> = Vec::new();
    let mut prev = Prev::Start;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                if prev == Prev::Value {
                    out.push(',');
                }
                let (end, closed) = scan_string(&chars, i);
                out.extend(&chars[i..end]);
                if !closed {
                    // A dangling backslash would escape the closing quote.
                    let trailing = out.chars().rev().take_while(|&c| c == '\\').count();
                    if trailing % 2 == 1 {
                        out.push('\\');
                    }
                    out.push('"');
                }
                prev = Prev::Value;
                i = end;
                continue;
            }
            '{' | '[' => {
                if prev == Prev::Value {
                    out.push(',');
                }
                stack.push(if c == '{' { '}' } else { ']' });
                out.push(c);
                prev = Prev::Open;
            }
            '}' | ']' => {
                if stack.contains(&c) {
                    while let Some(top) = stack.pop() {
                        close_dangling(&mut out, prev);
                        out.push(top);
                        prev = Prev::Value;
                        if top == c {
                            break;
                        }
                    }
                    if stack.is_empty() {
                        break;
                    }
                }
            }
            ':' => {
                out.push(':');
                prev = Prev::Colon;
            }
            ',' => {
                if prev == Prev::Value {
                    out.push(',');
                    prev = Prev::Comma;
                }
            }
            c if c.is_whitespace() => out.push(c),
            c if c.is_alphanumeric() || matches!(c, '-' | '+' | '.' | '_') => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '-' | '+' | '.' | '_'))
                {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();
                if prev == Prev::Value {
                    out.push(',');
                }
                match token.as_str() {
                    "None" | "null" | "Null" | "NULL" | "undefined" => out.push_str("null"),
                    "True" | "true" => out.push_str("true"),
                    "False" | "false" => out.push_str("false"),
                    t if serde_json::from_str::<serde_json::Number>(t).is_ok() => out.push_str(t),
                    t => {
                        out.push('"');
                        out.push_str(t);
                        out.push('"');
                    }
                }
                prev = Prev::Value;
                continue;
            }
            c => out.push(c),
        }
        i += 1;
    }

    if !stack.is_empty() {
        close_dangling(&mut out, prev);
        while let Some(top) = stack.pop() {
            out.push(top);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Stage 5 and the pipeline
// ---------------------------------------------------------------------------

fn excerpt_around(text: &str, line: usize, column: usize) -> String {
    let offset: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(|l| l.chars().count())
        .sum::<usize>()
        + column.saturating_sub(1);
    let total = text.chars().count();
    let to = (offset + EXCERPT_RADIUS).min(total);
    let from = offset.saturating_sub(EXCERPT_RADIUS).min(to);
    let mut excerpt: String = text.chars().skip(from).take(to - from).collect();
    if from > 0 {
        excerpt.insert_str(0, "...");
    }
    if to < total {
        excerpt.push_str("...");
    }
    excerpt
}

fn parse_error(text: &str, err: &serde_json::Error) -> ExamError {
    ExamError::ResponseParse {
        reason: format!("{err} (after repair)"),
        excerpt: excerpt_around(text, err.line(), err.column()),
    }
}

/// Parse a model response into a JSON value, repairing it as needed.
pub fn parse_json_response(raw: &str) -> Result<Value> {
    let text = extract_json_from_markdown(raw);

    if has_latex_control_escape(&text) {
        debug!("skipping direct parse: LaTeX commands would be read as control escapes");
    } else {
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => return Ok(value),
            Err(e) => debug!("direct parse failed: {e}"),
        }
    }

    let Some(start) = text.find('{') else {
        return Err(ExamError::ResponseParse {
            reason: "no JSON object found in response".to_string(),
            excerpt: excerpt_around(&text, 1, 1),
        });
    };

    let isolated = isolate_object(&text).unwrap_or(&text[start..]);
    let lexical = repair_lexical(isolated);
    let lexical_err = match serde_json::from_str::<Value>(&lexical) {
        Ok(value) => {
            debug!("parsed after lexical repair");
            return Ok(value);
        }
        Err(e) => {
            debug!("lexical repair insufficient: {e}");
            e
        }
    };

    let structural = repair_structure(&repair_lexical(&text[start..]));
    match serde_json::from_str::<Value>(&structural) {
        Ok(value) => {
            debug!("parsed after structural repair");
            Ok(value)
        }
        Err(_) => Err(parse_error(&lexical, &lexical_err)),
    }
}

// ---------------------------------------------------------------------------
// Typed paper
// ---------------------------------------------------------------------------

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(value.as_ref().and_then(value_to_string))
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u32>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|f| *f >= 0.0)
            .map(|f| Some(f.round() as u32))
            .ok_or_else(|| de::Error::custom(format!("invalid marks: {n}"))),
        Some(Value::String(s)) => {
            let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
            digits
                .parse()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("invalid marks: {s:?}")))
        }
        Some(other) => Err(de::Error::custom(format!("invalid marks: {other}"))),
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_u64().is_some_and(|n| n != 0),
        _ => false,
    })
}

fn lenient_options<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<BTreeMap<String, String>>, D::Error> {
    let options = match Option::<Value>::deserialize(d)? {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| Some((k.trim().to_uppercase(), value_to_string(v)?)))
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(value_to_string)
            .zip(b'A'..=b'Z')
            .map(|(text, label)| ((label as char).to_string(), text))
            .collect(),
        _ => BTreeMap::new(),
    };
    Ok((!options.is_empty()).then_some(options))
}

fn lenient_strings<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => items.iter().filter_map(value_to_string).collect(),
        Some(Value::String(s)) => vec![s],
        _ => Vec::new(),
    })
}

/// A generated paper as the model describes it.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedPaper {
    #[serde(default, alias = "duration", deserialize_with = "lenient_u32")]
    pub duration_minutes: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub total_marks: Option<u32>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub instructions: Vec<String>,
    pub sections: Vec<GeneratedSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedSection {
    #[serde(default, alias = "label", alias = "name", deserialize_with = "lenient_string")]
    pub section: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default)]
    pub questions: Vec<GeneratedQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedQuestion {
    #[serde(default, alias = "number", deserialize_with = "lenient_string")]
    pub question_number: Option<String>,
    #[serde(default, alias = "text", alias = "question", deserialize_with = "lenient_string")]
    pub question_text: Option<String>,
    #[serde(default, alias = "type", deserialize_with = "lenient_string")]
    pub question_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub marks: Option<u32>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub has_internal_choice: bool,
    #[serde(
        default,
        alias = "alternative",
        alias = "alternative_text",
        deserialize_with = "lenient_string"
    )]
    pub alternative_question_text: Option<String>,
    #[serde(default, alias = "choices", deserialize_with = "lenient_options")]
    pub options: Option<BTreeMap<String, String>>,
    #[serde(default, alias = "answer", deserialize_with = "lenient_string")]
    pub correct_answer: Option<String>,
}

/// A validated paper ready to be persisted.
#[derive(Debug, Clone)]
pub struct ParsedPaper {
    /// The repaired JSON with totals taken from the pattern.
    pub paper: Value,
    pub instructions: Vec<String>,
    pub duration_minutes: u32,
    pub total_marks: u32,
    /// Flattened questions with contiguous sequence numbers.
    pub questions: Vec<Question>,
}

impl fmt::Display for ParsedPaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} questions, {} marks, {} minutes",
            self.questions.len(),
            self.total_marks,
            self.duration_minutes
        )
    }
}

fn section_label(raw: Option<&str>, index: usize) -> String {
    let label = raw.map(str::trim).unwrap_or_default();
    let label = label
        .strip_prefix("Section ")
        .or_else(|| label.strip_prefix("SECTION "))
        .unwrap_or(label)
        .trim();
    if label.is_empty() {
        // Fall back to positional labels A, B, C...
        ((b'A' + (index % 26) as u8) as char).to_string()
    } else {
        label.to_string()
    }
}

/// Check the parsed value has the shape of a paper.
pub fn validate_paper(value: &Value) -> Result<GeneratedPaper> {
    let Some(object) = value.as_object() else {
        return Err(ExamError::InvalidStructure("expected a JSON object".into()));
    };
    if !object.get("sections").is_some_and(Value::is_array) {
        return Err(ExamError::InvalidStructure("missing sections".into()));
    }
    if !object.contains_key("duration_minutes") && !object.contains_key("duration") {
        return Err(ExamError::InvalidStructure("missing duration_minutes".into()));
    }
    serde_json::from_value(value.clone()).map_err(|e| ExamError::InvalidStructure(e.to_string()))
}

/// Flatten sections into questions numbered 1..=n in section order.
pub fn flatten_questions(paper: &GeneratedPaper, pattern: &ExamPattern) -> Result<Vec<Question>> {
    let mut questions = Vec::new();
    for (index, section) in paper.sections.iter().enumerate() {
        let label = section_label(section.section.as_deref(), index);
        let spec = pattern.section(&label);
        for generated in &section.questions {
            let number = questions.len() + 1;
            let text = generated
                .question_text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    ExamError::InvalidStructure(format!("question {number} has no text"))
                })?;

            let question_type = match generated.question_type.as_deref() {
                Some(raw) => match raw.parse::<QuestionType>() {
                    Ok(t) => t,
                    Err(e) => spec.map(|s| s.question_type).ok_or_else(|| {
                        ExamError::InvalidStructure(format!("question {number}: {e}"))
                    })?,
                },
                None => spec.map(|s| s.question_type).ok_or_else(|| {
                    ExamError::InvalidStructure(format!("question {number} has no type"))
                })?,
            };

            let marks = generated
                .marks
                .or(spec.map(|s| s.marks_each))
                .ok_or_else(|| {
                    ExamError::InvalidStructure(format!("question {number} has no marks"))
                })?;

            let alternative_text = generated
                .alternative_question_text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string);

            questions.push(Question {
                id: Uuid::new_v4(),
                section: label.clone(),
                sequence_number: number as u32,
                text: text.to_string(),
                question_type,
                marks,
                has_internal_choice: generated.has_internal_choice && alternative_text.is_some(),
                alternative_text,
                options: generated.options.clone(),
                correct_answer: generated
                    .correct_answer
                    .as_deref()
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string),
            });
        }
    }

    if questions.is_empty() {
        return Err(ExamError::InvalidStructure("paper has no questions".into()));
    }
    Ok(questions)
}

/// Parse, validate and flatten a paper response. Total marks and duration
/// always come from the pattern.
pub fn parse_paper(raw: &str, pattern: &ExamPattern) -> Result<ParsedPaper> {
    let mut value = parse_json_response(raw)?;
    let mut paper = validate_paper(&value)?;
    let questions = flatten_questions(&paper, pattern)?;

    paper.total_marks = Some(pattern.total_marks);
    paper.duration_minutes = Some(pattern.duration_minutes);
    if let Some(object) = value.as_object_mut() {
        object.insert("total_marks".into(), pattern.total_marks.into());
        object.insert("duration_minutes".into(), pattern.duration_minutes.into());
    }

    let marks: u32 = questions.iter().map(|q| q.marks).sum();
    if marks != pattern.total_marks {
        debug!(
            generated = marks,
            expected = pattern.total_marks,
            "generated marks differ from pattern"
        );
    }

    Ok(ParsedPaper {
        paper: value,
        instructions: paper.instructions,
        duration_minutes: pattern.duration_minutes,
        total_marks: pattern.total_marks,
        questions,
    })
}
