//! Recovery of JSON objects from unreliable model output.
//!
//! Small local models wrap JSON in prose, code fences, trailing commas and raw
//! newlines. [`parse_model_json`] tries a fixed chain of increasingly lenient
//! strategies and reports which one succeeded.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("Invalid trailing comma regex"));

static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x1f\x7f-\x9f]").expect("Invalid control char regex"));

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Which recovery step produced the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    /// The trimmed text was already a JSON object.
    Direct,
    /// Interior of a triple-backtick fence.
    CodeFence,
    /// First balanced `{...}` span.
    BraceScan,
    /// Balanced span with trailing commas removed.
    TrailingCommas,
    /// Balanced span with control characters stripped and whitespace collapsed.
    ControlChars,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub object: Map<String, Value>,
    pub strategy: ParseStrategy,
}

/// Recover a non-empty JSON object from raw model text.
///
/// Returns `None` when every strategy fails; an empty object counts as failure.
pub fn parse_model_json(raw: &str) -> Option<ParsedResponse> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    let found = |object, strategy| Some(ParsedResponse { object, strategy });

    if let Some(object) = parse_object(text) {
        return found(object, ParseStrategy::Direct);
    }

    if let Some(inner) = strip_code_fence(text) {
        if let Some(object) = parse_object(inner) {
            return found(object, ParseStrategy::CodeFence);
        }
    }

    let candidate = first_balanced_object(text)?;
    if let Some(object) = parse_object(candidate) {
        return found(object, ParseStrategy::BraceScan);
    }

    let without_commas = TRAILING_COMMA.replace_all(candidate, "$1");
    if let Some(object) = parse_object(&without_commas) {
        return found(object, ParseStrategy::TrailingCommas);
    }

    let cleaned = CONTROL_CHARS.replace_all(&without_commas, " ");
    let cleaned = WHITESPACE_RUN.replace_all(&cleaned, " ");
    if let Some(object) = parse_object(&cleaned) {
        return found(object, ParseStrategy::ControlChars);
    }

    None
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) if !map.is_empty() => Some(map),
        _ => None,
    }
}

/// Interior of the first fenced block, preferring a `json`-tagged fence.
fn strip_code_fence(text: &str) -> Option<&str> {
    let start = match text.find("```json") {
        Some(idx) => idx + "```json".len(),
        None => text.find("```")? + 3,
    };
    let end = start + text[start..].find("```")?;
    Some(text[start..end].trim())
}

/// Slice from the first `{` to its matching `}` by nesting depth.
///
/// Braces inside string literals are counted too, so a value like `"a}b"`
/// ends the span early.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let remainder = &text[start..];
    let mut depth = 0usize;
    for (i, c) in remainder.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&remainder[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Round every non-integer number to the nearest integer and clamp negatives
/// to zero, recursively through objects and arrays.
pub fn sanitize_numbers(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_numbers(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_numbers).collect()),
        Value::Number(n) => {
            if n.as_u64().is_some() {
                Value::Number(n)
            } else if n.as_i64().is_some() {
                Value::from(0u64)
            } else {
                let f = n.as_f64().unwrap_or(0.0);
                if !f.is_finite() || f.round() <= 0.0 {
                    Value::from(0u64)
                } else {
                    Value::from(f.round() as u64)
                }
            }
        }
        other => other,
    }
}

/// Char-safe prefix for log previews.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
