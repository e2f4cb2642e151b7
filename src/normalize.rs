//! Best-effort decoding of JSON blobs that callers pass as text.
//!
//! Agents regularly hand over stringified, doubly escaped or single-quoted JSON.
//! [`normalize`] recovers what it can and falls back to a default; the strict
//! helpers turn an undecodable or mis-shaped blob into an [`InvalidFormatError`].

use crate::errors::InvalidFormatError;
use crate::model::json_type_name;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

static NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("numeric pattern"));

const EMPTY_WORDS: [&str; 4] = ["", "null", "none", "undefined"];

#[derive(Debug, PartialEq)]
enum Outcome {
    Parsed(Value),
    Empty,
    Unparsed(String),
}

/// Lenient normalization. Never fails: undecodable text comes back trimmed.
pub fn normalize(input: Option<&Value>, default: Value) -> Value {
    match analyze(input) {
        Outcome::Parsed(value) => value,
        Outcome::Empty => default,
        Outcome::Unparsed(text) => Value::String(text),
    }
}

/// Strict normalization. `Ok(None)` means the input was absent or an empty word.
pub fn normalize_strict(
    input: Option<&Value>,
    field: &str,
) -> Result<Option<Value>, InvalidFormatError> {
    match analyze(input) {
        Outcome::Parsed(value) => Ok(Some(value)),
        Outcome::Empty => Ok(None),
        Outcome::Unparsed(text) => Err(InvalidFormatError::new(
            field,
            "could not be decoded as JSON",
            &text,
        )),
    }
}

pub fn expect_array(input: Option<&Value>, field: &str) -> Result<Vec<Value>, InvalidFormatError> {
    match normalize_strict(input, field)? {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(InvalidFormatError::new(
            field,
            format!("expected an array, got {}", json_type_name(&other)),
            &other.to_string(),
        )),
        None => Err(InvalidFormatError::new(field, "is required", "")),
    }
}

pub fn expect_object(
    input: Option<&Value>,
    field: &str,
) -> Result<Map<String, Value>, InvalidFormatError> {
    match normalize_strict(input, field)? {
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(InvalidFormatError::new(
            field,
            format!("expected an object, got {}", json_type_name(&other)),
            &other.to_string(),
        )),
        None => Err(InvalidFormatError::new(field, "is required", "")),
    }
}

fn analyze(input: Option<&Value>) -> Outcome {
    match input {
        None | Some(Value::Null) => Outcome::Empty,
        Some(Value::String(text)) => analyze_text(text),
        Some(other) => Outcome::Parsed(other.clone()),
    }
}

fn analyze_text(raw: &str) -> Outcome {
    let text = raw.trim();
    if EMPTY_WORDS.iter().any(|word| text.eq_ignore_ascii_case(word)) {
        return Outcome::Empty;
    }
    if let Some(value) = scalar(text) {
        return Outcome::Parsed(value);
    }

    match serde_json::from_str::<Value>(text) {
        // A JSON string may itself carry encoded JSON.
        Ok(Value::String(inner)) => {
            let inner_trimmed = inner.trim();
            match parse_plain(inner_trimmed).or_else(|| scalar(inner_trimmed)) {
                Some(value) => Outcome::Parsed(value),
                None => Outcome::Parsed(Value::String(inner)),
            }
        }
        Ok(value) => Outcome::Parsed(value),
        Err(_) => parse_repaired(text)
            .map(Outcome::Parsed)
            .unwrap_or_else(|| Outcome::Unparsed(text.to_string())),
    }
}

fn scalar(text: &str) -> Option<Value> {
    if text.eq_ignore_ascii_case("true") {
        return Some(Value::Bool(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return Some(Value::Bool(false));
    }
    if !NUMERIC.is_match(text) {
        return None;
    }
    if !text.contains('.') {
        if let Ok(int) = text.parse::<i64>() {
            return Some(Value::Number(int.into()));
        }
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Structured JSON only; plain strings and scalars are left to the caller.
fn parse_plain(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Array(_) | Value::Object(_))) => Some(value),
        _ => parse_repaired(text),
    }
}

fn parse_repaired(text: &str) -> Option<Value> {
    if text.contains("\\\"") {
        let unescaped = text.replace("\\\"", "\"").replace("\\\\", "\\");
        if let Ok(value) = serde_json::from_str::<Value>(&unescaped) {
            return Some(value);
        }
    }
    if text.contains('\'') && !text.contains('"') {
        let requoted = text.replace('\'', "\"");
        if let Ok(value) = serde_json::from_str::<Value>(&requoted) {
            return Some(value);
        }
    }
    None
}
