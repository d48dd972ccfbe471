//! Review records and the line formats they are parsed from
//!
//! A record is one non-blank line. Three shapes are accepted:
//!
//! - a JSON object (`{"reviewText": "...", "overall": 5.0}`)
//! - `<rating>\t<text>` when the first tab-separated field is numeric
//! - plain text with no rating

use crate::error::{Result, TallyError};
use serde_json::Value;

const TEXT_FIELDS: &[&str] = &["reviewText", "text", "review"];
const RATING_FIELDS: &[&str] = &["overall", "rating", "stars"];

/// One review, immutable once read
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    text: String,
    rating: Option<f64>,
}

impl Record {
    pub fn new(text: impl Into<String>, rating: Option<f64>) -> Self {
        Self {
            text: text.into(),
            rating,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn rating(&self) -> Option<f64> {
        self.rating
    }
}

/// Parse a raw line into a record
///
/// Returns `Ok(None)` for blank lines, which are not records. `location` is
/// only used to describe malformed input.
pub fn parse_line(raw: &[u8], location: &str) -> Result<Option<Record>> {
    let line = std::str::from_utf8(raw)
        .map_err(|e| TallyError::malformed(location, format!("invalid UTF-8: {e}")))?;
    let line = line.trim_end_matches(['\r', '\n']);
    // Byte order mark on the first line of a file
    let line = line.strip_prefix('\u{feff}').unwrap_or(line);

    if line.trim().is_empty() {
        return Ok(None);
    }

    if line.trim_start().starts_with('{') {
        return parse_json(line, location).map(Some);
    }

    if let Some((head, tail)) = line.split_once('\t') {
        if let Ok(rating) = head.trim().parse::<f64>() {
            return Ok(Some(Record::new(tail.trim(), Some(rating))));
        }
    }

    Ok(Some(Record::new(line.trim(), None)))
}

fn parse_json(line: &str, location: &str) -> Result<Record> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| TallyError::malformed(location, format!("invalid JSON: {e}")))?;

    let object = value
        .as_object()
        .ok_or_else(|| TallyError::malformed(location, "expected a JSON object"))?;

    let text = TEXT_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_str))
        .map(str::to_string);

    let rating = RATING_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(rating_from_value));

    if text.is_none() && rating.is_none() {
        return Err(TallyError::malformed(
            location,
            "object has neither review text nor rating",
        ));
    }

    Ok(Record::new(text.unwrap_or_default(), rating))
}

fn rating_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
