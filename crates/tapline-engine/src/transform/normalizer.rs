//! Data normalizer: standardizes column names, date and decimal
//! representations, and null handling across source systems.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tapline_types::error::Result;
use tapline_types::job::{NormalizerOptions, NullHandling};
use tapline_types::message::Message;

use super::Transformer;

/// Normalizes record payloads into a canonical shape.
///
/// Operates on a JSON array of objects (the usual extract output) or a
/// single object; any other payload passes through untouched.
pub struct Normalizer {
    options: NormalizerOptions,
}

impl Normalizer {
    #[must_use]
    pub fn new(options: NormalizerOptions) -> Self {
        Self { options }
    }

    fn normalize_record(&self, record: &Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::new();
        for (idx, (key, value)) in record.iter().enumerate() {
            let key = if self.options.normalize_column_names {
                normalize_column_name(key, idx)
            } else {
                key.clone()
            };

            let value = self.normalize_value(value);

            if value.is_null() {
                match &self.options.null_handling {
                    NullHandling::Keep => {
                        out.insert(key, Value::Null);
                    }
                    NullHandling::Exclude => {}
                    NullHandling::Replace { value: replacement } => {
                        out.insert(key, Value::String(replacement.clone()));
                    }
                }
            } else {
                out.insert(key, value);
            }
        }
        out
    }

    fn normalize_value(&self, value: &Value) -> Value {
        if let Value::String(s) = value {
            if self.options.normalize_dates {
                if let Some(iso) = reformat_date(s) {
                    return Value::String(iso);
                }
            }
            if self.options.normalize_decimals {
                if let Some(trimmed) = strip_trailing_zeros(s) {
                    return Value::String(trimmed);
                }
            }
        }
        value.clone()
    }
}

impl Transformer for Normalizer {
    fn name(&self) -> &str {
        "normalizer"
    }

    fn transform(&self, message: &Message) -> Result<Message> {
        tracing::debug!(message_id = message.id(), "Normalizing message");

        let payload = match &message.payload {
            Value::Array(rows) => Value::Array(
                rows.iter()
                    .map(|row| match row {
                        Value::Object(record) => Value::Object(self.normalize_record(record)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            Value::Object(record) => Value::Object(self.normalize_record(record)),
            other => other.clone(),
        };

        let mut out = Message::continuing(message, payload);
        out.set_header("normalized", "true");
        Ok(out)
    }
}

/// Canonical column name: lowercased, alphanumerics and underscores only,
/// runs of underscores collapsed. A name with nothing left falls back to
/// a positional placeholder.
fn normalize_column_name(name: &str, position: usize) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_underscore = true;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.extend(c.to_lowercase());
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        format!("column_{position}")
    } else {
        out
    }
}

/// Reformats date/datetime strings in common source formats to ISO 8601.
/// Returns None when the string is not a recognizable date.
fn reformat_date(s: &str) -> Option<String> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
    ];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];

    let s = s.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Drops insignificant trailing zeros from a plain decimal string.
/// Returns None when the string is not a decimal or needs no change.
fn strip_trailing_zeros(s: &str) -> Option<String> {
    let body = s.strip_prefix('-').unwrap_or(s);
    let (int_part, frac_part) = body.split_once('.')?;
    if int_part.is_empty()
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let frac = frac_part.trim_end_matches('0');
    if frac.len() == frac_part.len() {
        return None;
    }
    let sign = if s.starts_with('-') { "-" } else { "" };
    if frac.is_empty() {
        Some(format!("{sign}{int_part}"))
    } else {
        Some(format!("{sign}{int_part}.{frac}"))
    }
}
