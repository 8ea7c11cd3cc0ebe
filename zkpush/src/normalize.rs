use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::api::IngestError;
use crate::record::{DeviceCode, LogRecord, TEXT_PROTOCOL_DEVICE, UNKNOWN_DEVICE, UNKNOWN_USER};
use crate::time::TimeSource;

// Firmware versions disagree on the column separator: tabs, or space padding.
static FIELD_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\t+|\s{2,}").expect("valid field separator"));

/// Text lines need at least a PIN, a timestamp and a status.
const MIN_TEXT_FIELDS: usize = 3;

/// A decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    /// Decodes a body according to its content type. Unknown or missing content
    /// types are sniffed: a body starting with `{` or `[` is JSON.
    pub fn from_bytes(content_type: Option<&str>, body: &[u8]) -> Result<Payload, IngestError> {
        let is_json = match content_type.map(media_type) {
            Some(media) if media == "application/json" || media.ends_with("+json") => true,
            Some(media) if media.starts_with("text/") => false,
            _ => looks_like_json(body),
        };

        if is_json {
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Payload::Json(json!({})));
            }
            Ok(Payload::Json(serde_json::from_slice(body)?))
        } else {
            Ok(Payload::Text(String::from_utf8_lossy(body).into_owned()))
        }
    }

    pub fn format(&self) -> &'static str {
        match self {
            Payload::Json(_) => "json",
            Payload::Text(_) => "text",
        }
    }
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn looks_like_json(body: &[u8]) -> bool {
    matches!(
        body.iter().copied().find(|b| !b.is_ascii_whitespace()),
        Some(b'{') | Some(b'[')
    )
}

/// Maps a JSON device push to a record. Identifiers fall back through their
/// aliases when absent or empty; `Verified` and `Status` win as soon as they
/// are present, even when zero.
pub fn normalize_json(data: Value, timesource: &dyn TimeSource) -> LogRecord {
    let serial_number = first_string(&data, &["SN", "SerialNumber"])
        .unwrap_or_else(|| UNKNOWN_DEVICE.to_owned());
    let pin = first_string(&data, &["PIN", "UserID"]).unwrap_or_else(|| UNKNOWN_USER.to_owned());

    let verified = match present(&data, "Verified") {
        Some(value) => DeviceCode::from_json(value),
        None => present(&data, "VerifyMode")
            .filter(|value| is_truthy(value))
            .map(DeviceCode::from_json)
            .unwrap_or_default(),
    };
    let status = present(&data, "Status")
        .map(DeviceCode::from_json)
        .unwrap_or_default();

    let date_time = first_string(&data, &["DateTime", "Timestamp"])
        .unwrap_or_else(|| timesource.current_time());

    LogRecord {
        serial_number,
        pin,
        verified,
        status,
        date_time,
        raw_data: data,
    }
}

/// Maps a plain text push, one attendance line per row, to records. Rows with
/// fewer than three columns are dropped without error.
pub fn normalize_text(body: &str) -> Vec<LogRecord> {
    body.trim()
        .lines()
        .filter_map(|line| {
            let record = normalize_line(line);
            if record.is_none() && !line.trim().is_empty() {
                tracing::debug!(line, "skipping text line with too few fields");
                crate::prometheus::report_skipped_lines(1);
            }
            record
        })
        .collect()
}

fn normalize_line(line: &str) -> Option<LogRecord> {
    let fields = split_fields(line);
    if fields.len() < MIN_TEXT_FIELDS {
        return None;
    }

    let verified = fields
        .get(3)
        .map(|field| DeviceCode::parse(field))
        .unwrap_or_default();

    Some(LogRecord {
        serial_number: TEXT_PROTOCOL_DEVICE.to_owned(),
        pin: fields[0].to_owned(),
        verified,
        status: DeviceCode::parse(fields[2]),
        date_time: fields[1].to_owned(),
        raw_data: json!({
            "fields": fields,
            "rawText": line,
        }),
    })
}

/// Splits a text line into trimmed, non-empty columns.
pub fn split_fields(line: &str) -> Vec<&str> {
    FIELD_SEPARATOR
        .split(line)
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .collect()
}

fn present<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    data.get(key).filter(|value| !value.is_null())
}

fn first_string(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| data.get(*key))
        .find(|value| is_truthy(value))
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
