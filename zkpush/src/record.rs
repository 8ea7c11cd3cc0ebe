use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serial number used when a JSON push carries no `SN` nor `SerialNumber`.
pub const UNKNOWN_DEVICE: &str = "Unknown-Device";
/// PIN used when a JSON push carries no `PIN` nor `UserID`.
pub const UNKNOWN_USER: &str = "Unknown-User";
/// Serial number attached to every record received over the plain text protocol,
/// which does not identify the device.
pub const TEXT_PROTOCOL_DEVICE: &str = "ZKTeco-Device";

/// A verification or status code as pushed by the device.
///
/// Devices occasionally send garbage in numeric columns. Such values are kept
/// verbatim as `Unparsed` so that the line is still stored instead of rejected.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DeviceCode {
    Code(i64),
    Unparsed(String),
}

impl Default for DeviceCode {
    fn default() -> Self {
        DeviceCode::Code(0)
    }
}

impl DeviceCode {
    /// Parses the leading integer of `input`, ignoring leading whitespace and
    /// anything after the digits: `" 12abc"` is 12, `"abc"` is unparsed.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim_start();
        let digits_start = usize::from(trimmed.starts_with(['+', '-']));
        let digits_len = trimmed[digits_start..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();

        if digits_len == 0 {
            return DeviceCode::Unparsed(input.to_owned());
        }

        trimmed[..digits_start + digits_len]
            .parse::<i64>()
            .map(DeviceCode::Code)
            .unwrap_or_else(|_| DeviceCode::Unparsed(input.to_owned()))
    }

    /// Reads a code out of a JSON value. Numeric strings are parsed the same way
    /// as text protocol columns, booleans map to 0 and 1.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(number) => match number.as_i64() {
                Some(code) => DeviceCode::Code(code),
                None => DeviceCode::Unparsed(number.to_string()),
            },
            Value::String(text) => DeviceCode::parse(text),
            Value::Bool(flag) => DeviceCode::Code(i64::from(*flag)),
            other => DeviceCode::Unparsed(other.to_string()),
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, DeviceCode::Code(_))
    }
}

/// The canonical attendance record, one per JSON push or per valid text line.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub serial_number: String,
    pub pin: String,
    pub verified: DeviceCode,
    pub status: DeviceCode,
    pub date_time: String,
    pub raw_data: Value,
}

/// A record together with the identifier it was persisted under.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StoredRecord {
    pub id: String,
    #[serde(flatten)]
    pub record: LogRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_integers() {
        assert_eq!(DeviceCode::parse("0"), DeviceCode::Code(0));
        assert_eq!(DeviceCode::parse("15"), DeviceCode::Code(15));
        assert_eq!(DeviceCode::parse("-3"), DeviceCode::Code(-3));
        assert_eq!(DeviceCode::parse("+4"), DeviceCode::Code(4));
    }

    #[test]
    fn parses_leading_digits_only() {
        assert_eq!(DeviceCode::parse(" 12abc"), DeviceCode::Code(12));
        assert_eq!(DeviceCode::parse("1.5"), DeviceCode::Code(1));
    }

    #[test]
    fn keeps_garbage_verbatim() {
        assert_eq!(
            DeviceCode::parse("check-in"),
            DeviceCode::Unparsed("check-in".to_string())
        );
        assert_eq!(DeviceCode::parse("-"), DeviceCode::Unparsed("-".to_string()));
        assert_eq!(DeviceCode::parse(""), DeviceCode::Unparsed(String::new()));
        assert!(!DeviceCode::parse("99999999999999999999").is_code());
    }

    #[test]
    fn reads_codes_from_json() {
        assert_eq!(DeviceCode::from_json(&json!(7)), DeviceCode::Code(7));
        assert_eq!(DeviceCode::from_json(&json!("2")), DeviceCode::Code(2));
        assert_eq!(DeviceCode::from_json(&json!(true)), DeviceCode::Code(1));
        assert_eq!(
            DeviceCode::from_json(&json!(1.5)),
            DeviceCode::Unparsed("1.5".to_string())
        );
        assert_eq!(
            DeviceCode::from_json(&json!([1])),
            DeviceCode::Unparsed("[1]".to_string())
        );
    }

    #[test]
    fn serializes_with_device_field_names() {
        let record = StoredRecord {
            id: "42".to_string(),
            record: LogRecord {
                serial_number: "SN1".to_string(),
                pin: "7".to_string(),
                verified: DeviceCode::Code(1),
                status: DeviceCode::Unparsed("x".to_string()),
                date_time: "2024-01-01 08:00:00".to_string(),
                raw_data: json!({"PIN": "7"}),
            },
        };

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "id": "42",
                "serialNumber": "SN1",
                "pin": "7",
                "verified": 1,
                "status": "x",
                "dateTime": "2024-01-01 08:00:00",
                "rawData": {"PIN": "7"}
            })
        );
    }
}
