//! Timestamp normalization for values arriving from clients.
//!
//! Clients send dates either as ISO-8601 strings (with or without offset, or
//! date-only) or as structured dates serialized to epoch milliseconds. All of
//! them are stored in one canonical form: RFC 3339, UTC, millisecond precision.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::errors::{Error, Result};

const NAIVE_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Canonical representation of a timestamp.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Canonical "time of write" value.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn parse_datetime_str(input: &str) -> Option<DateTime<Utc>> {
    let value = input.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Parses a JSON date value. `null` yields `None`.
pub fn parse_datetime_value(value: &Value) -> Result<Option<DateTime<Utc>>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => parse_datetime_str(text).map(Some).ok_or_else(|| {
            Error::validation(format!("'{}' is not a recognized date", text))
        }),
        Value::Number(number) => {
            let millis = number
                .as_i64()
                .or_else(|| number.as_f64().map(|f| f as i64))
                .ok_or_else(|| Error::validation(format!("'{}' is not a valid epoch", number)))?;
            DateTime::from_timestamp_millis(millis)
                .map(Some)
                .ok_or_else(|| Error::validation(format!("epoch {} is out of range", millis)))
        }
        other => Err(Error::validation(format!(
            "expected an ISO-8601 string or epoch milliseconds, got {}",
            other
        ))),
    }
}

/// Serde adapter for optional date fields in sync payloads.
pub fn deserialize_optional_datetime<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(value) => parse_datetime_value(&value).map_err(|err| match err {
            Error::Validation(message) => serde::de::Error::custom(message),
            other => serde::de::Error::custom(other.to_string()),
        }),
    }
}
