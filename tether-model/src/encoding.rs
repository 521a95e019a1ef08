//! Conversions between attribute values and input text.

use crate::schema::Encoding;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use tether_core::Value;

/// Renders `value` as input text. Null becomes `""`; values the encoding does
/// not apply to use their plain display form.
pub fn encode(value: &Value, encoding: Option<Encoding>) -> String {
    match (value, encoding) {
        (Value::Null, _) => String::new(),
        (Value::Date(date), Some(encoding)) => match encoding {
            Encoding::Date => date.format("%Y-%m-%d").to_string(),
            Encoding::Time => date.format("%H:%M").to_string(),
            Encoding::DateTime => date.to_rfc3339_opts(SecondsFormat::Millis, true),
            Encoding::DateTimeLocal => date.format("%Y-%m-%dT%H:%M:%S").to_string(),
            Encoding::Number | Encoding::Int | Encoding::Float => value.to_string(),
        },
        _ => value.to_string(),
    }
}

/// Parses input text per `encoding`.
///
/// Text that does not parse is kept as a string so that a typed rule reports
/// it as a `type` error. Local date-times are read as UTC.
pub fn decode(text: &str, encoding: Option<Encoding>) -> Value {
    let Some(encoding) = encoding else {
        return Value::String(text.to_string());
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    let decoded = match encoding {
        Encoding::Number => trimmed
            .parse::<i64>()
            .map(Value::Int)
            .ok()
            .or_else(|| trimmed.parse::<f64>().ok().map(Value::Float)),
        Encoding::Int => parse_leading_int(trimmed).map(Value::Int),
        Encoding::Float => trimmed.parse::<f64>().ok().map(Value::Float),
        Encoding::Date => parse_date(trimmed).map(Value::Date),
        Encoding::Time => parse_time(trimmed).map(Value::Date),
        Encoding::DateTime | Encoding::DateTimeLocal => parse_datetime(trimmed).map(Value::Date),
    };
    decoded.unwrap_or_else(|| Value::String(text.to_string()))
}

/// `"42px"` -> 42. Leading sign allowed.
fn parse_leading_int(s: &str) -> Option<i64> {
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().ok()
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    parse_datetime(s)
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .map(|time| epoch.and_time(time).and_utc())
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.and_utc())
}
