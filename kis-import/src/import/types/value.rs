//! Column value representation shared by source rows and destination rows

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

/// A single column value, used for source records, destination rows and binds
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// Null/empty value
    #[default]
    Null,
    /// Text value (never empty, empty strings are stored as Null)
    Text(String),
    /// Whole number
    Int(i64),
    /// Boolean flag
    Bool(bool),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time without timezone, truncated to whole seconds
    DateTime(NaiveDateTime),
}

impl Value {
    /// Build a text value, mapping empty strings to Null
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() { Value::Null } else { Value::Text(s) }
    }

    /// Build a text value from an optional string
    pub fn opt_text(s: Option<String>) -> Self {
        s.map(Value::text).unwrap_or(Value::Null)
    }

    /// Build an integer value from an optional number
    pub fn opt_int(i: Option<i64>) -> Self {
        i.map(Value::Int).unwrap_or(Value::Null)
    }

    /// Build a date value from an optional date
    pub fn opt_date(d: Option<NaiveDate>) -> Self {
        d.map(Value::Date).unwrap_or(Value::Null)
    }

    /// Build a timestamp value, dropping sub-second precision
    pub fn datetime(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt.with_nanosecond(0).unwrap_or(dt))
    }

    /// Build a timestamp value from an optional timestamp
    pub fn opt_datetime(dt: Option<NaiveDateTime>) -> Self {
        dt.map(Value::datetime).unwrap_or(Value::Null)
    }

    /// Check if this value is null (an empty string counts as null)
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Compare two values the way change detection does
    ///
    /// Null and the empty string are the same value; everything else must be
    /// equal in type and content.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self.is_null(), other.is_null()) {
            (true, true) => true,
            (true, false) | (false, true) => false,
            (false, false) => self == other,
        }
    }

    /// Try to get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Render the value as a natural-key component
    ///
    /// Null renders as the empty string so that a missing patronymic and an
    /// empty one produce the same key.
    pub fn key_component(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "(null)"),
            Value::Text(s) => write!(f, "{}", s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Parse a legacy timestamp
///
/// Accepts RFC 3339 (offset dropped, local wall time kept), ISO 8601 without
/// offset and the `YYYY-MM-DD HH:MM:SS` form the legacy database uses.
pub fn parse_moment(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}
