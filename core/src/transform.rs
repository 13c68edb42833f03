//! Column value transform rules.
//!
//! The same rules run in both directions: [`to_database`] before a value is
//! bound as a statement parameter, [`from_database`] when a raw row value is
//! copied onto an entity. A registered [`Transformer`] on the column takes
//! precedence over every built-in rule.
//!
//! | Column type | Stored as | Read back as |
//! |---|---|---|
//! | `array` | comma-joined text | `Value::Array` |
//! | `json` | serialized JSON text | `Value::Json` (raw text if it fails to parse) |
//! | `date` | RFC 3339 text | `Value::Timestamp` |
//! | `datetime` | epoch milliseconds | `Value::Timestamp` |
//! | `boolean` | `0` / `1` | `Value::Bool` |

use chrono::{DateTime, SecondsFormat, Utc};

use crate::metadata::{ColumnDescriptor, ColumnType};
use crate::value::Value;

/// Converts an entity-side value into the primitive stored for `column`.
///
/// # Examples
///
/// ```
/// use relata_core::{ColumnDescriptor, ColumnType, Value, transform};
///
/// let tags = ColumnDescriptor::new("Post", "tags", ColumnType::Array);
/// let stored = transform::to_database(&tags, &Value::Array(vec!["a".into(), "b".into()]));
/// assert_eq!(stored, Value::Text("a,b".into()));
/// ```
pub fn to_database(column: &ColumnDescriptor, value: &Value) -> Value {
    if let Some(transformer) = &column.transformer {
        return transformer.to(value);
    }
    if value.is_null() {
        return Value::Null;
    }

    match column.column_type {
        ColumnType::Array => match value {
            Value::Array(items) => Value::Text(items.join(",")),
            other => other.to_param(),
        },
        ColumnType::Json => {
            let json = match value {
                Value::Json(json) => json.clone(),
                Value::Text(s) => serde_json::Value::String(s.clone()),
                Value::Integer(i) => serde_json::Value::from(*i),
                Value::Real(r) => serde_json::Value::from(*r),
                Value::Bool(b) => serde_json::Value::Bool(*b),
                Value::Array(items) => serde_json::Value::from(items.clone()),
                Value::Timestamp(ts) => serde_json::Value::String(format_date(ts)),
                Value::Null => serde_json::Value::Null,
            };
            Value::Text(json.to_string())
        }
        ColumnType::Date => match value {
            Value::Timestamp(ts) => Value::Text(format_date(ts)),
            other => other.to_param(),
        },
        ColumnType::Datetime => match value {
            Value::Timestamp(ts) => Value::Integer(ts.timestamp_millis()),
            other => other.to_param(),
        },
        _ => value.to_param(),
    }
}

/// Converts a raw stored value for `column` back into its entity-side form.
///
/// # Examples
///
/// ```
/// use relata_core::{ColumnDescriptor, ColumnType, Value, transform};
///
/// let meta = ColumnDescriptor::new("Post", "meta", ColumnType::Json);
/// let read = transform::from_database(&meta, &Value::Text(r#"{"x":1}"#.into()));
/// assert_eq!(read, Value::Json(serde_json::json!({"x": 1})));
///
/// // Malformed JSON comes back as the raw string.
/// let broken = transform::from_database(&meta, &Value::Text("{oops".into()));
/// assert_eq!(broken, Value::Text("{oops".into()));
/// ```
pub fn from_database(column: &ColumnDescriptor, raw: &Value) -> Value {
    if let Some(transformer) = &column.transformer {
        return transformer.from(raw);
    }
    if raw.is_null() {
        return Value::Null;
    }

    match (column.column_type, raw) {
        (ColumnType::Array, Value::Text(s)) if s.is_empty() => Value::Array(Vec::new()),
        (ColumnType::Array, Value::Text(s)) => {
            Value::Array(s.split(',').map(str::to_string).collect())
        }
        (ColumnType::Json, Value::Text(s)) => match serde_json::from_str(s) {
            Ok(json) => Value::Json(json),
            Err(_) => Value::Text(s.clone()),
        },
        (ColumnType::Date, Value::Text(s)) => match DateTime::parse_from_rfc3339(s) {
            Ok(ts) => Value::Timestamp(ts.with_timezone(&Utc)),
            Err(_) => Value::Text(s.clone()),
        },
        (ColumnType::Datetime, Value::Integer(ms)) => DateTime::from_timestamp_millis(*ms)
            .map_or(Value::Integer(*ms), Value::Timestamp),
        (ColumnType::Boolean, Value::Integer(i)) => Value::Bool(*i != 0),
        (_, other) => other.clone(),
    }
}

fn format_date(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
