//! Dynamic property values.
//!
//! [`Value`] is the currency exchanged between entity records, filters, the
//! SQL generator, and the execution transport. Rich variants (`Array`, `Json`,
//! `Timestamp`) exist on the entity side only; the
//! [`transform`](crate::transform) rules reduce them to the primitive SQLite
//! storage classes before a statement is executed.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// A single property or parameter value.
///
/// # Examples
///
/// ```
/// use relata_core::Value;
///
/// let v = Value::from("alice");
/// assert_eq!(v.as_str(), Some("alice"));
/// assert!(Value::Null.is_null());
/// assert_eq!(Value::from(7i64).as_i64(), Some(7));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL `NULL` / an unset property.
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Bool(bool),
    Text(String),
    /// List of strings, stored as a comma-joined string.
    Array(Vec<String>),
    /// Arbitrary JSON document, stored as its serialized text.
    Json(serde_json::Value),
    /// Point in time, stored as RFC 3339 text or epoch milliseconds.
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[String]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Canonical identity string used to group rows by primary key.
    ///
    /// Returns `None` for `NULL`, which never identifies a row.
    pub fn identity_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(format!("i:{i}")),
            Value::Real(r) if r.fract() == 0.0 => Some(format!("i:{}", *r as i64)),
            Value::Real(r) => Some(format!("r:{r}")),
            Value::Bool(b) => Some(format!("i:{}", i64::from(*b))),
            Value::Text(s) => Some(format!("t:{s}")),
            other => Some(format!("p:{}", other.to_param_value_text())),
        }
    }

    /// Reduces the value to a primitive SQLite storage class without any
    /// column-specific knowledge.
    ///
    /// Used for filter parameters, where the owning column's rich type is
    /// not consulted.
    pub fn to_param(&self) -> Value {
        match self {
            Value::Bool(b) => Value::Integer(i64::from(*b)),
            Value::Array(_) | Value::Json(_) | Value::Timestamp(_) => {
                Value::Text(self.to_param_value_text())
            }
            other => other.clone(),
        }
    }

    fn to_param_value_text(&self) -> String {
        match self {
            Value::Array(items) => items.join(","),
            Value::Json(json) => json.to_string(),
            Value::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::Millis, true),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Array(items) => write!(f, "[{}]", items.join(", ")),
            Value::Json(json) => write!(f, "{json}"),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::Array(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_ignores_null() {
        assert_eq!(Value::Null.identity_key(), None);
        assert_eq!(Value::Integer(3).identity_key(), Some("i:3".to_string()));
    }

    #[test]
    fn test_identity_key_integral_real_matches_integer() {
        assert_eq!(Value::Real(3.0).identity_key(), Value::Integer(3).identity_key());
    }

    #[test]
    fn test_to_param_flattens_rich_values() {
        assert_eq!(Value::Bool(true).to_param(), Value::Integer(1));
        assert_eq!(
            Value::Array(vec!["a".into(), "b".into()]).to_param(),
            Value::Text("a,b".into())
        );
        assert_eq!(
            Value::Json(serde_json::json!({"x": 1})).to_param(),
            Value::Text(r#"{"x":1}"#.into())
        );
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }
}
