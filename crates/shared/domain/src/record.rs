//! Record representation shared by repositories and storage adapters.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered attribute map (field name -> value).
pub type Attributes = Map<String, Value>;

/// A stored row, as exchanged with adapters.
pub type Record = Attributes;

/// Filter map. Keys are plain fields or `<field>__<operator>`.
pub type Filters = Attributes;

/// Metadata attached to emitted events.
pub type Metadata = Attributes;

/// Identifier of a stored record.
///
/// Storage backends identify rows either by integer or by string; any
/// other value is not a valid identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    /// Read an identifier out of a JSON value.
    ///
    /// Returns `None` for anything but an integer or a string.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) => Some(RecordId::Str(s.clone())),
            _ => None,
        }
    }

    /// Convert back to a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            RecordId::Int(n) => Value::from(*n),
            RecordId::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{}", n),
            RecordId::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Int(n)
    }
}

impl From<i32> for RecordId {
    fn from(n: i32) -> Self {
        RecordId::Int(n.into())
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Str(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::Str(s)
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Self {
        id.to_value()
    }
}

/// Human readable name of a JSON value's type, for error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifiers_are_integers_or_strings() {
        assert_eq!(RecordId::from_value(&json!(42)), Some(RecordId::Int(42)));
        assert_eq!(
            RecordId::from_value(&json!("abc")),
            Some(RecordId::Str("abc".to_string()))
        );
        assert_eq!(RecordId::from_value(&json!(1.5)), None);
        assert_eq!(RecordId::from_value(&json!({"id": 1})), None);
        assert_eq!(RecordId::from_value(&Value::Null), None);
    }

    #[test]
    fn display_is_the_bare_value() {
        assert_eq!(RecordId::from(42).to_string(), "42");
        assert_eq!(RecordId::from("post-1").to_string(), "post-1");
    }

    #[test]
    fn value_kind_names() {
        assert_eq!(value_kind(&json!(true)), "boolean");
        assert_eq!(value_kind(&json!(1.5)), "float");
        assert_eq!(value_kind(&json!(3)), "integer");
        assert_eq!(value_kind(&json!([1])), "array");
    }
}
