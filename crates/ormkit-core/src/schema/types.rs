//! Core type definitions for the schema registry.

use std::fmt;

use chrono::{DateTime, Utc};
use ormkit_proto::Value;
use serde::{Deserialize, Serialize};

/// Scalar kinds a field may hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// UTF-8 string.
    String,
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// Boolean value.
    Boolean,
    /// Timestamp, UTC.
    DateTime,
    /// A declared enum, by name. Stored as its variant string.
    Enum(String),
}

impl ScalarKind {
    /// Int or Float.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarKind::Int | ScalarKind::Float)
    }

    /// Whether values of this kind accept string pattern operators.
    pub fn is_text(&self) -> bool {
        matches!(self, ScalarKind::String)
    }

    /// Coerce a caller value to this kind.
    ///
    /// Null passes through; the caller decides whether null is allowed.
    /// Integers widen to floats, RFC 3339 strings parse as timestamps, and
    /// enum values must be declared variants.
    pub fn coerce(&self, value: &Value, variants: Option<&[String]>) -> Result<Value, String> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (ScalarKind::String, Value::String(_))
            | (ScalarKind::Int, Value::Int(_))
            | (ScalarKind::Float, Value::Float(_))
            | (ScalarKind::Boolean, Value::Bool(_))
            | (ScalarKind::DateTime, Value::DateTime(_)) => Ok(value.clone()),
            (ScalarKind::Float, Value::Int(i)) => Ok(Value::Float(*i as f64)),
            (ScalarKind::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|e| format!("'{s}' is not an RFC 3339 timestamp: {e}")),
            (ScalarKind::Enum(name), Value::String(s)) => match variants {
                Some(variants) if variants.iter().any(|v| v == s) => Ok(value.clone()),
                _ => Err(format!("'{s}' is not a variant of enum {name}")),
            },
            (kind, other) => Err(format!("expected {kind}, got {}", other.type_name())),
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::String => write!(f, "string"),
            ScalarKind::Int => write!(f, "int"),
            ScalarKind::Float => write!(f, "float"),
            ScalarKind::Boolean => write!(f, "boolean"),
            ScalarKind::DateTime => write!(f, "datetime"),
            ScalarKind::Enum(name) => write!(f, "enum {name}"),
        }
    }
}

/// How a field is filled when a create payload omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultRule {
    /// Assigned by the database on insert.
    Autoincrement,
    /// Random v4 UUID string.
    Uuid,
    /// Current time on insert.
    Now,
    /// Current time on insert and on every update.
    UpdatedAt,
    /// A literal value.
    Value(Value),
}

/// Behavior when a referenced record is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    /// Prevent deletion if related records exist.
    Restrict,
    /// Delete related records.
    Cascade,
    /// Set the foreign key to null.
    SetNull,
}

/// Cardinality of a relation, seen from the declaring entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Exactly one related record.
    ToOne,
    /// Zero or one related record.
    OptionalToOne,
    /// Any number of related records.
    ToMany,
}

impl Cardinality {
    pub fn is_to_many(&self) -> bool {
        matches!(self, Cardinality::ToMany)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_widening_and_parsing() {
        assert_eq!(ScalarKind::Float.coerce(&Value::Int(3), None), Ok(Value::Float(3.0)));
        assert_eq!(ScalarKind::Int.coerce(&Value::Null, None), Ok(Value::Null));

        let parsed = ScalarKind::DateTime
            .coerce(&Value::from("2024-05-01T10:00:00Z"), None)
            .unwrap();
        assert!(matches!(parsed, Value::DateTime(_)));

        assert!(ScalarKind::Int.coerce(&Value::Float(1.5), None).is_err());
        assert!(ScalarKind::Boolean.coerce(&Value::Int(1), None).is_err());
    }

    #[test]
    fn test_coerce_enum_variants() {
        let belts = vec!["WHITE".to_string(), "BLACK".to_string()];
        let kind = ScalarKind::Enum("Belt".into());
        assert!(kind.coerce(&Value::from("BLACK"), Some(&belts)).is_ok());
        let err = kind.coerce(&Value::from("PURPLE"), Some(&belts)).unwrap_err();
        assert!(err.contains("not a variant of enum Belt"));
    }

    #[test]
    fn test_serde_names() {
        let kind: ScalarKind = serde_json::from_str("\"datetime\"").unwrap();
        assert_eq!(kind, ScalarKind::DateTime);
        let kind: ScalarKind = serde_json::from_str("{\"enum\":\"Belt\"}").unwrap();
        assert_eq!(kind, ScalarKind::Enum("Belt".into()));
        let rule: DefaultRule = serde_json::from_str("{\"value\":\"PENDING\"}").unwrap();
        assert_eq!(rule, DefaultRule::Value(Value::from("PENDING")));
        let rule: DefaultRule = serde_json::from_str("\"updated_at\"").unwrap();
        assert_eq!(rule, DefaultRule::UpdatedAt);
        let policy: OnDelete = serde_json::from_str("\"set_null\"").unwrap();
        assert_eq!(policy, OnDelete::SetNull);
    }
}
