//! Result materialization: storage rows to typed records.
//!
//! Rows come back from a driver in storage form. Booleans arrive as 0/1
//! integers and timestamps as microseconds since the Unix epoch; the
//! schema decides how each column is read back.

use chrono::{DateTime, Utc};
use ormkit_proto::{EntityRecord, Row, Value};

use crate::error::StorageError;
use crate::schema::{EntityDefinition, ScalarKind};

/// Decode one stored value as `kind`.
pub fn decode_value(kind: &ScalarKind, value: Value, column: &str) -> Result<Value, StorageError> {
    let decode_error = |message: String| StorageError::Decode {
        column: column.to_string(),
        message,
    };
    match (kind, value) {
        (_, Value::Null) => Ok(Value::Null),
        (ScalarKind::Boolean, Value::Int(i)) => Ok(Value::Bool(i != 0)),
        (ScalarKind::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
        (ScalarKind::Int, Value::Int(i)) => Ok(Value::Int(i)),
        (ScalarKind::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
        (ScalarKind::Float, Value::Float(f)) => Ok(Value::Float(f)),
        (ScalarKind::DateTime, Value::Int(micros)) => DateTime::from_timestamp_micros(micros)
            .map(Value::DateTime)
            .ok_or_else(|| decode_error(format!("timestamp {micros} is out of range"))),
        (ScalarKind::DateTime, Value::DateTime(dt)) => Ok(Value::DateTime(dt)),
        (ScalarKind::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
            .map_err(|e| decode_error(e.to_string())),
        (ScalarKind::String | ScalarKind::Enum(_), Value::String(s)) => Ok(Value::String(s)),
        (kind, other) => Err(decode_error(format!(
            "expected {kind}, found {}",
            other.type_name()
        ))),
    }
}

/// Convert an engine value to the form a driver stores and returns, so it
/// can be compared with raw row values.
pub fn storage_value(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::Int(i64::from(*b)),
        Value::DateTime(dt) => Value::Int(dt.timestamp_micros()),
        other => other.clone(),
    }
}

/// Build a record of `entity` holding the `output` fields of `row`.
///
/// Fields are emitted in declaration order. Columns the row carries beyond
/// `output` (join and cursor helpers) are dropped.
pub fn materialize(
    entity: &EntityDefinition,
    output: &[String],
    mut row: Row,
) -> Result<EntityRecord, StorageError> {
    let mut record = EntityRecord::new(entity.name.clone());
    for field in entity.fields.iter().filter(|f| output.contains(&f.name)) {
        let raw = row.take(&field.name).ok_or_else(|| StorageError::Decode {
            column: field.name.clone(),
            message: "column missing from result row".to_string(),
        })?;
        let value = decode_value(&field.kind, raw, &field.name)?;
        record.fields.push((field.name.clone(), value));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::registry;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decodes_storage_forms() {
        let registry = registry();
        let member = registry.entity("TeamMember").unwrap();
        let row = Row::new(vec![
            ("teamId".into(), Value::Int(1)),
            ("athleteId".into(), Value::Int(2)),
            ("captain".into(), Value::Int(1)),
        ]);
        let record = materialize(member, &["captain".to_string(), "teamId".to_string()], row).unwrap();
        assert_eq!(
            record.fields,
            vec![
                ("teamId".to_string(), Value::Int(1)),
                ("captain".to_string(), Value::Bool(true)),
            ]
        );
    }

    #[test]
    fn test_timestamp_round_trip_through_storage() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 10, 30, 0).unwrap();
        let stored = storage_value(&Value::DateTime(at));
        assert_eq!(stored, Value::Int(at.timestamp_micros()));
        assert_eq!(
            decode_value(&ScalarKind::DateTime, stored, "issuedAt").unwrap(),
            Value::DateTime(at)
        );
    }

    #[test]
    fn test_decode_mismatch_and_missing_column() {
        let err = decode_value(&ScalarKind::Int, Value::String("x".into()), "seed").unwrap_err();
        assert!(matches!(err, StorageError::Decode { ref column, .. } if column == "seed"));

        let registry = registry();
        let club = registry.entity("Club").unwrap();
        let err = materialize(club, &["name".to_string()], Row::default()).unwrap_err();
        assert!(matches!(err, StorageError::Decode { ref column, .. } if column == "name"));
    }
}
