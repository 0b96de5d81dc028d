//! Write payload validation.
//!
//! A [`Data`] payload is checked against the entity definition and turned
//! into column writes before any storage access. Relation connects are
//! kept as pending lookups; the executor resolves them on the write's
//! connection.

use chrono::Utc;
use ormkit_proto::{Data, DataValue, Value};

use crate::error::{Error, MutationError};
use crate::filter::{FilterCompiler, UniqueKey};
use crate::schema::{Cardinality, DefaultRule, EntityDefinition, Member, SchemaRegistry};

/// Whether a payload creates or updates a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

/// In-place numeric update operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    pub fn sql(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
        }
    }
}

/// New value of one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Set(Value),
    Arithmetic(ArithmeticOp, Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnWrite {
    pub column: String,
    pub assignment: Assignment,
}

/// A connect to resolve before writing: the target's `remote` values are
/// copied into `local` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConnect {
    pub relation: String,
    pub key: UniqueKey,
    pub local: Vec<String>,
    pub remote: Vec<String>,
}

/// A validated payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledPayload {
    pub writes: Vec<ColumnWrite>,
    pub connects: Vec<PendingConnect>,
}

impl CompiledPayload {
    /// Value assigned to `column`, when it is a plain set.
    pub fn value_of(&self, column: &str) -> Option<&Value> {
        self.writes.iter().find_map(|w| match &w.assignment {
            Assignment::Set(value) if w.column == column => Some(value),
            _ => None,
        })
    }

    pub fn writes_column(&self, column: &str) -> bool {
        self.writes.iter().any(|w| w.column == column)
            || self
                .connects
                .iter()
                .any(|c| c.local.iter().any(|l| l == column))
    }

    /// Append resolved connect values.
    pub fn resolve(&mut self, connect: &PendingConnect, values: Vec<Value>) {
        for (column, value) in connect.local.iter().zip(values) {
            self.writes.push(ColumnWrite {
                column: column.clone(),
                assignment: Assignment::Set(value),
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.connects.is_empty()
    }
}

/// Validates payloads against the schema.
pub struct PayloadCompiler<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> PayloadCompiler<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Validate `data` for `entity`. Creates are completed with defaults and
    /// rejected when a required field stays unset; updates refresh
    /// `updated_at` fields.
    pub fn compile(
        &self,
        entity: &EntityDefinition,
        data: &Data,
        mode: WriteMode,
    ) -> Result<CompiledPayload, Error> {
        let mut payload = CompiledPayload::default();
        for (member, change) in &data.entries {
            if payload.writes_column(member) {
                return Err(invalid(entity, member, "written more than once"));
            }
            match entity.member(member) {
                Some(Member::Field(field)) => {
                    let variants = self.registry.variants_of(&field.kind);
                    let coerce = |value: &Value| {
                        field
                            .kind
                            .coerce(value, variants)
                            .map_err(|reason| invalid(entity, member, &reason))
                    };
                    let assignment = match change {
                        DataValue::Set(value) => {
                            let value = coerce(value)?;
                            if value.is_null() && !field.nullable {
                                return Err(invalid(entity, member, "field is not nullable"));
                            }
                            Assignment::Set(value)
                        }
                        DataValue::Increment(by)
                        | DataValue::Decrement(by)
                        | DataValue::Multiply(by)
                        | DataValue::Divide(by) => {
                            if mode == WriteMode::Create {
                                return Err(invalid(
                                    entity,
                                    member,
                                    &format!("'{}' is only valid in updates", change.name()),
                                ));
                            }
                            if !field.kind.is_numeric() {
                                return Err(invalid(
                                    entity,
                                    member,
                                    &format!("'{}' requires a numeric field", change.name()),
                                ));
                            }
                            let by = coerce(by)?;
                            if by.is_null() {
                                return Err(invalid(entity, member, "operand must not be null"));
                            }
                            let op = match change {
                                DataValue::Increment(_) => ArithmeticOp::Add,
                                DataValue::Decrement(_) => ArithmeticOp::Subtract,
                                DataValue::Multiply(_) => ArithmeticOp::Multiply,
                                _ => ArithmeticOp::Divide,
                            };
                            Assignment::Arithmetic(op, by)
                        }
                        DataValue::Connect(_) | DataValue::Disconnect => {
                            return Err(invalid(
                                entity,
                                member,
                                &format!("'{}' applies to relations only", change.name()),
                            ))
                        }
                    };
                    payload.writes.push(ColumnWrite {
                        column: field.name.clone(),
                        assignment,
                    });
                }
                Some(Member::Relation(relation)) => {
                    if !relation.declares_foreign_key() {
                        return Err(invalid(
                            entity,
                            member,
                            "only the side holding the foreign key can be written",
                        ));
                    }
                    if relation.local_columns().iter().any(|c| payload.writes_column(c)) {
                        return Err(invalid(entity, member, "foreign key written more than once"));
                    }
                    match change {
                        DataValue::Connect(unique) => {
                            let key = FilterCompiler::new(self.registry)
                                .compile_unique(&relation.target, unique)?;
                            payload.connects.push(PendingConnect {
                                relation: relation.name.clone(),
                                key,
                                local: relation.local_columns().to_vec(),
                                remote: relation.remote_columns().to_vec(),
                            });
                        }
                        DataValue::Disconnect => {
                            if mode == WriteMode::Create {
                                return Err(invalid(entity, member, "'disconnect' is only valid in updates"));
                            }
                            if relation.cardinality != Cardinality::OptionalToOne {
                                return Err(invalid(entity, member, "relation is required"));
                            }
                            for column in relation.local_columns() {
                                payload.writes.push(ColumnWrite {
                                    column: column.clone(),
                                    assignment: Assignment::Set(Value::Null),
                                });
                            }
                        }
                        other => {
                            return Err(invalid(
                                entity,
                                member,
                                &format!("'{}' applies to fields only", other.name()),
                            ))
                        }
                    }
                }
                None => return Err(invalid(entity, member, "no such field or relation")),
            }
        }

        match mode {
            WriteMode::Create => self.apply_defaults(entity, &mut payload)?,
            WriteMode::Update => {
                for field in &entity.fields {
                    if field.default == Some(DefaultRule::UpdatedAt) && !payload.writes_column(&field.name) {
                        payload.writes.push(ColumnWrite {
                            column: field.name.clone(),
                            assignment: Assignment::Set(Value::DateTime(Utc::now())),
                        });
                    }
                }
            }
        }
        Ok(payload)
    }

    fn apply_defaults(&self, entity: &EntityDefinition, payload: &mut CompiledPayload) -> Result<(), Error> {
        let now = Utc::now();
        for field in &entity.fields {
            if payload.writes_column(&field.name) {
                continue;
            }
            let value = match &field.default {
                Some(DefaultRule::Autoincrement) => continue,
                Some(DefaultRule::Uuid) => Value::String(uuid::Uuid::new_v4().to_string()),
                Some(DefaultRule::Now | DefaultRule::UpdatedAt) => Value::DateTime(now),
                Some(DefaultRule::Value(value)) => field
                    .kind
                    .coerce(value, self.registry.variants_of(&field.kind))
                    .map_err(|reason| invalid(entity, &field.name, &reason))?,
                None if field.nullable => continue,
                None => {
                    return Err(MutationError::MissingField {
                        entity: entity.name.clone(),
                        field: field.name.clone(),
                    }
                    .into())
                }
            };
            payload.writes.push(ColumnWrite {
                column: field.name.clone(),
                assignment: Assignment::Set(value),
            });
        }
        Ok(())
    }
}

fn invalid(entity: &EntityDefinition, member: &str, reason: &str) -> Error {
    MutationError::InvalidWrite {
        entity: entity.name.clone(),
        member: member.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::registry;
    use ormkit_proto::UniqueWhere;
    use pretty_assertions::assert_eq;

    fn compile(entity: &str, data: Data, mode: WriteMode) -> Result<CompiledPayload, Error> {
        let registry = registry();
        let def = registry.entity(entity).unwrap().clone();
        PayloadCompiler::new(&registry).compile(&def, &data, mode)
    }

    #[test]
    fn test_create_applies_defaults() {
        let payload = compile(
            "Entry",
            Data::new()
                .set("athleteId", 1)
                .connect("division", UniqueWhere::by("id", 2)),
            WriteMode::Create,
        )
        .unwrap();
        assert_eq!(payload.value_of("status"), Some(&Value::from("PENDING")));
        assert_eq!(payload.value_of("fee"), Some(&Value::Float(0.0)));
        assert!(payload.value_of("id").is_none());
        assert!(payload.value_of("seed").is_none());
        assert!(matches!(payload.value_of("createdAt"), Some(Value::DateTime(_))));
        assert_eq!(payload.connects.len(), 1);
        assert_eq!(payload.connects[0].local, vec!["divisionId".to_string()]);
    }

    #[test]
    fn test_missing_required_field() {
        let err = compile("Club", Data::new().set("city", "Oslo"), WriteMode::Create).unwrap_err();
        assert!(matches!(
            err,
            Error::Mutation(MutationError::MissingField { ref field, .. }) if field == "name"
        ));
    }

    #[test]
    fn test_uuid_default() {
        let payload = compile(
            "User",
            Data::new().set("email", "a@b.c").set("name", "Ana"),
            WriteMode::Create,
        )
        .unwrap();
        let id = payload.value_of("id").and_then(Value::as_str).unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_update_rules() {
        let payload = compile("Athlete", Data::new().increment("weight", 2), WriteMode::Update).unwrap();
        assert_eq!(
            payload.writes[0].assignment,
            Assignment::Arithmetic(ArithmeticOp::Add, Value::Float(2.0))
        );
        assert!(payload.writes_column("updatedAt"));

        for (data, mode) in [
            (Data::new().increment("lastName", 1), WriteMode::Update),
            (Data::new().increment("weight", 1), WriteMode::Create),
            (Data::new().disconnect("club"), WriteMode::Update),
            (Data::new().set("lastName", Value::Null), WriteMode::Update),
            (Data::new().set("nickname", "x"), WriteMode::Update),
            (Data::new().set("belt", "PURPLE"), WriteMode::Update),
        ] {
            let err = compile("Athlete", data, mode).unwrap_err();
            assert!(matches!(err, Error::Mutation(MutationError::InvalidWrite { .. })), "{err}");
        }

        let payload = compile("Entry", Data::new().disconnect("weightClass"), WriteMode::Update).unwrap();
        assert_eq!(payload.value_of("weightClassId"), Some(&Value::Null));
    }

    #[test]
    fn test_connect_only_on_owning_side() {
        let err = compile(
            "Club",
            Data::new().connect("athletes", UniqueWhere::by("id", 1)),
            WriteMode::Update,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Mutation(MutationError::InvalidWrite { ref member, .. }) if member == "athletes"));
    }
}
