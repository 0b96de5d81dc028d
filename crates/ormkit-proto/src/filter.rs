//! Typed filter trees.
//!
//! A [`Filter`] is the caller-facing shape of a `where` argument. It is purely
//! structural: field names and operator/kind compatibility are checked later by
//! the filter compiler against a schema registry.

use crate::value::Value;

/// A conjunction of conditions over one entity.
///
/// An empty filter matches every record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

/// One entry of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Operators applied to a scalar field.
    Field { field: String, filter: FieldFilter },
    /// Quantified condition on a relation.
    Relation {
        relation: String,
        filter: RelationFilter,
    },
    /// All nested filters must hold. Empty matches everything.
    And(Vec<Filter>),
    /// At least one nested filter must hold. Empty matches nothing.
    Or(Vec<Filter>),
    /// None of the nested filters may hold.
    Not(Vec<Filter>),
}

/// String comparison mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    #[default]
    Default,
    Insensitive,
}

/// A set of operators on a single scalar field, all of which must hold.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldFilter {
    pub ops: Vec<FieldOp>,
    pub mode: QueryMode,
}

/// A scalar operator.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Equals(Value),
    Not(Box<FieldFilter>),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
}

impl FieldOp {
    /// Operator name as written in argument documents.
    pub fn name(&self) -> &'static str {
        match self {
            FieldOp::Equals(_) => "equals",
            FieldOp::Not(_) => "not",
            FieldOp::In(_) => "in",
            FieldOp::NotIn(_) => "notIn",
            FieldOp::Lt(_) => "lt",
            FieldOp::Lte(_) => "lte",
            FieldOp::Gt(_) => "gt",
            FieldOp::Gte(_) => "gte",
            FieldOp::Contains(_) => "contains",
            FieldOp::StartsWith(_) => "startsWith",
            FieldOp::EndsWith(_) => "endsWith",
        }
    }
}

/// Quantified relation conditions.
///
/// `Is`/`IsNot` apply to to-one relations; `None` inside them tests for the
/// related record's absence. `Every`/`Some`/`None` apply to to-many relations.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationFilter {
    Is(Option<Filter>),
    IsNot(Option<Filter>),
    Every(Filter),
    Some(Filter),
    None(Filter),
}

impl RelationFilter {
    pub fn is(filter: Filter) -> Self {
        RelationFilter::Is(Some(filter))
    }

    pub fn is_not(filter: Filter) -> Self {
        RelationFilter::IsNot(Some(filter))
    }

    /// Matches records whose optional to-one relation is absent.
    pub fn is_null() -> Self {
        RelationFilter::Is(None)
    }

    /// Matches records whose optional to-one relation is present.
    pub fn is_not_null() -> Self {
        RelationFilter::IsNot(None)
    }

    pub fn every(filter: Filter) -> Self {
        RelationFilter::Every(filter)
    }

    pub fn some(filter: Filter) -> Self {
        RelationFilter::Some(filter)
    }

    pub fn none(filter: Filter) -> Self {
        RelationFilter::None(filter)
    }

    /// Quantifier name as written in argument documents.
    pub fn name(&self) -> &'static str {
        match self {
            RelationFilter::Is(_) => "is",
            RelationFilter::IsNot(_) => "isNot",
            RelationFilter::Every(_) => "every",
            RelationFilter::Some(_) => "some",
            RelationFilter::None(_) => "none",
        }
    }
}

impl Filter {
    /// Create an empty filter (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Add operators on a scalar field.
    pub fn field(mut self, field: impl Into<String>, filter: FieldFilter) -> Self {
        self.conditions.push(Condition::Field {
            field: field.into(),
            filter,
        });
        self
    }

    /// Shorthand for an equality condition.
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(field, FieldFilter::equals(value))
    }

    /// Add a relation condition.
    pub fn relation(mut self, relation: impl Into<String>, filter: RelationFilter) -> Self {
        self.conditions.push(Condition::Relation {
            relation: relation.into(),
            filter,
        });
        self
    }

    pub fn and(mut self, filters: Vec<Filter>) -> Self {
        self.conditions.push(Condition::And(filters));
        self
    }

    pub fn or(mut self, filters: Vec<Filter>) -> Self {
        self.conditions.push(Condition::Or(filters));
        self
    }

    pub fn not(mut self, filters: Vec<Filter>) -> Self {
        self.conditions.push(Condition::Not(filters));
        self
    }
}

impl FieldFilter {
    /// Create a field filter with a single operator.
    pub fn with(op: FieldOp) -> Self {
        Self {
            ops: vec![op],
            mode: QueryMode::Default,
        }
    }

    /// Add another operator that must also hold.
    pub fn and(mut self, op: FieldOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Compare strings case-insensitively.
    pub fn insensitive(mut self) -> Self {
        self.mode = QueryMode::Insensitive;
        self
    }

    pub fn equals(value: impl Into<Value>) -> Self {
        Self::with(FieldOp::Equals(value.into()))
    }

    pub fn not_equals(value: impl Into<Value>) -> Self {
        Self::with(FieldOp::Not(Box::new(Self::equals(value))))
    }

    pub fn is_null() -> Self {
        Self::equals(Value::Null)
    }

    pub fn is_not_null() -> Self {
        Self::not_equals(Value::Null)
    }

    pub fn in_values<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::with(FieldOp::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::with(FieldOp::NotIn(values.into_iter().map(Into::into).collect()))
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Self::with(FieldOp::Lt(value.into()))
    }

    pub fn lte(value: impl Into<Value>) -> Self {
        Self::with(FieldOp::Lte(value.into()))
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Self::with(FieldOp::Gt(value.into()))
    }

    pub fn gte(value: impl Into<Value>) -> Self {
        Self::with(FieldOp::Gte(value.into()))
    }

    pub fn contains(pattern: impl Into<String>) -> Self {
        Self::with(FieldOp::Contains(pattern.into()))
    }

    pub fn starts_with(prefix: impl Into<String>) -> Self {
        Self::with(FieldOp::StartsWith(prefix.into()))
    }

    pub fn ends_with(suffix: impl Into<String>) -> Self {
        Self::with(FieldOp::EndsWith(suffix.into()))
    }
}

/// Identifies at most one record by a complete unique key.
///
/// Field order does not matter; the compiler matches the supplied field set
/// against the entity's primary key and declared unique constraints.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UniqueWhere {
    pub fields: Vec<(String, Value)>,
}

impl UniqueWhere {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unique filter on a single field.
    pub fn by(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and(field, value)
    }

    /// Add another key field.
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builder() {
        let filter = Filter::new()
            .eq("status", "CONFIRMED")
            .field("seed", FieldFilter::gte(1).and(FieldOp::Lte(Value::Int(4))))
            .relation(
                "athlete",
                RelationFilter::is(Filter::new().field("lastName", FieldFilter::starts_with("Mc"))),
            );

        assert_eq!(filter.conditions.len(), 3);
        match &filter.conditions[1] {
            Condition::Field { field, filter } => {
                assert_eq!(field, "seed");
                assert_eq!(filter.ops.len(), 2);
            }
            other => panic!("unexpected condition {other:?}"),
        }
    }

    #[test]
    fn test_not_equals_wraps_equals() {
        let f = FieldFilter::not_equals(5);
        assert_eq!(
            f.ops,
            vec![FieldOp::Not(Box::new(FieldFilter::equals(5)))]
        );
        assert_eq!(f.ops[0].name(), "not");
    }

    #[test]
    fn test_unique_where() {
        let key = UniqueWhere::by("clubId", 3).and("name", "Juniors");
        assert_eq!(key.get("clubId"), Some(&Value::Int(3)));
        assert_eq!(key.field_names(), vec!["clubId", "name"]);
        assert!(key.get("id").is_none());
    }
}
