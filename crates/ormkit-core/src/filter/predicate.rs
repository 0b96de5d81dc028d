//! Compiled predicate trees.
//!
//! A [`PredicateNode`] is a filter that has been checked against the schema:
//! every field exists, every operator suits the field kind and every value
//! has been coerced. Relation conditions carry their resolved join columns,
//! so rendering needs no further schema access.

use ormkit_proto::{Aggregation, Value};

/// The left-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A column of the current table.
    Column(String),
    /// An aggregate over the current group.
    Aggregate(Aggregation),
}

/// A comparison operator with its coerced right-hand side.
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonOp {
    Equals(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    IsNull,
    IsNotNull,
}

/// A single comparison against an operand.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldComparison {
    pub operand: Operand,
    pub op: ComparisonOp,
    /// Compare case-insensitively.
    pub insensitive: bool,
}

/// How a relation condition quantifies over related records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// At least one related record matches.
    Exists,
    /// No related record matches.
    NotExists,
    /// Every related record matches. Vacuously true without related records.
    Every,
}

/// A condition on related records.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationPredicate {
    pub relation: String,
    /// Target entity (table).
    pub target: String,
    /// Join columns on the filtered entity.
    pub local: Vec<String>,
    /// Matching join columns on the target.
    pub remote: Vec<String>,
    pub quantifier: Quantifier,
    /// Condition on the related record; `None` tests existence only.
    pub predicate: Option<Box<PredicateNode>>,
}

/// A compiled predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateNode {
    Field(FieldComparison),
    /// All children hold. Empty means true.
    And(Vec<PredicateNode>),
    /// Any child holds. Empty means false.
    Or(Vec<PredicateNode>),
    Not(Box<PredicateNode>),
    Relation(RelationPredicate),
}

impl PredicateNode {
    /// The always-true predicate.
    pub fn always() -> Self {
        PredicateNode::And(vec![])
    }

    /// Equality on a column.
    pub fn column_eq(column: impl Into<String>, value: Value) -> Self {
        let op = if value.is_null() {
            ComparisonOp::IsNull
        } else {
            ComparisonOp::Equals(value)
        };
        PredicateNode::Field(FieldComparison {
            operand: Operand::Column(column.into()),
            op,
            insensitive: false,
        })
    }

    /// Combine nodes with AND, flattening a single node.
    pub fn all(mut nodes: Vec<PredicateNode>) -> Self {
        if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            PredicateNode::And(nodes)
        }
    }

    /// Whether the node is trivially true.
    pub fn is_always(&self) -> bool {
        matches!(self, PredicateNode::And(nodes) if nodes.is_empty())
    }
}

/// A resolved unique-key lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueKey {
    pub entity: String,
    /// Name of the matched key.
    pub name: String,
    /// Key fields in key order, with coerced values.
    pub fields: Vec<(String, Value)>,
}

impl UniqueKey {
    /// Equality predicate selecting the keyed record.
    pub fn predicate(&self) -> PredicateNode {
        PredicateNode::all(
            self.fields
                .iter()
                .map(|(field, value)| PredicateNode::column_eq(field.clone(), value.clone()))
                .collect(),
        )
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }
}
