//! Entity definitions.

use serde::{Deserialize, Serialize};

use super::field::FieldDefinition;
use super::relation::RelationDefinition;

/// A composite unique constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Constraint name; defaults to the field names joined by `_`.
    #[serde(default)]
    pub name: Option<String>,
    pub fields: Vec<String>,
}

/// A set of fields identifying at most one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDefinition {
    pub name: String,
    pub fields: Vec<String>,
    pub primary: bool,
}

/// A member of an entity: a scalar field or a relation.
#[derive(Debug, Clone, Copy)]
pub enum Member<'a> {
    Field(&'a FieldDefinition),
    Relation(&'a RelationDefinition),
}

/// An entity definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Entity name, also used as the table name.
    pub name: String,
    /// Scalar fields in declaration order.
    pub fields: Vec<FieldDefinition>,
    /// Primary key fields.
    pub primary_key: Vec<String>,
    /// Composite unique constraints.
    #[serde(default)]
    pub uniques: Vec<UniqueConstraint>,
    /// Relations to other entities.
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}

/// Default name of a key over `fields`.
pub fn key_name(fields: &[String]) -> String {
    fields.join("_")
}

impl EntityDefinition {
    /// Create a new entity with no members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![],
            primary_key: vec![],
            uniques: vec![],
            relations: vec![],
        }
    }

    /// Add a field.
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDefinition>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Set the primary key.
    pub fn with_primary_key<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Add a composite unique constraint.
    pub fn with_unique<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.uniques.push(UniqueConstraint {
            name: None,
            fields: fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add a relation.
    pub fn with_relation(mut self, relation: RelationDefinition) -> Self {
        self.relations.push(relation);
        self
    }

    /// Get a scalar field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get a relation by name.
    pub fn relation(&self, name: &str) -> Option<&RelationDefinition> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Resolve a member name.
    pub fn member(&self, name: &str) -> Option<Member<'_>> {
        self.field(name)
            .map(Member::Field)
            .or_else(|| self.relation(name).map(Member::Relation))
    }

    /// Names of all scalar fields in declaration order.
    pub fn scalar_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// The primary key followed by every declared unique key.
    pub fn unique_keys(&self) -> Vec<KeyDefinition> {
        let mut keys = vec![KeyDefinition {
            name: key_name(&self.primary_key),
            fields: self.primary_key.clone(),
            primary: true,
        }];
        for field in self.fields.iter().filter(|f| f.unique) {
            keys.push(KeyDefinition {
                name: field.name.clone(),
                fields: vec![field.name.clone()],
                primary: false,
            });
        }
        for unique in &self.uniques {
            keys.push(KeyDefinition {
                name: unique
                    .name
                    .clone()
                    .unwrap_or_else(|| key_name(&unique.fields)),
                fields: unique.fields.clone(),
                primary: false,
            });
        }
        keys
    }

    /// Whether `fields`, as a set, is exactly one of the entity's unique keys.
    pub fn is_unique_key(&self, fields: &[String]) -> bool {
        self.unique_keys().iter().any(|key| same_set(&key.fields, fields))
    }
}

pub(crate) fn same_set(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.contains(x))
}
