//! Relation definitions between entities.

use serde::{Deserialize, Serialize};

use super::types::{Cardinality, OnDelete};

/// Columns joining a relation, resolved when the registry loads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoinColumns {
    /// Columns on the declaring entity.
    pub local: Vec<String>,
    /// Matching columns on the target entity.
    pub remote: Vec<String>,
    /// Whether the declaring entity holds the foreign key.
    pub owns_foreign_key: bool,
    /// Delete policy of the pair, taken from the foreign-key side.
    pub on_delete: Option<OnDelete>,
}

/// A named relation from one entity to another.
///
/// Exactly one side of a bidirectional pair declares `fields`/`references`
/// (the foreign key) and the `on_delete` policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDefinition {
    /// Relation name, unique among the entity's members.
    pub name: String,
    /// Target entity name.
    pub target: String,
    pub cardinality: Cardinality,
    /// Foreign-key fields on this entity.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Referenced fields on the target, forming a unique key there.
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub on_delete: Option<OnDelete>,
    /// Name of the matching relation on the target.
    #[serde(default)]
    pub inverse: Option<String>,
    /// Explicitly declared without an inverse.
    #[serde(default)]
    pub one_directional: bool,
    #[serde(skip)]
    pub(crate) join: JoinColumns,
}

impl RelationDefinition {
    fn new(name: impl Into<String>, target: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality,
            fields: vec![],
            references: vec![],
            on_delete: None,
            inverse: None,
            one_directional: false,
            join: JoinColumns::default(),
        }
    }

    /// Create a required to-one relation.
    pub fn to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, Cardinality::ToOne)
    }

    /// Create an optional to-one relation.
    pub fn optional_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, Cardinality::OptionalToOne)
    }

    /// Create a to-many relation.
    pub fn to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target, Cardinality::ToMany)
    }

    /// Declare the foreign key held by this side.
    pub fn with_foreign_key<S: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = S>,
        references: impl IntoIterator<Item = S>,
    ) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self.references = references.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_on_delete(mut self, on_delete: OnDelete) -> Self {
        self.on_delete = Some(on_delete);
        self
    }

    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    pub fn one_directional(mut self) -> Self {
        self.one_directional = true;
        self
    }

    /// Whether this side declares the foreign key.
    pub fn declares_foreign_key(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn is_to_many(&self) -> bool {
        self.cardinality.is_to_many()
    }

    /// Resolved join columns.
    pub fn join(&self) -> &JoinColumns {
        &self.join
    }

    /// Columns on the declaring entity.
    pub fn local_columns(&self) -> &[String] {
        &self.join.local
    }

    /// Columns on the target entity.
    pub fn remote_columns(&self) -> &[String] {
        &self.join.remote
    }
}
