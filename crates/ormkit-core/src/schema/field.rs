//! Field definitions for entities.

use serde::{Deserialize, Serialize};

use super::types::{DefaultRule, ScalarKind};

/// A scalar field definition within an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name, also used as the column name.
    pub name: String,
    /// Scalar kind.
    pub kind: ScalarKind,
    /// Whether the field accepts null.
    #[serde(default)]
    pub nullable: bool,
    /// Value used when a create payload omits the field.
    #[serde(default)]
    pub default: Option<DefaultRule>,
    /// Single-field unique constraint.
    #[serde(default)]
    pub unique: bool,
    /// Allow `lt`/`gt` comparisons on a string field.
    #[serde(default)]
    pub orderable: bool,
}

impl FieldDefinition {
    /// Create a new required field.
    pub fn new(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            default: None,
            unique: false,
            orderable: false,
        }
    }

    /// Create a nullable field.
    pub fn optional(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            nullable: true,
            ..Self::new(name, kind)
        }
    }

    /// Set the default rule.
    pub fn with_default(mut self, default: DefaultRule) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Allow range comparisons on a string field.
    pub fn orderable(mut self) -> Self {
        self.orderable = true;
        self
    }

    /// A create payload must supply this field.
    pub fn is_required_on_create(&self) -> bool {
        !self.nullable && self.default.is_none()
    }

    /// Whether `lt`/`lte`/`gt`/`gte` apply.
    pub fn supports_range(&self) -> bool {
        match self.kind {
            ScalarKind::Int | ScalarKind::Float | ScalarKind::DateTime => true,
            ScalarKind::String => self.orderable,
            ScalarKind::Boolean | ScalarKind::Enum(_) => false,
        }
    }

    pub fn is_autoincrement(&self) -> bool {
        matches!(self.default, Some(DefaultRule::Autoincrement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_on_create() {
        assert!(FieldDefinition::new("name", ScalarKind::String).is_required_on_create());
        assert!(!FieldDefinition::optional("city", ScalarKind::String).is_required_on_create());
        assert!(!FieldDefinition::new("id", ScalarKind::Int)
            .with_default(DefaultRule::Autoincrement)
            .is_required_on_create());
    }

    #[test]
    fn test_supports_range() {
        assert!(FieldDefinition::new("weight", ScalarKind::Float).supports_range());
        assert!(!FieldDefinition::new("name", ScalarKind::String).supports_range());
        assert!(FieldDefinition::new("name", ScalarKind::String)
            .orderable()
            .supports_range());
        assert!(!FieldDefinition::new("active", ScalarKind::Boolean).supports_range());
    }
}
