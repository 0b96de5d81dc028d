//! The schema registry: validated, immutable entity metadata.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::entity::{same_set, EntityDefinition};
use super::relation::{JoinColumns, RelationDefinition};
use super::types::{Cardinality, DefaultRule, OnDelete, ScalarKind};
use crate::error::{FilterError, SchemaError};

/// A declared enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDefinition {
    pub name: String,
    pub variants: Vec<String>,
}

/// Unvalidated schema input, usually parsed from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaSource {
    #[serde(default)]
    pub enums: Vec<EnumDefinition>,
    pub entities: Vec<EntityDefinition>,
}

impl SchemaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enum<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        variants: impl IntoIterator<Item = S>,
    ) -> Self {
        self.enums.push(EnumDefinition {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn with_entity(mut self, entity: EntityDefinition) -> Self {
        self.entities.push(entity);
        self
    }
}

/// A record set that depends on another entity through a foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependent {
    /// Entity holding the foreign key.
    pub entity: String,
    /// Relation on `entity` that declares the foreign key.
    pub relation: String,
    /// Name used in errors: the parent's inverse relation, or `Entity.relation`.
    pub name: String,
    /// Foreign-key fields on `entity`.
    pub fields: Vec<String>,
    /// Referenced fields on the parent.
    pub references: Vec<String>,
    pub on_delete: OnDelete,
}

/// Validated schema metadata. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entities: Vec<EntityDefinition>,
    index: HashMap<String, usize>,
    enums: HashMap<String, EnumDefinition>,
    dependents: HashMap<String, Vec<Dependent>>,
}

impl SchemaRegistry {
    /// Parse and validate a JSON schema document.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let source: SchemaSource = serde_json::from_str(json)?;
        Self::load(source)
    }

    /// Validate a schema source and build the registry.
    pub fn load(source: SchemaSource) -> Result<Self, SchemaError> {
        let mut enums = HashMap::new();
        for def in source.enums {
            if def.variants.is_empty() {
                return Err(SchemaError::EmptyEnum { name: def.name });
            }
            let name = def.name.clone();
            if enums.insert(name.clone(), def).is_some() {
                return Err(SchemaError::DuplicateEnum { name });
            }
        }

        let mut index = HashMap::new();
        for (i, entity) in source.entities.iter().enumerate() {
            if index.insert(entity.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateEntity {
                    entity: entity.name.clone(),
                });
            }
        }

        for entity in &source.entities {
            validate_entity(entity, &enums)?;
        }
        for entity in &source.entities {
            for relation in &entity.relations {
                let target = index
                    .get(&relation.target)
                    .map(|&i| &source.entities[i])
                    .ok_or_else(|| SchemaError::UnknownTarget {
                        entity: entity.name.clone(),
                        relation: relation.name.clone(),
                        target: relation.target.clone(),
                    })?;
                validate_relation(entity, relation, target)?;
            }
        }

        let mut entities = source.entities;
        let mut joins = Vec::new();
        for (i, entity) in entities.iter().enumerate() {
            for (j, relation) in entity.relations.iter().enumerate() {
                let join = if relation.declares_foreign_key() {
                    JoinColumns {
                        local: relation.fields.clone(),
                        remote: relation.references.clone(),
                        owns_foreign_key: true,
                        on_delete: relation.on_delete,
                    }
                } else {
                    let owner = relation
                        .inverse
                        .as_deref()
                        .and_then(|name| {
                            index
                                .get(&relation.target)
                                .and_then(|&t| entities[t].relation(name))
                        })
                        .ok_or_else(|| SchemaError::MissingInverse {
                            entity: entity.name.clone(),
                            relation: relation.name.clone(),
                        })?;
                    JoinColumns {
                        local: owner.references.clone(),
                        remote: owner.fields.clone(),
                        owns_foreign_key: false,
                        on_delete: owner.on_delete,
                    }
                };
                joins.push((i, j, join));
            }
        }
        for (i, j, join) in joins {
            entities[i].relations[j].join = join;
        }

        let mut dependents: HashMap<String, Vec<Dependent>> = HashMap::new();
        for entity in &entities {
            for relation in entity.relations.iter().filter(|r| r.declares_foreign_key()) {
                dependents
                    .entry(relation.target.clone())
                    .or_default()
                    .push(Dependent {
                        entity: entity.name.clone(),
                        relation: relation.name.clone(),
                        name: relation
                            .inverse
                            .clone()
                            .unwrap_or_else(|| format!("{}.{}", entity.name, relation.name)),
                        fields: relation.fields.clone(),
                        references: relation.references.clone(),
                        on_delete: relation.on_delete.unwrap_or(OnDelete::Restrict),
                    });
            }
        }

        tracing::info!(
            entities = entities.len(),
            enums = enums.len(),
            "schema registry loaded"
        );

        Ok(Self {
            entities,
            index,
            enums,
            dependents,
        })
    }

    /// Get an entity by name.
    pub fn entity(&self, name: &str) -> Option<&EntityDefinition> {
        self.index.get(name).map(|&i| &self.entities[i])
    }

    /// Get an entity by name, failing with `UnknownEntity`.
    pub fn require(&self, name: &str) -> Result<&EntityDefinition, FilterError> {
        self.entity(name).ok_or_else(|| FilterError::UnknownEntity {
            entity: name.to_string(),
        })
    }

    /// All entities in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDefinition> {
        self.entities.iter()
    }

    /// Relations declared on an entity.
    pub fn relations_of(&self, entity: &str) -> &[RelationDefinition] {
        self.entity(entity).map(|e| e.relations.as_slice()).unwrap_or(&[])
    }

    /// Entities whose foreign keys reference `entity`.
    pub fn dependents_of(&self, entity: &str) -> &[Dependent] {
        self.dependents
            .get(entity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Get a declared enum.
    pub fn enum_definition(&self, name: &str) -> Option<&EnumDefinition> {
        self.enums.get(name)
    }

    /// Variants allowed for a scalar kind, if it is an enum.
    pub fn variants_of(&self, kind: &ScalarKind) -> Option<&[String]> {
        match kind {
            ScalarKind::Enum(name) => self.enums.get(name).map(|e| e.variants.as_slice()),
            _ => None,
        }
    }
}

fn validate_entity(
    entity: &EntityDefinition,
    enums: &HashMap<String, EnumDefinition>,
) -> Result<(), SchemaError> {
    let mut members = HashSet::new();
    let names = entity
        .fields
        .iter()
        .map(|f| &f.name)
        .chain(entity.relations.iter().map(|r| &r.name));
    for name in names {
        if !members.insert(name.as_str()) {
            return Err(SchemaError::DuplicateMember {
                entity: entity.name.clone(),
                name: name.clone(),
            });
        }
    }

    let unknown = |field: &str, context: &str| SchemaError::UnknownField {
        entity: entity.name.clone(),
        field: field.to_string(),
        context: context.to_string(),
    };

    if entity.primary_key.is_empty() {
        return Err(SchemaError::MissingPrimaryKey {
            entity: entity.name.clone(),
        });
    }
    for name in &entity.primary_key {
        let field = entity
            .field(name)
            .ok_or_else(|| unknown(name, "primary key"))?;
        if field.nullable {
            return Err(SchemaError::NullablePrimaryKey {
                entity: entity.name.clone(),
                field: name.clone(),
            });
        }
    }

    for unique in &entity.uniques {
        if unique.fields.is_empty() {
            return Err(unknown("", "empty unique constraint"));
        }
        for name in &unique.fields {
            entity
                .field(name)
                .ok_or_else(|| unknown(name, "unique constraint"))?;
        }
    }

    for field in &entity.fields {
        let variants = match &field.kind {
            ScalarKind::Enum(name) => match enums.get(name) {
                Some(def) => Some(def.variants.as_slice()),
                None => {
                    return Err(SchemaError::UnknownEnum {
                        entity: entity.name.clone(),
                        field: field.name.clone(),
                        name: name.clone(),
                    })
                }
            },
            _ => None,
        };

        let invalid = |reason: &str| SchemaError::InvalidDefault {
            entity: entity.name.clone(),
            field: field.name.clone(),
            reason: reason.to_string(),
        };
        match &field.default {
            None => {}
            Some(DefaultRule::Autoincrement) => {
                if field.kind != ScalarKind::Int || entity.primary_key != [field.name.clone()] {
                    return Err(invalid("autoincrement requires a single int primary key"));
                }
            }
            Some(DefaultRule::Uuid) => {
                if field.kind != ScalarKind::String {
                    return Err(invalid("uuid requires a string field"));
                }
            }
            Some(DefaultRule::Now) | Some(DefaultRule::UpdatedAt) => {
                if field.kind != ScalarKind::DateTime {
                    return Err(invalid("timestamp defaults require a datetime field"));
                }
            }
            Some(DefaultRule::Value(value)) => {
                if value.is_null() && !field.nullable {
                    return Err(invalid("null default on a required field"));
                }
                field
                    .kind
                    .coerce(value, variants)
                    .map_err(|reason| invalid(&reason))?;
            }
        }
    }
    Ok(())
}

fn validate_relation(
    entity: &EntityDefinition,
    relation: &RelationDefinition,
    target: &EntityDefinition,
) -> Result<(), SchemaError> {
    let invalid = |reason: String| SchemaError::InvalidRelation {
        entity: entity.name.clone(),
        relation: relation.name.clone(),
        reason,
    };

    if relation.one_directional && relation.inverse.is_some() {
        return Err(invalid(
            "a one-directional relation cannot name an inverse".to_string(),
        ));
    }

    if relation.declares_foreign_key() {
        if relation.fields.len() != relation.references.len() {
            return Err(invalid(
                "fields and references must have the same length".to_string(),
            ));
        }
        if relation.is_to_many() {
            return Err(invalid(
                "a to-many relation cannot hold the foreign key".to_string(),
            ));
        }
        let context = format!("relation '{}'", relation.name);
        let mut fk_fields = Vec::new();
        for (name, reference) in relation.fields.iter().zip(&relation.references) {
            let field = entity
                .field(name)
                .ok_or_else(|| SchemaError::UnknownField {
                    entity: entity.name.clone(),
                    field: name.clone(),
                    context: context.clone(),
                })?;
            let referenced = target
                .field(reference)
                .ok_or_else(|| SchemaError::UnknownField {
                    entity: target.name.clone(),
                    field: reference.clone(),
                    context: format!("references of {}.{}", entity.name, relation.name),
                })?;
            if field.kind != referenced.kind {
                return Err(invalid(format!(
                    "'{}' ({}) cannot reference '{}.{}' ({})",
                    field.name, field.kind, target.name, referenced.name, referenced.kind
                )));
            }
            fk_fields.push(field);
        }
        if !target.is_unique_key(&relation.references) {
            return Err(invalid(format!(
                "references must form a unique key of '{}'",
                target.name
            )));
        }

        match relation.on_delete {
            None => {
                return Err(SchemaError::MissingDeletePolicy {
                    entity: entity.name.clone(),
                    relation: relation.name.clone(),
                })
            }
            Some(OnDelete::SetNull) => {
                if let Some(field) = fk_fields.iter().find(|f| !f.nullable) {
                    return Err(SchemaError::InvalidDeletePolicy {
                        entity: entity.name.clone(),
                        relation: relation.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
            Some(_) => {}
        }

        match relation.cardinality {
            Cardinality::ToOne if fk_fields.iter().any(|f| f.nullable) => {
                return Err(invalid(
                    "a required relation cannot use nullable foreign key fields".to_string(),
                ));
            }
            Cardinality::OptionalToOne if fk_fields.iter().any(|f| !f.nullable) => {
                return Err(invalid(
                    "an optional relation needs nullable foreign key fields".to_string(),
                ));
            }
            _ => {}
        }
    } else {
        if relation.on_delete.is_some() {
            return Err(SchemaError::MisplacedDeletePolicy {
                entity: entity.name.clone(),
                relation: relation.name.clone(),
            });
        }
        if relation.one_directional {
            return Err(invalid(
                "a one-directional relation must declare its foreign key".to_string(),
            ));
        }
    }

    let Some(inverse_name) = &relation.inverse else {
        if relation.one_directional {
            return Ok(());
        }
        return Err(SchemaError::MissingInverse {
            entity: entity.name.clone(),
            relation: relation.name.clone(),
        });
    };

    let inverse = target.relation(inverse_name).ok_or_else(|| {
        invalid(format!(
            "inverse '{}' not found on '{}'",
            inverse_name, target.name
        ))
    })?;
    if inverse.target != entity.name || inverse.inverse.as_deref() != Some(relation.name.as_str())
    {
        return Err(invalid(format!(
            "inverse '{}.{}' does not point back to this relation",
            target.name, inverse_name
        )));
    }
    if relation.declares_foreign_key() == inverse.declares_foreign_key() {
        return Err(SchemaError::AmbiguousForeignKey {
            entity: entity.name.clone(),
            relation: relation.name.clone(),
        });
    }
    if !relation.declares_foreign_key() && !relation.is_to_many() {
        if relation.cardinality == Cardinality::ToOne {
            return Err(invalid(
                "the side without the foreign key cannot be a required to-one".to_string(),
            ));
        }
        let unique_foreign_key = target
            .unique_keys()
            .iter()
            .any(|key| same_set(&key.fields, &inverse.fields));
        if !unique_foreign_key {
            return Err(invalid(format!(
                "a to-one inverse requires the foreign key on '{}' to be unique",
                target.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::FieldDefinition;

    fn id() -> FieldDefinition {
        FieldDefinition::new("id", ScalarKind::Int).with_default(DefaultRule::Autoincrement)
    }

    fn club() -> EntityDefinition {
        EntityDefinition::new("Club")
            .with_field(id())
            .with_field(FieldDefinition::new("name", ScalarKind::String))
            .with_primary_key(["id"])
            .with_relation(RelationDefinition::to_many("athletes", "Athlete").with_inverse("club"))
    }

    fn athlete() -> EntityDefinition {
        EntityDefinition::new("Athlete")
            .with_field(id())
            .with_field(FieldDefinition::new("clubId", ScalarKind::Int))
            .with_primary_key(["id"])
            .with_relation(
                RelationDefinition::to_one("club", "Club")
                    .with_foreign_key(["clubId"], ["id"])
                    .with_on_delete(OnDelete::Restrict)
                    .with_inverse("athletes"),
            )
    }

    #[test]
    fn test_load_resolves_joins_and_dependents() {
        let registry = SchemaRegistry::load(
            SchemaSource::new().with_entity(club()).with_entity(athlete()),
        )
        .unwrap();

        let athletes = registry.entity("Club").unwrap().relation("athletes").unwrap();
        assert_eq!(athletes.local_columns(), ["id".to_string()]);
        assert_eq!(athletes.remote_columns(), ["clubId".to_string()]);
        assert!(!athletes.join().owns_foreign_key);
        assert_eq!(athletes.join().on_delete, Some(OnDelete::Restrict));

        let dependents = registry.dependents_of("Club");
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].entity, "Athlete");
        assert_eq!(dependents[0].name, "athletes");
        assert!(registry.dependents_of("Athlete").is_empty());
    }

    #[test]
    fn test_missing_inverse_rejected() {
        let club = EntityDefinition::new("Club").with_field(id()).with_primary_key(["id"]);
        let err = SchemaRegistry::load(SchemaSource::new().with_entity(club).with_entity(athlete()))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRelation { ref relation, .. } if relation == "club"));

        let athlete = EntityDefinition::new("Athlete")
            .with_field(id())
            .with_field(FieldDefinition::new("clubId", ScalarKind::Int))
            .with_primary_key(["id"])
            .with_relation(
                RelationDefinition::to_one("club", "Club")
                    .with_foreign_key(["clubId"], ["id"])
                    .with_on_delete(OnDelete::Cascade),
            );
        let club = EntityDefinition::new("Club").with_field(id()).with_primary_key(["id"]);
        let err = SchemaRegistry::load(SchemaSource::new().with_entity(club).with_entity(athlete))
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingInverse { .. }));
    }

    #[test]
    fn test_one_directional_allowed() {
        let athlete = EntityDefinition::new("Athlete")
            .with_field(id())
            .with_field(FieldDefinition::new("clubId", ScalarKind::Int))
            .with_primary_key(["id"])
            .with_relation(
                RelationDefinition::to_one("club", "Club")
                    .with_foreign_key(["clubId"], ["id"])
                    .with_on_delete(OnDelete::Cascade)
                    .one_directional(),
            );
        let club = EntityDefinition::new("Club").with_field(id()).with_primary_key(["id"]);
        let registry =
            SchemaRegistry::load(SchemaSource::new().with_entity(club).with_entity(athlete)).unwrap();
        assert_eq!(registry.dependents_of("Club")[0].name, "Athlete.club");
    }

    #[test]
    fn test_set_null_requires_nullable_field() {
        let athlete = EntityDefinition::new("Athlete")
            .with_field(id())
            .with_field(FieldDefinition::new("clubId", ScalarKind::Int))
            .with_primary_key(["id"])
            .with_relation(
                RelationDefinition::to_one("club", "Club")
                    .with_foreign_key(["clubId"], ["id"])
                    .with_on_delete(OnDelete::SetNull)
                    .with_inverse("athletes"),
            );
        let err = SchemaRegistry::load(SchemaSource::new().with_entity(club()).with_entity(athlete))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDeletePolicy { ref field, .. } if field == "clubId"));
    }

    #[test]
    fn test_missing_delete_policy() {
        let athlete = EntityDefinition::new("Athlete")
            .with_field(id())
            .with_field(FieldDefinition::new("clubId", ScalarKind::Int))
            .with_primary_key(["id"])
            .with_relation(
                RelationDefinition::to_one("club", "Club")
                    .with_foreign_key(["clubId"], ["id"])
                    .with_inverse("athletes"),
            );
        let err = SchemaRegistry::load(SchemaSource::new().with_entity(club()).with_entity(athlete))
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingDeletePolicy { .. }));
    }

    #[test]
    fn test_both_sides_declare_foreign_key() {
        let club = EntityDefinition::new("Club")
            .with_field(id())
            .with_field(FieldDefinition::new("captainId", ScalarKind::Int))
            .with_primary_key(["id"])
            .with_relation(
                RelationDefinition::to_one("athletes", "Athlete")
                    .with_foreign_key(["captainId"], ["id"])
                    .with_on_delete(OnDelete::Restrict)
                    .with_inverse("club"),
            );
        let err = SchemaRegistry::load(SchemaSource::new().with_entity(club).with_entity(athlete()))
            .unwrap_err();
        assert!(matches!(err, SchemaError::AmbiguousForeignKey { .. }));
    }

    #[test]
    fn test_entity_level_errors() {
        let dup = SchemaSource::new().with_entity(club()).with_entity(club());
        assert!(matches!(
            SchemaRegistry::load(dup).unwrap_err(),
            SchemaError::DuplicateEntity { .. }
        ));

        let no_pk = EntityDefinition::new("Log").with_field(FieldDefinition::new("msg", ScalarKind::String));
        assert!(matches!(
            SchemaRegistry::load(SchemaSource::new().with_entity(no_pk)).unwrap_err(),
            SchemaError::MissingPrimaryKey { .. }
        ));

        let bad_enum = EntityDefinition::new("Log")
            .with_field(id())
            .with_field(FieldDefinition::new("level", ScalarKind::Enum("Level".into())))
            .with_primary_key(["id"]);
        assert!(matches!(
            SchemaRegistry::load(SchemaSource::new().with_entity(bad_enum)).unwrap_err(),
            SchemaError::UnknownEnum { .. }
        ));

        let bad_default = EntityDefinition::new("Log")
            .with_field(id())
            .with_field(
                FieldDefinition::new("level", ScalarKind::Enum("Level".into()))
                    .with_default(DefaultRule::Value("TRACE".into())),
            )
            .with_primary_key(["id"]);
        let source = SchemaSource::new()
            .with_enum("Level", ["INFO", "WARN"])
            .with_entity(bad_default);
        assert!(matches!(
            SchemaRegistry::load(source).unwrap_err(),
            SchemaError::InvalidDefault { .. }
        ));
    }
}
