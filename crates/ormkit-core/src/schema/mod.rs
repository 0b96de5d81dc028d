//! Schema registry: entity, field, relation and enum metadata.

mod ddl;
pub mod entity;
pub mod field;
pub mod registry;
pub mod relation;
pub mod types;

pub use entity::{key_name, EntityDefinition, KeyDefinition, Member, UniqueConstraint};
pub use field::FieldDefinition;
pub use registry::{Dependent, EnumDefinition, SchemaRegistry, SchemaSource};
pub use relation::{JoinColumns, RelationDefinition};
pub use types::{Cardinality, DefaultRule, OnDelete, ScalarKind};
