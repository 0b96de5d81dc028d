//! Table definitions rendered from the registry.

use std::collections::HashSet;

use super::entity::EntityDefinition;
use super::registry::SchemaRegistry;
use crate::driver::Dialect;

impl SchemaRegistry {
    /// `CREATE TABLE`/`CREATE INDEX` statements for every entity.
    ///
    /// Tables are ordered so that referenced tables come first; entities on a
    /// reference cycle keep declaration order.
    pub fn create_statements(&self, dialect: &dyn Dialect) -> Vec<String> {
        let mut statements = Vec::new();
        for entity in self.creation_order() {
            statements.push(create_table(entity, dialect));
            for relation in entity.relations.iter().filter(|r| r.declares_foreign_key()) {
                statements.push(format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    dialect.quote(&format!("{}_{}_idx", entity.name, relation.fields.join("_"))),
                    dialect.quote(&entity.name),
                    quote_list(dialect, &relation.fields),
                ));
            }
        }
        statements
    }

    fn creation_order(&self) -> Vec<&EntityDefinition> {
        let mut created: HashSet<&str> = HashSet::new();
        let mut order = Vec::new();
        let mut pending: Vec<&EntityDefinition> = self.entities().collect();

        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|entity| {
                let ready = entity
                    .relations
                    .iter()
                    .filter(|r| r.declares_foreign_key() && r.target != entity.name)
                    .all(|r| created.contains(r.target.as_str()));
                if ready {
                    created.insert(entity.name.as_str());
                    order.push(*entity);
                }
                !ready
            });
            if pending.len() == before {
                // Cycle: fall back to declaration order for the rest.
                order.append(&mut pending);
            }
        }
        order
    }
}

fn quote_list(dialect: &dyn Dialect, names: &[String]) -> String {
    names
        .iter()
        .map(|n| dialect.quote(n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_table(entity: &EntityDefinition, dialect: &dyn Dialect) -> String {
    let mut lines = Vec::new();
    let mut inline_key = false;

    for field in &entity.fields {
        let mut line = format!("{} ", dialect.quote(&field.name));
        if field.is_autoincrement() {
            line.push_str(dialect.autoincrement_key());
            inline_key = true;
        } else {
            line.push_str(dialect.column_type(&field.kind));
            if !field.nullable {
                line.push_str(" NOT NULL");
            }
        }
        lines.push(line);
    }

    if !inline_key {
        lines.push(format!(
            "PRIMARY KEY ({})",
            quote_list(dialect, &entity.primary_key)
        ));
    }
    for key in entity.unique_keys().iter().filter(|k| !k.primary) {
        lines.push(format!("UNIQUE ({})", quote_list(dialect, &key.fields)));
    }
    for relation in entity.relations.iter().filter(|r| r.declares_foreign_key()) {
        lines.push(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_list(dialect, &relation.fields),
            dialect.quote(&relation.target),
            quote_list(dialect, &relation.references),
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        dialect.quote(&entity.name),
        lines.join(",\n  ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SqliteDialect;
    use crate::schema::{
        DefaultRule, FieldDefinition, OnDelete, RelationDefinition, ScalarKind, SchemaSource,
    };
    use pretty_assertions::assert_eq;

    fn registry() -> SchemaRegistry {
        // Declared child-first to exercise ordering.
        let athlete = EntityDefinition::new("Athlete")
            .with_field(
                FieldDefinition::new("id", ScalarKind::Int).with_default(DefaultRule::Autoincrement),
            )
            .with_field(FieldDefinition::new("clubId", ScalarKind::Int))
            .with_field(FieldDefinition::optional("email", ScalarKind::String).unique())
            .with_primary_key(["id"])
            .with_relation(
                RelationDefinition::to_one("club", "Club")
                    .with_foreign_key(["clubId"], ["id"])
                    .with_on_delete(OnDelete::Restrict)
                    .with_inverse("athletes"),
            );
        let club = EntityDefinition::new("Club")
            .with_field(
                FieldDefinition::new("id", ScalarKind::Int).with_default(DefaultRule::Autoincrement),
            )
            .with_field(FieldDefinition::new("name", ScalarKind::String))
            .with_primary_key(["id"])
            .with_relation(RelationDefinition::to_many("athletes", "Athlete").with_inverse("club"));
        SchemaRegistry::load(SchemaSource::new().with_entity(athlete).with_entity(club)).unwrap()
    }

    #[test]
    fn test_referenced_tables_first() {
        let statements = registry().create_statements(&SqliteDialect);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS \"Club\""));
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS \"Athlete\""));
        assert_eq!(
            statements[2],
            "CREATE INDEX IF NOT EXISTS \"Athlete_clubId_idx\" ON \"Athlete\" (\"clubId\")"
        );
    }

    #[test]
    fn test_create_table_sqlite() {
        let statements = registry().create_statements(&SqliteDialect);
        assert_eq!(
            statements[1],
            "CREATE TABLE IF NOT EXISTS \"Athlete\" (\n  \
             \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n  \
             \"clubId\" INTEGER NOT NULL,\n  \
             \"email\" TEXT,\n  \
             UNIQUE (\"email\"),\n  \
             FOREIGN KEY (\"clubId\") REFERENCES \"Club\" (\"id\")\n)"
        );
    }
}
