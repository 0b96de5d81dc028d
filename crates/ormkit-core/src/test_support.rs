//! Shared fixtures for unit tests.

use crate::schema::SchemaRegistry;

pub(crate) const TOURNAMENT_SCHEMA: &str = include_str!("../../../schemas/tournament.json");

pub(crate) fn registry() -> SchemaRegistry {
    SchemaRegistry::from_json(TOURNAMENT_SCHEMA).expect("tournament schema loads")
}
