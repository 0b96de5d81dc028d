//! ormkit core: schema-checked queries and mutations over SQL backends.
//!
//! This crate turns the argument types of [`ormkit_proto`] into validated,
//! parameterized SQL and materializes the results.
//!
//! # Modules
//!
//! - [`schema`] - Entity, field, relation and enum metadata
//! - [`filter`] - Compilation of `where` trees into predicates
//! - [`query`] - Read planning, rendering and include loading
//! - [`aggregate`] - `aggregate`, `count` and `groupBy`
//! - [`mutation`] - Write validation, execution and delete policies
//! - [`materialize`] - Decoding of stored rows into records
//! - [`transaction`] - Batches, interactive transactions and retries
//! - [`engine`] - The engine handle and per-entity delegates
//! - [`driver`] - Driver, connection and dialect interfaces; SQLite driver
//! - [`config`] - Engine and driver configuration

pub mod aggregate;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod filter;
pub mod materialize;
pub mod mutation;
pub mod query;
pub mod schema;
pub mod sql;
pub mod transaction;

#[cfg(test)]
mod test_support;

pub use ormkit_proto as proto;

pub use aggregate::AggregateExecutor;
pub use config::{EngineConfig, RetryPolicy, SqliteConfig, TransactionOptions};
pub use driver::{
    Connection, Dialect, Driver, IsolationLevel, PostgresDialect, SqliteDialect, SqliteDriver,
    Statement,
};
pub use engine::{Delegate, Engine, OperationRunner};
pub use error::{
    Error, FilterError, MutationError, PlanError, QueryError, SchemaError, StorageError,
    TransactionError,
};
pub use filter::{FilterCompiler, PredicateNode, UniqueKey};
pub use mutation::{CascadeExecutor, MutationExecutor, PayloadCompiler};
pub use query::{ExecutionPlan, QueryExecutor, QueryPlanner};
pub use schema::{
    Cardinality, DefaultRule, EntityDefinition, FieldDefinition, OnDelete, RelationDefinition,
    ScalarKind, SchemaRegistry, SchemaSource,
};
pub use transaction::TransactionClient;
