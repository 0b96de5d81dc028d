//! Storage driver interface.
//!
//! The engine talks to a backend only through [`Driver`] and [`Connection`],
//! passing parameterized [`Statement`]s rendered for the driver's
//! [`Dialect`].

pub mod dialect;
pub mod sqlite;

pub use dialect::{Dialect, IsolationLevel, PostgresDialect, SqliteDialect};
pub use sqlite::SqliteDriver;

use std::time::Duration;

use async_trait::async_trait;
use ormkit_proto::{Row, Value};

use crate::error::StorageError;

/// A SQL statement with positional parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// One leased backend connection.
#[async_trait]
pub trait Connection: Send {
    /// Run a statement returning rows.
    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, StorageError>;

    /// Run a statement, returning the number of affected rows.
    async fn execute(&mut self, statement: &Statement) -> Result<u64, StorageError>;

    /// Open a transaction, waiting at most `wait` for another writer to
    /// release the database. Contention past `wait` fails with `Busy`.
    async fn begin(&mut self, isolation: Option<IsolationLevel>, wait: Duration) -> Result<(), StorageError>;

    async fn commit(&mut self) -> Result<(), StorageError>;

    async fn rollback(&mut self) -> Result<(), StorageError>;
}

/// A connection source for one database.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// SQL dialect statements must be rendered in.
    fn dialect(&self) -> &dyn Dialect;

    /// Lease a connection. Waits while the pool is exhausted.
    async fn acquire(&self) -> Result<Box<dyn Connection>, StorageError>;

    /// Close the pool. Later `acquire` calls fail with `Disconnected`.
    async fn close(&self);
}
