//! Client handle of an interactive transaction.

use std::sync::Arc;

use async_trait::async_trait;
use ormkit_proto::{Operation, OperationResult, Row, Value};
use tokio::sync::Mutex;

use crate::driver::Connection;
use crate::engine::{Delegate, Engine, OperationRunner};
use crate::error::{Error, TransactionError};
use crate::schema::SchemaRegistry;

/// Runs operations on the connection pinned by an interactive transaction.
///
/// Clones share the connection and run their operations one at a time.
/// Once the transaction finishes every clone fails with
/// `TransactionError::Closed`.
#[derive(Clone)]
pub struct TransactionClient {
    engine: Engine,
    connection: Arc<Mutex<Option<Box<dyn Connection>>>>,
}

impl TransactionClient {
    pub(crate) fn new(engine: Engine, connection: Box<dyn Connection>) -> Self {
        Self {
            engine,
            connection: Arc::new(Mutex::new(Some(connection))),
        }
    }

    /// Operations on one entity, inside this transaction.
    pub fn entity(&self, name: &str) -> Result<Delegate<'_>, Error> {
        Delegate::new(self, name)
    }

    /// Run one operation. Nothing is retried inside a transaction.
    pub async fn execute(&self, operation: Operation) -> Result<OperationResult, Error> {
        let mut guard = self.connection.lock().await;
        let conn = guard.as_mut().ok_or(TransactionError::Closed)?;
        self.engine.dispatch(conn.as_mut(), &operation).await
    }

    pub async fn query_raw(&self, sql: impl Into<String>, params: Vec<Value>) -> Result<Vec<Row>, Error> {
        match self
            .execute(Operation::QueryRaw {
                sql: sql.into(),
                params,
            })
            .await?
        {
            OperationResult::Rows(rows) => Ok(rows),
            other => Err(crate::engine::unexpected("queryRaw", &other)),
        }
    }

    pub async fn execute_raw(&self, sql: impl Into<String>, params: Vec<Value>) -> Result<u64, Error> {
        match self
            .execute(Operation::ExecuteRaw {
                sql: sql.into(),
                params,
            })
            .await?
        {
            OperationResult::Affected(count) => Ok(count),
            other => Err(crate::engine::unexpected("executeRaw", &other)),
        }
    }

    /// Whether the transaction has finished.
    pub async fn is_closed(&self) -> bool {
        self.connection.lock().await.is_none()
    }

    /// Take the pinned connection back, closing the client.
    pub(crate) async fn close(&self) -> Option<Box<dyn Connection>> {
        self.connection.lock().await.take()
    }
}

#[async_trait]
impl OperationRunner for TransactionClient {
    fn registry(&self) -> &SchemaRegistry {
        self.engine.registry()
    }

    async fn execute(&self, operation: Operation) -> Result<OperationResult, Error> {
        TransactionClient::execute(self, operation).await
    }
}
