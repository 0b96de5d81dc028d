//! The engine: schema, driver and configuration behind one handle.
//!
//! An [`Engine`] is constructed explicitly by the caller and cloned freely;
//! clones share the registry and the driver's pool. Operations are issued
//! through per-entity [`Delegate`]s or as [`Operation`] envelopes.

mod delegate;
mod dispatch;

pub use delegate::{Delegate, OperationRunner};
pub(crate) use dispatch::unexpected;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ormkit_proto::{Operation, OperationResult, Row, Value};

use crate::config::EngineConfig;
use crate::driver::{Connection, Dialect, Driver, IsolationLevel, Statement};
use crate::error::{Error, StorageError, TransactionError};
use crate::schema::SchemaRegistry;
use crate::transaction::with_retry;

struct EngineInner {
    registry: SchemaRegistry,
    driver: Box<dyn Driver>,
    config: EngineConfig,
}

/// Query and mutation engine over one database.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dialect", &self.dialect().name())
            .field("entities", &self.inner.registry.entities().count())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Engine {
    pub fn new(registry: SchemaRegistry, driver: impl Driver, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry,
                driver: Box::new(driver),
                config,
            }),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.inner.driver.dialect()
    }

    /// Check that the database can be reached.
    pub async fn connect(&self) -> Result<(), Error> {
        let conn = self.acquire(self.inner.config.transaction.max_wait).await?;
        drop(conn);
        tracing::info!(
            dialect = self.dialect().name(),
            entities = self.inner.registry.entities().count(),
            "engine connected"
        );
        Ok(())
    }

    /// Close the connection pool. Later operations fail with
    /// `StorageError::Disconnected`.
    pub async fn disconnect(&self) {
        self.inner.driver.close().await;
        tracing::info!("engine disconnected");
    }

    /// Create every table and index of the schema that does not exist yet.
    pub async fn push_schema(&self) -> Result<usize, Error> {
        let statements = self.inner.registry.create_statements(self.dialect());
        let mut conn = self.begin(self.inner.config.transaction.max_wait, None).await?;
        for sql in &statements {
            if let Err(err) = conn.execute(&Statement::new(sql.clone(), vec![])).await {
                rollback_quietly(conn.as_mut()).await;
                return Err(err.into());
            }
        }
        conn.commit().await?;
        tracing::info!(statements = statements.len(), "schema pushed");
        Ok(statements.len())
    }

    /// Operations on one entity.
    pub fn entity(&self, name: &str) -> Result<Delegate<'_>, Error> {
        Delegate::new(self, name)
    }

    /// Run one operation on a pooled connection.
    ///
    /// Writes run in their own transaction. Reads and writes flagged
    /// retry-safe are retried on transient storage failures.
    pub async fn execute(&self, operation: Operation) -> Result<OperationResult, Error> {
        let operation = &operation;
        with_retry(&self.inner.config.retry, operation.is_retry_safe(), || async move {
            self.execute_once(operation).await
        })
        .await
    }

    /// Run a raw query, bypassing the compiler. Rows come back in storage form.
    pub async fn query_raw(&self, sql: impl Into<String>, params: Vec<Value>) -> Result<Vec<Row>, Error> {
        match self
            .execute(Operation::QueryRaw {
                sql: sql.into(),
                params,
            })
            .await?
        {
            OperationResult::Rows(rows) => Ok(rows),
            other => Err(unexpected("queryRaw", &other)),
        }
    }

    /// Run a raw statement, returning the affected row count.
    pub async fn execute_raw(&self, sql: impl Into<String>, params: Vec<Value>) -> Result<u64, Error> {
        match self
            .execute(Operation::ExecuteRaw {
                sql: sql.into(),
                params,
            })
            .await?
        {
            OperationResult::Affected(count) => Ok(count),
            other => Err(unexpected("executeRaw", &other)),
        }
    }

    /// Fail `future` with `DeadlineExceeded` if it does not finish in time.
    ///
    /// The future is dropped on expiry, which interrupts its in-flight
    /// statement and rolls back its connection before reuse.
    pub async fn with_deadline<T, F>(after: Duration, future: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        tokio::time::timeout(after, future)
            .await
            .map_err(|_| Error::DeadlineExceeded { after })?
    }

    async fn execute_once(&self, operation: &Operation) -> Result<OperationResult, Error> {
        let max_wait = self.inner.config.transaction.max_wait;
        let started = Instant::now();
        let mut conn = self.acquire(max_wait).await?;
        if !operation.kind().is_write() {
            return self.dispatch(conn.as_mut(), operation).await;
        }
        begin_within(conn.as_mut(), None, max_wait, started).await?;
        match self.dispatch(conn.as_mut(), operation).await {
            Ok(result) => {
                conn.commit().await?;
                Ok(result)
            }
            Err(err) => {
                rollback_quietly(conn.as_mut()).await;
                Err(err)
            }
        }
    }

    /// Lease a connection, waiting at most `max_wait`.
    pub(crate) async fn acquire(&self, max_wait: Duration) -> Result<Box<dyn Connection>, Error> {
        match tokio::time::timeout(max_wait, self.inner.driver.acquire()).await {
            Ok(conn) => Ok(conn?),
            Err(_) => Err(TransactionError::MaxWaitExceeded { max_wait }.into()),
        }
    }

    /// Lease a connection and open a transaction on it. `max_wait` covers
    /// both the pool and the database write lock.
    pub(crate) async fn begin(
        &self,
        max_wait: Duration,
        isolation: Option<IsolationLevel>,
    ) -> Result<Box<dyn Connection>, Error> {
        let started = Instant::now();
        let mut conn = self.acquire(max_wait).await?;
        begin_within(conn.as_mut(), isolation, max_wait, started).await?;
        Ok(conn)
    }
}

async fn begin_within(
    conn: &mut dyn Connection,
    isolation: Option<IsolationLevel>,
    max_wait: Duration,
    started: Instant,
) -> Result<(), Error> {
    let wait = max_wait.saturating_sub(started.elapsed());
    match conn.begin(isolation, wait).await {
        Ok(()) => Ok(()),
        Err(StorageError::Busy(detail)) => {
            tracing::debug!(%detail, max_wait_ms = max_wait.as_millis() as u64, "write lock not acquired");
            Err(TransactionError::MaxWaitExceeded { max_wait }.into())
        }
        Err(err) => Err(err.into()),
    }
}

#[async_trait]
impl OperationRunner for Engine {
    fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    async fn execute(&self, operation: Operation) -> Result<OperationResult, Error> {
        Engine::execute(self, operation).await
    }
}

/// Roll back, logging instead of failing; the original error wins.
pub(crate) async fn rollback_quietly(conn: &mut dyn Connection) {
    if let Err(err) = conn.rollback().await {
        tracing::warn!(error = %err, "rollback failed");
    }
}
