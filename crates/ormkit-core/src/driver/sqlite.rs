//! SQLite driver backed by rusqlite.
//!
//! Connections are pooled: an idle list guarded by a mutex and a semaphore
//! bounding the number of leased connections. Statements run on the blocking
//! thread pool. Dropping a statement future interrupts the running statement,
//! and a connection returned mid-transaction is rolled back before reuse.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ormkit_proto::{Row, Value};
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{ffi, ErrorCode, InterruptHandle};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{Connection, Dialect, Driver, IsolationLevel, SqliteDialect, Statement};
use crate::config::SqliteConfig;
use crate::error::StorageError;

struct SqliteHandle {
    conn: Mutex<rusqlite::Connection>,
    interrupt: InterruptHandle,
}

struct Pool {
    config: SqliteConfig,
    idle: Mutex<Vec<Arc<SqliteHandle>>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

/// A pooled SQLite driver.
#[derive(Clone)]
pub struct SqliteDriver {
    pool: Arc<Pool>,
    dialect: SqliteDialect,
}

impl SqliteDriver {
    /// Create a driver. Connections are opened lazily.
    pub fn new(config: SqliteConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.pool_size.max(1)));
        Self {
            pool: Arc::new(Pool {
                config,
                idle: Mutex::new(Vec::new()),
                permits,
                closed: AtomicBool::new(false),
            }),
            dialect: SqliteDialect,
        }
    }

    /// Open a file-backed database.
    pub fn open(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(SqliteConfig::new(path))
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(SqliteConfig::in_memory())
    }

    /// Number of connections that can be leased right now.
    pub fn available(&self) -> usize {
        self.pool.permits.available_permits()
    }
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("path", &self.pool.config.path)
            .field("pool_size", &self.pool.config.pool_size)
            .finish()
    }
}

fn open_connection(config: &SqliteConfig) -> Result<rusqlite::Connection, StorageError> {
    let conn = match &config.path {
        Some(path) => rusqlite::Connection::open(path),
        None => rusqlite::Connection::open_in_memory(),
    }
    .map_err(map_error)?;

    conn.busy_timeout(config.busy_timeout).map_err(map_error)?;
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA case_sensitive_like = ON;")
        .map_err(map_error)?;
    if config.path.is_some() {
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(map_error)?;
        tracing::debug!(journal_mode = %mode, "opened sqlite connection");
    }
    Ok(conn)
}

#[async_trait]
impl Driver for SqliteDriver {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn acquire(&self) -> Result<Box<dyn Connection>, StorageError> {
        if self.pool.closed.load(Ordering::Acquire) {
            return Err(StorageError::Disconnected);
        }
        let permit = self
            .pool
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StorageError::Disconnected)?;

        let idle = self.pool.idle.lock().pop();
        let config = self.pool.config.clone();
        let handle = tokio::task::spawn_blocking(move || -> Result<Arc<SqliteHandle>, StorageError> {
            match idle {
                Some(handle) => {
                    {
                        let conn = handle.conn.lock();
                        if !conn.is_autocommit() {
                            tracing::warn!("rolling back transaction left open on pooled connection");
                            conn.execute_batch("ROLLBACK").map_err(map_error)?;
                        }
                    }
                    Ok(handle)
                }
                None => {
                    let conn = open_connection(&config)?;
                    let interrupt = conn.get_interrupt_handle();
                    Ok(Arc::new(SqliteHandle {
                        conn: Mutex::new(conn),
                        interrupt,
                    }))
                }
            }
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))??;

        Ok(Box::new(PooledConnection {
            handle: Some(handle),
            pool: self.pool.clone(),
            _permit: permit,
        }))
    }

    async fn close(&self) {
        self.pool.closed.store(true, Ordering::Release);
        self.pool.permits.close();
        let dropped = {
            let mut idle = self.pool.idle.lock();
            std::mem::take(&mut *idle)
        };
        tracing::debug!(connections = dropped.len(), "sqlite pool closed");
    }
}

/// A leased connection. Returns to the idle list on drop.
struct PooledConnection {
    handle: Option<Arc<SqliteHandle>>,
    pool: Arc<Pool>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !self.pool.closed.load(Ordering::Acquire) {
                self.pool.idle.lock().push(handle);
            }
        }
    }
}

/// Interrupts the connection's running statement unless disarmed.
struct InterruptGuard {
    handle: Option<Arc<SqliteHandle>>,
}

impl InterruptGuard {
    fn disarm(&mut self) {
        self.handle = None;
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!("interrupting cancelled sqlite statement");
            handle.interrupt.interrupt();
        }
    }
}

impl PooledConnection {
    async fn run<T, F>(&self, work: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let handle = self.handle.clone().ok_or(StorageError::Disconnected)?;
        let mut guard = InterruptGuard {
            handle: Some(handle.clone()),
        };
        let result = tokio::task::spawn_blocking(move || {
            let conn = handle.conn.lock();
            work(&conn)
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()));
        guard.disarm();
        result?
    }
}

#[async_trait]
impl Connection for PooledConnection {
    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, StorageError> {
        tracing::debug!(sql = %statement.sql, params = statement.params.len(), "query");
        let statement = statement.clone();
        self.run(move |conn| query_rows(conn, &statement)).await
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, StorageError> {
        tracing::debug!(sql = %statement.sql, params = statement.params.len(), "execute");
        let statement = statement.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare_cached(&statement.sql).map_err(map_error)?;
            let params: Vec<SqlValue> = statement.params.iter().map(to_sql).collect();
            let affected = stmt
                .execute(rusqlite::params_from_iter(params.iter()))
                .map_err(map_error)?;
            Ok(affected as u64)
        })
        .await
    }

    async fn begin(&mut self, isolation: Option<IsolationLevel>, wait: Duration) -> Result<(), StorageError> {
        let sql = SqliteDialect.begin(isolation);
        let busy_timeout = self.pool.config.busy_timeout;
        tracing::debug!(sql = %sql, wait_ms = wait.as_millis() as u64, "begin");
        // BEGIN IMMEDIATE blocks in the busy handler while another
        // connection holds the write lock.
        self.run(move |conn| {
            conn.busy_timeout(wait).map_err(map_error)?;
            let begun = conn.execute_batch(&sql).map_err(map_error);
            conn.busy_timeout(busy_timeout).map_err(map_error)?;
            begun
        })
        .await
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        tracing::debug!("commit");
        self.run(|conn| conn.execute_batch("COMMIT").map_err(map_error))
            .await
    }

    async fn rollback(&mut self) -> Result<(), StorageError> {
        tracing::debug!("rollback");
        self.run(|conn| {
            if conn.is_autocommit() {
                return Ok(());
            }
            conn.execute_batch("ROLLBACK").map_err(map_error)
        })
        .await
    }
}

fn query_rows(conn: &rusqlite::Connection, statement: &Statement) -> Result<Vec<Row>, StorageError> {
    let mut stmt = conn.prepare_cached(&statement.sql).map_err(map_error)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let params: Vec<SqlValue> = statement.params.iter().map(to_sql).collect();
    let mut rows = stmt
        .query(rusqlite::params_from_iter(params.iter()))
        .map_err(map_error)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(map_error)? {
        let mut values = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let value = row.get_ref(i).map_err(map_error)?;
            values.push((name.clone(), from_sql(value)));
        }
        out.push(Row::new(values));
    }
    Ok(out)
}

/// Convert an engine value to its SQLite storage form.
///
/// Booleans are stored as 0/1 and timestamps as microseconds since the
/// Unix epoch; the materializer converts them back using the schema.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::DateTime(dt) => SqlValue::Integer(dt.timestamp_micros()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn map_error(err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let detail = message.clone().unwrap_or_else(|| failure.to_string());
            match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StorageError::Busy(detail),
                ErrorCode::OperationInterrupted => StorageError::Interrupted,
                ErrorCode::ConstraintViolation => match failure.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        StorageError::UniqueViolation(detail)
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => StorageError::ForeignKeyViolation(detail),
                    _ => StorageError::ConstraintViolation(detail),
                },
                _ => StorageError::Backend(detail),
            }
        }
        _ => StorageError::Backend(err.to_string()),
    }
}
