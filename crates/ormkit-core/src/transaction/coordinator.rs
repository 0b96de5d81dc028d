//! Batches and interactive transactions.

use std::future::Future;

use ormkit_proto::{Operation, OperationResult};

use super::client::TransactionClient;
use super::retry::with_retry;
use crate::config::TransactionOptions;
use crate::engine::{rollback_quietly, Engine};
use crate::error::{Error, TransactionError};

impl Engine {
    /// Run `operations` in order inside one transaction.
    ///
    /// Either every operation commits or none does. Batches made only of
    /// retry-safe operations are retried as a whole on transient failures.
    pub async fn run_batch(&self, operations: Vec<Operation>) -> Result<Vec<OperationResult>, Error> {
        let retry_safe = operations.iter().all(Operation::is_retry_safe);
        let operations = operations.as_slice();
        with_retry(&self.config().retry, retry_safe, || async move {
            self.run_batch_once(operations).await
        })
        .await
    }

    async fn run_batch_once(&self, operations: &[Operation]) -> Result<Vec<OperationResult>, Error> {
        let mut conn = self.begin(self.config().transaction.max_wait, None).await?;
        let mut results = Vec::with_capacity(operations.len());
        for operation in operations {
            match self.dispatch(conn.as_mut(), operation).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    tracing::debug!(
                        completed = results.len(),
                        operations = operations.len(),
                        "batch failed, rolling back"
                    );
                    rollback_quietly(conn.as_mut()).await;
                    return Err(err);
                }
            }
        }
        conn.commit().await?;
        tracing::debug!(operations = operations.len(), "batch committed");
        Ok(results)
    }

    /// Run `body` inside an interactive transaction.
    ///
    /// `max_wait` bounds the wait for a connection and for the database
    /// write lock; `timeout` bounds the transaction once started. The transaction commits when `body`
    /// returns `Ok` and rolls back otherwise; the client is closed either
    /// way.
    ///
    /// ```ignore
    /// let moved = engine
    ///     .run_interactive(TransactionOptions::default(), |tx| async move {
    ///         let athletes = tx.entity("Athlete")?;
    ///         athletes.update(UpdateArgs::new(UniqueWhere::by("id", 1), data)).await
    ///     })
    ///     .await?;
    /// ```
    pub async fn run_interactive<T, F, Fut>(&self, options: TransactionOptions, body: F) -> Result<T, Error>
    where
        F: FnOnce(TransactionClient) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let dialect = self.dialect();
        if let Some(level) = options.isolation {
            if !dialect.supports_isolation(level) {
                return Err(TransactionError::UnsupportedIsolation {
                    level: level.to_string(),
                    dialect: dialect.name(),
                }
                .into());
            }
        }

        let conn = self.begin(options.max_wait, options.isolation).await?;
        tracing::debug!(
            timeout_ms = options.timeout.as_millis() as u64,
            isolation = ?options.isolation,
            "interactive transaction started"
        );

        let client = TransactionClient::new(self.clone(), conn);
        let outcome = tokio::time::timeout(options.timeout, body(client.clone())).await;
        let mut conn = client.close().await.ok_or(TransactionError::Closed)?;

        match outcome {
            Ok(Ok(value)) => {
                conn.commit().await?;
                tracing::debug!("interactive transaction committed");
                Ok(value)
            }
            Ok(Err(err)) => {
                rollback_quietly(conn.as_mut()).await;
                tracing::debug!(error = %err, "interactive transaction rolled back");
                Err(err)
            }
            Err(_) => {
                rollback_quietly(conn.as_mut()).await;
                tracing::warn!(
                    timeout_ms = options.timeout.as_millis() as u64,
                    "interactive transaction timed out"
                );
                Err(TransactionError::TimeoutExceeded {
                    timeout: options.timeout,
                }
                .into())
            }
        }
    }
}
