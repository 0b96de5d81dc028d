//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::driver::IsolationLevel;

/// Default maximum include nesting.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 5;

/// Default number of pooled connections.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default number of attempts for retryable operations.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between retries in milliseconds.
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 20;

/// Default time to wait for a pooled connection in milliseconds.
pub const DEFAULT_MAX_WAIT_MS: u64 = 2_000;

/// Default interactive transaction lifetime in milliseconds.
pub const DEFAULT_TRANSACTION_TIMEOUT_MS: u64 = 5_000;

/// Default SQLite busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Retry policy for transient storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_backoff
            .saturating_mul(1u32 << retry.saturating_sub(1).min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
        }
    }
}

/// Options of an interactive transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Upper bound on waiting for a connection.
    pub max_wait: Duration,
    /// Upper bound on the transaction's lifetime once started.
    pub timeout: Duration,
    /// Isolation level; `None` uses the backend default.
    pub isolation: Option<IsolationLevel>,
}

impl TransactionOptions {
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = Some(isolation);
        self
    }
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MS),
            timeout: Duration::from_millis(DEFAULT_TRANSACTION_TIMEOUT_MS),
            isolation: None,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum include nesting depth.
    pub max_include_depth: usize,
    /// Retry policy for reads and retry-safe writes.
    pub retry: RetryPolicy,
    /// Defaults for interactive transactions.
    pub transaction: TransactionOptions,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_transaction(mut self, options: TransactionOptions) -> Self {
        self.transaction = options;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            retry: RetryPolicy::default(),
            transaction: TransactionOptions::default(),
        }
    }
}

/// SQLite driver configuration.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file; `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// Maximum number of open connections.
    pub pool_size: usize,
    /// How long a statement waits on a locked database.
    pub busy_timeout: Duration,
}

impl SqliteConfig {
    /// A file-backed database.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            pool_size: DEFAULT_POOL_SIZE,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }

    /// An in-memory database. Limited to one connection, since every
    /// connection would otherwise see its own database.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            pool_size: 1,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = if self.path.is_some() { size.max(1) } else { 1 };
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_include_depth, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.transaction.max_wait, Duration::from_secs(2));
        assert_eq!(config.transaction.timeout, Duration::from_secs(5));
        assert!(config.transaction.isolation.is_none());
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(20));
        assert_eq!(policy.backoff(2), Duration::from_millis(40));
        assert_eq!(policy.backoff(3), Duration::from_millis(80));
    }

    #[test]
    fn test_in_memory_pool_is_single() {
        assert_eq!(SqliteConfig::in_memory().with_pool_size(8).pool_size, 1);
        assert_eq!(SqliteConfig::new("db.sqlite").with_pool_size(0).pool_size, 1);
    }
}
