//! SQL dialects.

use std::fmt;

use crate::schema::ScalarKind;

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Backend-specific SQL spelling.
pub trait Dialect: fmt::Debug + Send + Sync {
    /// Dialect name, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Quote an identifier.
    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Column type for a scalar kind.
    fn column_type(&self, kind: &ScalarKind) -> &'static str;

    /// Column definition suffix for an autoincrementing single-column key.
    fn autoincrement_key(&self) -> &'static str;

    /// Case-insensitive comparison operand wrapper, e.g. `LOWER(x)`.
    fn fold_case(&self, expr: &str) -> String {
        format!("LOWER({expr})")
    }

    /// `LIMIT`/`OFFSET` clause. Empty when neither is set.
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String;

    /// Whether `level` can be requested for a transaction.
    fn supports_isolation(&self, level: IsolationLevel) -> bool;

    /// Statement opening a transaction.
    fn begin(&self, isolation: Option<IsolationLevel>) -> String;
}

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{index}")
    }

    fn column_type(&self, kind: &ScalarKind) -> &'static str {
        match kind {
            ScalarKind::String | ScalarKind::Enum(_) => "TEXT",
            ScalarKind::Int | ScalarKind::Boolean | ScalarKind::DateTime => "INTEGER",
            ScalarKind::Float => "REAL",
        }
    }

    fn autoincrement_key(&self) -> &'static str {
        "INTEGER PRIMARY KEY AUTOINCREMENT"
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (None, None) => String::new(),
            (Some(limit), None) => format!(" LIMIT {limit}"),
            (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
            (None, Some(offset)) => format!(" LIMIT -1 OFFSET {offset}"),
        }
    }

    fn supports_isolation(&self, level: IsolationLevel) -> bool {
        // SQLite transactions are always serializable.
        level == IsolationLevel::Serializable
    }

    fn begin(&self, _isolation: Option<IsolationLevel>) -> String {
        "BEGIN IMMEDIATE".to_string()
    }
}

/// PostgreSQL dialect. Renders SQL only; no driver ships for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn column_type(&self, kind: &ScalarKind) -> &'static str {
        match kind {
            ScalarKind::String | ScalarKind::Enum(_) => "TEXT",
            ScalarKind::Int | ScalarKind::DateTime => "BIGINT",
            ScalarKind::Boolean => "BOOLEAN",
            ScalarKind::Float => "DOUBLE PRECISION",
        }
    }

    fn autoincrement_key(&self) -> &'static str {
        "BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut clause = String::new();
        if let Some(limit) = limit {
            clause.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = offset {
            clause.push_str(&format!(" OFFSET {offset}"));
        }
        clause
    }

    fn supports_isolation(&self, _level: IsolationLevel) -> bool {
        true
    }

    fn begin(&self, isolation: Option<IsolationLevel>) -> String {
        match isolation {
            Some(level) => format!("BEGIN ISOLATION LEVEL {}", level.as_sql()),
            None => "BEGIN".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_limit_offset() {
        let d = SqliteDialect;
        assert_eq!(d.limit_offset(None, None), "");
        assert_eq!(d.limit_offset(Some(3), None), " LIMIT 3");
        assert_eq!(d.limit_offset(None, Some(2)), " LIMIT -1 OFFSET 2");
    }

    #[test]
    fn test_postgres_spelling() {
        let d = PostgresDialect;
        assert_eq!(d.placeholder(3), "$3");
        assert_eq!(d.limit_offset(None, Some(2)), " OFFSET 2");
        assert_eq!(
            d.begin(Some(IsolationLevel::RepeatableRead)),
            "BEGIN ISOLATION LEVEL REPEATABLE READ"
        );
        assert_eq!(d.column_type(&ScalarKind::Boolean), "BOOLEAN");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(SqliteDialect.quote("we\"ird"), "\"we\"\"ird\"");
        assert!(!SqliteDialect.supports_isolation(IsolationLevel::ReadCommitted));
    }
}
