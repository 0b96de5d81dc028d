//! Core error types.

use std::time::Duration;

use ormkit_proto::OperationKind;
use thiserror::Error;

/// Schema registry load errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema source is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate entity '{entity}'")]
    DuplicateEntity { entity: String },

    #[error("duplicate enum '{name}'")]
    DuplicateEnum { name: String },

    #[error("enum '{name}' declares no variants")]
    EmptyEnum { name: String },

    #[error("entity '{entity}': duplicate member '{name}'")]
    DuplicateMember { entity: String, name: String },

    #[error("entity '{entity}': missing primary key")]
    MissingPrimaryKey { entity: String },

    #[error("entity '{entity}': primary key field '{field}' must not be nullable")]
    NullablePrimaryKey { entity: String, field: String },

    #[error("entity '{entity}': unknown field '{field}' in {context}")]
    UnknownField {
        entity: String,
        field: String,
        context: String,
    },

    #[error("entity '{entity}' field '{field}': undeclared enum '{name}'")]
    UnknownEnum {
        entity: String,
        field: String,
        name: String,
    },

    #[error("entity '{entity}' field '{field}': invalid default: {reason}")]
    InvalidDefault {
        entity: String,
        field: String,
        reason: String,
    },

    #[error("relation '{entity}.{relation}': unknown target entity '{target}'")]
    UnknownTarget {
        entity: String,
        relation: String,
        target: String,
    },

    #[error("relation '{entity}.{relation}': {reason}")]
    InvalidRelation {
        entity: String,
        relation: String,
        reason: String,
    },

    #[error("relation '{entity}.{relation}' has no inverse and is not marked one-directional")]
    MissingInverse { entity: String, relation: String },

    #[error("relation '{entity}.{relation}': exactly one side must declare the foreign key")]
    AmbiguousForeignKey { entity: String, relation: String },

    #[error("relation '{entity}.{relation}': on_delete must be declared on the foreign-key side")]
    MissingDeletePolicy { entity: String, relation: String },

    #[error("relation '{entity}.{relation}': on_delete declared on the side without the foreign key")]
    MisplacedDeletePolicy { entity: String, relation: String },

    #[error("relation '{entity}.{relation}': set_null requires nullable foreign key field '{field}'")]
    InvalidDeletePolicy {
        entity: String,
        relation: String,
        field: String,
    },
}

/// Filter compilation errors.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("unknown entity '{entity}'")]
    UnknownEntity { entity: String },

    #[error("entity '{entity}' has no field '{field}'")]
    UnknownField { entity: String, field: String },

    #[error("operator '{operator}' is not valid for '{entity}.{field}' of kind {kind}")]
    InvalidOperator {
        entity: String,
        field: String,
        operator: String,
        kind: String,
    },

    #[error("invalid value for '{entity}.{field}': {message}")]
    InvalidValue {
        entity: String,
        field: String,
        message: String,
    },

    #[error("'{entity}' unique filter on [{}] does not match a unique key{}", .supplied.join(", "), closest_hint(.closest))]
    IncompleteKey {
        entity: String,
        supplied: Vec<String>,
        closest: Vec<String>,
    },
}

fn closest_hint(closest: &[String]) -> String {
    if closest.is_empty() {
        String::new()
    } else {
        format!(" (expected all of [{}])", closest.join(", "))
    }
}

/// Query planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("entity '{entity}' has no relation '{relation}'")]
    UnknownRelation { entity: String, relation: String },

    #[error("cyclic include: {path}")]
    CyclicInclude { path: String },

    #[error("include depth {depth} exceeds the maximum of {max}")]
    DepthExceeded { depth: usize, max: usize },

    #[error("take must not be 0 when a cursor is given")]
    InvalidTake,

    #[error("cursor pagination cannot order by '{key}': {reason}")]
    UnsupportedCursorOrder { key: String, reason: String },

    #[error("cannot order '{entity}' by '{target}': {reason}")]
    InvalidOrder {
        entity: String,
        target: String,
        reason: String,
    },

    #[error("relation '{relation}' is to-one; it cannot be ordered or paginated")]
    ToOneWindow { relation: String },
}

/// Aggregation and group-by errors.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("\"by\" must not be empty")]
    EmptyBy,

    #[error("no '{entity}' record found")]
    NotFound { entity: String },

    #[error("{clause} references '{field}', which is not in \"by\"")]
    UngroupedField { clause: &'static str, field: String },

    #[error("{function} is not valid for '{entity}.{field}' of kind {kind}")]
    InvalidAggregate {
        entity: String,
        field: String,
        function: String,
        kind: String,
    },
}

/// Write validation and execution errors.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("'{entity}': missing required field '{field}'")]
    MissingField { entity: String, field: String },

    #[error("'{entity}': invalid write to '{member}': {reason}")]
    InvalidWrite {
        entity: String,
        member: String,
        reason: String,
    },

    #[error("cannot delete '{entity}': {count} related record(s) in '{relation}' ({dependent}) restrict deletion")]
    RestrictedRelation {
        entity: String,
        relation: String,
        dependent: String,
        count: u64,
    },

    #[error("'{entity}': record to {action} not found")]
    RecordNotFound { entity: String, action: &'static str },

    #[error("'{entity}': connect target for '{relation}' not found")]
    ConnectTargetNotFound { entity: String, relation: String },

    #[error("'{entity}': unique constraint violated ({detail})")]
    UniqueViolation { entity: String, detail: String },

    #[error("'{entity}': limit requires an explicit orderBy")]
    LimitWithoutOrder { entity: String },

    #[error("cascade depth exceeded at '{entity}'")]
    CascadeDepthExceeded { entity: String },
}

/// Storage backend errors.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("database is busy: {0}")]
    Busy(String),

    #[error("deadlock detected: {0}")]
    Deadlock(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("statement interrupted")]
    Interrupted,

    #[error("engine is disconnected")]
    Disconnected,

    #[error("cannot decode '{column}': {message}")]
    Decode { column: String, message: String },

    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether retrying the same statement may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Busy(_) | StorageError::Deadlock(_) | StorageError::ConnectionLost(_)
        )
    }
}

/// Transaction lifecycle errors.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("could not start a transaction within {max_wait:?}")]
    MaxWaitExceeded { max_wait: Duration },

    #[error("transaction exceeded its timeout of {timeout:?} and was rolled back")]
    TimeoutExceeded { timeout: Duration },

    #[error("isolation level {level} is not supported by {dialect}")]
    UnsupportedIsolation {
        level: String,
        dialect: &'static str,
    },

    #[error("transaction is already closed")]
    Closed,
}

/// Core engine errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("invalid arguments: {0}")]
    Arguments(#[from] ormkit_proto::Error),

    #[error("operation did not finish within {after:?}")]
    DeadlineExceeded { after: Duration },

    /// An error annotated with the operation and entity that raised it.
    #[error("{operation} on '{entity}' failed: {source}")]
    Operation {
        operation: OperationKind,
        entity: String,
        source: Box<Error>,
    },
}

impl Error {
    /// Attach operation context. Already-annotated errors are left alone.
    pub fn in_operation(self, operation: OperationKind, entity: &str) -> Self {
        match self {
            Error::Operation { .. } => self,
            other => Error::Operation {
                operation,
                entity: entity.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The error with any operation context stripped.
    pub fn root(&self) -> &Error {
        match self {
            Error::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the failure is a transient storage condition.
    pub fn is_transient(&self) -> bool {
        matches!(self.root(), Error::Storage(e) if e.is_transient())
    }
}
