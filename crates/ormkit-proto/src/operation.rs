//! Operation envelopes used by batches and the command line.

use std::fmt;
use std::str::FromStr;

use serde_json::Value as Json;

use crate::aggregate::{AggregateArgs, CountArgs, GroupByArgs};
use crate::error::Error;
use crate::mutation::{
    CreateArgs, CreateManyArgs, DeleteArgs, DeleteManyArgs, UpdateArgs, UpdateManyArgs,
    UpsertArgs,
};
use crate::query::{FindArgs, FindUniqueArgs};
use crate::result::{AggregateRecord, BatchCount, EntityRecord, GroupRecord, Row};
use crate::value::Value;

/// Operation names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    FindUnique,
    FindFirst,
    FindMany,
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,
    Aggregate,
    GroupBy,
    Count,
    QueryRaw,
    ExecuteRaw,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::FindUnique => "findUnique",
            OperationKind::FindFirst => "findFirst",
            OperationKind::FindMany => "findMany",
            OperationKind::Create => "create",
            OperationKind::CreateMany => "createMany",
            OperationKind::Update => "update",
            OperationKind::UpdateMany => "updateMany",
            OperationKind::Upsert => "upsert",
            OperationKind::Delete => "delete",
            OperationKind::DeleteMany => "deleteMany",
            OperationKind::Aggregate => "aggregate",
            OperationKind::GroupBy => "groupBy",
            OperationKind::Count => "count",
            OperationKind::QueryRaw => "queryRaw",
            OperationKind::ExecuteRaw => "executeRaw",
        }
    }

    /// Whether the operation writes.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            OperationKind::Create
                | OperationKind::CreateMany
                | OperationKind::Update
                | OperationKind::UpdateMany
                | OperationKind::Upsert
                | OperationKind::Delete
                | OperationKind::DeleteMany
                | OperationKind::ExecuteRaw
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "findUnique" => OperationKind::FindUnique,
            "findFirst" => OperationKind::FindFirst,
            "findMany" => OperationKind::FindMany,
            "create" => OperationKind::Create,
            "createMany" => OperationKind::CreateMany,
            "update" => OperationKind::Update,
            "updateMany" => OperationKind::UpdateMany,
            "upsert" => OperationKind::Upsert,
            "delete" => OperationKind::Delete,
            "deleteMany" => OperationKind::DeleteMany,
            "aggregate" => OperationKind::Aggregate,
            "groupBy" => OperationKind::GroupBy,
            "count" => OperationKind::Count,
            "queryRaw" => OperationKind::QueryRaw,
            "executeRaw" => OperationKind::ExecuteRaw,
            other => return Err(Error::UnknownOperation(other.to_string())),
        };
        Ok(kind)
    }
}

/// A fully described operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    FindUnique { entity: String, args: FindUniqueArgs },
    FindFirst { entity: String, args: FindArgs },
    FindMany { entity: String, args: FindArgs },
    Create { entity: String, args: CreateArgs },
    CreateMany { entity: String, args: CreateManyArgs },
    Update { entity: String, args: UpdateArgs },
    UpdateMany { entity: String, args: UpdateManyArgs },
    Upsert { entity: String, args: UpsertArgs },
    Delete { entity: String, args: DeleteArgs },
    DeleteMany { entity: String, args: DeleteManyArgs },
    Aggregate { entity: String, args: AggregateArgs },
    GroupBy { entity: String, args: GroupByArgs },
    Count { entity: String, args: CountArgs },
    QueryRaw { sql: String, params: Vec<Value> },
    ExecuteRaw { sql: String, params: Vec<Value> },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::FindUnique { .. } => OperationKind::FindUnique,
            Operation::FindFirst { .. } => OperationKind::FindFirst,
            Operation::FindMany { .. } => OperationKind::FindMany,
            Operation::Create { .. } => OperationKind::Create,
            Operation::CreateMany { .. } => OperationKind::CreateMany,
            Operation::Update { .. } => OperationKind::Update,
            Operation::UpdateMany { .. } => OperationKind::UpdateMany,
            Operation::Upsert { .. } => OperationKind::Upsert,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::DeleteMany { .. } => OperationKind::DeleteMany,
            Operation::Aggregate { .. } => OperationKind::Aggregate,
            Operation::GroupBy { .. } => OperationKind::GroupBy,
            Operation::Count { .. } => OperationKind::Count,
            Operation::QueryRaw { .. } => OperationKind::QueryRaw,
            Operation::ExecuteRaw { .. } => OperationKind::ExecuteRaw,
        }
    }

    /// Entity the operation targets; raw operations have none.
    pub fn entity(&self) -> Option<&str> {
        match self {
            Operation::FindUnique { entity, .. }
            | Operation::FindFirst { entity, .. }
            | Operation::FindMany { entity, .. }
            | Operation::Create { entity, .. }
            | Operation::CreateMany { entity, .. }
            | Operation::Update { entity, .. }
            | Operation::UpdateMany { entity, .. }
            | Operation::Upsert { entity, .. }
            | Operation::Delete { entity, .. }
            | Operation::DeleteMany { entity, .. }
            | Operation::Aggregate { entity, .. }
            | Operation::GroupBy { entity, .. }
            | Operation::Count { entity, .. } => Some(entity),
            Operation::QueryRaw { .. } | Operation::ExecuteRaw { .. } => None,
        }
    }

    /// Whether the coordinator may re-run this operation after a transient
    /// failure. Reads always qualify; writes only when flagged.
    pub fn is_retry_safe(&self) -> bool {
        match self {
            Operation::FindUnique { .. }
            | Operation::FindFirst { .. }
            | Operation::FindMany { .. }
            | Operation::Aggregate { .. }
            | Operation::GroupBy { .. }
            | Operation::Count { .. } => true,
            Operation::Create { args, .. } => args.retry_safe,
            Operation::CreateMany { args, .. } => args.retry_safe,
            Operation::Update { args, .. } => args.retry_safe,
            Operation::UpdateMany { args, .. } => args.retry_safe,
            Operation::Upsert { args, .. } => args.retry_safe,
            Operation::Delete { args, .. } => args.retry_safe,
            Operation::DeleteMany { args, .. } => args.retry_safe,
            Operation::QueryRaw { .. } | Operation::ExecuteRaw { .. } => false,
        }
    }
}

/// Result of an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    /// `findUnique`/`findFirst`.
    Record(Option<EntityRecord>),
    /// `findMany`.
    Records(Vec<EntityRecord>),
    /// `create`/`update`/`upsert`/`delete`.
    Written(EntityRecord),
    /// `createMany`/`updateMany`/`deleteMany`.
    Batch(BatchCount),
    Aggregate(AggregateRecord),
    Groups(Vec<GroupRecord>),
    Count(u64),
    /// `queryRaw`.
    Rows(Vec<Row>),
    /// `executeRaw`.
    Affected(u64),
}

impl OperationResult {
    pub fn to_json(&self) -> Json {
        match self {
            OperationResult::Record(None) => Json::Null,
            OperationResult::Record(Some(record)) | OperationResult::Written(record) => {
                record.to_json()
            }
            OperationResult::Records(records) => {
                Json::Array(records.iter().map(EntityRecord::to_json).collect())
            }
            OperationResult::Batch(batch) => serde_json::json!({ "count": batch.count }),
            OperationResult::Aggregate(record) => record.to_json(),
            OperationResult::Groups(groups) => {
                Json::Array(groups.iter().map(GroupRecord::to_json).collect())
            }
            OperationResult::Count(count) => Json::from(*count),
            OperationResult::Rows(rows) => Json::Array(rows.iter().map(Row::to_json).collect()),
            OperationResult::Affected(count) => Json::from(*count),
        }
    }
}
