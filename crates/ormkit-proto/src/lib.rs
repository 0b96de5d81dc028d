//! ormkit argument and result types.
//!
//! This crate defines the caller-facing shapes of every ormkit operation,
//! independent of any schema or storage backend.
//!
//! # Modules
//!
//! - [`value`] - Runtime value types for filters, payloads and results
//! - [`filter`] - Typed `where` trees and unique-key filters
//! - [`query`] - Read arguments: ordering, pagination and selection
//! - [`mutation`] - Write arguments and payloads
//! - [`aggregate`] - Aggregate, count and group-by arguments
//! - [`result`] - Records, aggregates and raw rows
//! - [`operation`] - Operation envelopes for batches
//! - [`json`] - Parsing of JSON argument documents
//! - [`error`] - Argument construction errors

pub mod aggregate;
pub mod error;
pub mod filter;
pub mod json;
pub mod mutation;
pub mod operation;
pub mod query;
pub mod result;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use aggregate::{
    AggregateArgs, AggregateFunction, Aggregation, CountArgs, GroupByArgs, GroupOrderBy,
    GroupOrderTarget, Having, HavingCondition,
};
pub use filter::{Condition, FieldFilter, FieldOp, Filter, QueryMode, RelationFilter, UniqueWhere};
pub use mutation::{
    CreateArgs, CreateManyArgs, Data, DataValue, DeleteArgs, DeleteManyArgs, UpdateArgs,
    UpdateManyArgs, UpsertArgs,
};
pub use operation::{Operation, OperationKind, OperationResult};
pub use query::{
    FindArgs, FindUniqueArgs, NullsOrder, OrderBy, OrderTarget, SelectItem, Selection,
    SelectionShape, SortOrder,
};
pub use result::{
    AggregateRecord, AggregateValue, BatchCount, EntityRecord, GroupRecord, RelationValue, Row,
};
pub use value::Value;
