//! Write arguments.

use crate::filter::{Filter, UniqueWhere};
use crate::query::{OrderBy, Selection};
use crate::value::Value;

/// How a single payload entry changes a record.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// Assign a value.
    Set(Value),
    /// Add to a numeric field.
    Increment(Value),
    /// Subtract from a numeric field.
    Decrement(Value),
    /// Multiply a numeric field.
    Multiply(Value),
    /// Divide a numeric field.
    Divide(Value),
    /// Point a to-one relation at an existing record.
    Connect(UniqueWhere),
    /// Clear an optional to-one relation.
    Disconnect,
}

impl DataValue {
    /// Operation name as written in argument documents.
    pub fn name(&self) -> &'static str {
        match self {
            DataValue::Set(_) => "set",
            DataValue::Increment(_) => "increment",
            DataValue::Decrement(_) => "decrement",
            DataValue::Multiply(_) => "multiply",
            DataValue::Divide(_) => "divide",
            DataValue::Connect(_) => "connect",
            DataValue::Disconnect => "disconnect",
        }
    }
}

/// A create or update payload: ordered `(member, change)` entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Data {
    pub entries: Vec<(String, DataValue)>,
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a field.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .push((field.into(), DataValue::Set(value.into())));
        self
    }

    pub fn increment(mut self, field: impl Into<String>, by: impl Into<Value>) -> Self {
        self.entries
            .push((field.into(), DataValue::Increment(by.into())));
        self
    }

    pub fn decrement(mut self, field: impl Into<String>, by: impl Into<Value>) -> Self {
        self.entries
            .push((field.into(), DataValue::Decrement(by.into())));
        self
    }

    pub fn multiply(mut self, field: impl Into<String>, by: impl Into<Value>) -> Self {
        self.entries
            .push((field.into(), DataValue::Multiply(by.into())));
        self
    }

    pub fn divide(mut self, field: impl Into<String>, by: impl Into<Value>) -> Self {
        self.entries
            .push((field.into(), DataValue::Divide(by.into())));
        self
    }

    /// Connect a to-one relation to the record identified by `target`.
    pub fn connect(mut self, relation: impl Into<String>, target: UniqueWhere) -> Self {
        self.entries
            .push((relation.into(), DataValue::Connect(target)));
        self
    }

    pub fn disconnect(mut self, relation: impl Into<String>) -> Self {
        self.entries.push((relation.into(), DataValue::Disconnect));
        self
    }

    pub fn get(&self, member: &str) -> Option<&DataValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, value)| value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Arguments of `create`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateArgs {
    pub data: Data,
    pub selection: Selection,
    /// Allow the transaction coordinator to retry this write.
    pub retry_safe: bool,
}

impl CreateArgs {
    pub fn new(data: Data) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn retry_safe(mut self) -> Self {
        self.retry_safe = true;
        self
    }
}

/// Arguments of `createMany`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateManyArgs {
    pub data: Vec<Data>,
    /// Skip rows that collide with an existing unique key instead of failing.
    pub skip_duplicates: bool,
    pub retry_safe: bool,
}

impl CreateManyArgs {
    pub fn new(data: Vec<Data>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn skip_duplicates(mut self) -> Self {
        self.skip_duplicates = true;
        self
    }
}

/// Arguments of `update`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateArgs {
    pub unique: UniqueWhere,
    pub data: Data,
    pub selection: Selection,
    pub retry_safe: bool,
}

impl UpdateArgs {
    pub fn new(unique: UniqueWhere, data: Data) -> Self {
        Self {
            unique,
            data,
            selection: Selection::default(),
            retry_safe: false,
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn retry_safe(mut self) -> Self {
        self.retry_safe = true;
        self
    }
}

/// Arguments of `updateMany`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateManyArgs {
    pub filter: Option<Filter>,
    pub data: Data,
    /// Upper bound on affected rows; requires `order_by`.
    pub limit: Option<u64>,
    pub order_by: Vec<OrderBy>,
    pub retry_safe: bool,
}

impl UpdateManyArgs {
    pub fn new(data: Data) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }
}

/// Arguments of `upsert`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertArgs {
    pub unique: UniqueWhere,
    pub create: Data,
    pub update: Data,
    pub selection: Selection,
    pub retry_safe: bool,
}

impl UpsertArgs {
    pub fn new(unique: UniqueWhere, create: Data, update: Data) -> Self {
        Self {
            unique,
            create,
            update,
            selection: Selection::default(),
            retry_safe: false,
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn retry_safe(mut self) -> Self {
        self.retry_safe = true;
        self
    }
}

/// Arguments of `delete`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteArgs {
    pub unique: UniqueWhere,
    pub selection: Selection,
    pub retry_safe: bool,
}

impl DeleteArgs {
    pub fn new(unique: UniqueWhere) -> Self {
        Self {
            unique,
            selection: Selection::default(),
            retry_safe: false,
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }
}

/// Arguments of `deleteMany`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteManyArgs {
    pub filter: Option<Filter>,
    /// Upper bound on deleted rows; requires `order_by`.
    pub limit: Option<u64>,
    pub order_by: Vec<OrderBy>,
    pub retry_safe: bool,
}

impl DeleteManyArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }
}
