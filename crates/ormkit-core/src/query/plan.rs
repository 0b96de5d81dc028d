//! Execution plan types.

use ormkit_proto::{NullsOrder, SortOrder};

use crate::filter::{PredicateNode, UniqueKey};

/// What an ordering key sorts on.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderKey {
    /// A column of the planned entity.
    Column(String),
    /// A column of a to-one related entity, reached with a left join.
    Joined {
        relation: String,
        target: String,
        local: Vec<String>,
        remote: Vec<String>,
        field: String,
    },
    /// The number of related records of a to-many relation.
    RelationCount {
        relation: String,
        target: String,
        local: Vec<String>,
        remote: Vec<String>,
    },
}

impl OrderKey {
    /// Human-readable name used in errors.
    pub fn label(&self) -> String {
        match self {
            OrderKey::Column(name) => name.clone(),
            OrderKey::Joined {
                relation, field, ..
            } => format!("{relation}.{field}"),
            OrderKey::RelationCount { relation, .. } => format!("{relation}._count"),
        }
    }
}

/// One resolved ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOrder {
    pub key: OrderKey,
    pub order: SortOrder,
    pub nulls: Option<NullsOrder>,
}

impl PlannedOrder {
    pub fn reversed(&self) -> Self {
        Self {
            key: self.key.clone(),
            order: self.order.reversed(),
            nulls: self.nulls.map(NullsOrder::reversed),
        }
    }
}

/// Which slice of the ordered rows to return.
#[derive(Debug, Clone, PartialEq)]
pub enum Window {
    /// Positional window. A negative `take` returns the last rows.
    Offset { skip: u64, take: Option<i64> },
    /// Rows after (positive `take`) or before (negative `take`) the cursor
    /// row, which itself is excluded.
    Cursor {
        key: UniqueKey,
        skip: u64,
        take: Option<i64>,
    },
}

impl Window {
    /// No windowing.
    pub fn all() -> Self {
        Window::Offset { skip: 0, take: None }
    }

    /// Whether rows are fetched in reverse order and flipped afterwards.
    pub fn is_backward(&self) -> bool {
        match self {
            Window::Offset { take, .. } | Window::Cursor { take, .. } => {
                matches!(take, Some(t) if *t < 0)
            }
        }
    }

    pub fn skip(&self) -> u64 {
        match self {
            Window::Offset { skip, .. } | Window::Cursor { skip, .. } => *skip,
        }
    }

    /// Absolute row limit.
    pub fn limit(&self) -> Option<u64> {
        match self {
            Window::Offset { take, .. } | Window::Cursor { take, .. } => {
                take.map(|t| t.unsigned_abs())
            }
        }
    }
}

/// A nested include, fetched per level and windowed per parent.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludePlan {
    pub relation: String,
    pub to_many: bool,
    /// Join columns on the parent.
    pub local: Vec<String>,
    /// Matching join columns on the included entity.
    pub remote: Vec<String>,
    pub plan: ExecutionPlan,
}

/// A validated read plan for one entity level.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub entity: String,
    /// Columns fetched: the output fields plus join and cursor helpers,
    /// in declaration order.
    pub columns: Vec<String>,
    /// Scalar fields returned to the caller, in declaration order.
    pub output: Vec<String>,
    pub predicate: PredicateNode,
    /// Ordering keys, ending with the primary key.
    pub order: Vec<PlannedOrder>,
    pub window: Window,
    pub includes: Vec<IncludePlan>,
}

impl ExecutionPlan {
    /// Include depth below this level.
    pub fn depth(&self) -> usize {
        self.includes
            .iter()
            .map(|include| include.plan.depth() + 1)
            .max()
            .unwrap_or(0)
    }
}
