//! Read arguments: ordering, pagination and selection.

use crate::error::Error;
use crate::filter::{Filter, UniqueWhere};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn reversed(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// Placement of nulls in an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

impl NullsOrder {
    pub fn reversed(self) -> Self {
        match self {
            NullsOrder::First => NullsOrder::Last,
            NullsOrder::Last => NullsOrder::First,
        }
    }
}

/// What an ordering key refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderTarget {
    /// A scalar field of the entity.
    Field(String),
    /// A scalar field of a to-one related entity.
    Relation { relation: String, field: String },
    /// The number of related records of a to-many relation.
    RelationCount(String),
}

/// One ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub target: OrderTarget,
    pub order: SortOrder,
    pub nulls: Option<NullsOrder>,
}

impl OrderBy {
    /// Order by a scalar field ascending.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            target: OrderTarget::Field(field.into()),
            order: SortOrder::Asc,
            nulls: None,
        }
    }

    /// Order by a scalar field descending.
    pub fn desc(field: impl Into<String>) -> Self {
        Self::asc(field).with_order(SortOrder::Desc)
    }

    /// Order by a field of a to-one relation.
    pub fn relation(relation: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            target: OrderTarget::Relation {
                relation: relation.into(),
                field: field.into(),
            },
            order: SortOrder::Asc,
            nulls: None,
        }
    }

    /// Order by the size of a to-many relation.
    pub fn relation_count(relation: impl Into<String>) -> Self {
        Self {
            target: OrderTarget::RelationCount(relation.into()),
            order: SortOrder::Asc,
            nulls: None,
        }
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }
}

/// One entry of a field allow-list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// A scalar field, or a relation included with default arguments.
    Field(String),
    /// A relation included with its own arguments.
    Relation(String, FindArgs),
}

/// Which part of a record to return.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SelectionShape {
    /// Every scalar field, no relations.
    #[default]
    Scalars,
    /// Only the listed fields and relations.
    Fields(Vec<SelectItem>),
    /// Every scalar field plus the listed relations.
    Include(Vec<(String, FindArgs)>),
}

/// A record selection. `omit` removes scalar fields from whatever the shape
/// would otherwise return, including explicitly selected ones.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    pub shape: SelectionShape,
    pub omit: Vec<String>,
}

impl Selection {
    /// Build a selection from optional `select`, `include` and `omit` parts.
    ///
    /// Fails when both `select` and `include` are given.
    pub fn new(
        select: Option<Vec<SelectItem>>,
        include: Option<Vec<(String, FindArgs)>>,
        omit: Vec<String>,
    ) -> Result<Self, Error> {
        let shape = match (select, include) {
            (Some(_), Some(_)) => return Err(Error::SelectAndInclude),
            (Some(items), None) => SelectionShape::Fields(items),
            (None, Some(relations)) => SelectionShape::Include(relations),
            (None, None) => SelectionShape::Scalars,
        };
        Ok(Self { shape, omit })
    }

    /// All scalar fields.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only the named fields.
    pub fn fields<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            shape: SelectionShape::Fields(
                fields.into_iter().map(|f| SelectItem::Field(f.into())).collect(),
            ),
            omit: vec![],
        }
    }

    /// Add a relation. Keeps an allow-list shape if one is in use.
    pub fn with_relation(mut self, relation: impl Into<String>, args: FindArgs) -> Self {
        let relation = relation.into();
        match &mut self.shape {
            SelectionShape::Scalars => {
                self.shape = SelectionShape::Include(vec![(relation, args)]);
            }
            SelectionShape::Include(relations) => relations.push((relation, args)),
            SelectionShape::Fields(items) => items.push(SelectItem::Relation(relation, args)),
        }
        self
    }

    pub fn with_omit<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.omit.extend(fields.into_iter().map(Into::into));
        self
    }
}

/// Arguments of `findMany`/`findFirst`, also used for nested includes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindArgs {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub skip: Option<u64>,
    /// Negative values page backwards from the cursor or the end.
    pub take: Option<i64>,
    pub cursor: Option<UniqueWhere>,
    pub selection: Selection,
}

impl FindArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn with_cursor(mut self, cursor: UniqueWhere) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Include a relation with its own arguments.
    pub fn include(mut self, relation: impl Into<String>, args: FindArgs) -> Self {
        self.selection = self.selection.with_relation(relation, args);
        self
    }

    /// True when any windowing argument is set.
    pub fn has_window(&self) -> bool {
        self.skip.is_some() || self.take.is_some() || self.cursor.is_some()
    }
}

/// Arguments of `findUnique`.
#[derive(Debug, Clone, PartialEq)]
pub struct FindUniqueArgs {
    pub unique: UniqueWhere,
    pub selection: Selection,
}

impl FindUniqueArgs {
    pub fn new(unique: UniqueWhere) -> Self {
        Self {
            unique,
            selection: Selection::default(),
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }
}
