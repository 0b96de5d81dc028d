//! Aggregate, count and group-by arguments.

use std::fmt;

use crate::filter::{FieldFilter, Filter};
use crate::query::{OrderBy, SortOrder};

/// Aggregate function types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    /// Count of records, or of non-null values of a field.
    Count,
    /// Sum of numeric values.
    Sum,
    /// Average of numeric values.
    Avg,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
}

impl AggregateFunction {
    /// Key used in argument and result documents (`_count`, `_avg`, ...).
    pub fn key(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "_count",
            AggregateFunction::Sum => "_sum",
            AggregateFunction::Avg => "_avg",
            AggregateFunction::Min => "_min",
            AggregateFunction::Max => "_max",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "_count" => Some(AggregateFunction::Count),
            "_sum" => Some(AggregateFunction::Sum),
            "_avg" => Some(AggregateFunction::Avg),
            "_min" => Some(AggregateFunction::Min),
            "_max" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    /// SQL function name.
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A single aggregation operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Aggregation {
    /// The aggregation function to apply.
    pub function: AggregateFunction,
    /// Field to aggregate (None for COUNT(*)).
    pub field: Option<String>,
}

impl Aggregation {
    /// Create a COUNT(*) aggregation.
    pub fn count() -> Self {
        Self {
            function: AggregateFunction::Count,
            field: None,
        }
    }

    /// Create a COUNT(field) aggregation.
    pub fn count_field(field: impl Into<String>) -> Self {
        Self {
            function: AggregateFunction::Count,
            field: Some(field.into()),
        }
    }

    /// Create a SUM aggregation.
    pub fn sum(field: impl Into<String>) -> Self {
        Self {
            function: AggregateFunction::Sum,
            field: Some(field.into()),
        }
    }

    /// Create an AVG aggregation.
    pub fn avg(field: impl Into<String>) -> Self {
        Self {
            function: AggregateFunction::Avg,
            field: Some(field.into()),
        }
    }

    /// Create a MIN aggregation.
    pub fn min(field: impl Into<String>) -> Self {
        Self {
            function: AggregateFunction::Min,
            field: Some(field.into()),
        }
    }

    /// Create a MAX aggregation.
    pub fn max(field: impl Into<String>) -> Self {
        Self {
            function: AggregateFunction::Max,
            field: Some(field.into()),
        }
    }

    /// Result label, e.g. `_avg.weight` or `_count._all`.
    pub fn label(&self) -> String {
        format!(
            "{}.{}",
            self.function.key(),
            self.field.as_deref().unwrap_or("_all")
        )
    }
}

/// Arguments of `aggregate`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateArgs {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub aggregations: Vec<Aggregation>,
}

impl AggregateArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregations.push(aggregation);
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

    pub fn with_take(mut self, take: u64) -> Self {
        self.take = Some(take);
        self
    }
}

/// Arguments of `count`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CountArgs {
    pub filter: Option<Filter>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl CountArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// A post-aggregation condition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Having {
    pub conditions: Vec<HavingCondition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HavingCondition {
    /// Condition on a grouping field.
    Field { field: String, filter: FieldFilter },
    /// Condition on an aggregate value.
    Aggregate {
        aggregation: Aggregation,
        filter: FieldFilter,
    },
    And(Vec<Having>),
    Or(Vec<Having>),
    Not(Vec<Having>),
}

impl Having {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: impl Into<String>, filter: FieldFilter) -> Self {
        self.conditions.push(HavingCondition::Field {
            field: field.into(),
            filter,
        });
        self
    }

    pub fn aggregate(mut self, aggregation: Aggregation, filter: FieldFilter) -> Self {
        self.conditions.push(HavingCondition::Aggregate {
            aggregation,
            filter,
        });
        self
    }

    pub fn or(mut self, branches: Vec<Having>) -> Self {
        self.conditions.push(HavingCondition::Or(branches));
        self
    }
}

/// Ordering key of a group-by result.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOrderTarget {
    Field(String),
    Aggregate(Aggregation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupOrderBy {
    pub target: GroupOrderTarget,
    pub order: SortOrder,
}

impl GroupOrderBy {
    pub fn field(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            target: GroupOrderTarget::Field(field.into()),
            order,
        }
    }

    pub fn aggregate(aggregation: Aggregation, order: SortOrder) -> Self {
        Self {
            target: GroupOrderTarget::Aggregate(aggregation),
            order,
        }
    }
}

/// Arguments of `groupBy`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupByArgs {
    pub by: Vec<String>,
    pub filter: Option<Filter>,
    pub having: Option<Having>,
    pub aggregations: Vec<Aggregation>,
    pub order_by: Vec<GroupOrderBy>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl GroupByArgs {
    pub fn new<S: Into<String>>(by: impl IntoIterator<Item = S>) -> Self {
        Self {
            by: by.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_having(mut self, having: Having) -> Self {
        self.having = Some(having);
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    pub fn with_order(mut self, order: GroupOrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn with_take(mut self, take: u64) -> Self {
        self.take = Some(take);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_constructors() {
        assert_eq!(Aggregation::count().field, None);
        assert_eq!(Aggregation::avg("weight").function, AggregateFunction::Avg);
        assert_eq!(Aggregation::count().label(), "_count._all");
        assert_eq!(Aggregation::sum("fee").label(), "_sum.fee");
    }

    #[test]
    fn test_function_keys() {
        for f in [
            AggregateFunction::Count,
            AggregateFunction::Sum,
            AggregateFunction::Avg,
            AggregateFunction::Min,
            AggregateFunction::Max,
        ] {
            assert_eq!(AggregateFunction::from_key(f.key()), Some(f));
        }
        assert_eq!(AggregateFunction::from_key("_median"), None);
    }

    #[test]
    fn test_group_by_builder() {
        let args = GroupByArgs::new(["gender", "belt"])
            .with_aggregation(Aggregation::avg("weight"))
            .with_having(Having::new().aggregate(Aggregation::avg("weight"), FieldFilter::gt(60.0)))
            .with_order(GroupOrderBy::field("belt", SortOrder::Asc));
        assert_eq!(args.by, vec!["gender".to_string(), "belt".to_string()]);
        assert_eq!(args.having.map(|h| h.conditions.len()), Some(1));
    }
}
