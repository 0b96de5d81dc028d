//! Query planning and execution.
//!
//! Reads go through two stages:
//!
//! 1. [`QueryPlanner`] validates find arguments against the schema and
//!    produces an [`ExecutionPlan`]: compiled predicate, total ordering,
//!    window and the include tree.
//! 2. [`QueryExecutor`] renders the plan to SQL, fetches the root rows and
//!    loads every include level with one query per chunk of parent keys.

mod executor;
mod plan;
mod planner;
mod render;

pub use executor::QueryExecutor;
pub use plan::{ExecutionPlan, IncludePlan, OrderKey, PlannedOrder, Window};
pub use planner::QueryPlanner;
pub use render::{child_statements, select_statement};
pub(crate) use render::{render_select, ROOT};
