//! SQL rendering of execution plans.

use ormkit_proto::{NullsOrder, SortOrder, Value};

use super::plan::{ExecutionPlan, OrderKey, PlannedOrder, Window};
use crate::driver::{Dialect, Statement};
use crate::filter::UniqueKey;
use crate::sql::{render_join, render_predicate, SqlWriter};

/// Alias of the planned entity in every read.
pub(crate) const ROOT: &str = "t0";

const CURSOR: &str = "cur";
const CURSOR_SOURCE: &str = "cur0";

/// Maximum parent keys bound into one include query.
pub(crate) const CHILD_CHUNK: usize = 500;

struct OrderTerm {
    expr: String,
    order: SortOrder,
    nulls: Option<NullsOrder>,
}

/// Render the top-level read of `plan`, window included.
///
/// Backward windows are rendered with the ordering reversed; the caller
/// flips the returned rows.
pub fn select_statement(dialect: &dyn Dialect, plan: &ExecutionPlan) -> Statement {
    let mut w = SqlWriter::new(dialect);
    render_select(&mut w, plan);
    w.finish()
}

/// Append the top-level read of `plan` to `w`, e.g. as a subquery.
pub(crate) fn render_select(w: &mut SqlWriter<'_>, plan: &ExecutionPlan) {
    let order: Vec<PlannedOrder> = if plan.window.is_backward() {
        plan.order.iter().map(PlannedOrder::reversed).collect()
    } else {
        plan.order.clone()
    };

    let terms = render_from(w, plan, &order);
    if let Window::Cursor { key, .. } = &plan.window {
        render_cursor_join(w, key, &order);
    }

    w.push(" WHERE (");
    render_predicate(w, &plan.predicate, ROOT);
    w.push(")");
    if matches!(plan.window, Window::Cursor { .. }) {
        w.push(" AND ");
        render_cursor_condition(w, &order);
    }
    render_order(w, &terms);

    let skip = plan.window.skip();
    let clause = w
        .dialect()
        .limit_offset(plan.window.limit(), (skip > 0).then_some(skip));
    w.push(&clause);
}

/// Render the reads of an include level for the given parent keys.
///
/// No window is applied in SQL; rows come back in plan order and are
/// windowed per parent by the executor.
pub fn child_statements(
    dialect: &dyn Dialect,
    plan: &ExecutionPlan,
    remote: &[String],
    parents: &[Vec<Value>],
) -> Vec<Statement> {
    parents
        .chunks(CHILD_CHUNK)
        .map(|chunk| {
            let mut w = SqlWriter::new(dialect);
            let terms = render_from(&mut w, plan, &plan.order);
            w.push(" WHERE (");
            render_predicate(&mut w, &plan.predicate, ROOT);
            w.push(") AND ");
            render_parent_keys(&mut w, remote, chunk);
            render_order(&mut w, &terms);
            w.finish()
        })
        .collect()
}

fn render_from(w: &mut SqlWriter<'_>, plan: &ExecutionPlan, order: &[PlannedOrder]) -> Vec<OrderTerm> {
    w.push("SELECT ");
    w.join(&plan.columns, ", ", |w, column| {
        w.column(ROOT, column).push(" AS ").ident(column);
    });
    w.push(" FROM ").table(&plan.entity, ROOT);

    let mut terms = Vec::with_capacity(order.len());
    for (i, planned) in order.iter().enumerate() {
        let expr = match &planned.key {
            OrderKey::Column(column) => w.qualified(ROOT, column),
            OrderKey::Joined {
                target,
                local,
                remote,
                field,
                ..
            } => {
                let alias = format!("o{i}");
                w.push(" LEFT JOIN ").table(target, &alias).push(" ON ");
                render_join(w, &alias, remote, ROOT, local);
                w.qualified(&alias, field)
            }
            OrderKey::RelationCount {
                target,
                local,
                remote,
                ..
            } => {
                let alias = format!("o{i}");
                w.push(" LEFT JOIN (SELECT ");
                w.join(remote, ", ", |w, column| {
                    w.ident(column);
                });
                w.push(", COUNT(*) AS ").ident("_count");
                w.push(" FROM ").ident(target).push(" GROUP BY ");
                w.join(remote, ", ", |w, column| {
                    w.ident(column);
                });
                w.push(") AS ").ident(&alias).push(" ON ");
                render_join(w, &alias, remote, ROOT, local);
                format!("COALESCE({}, 0)", w.qualified(&alias, "_count"))
            }
        };
        terms.push(OrderTerm {
            expr,
            order: planned.order,
            nulls: planned.nulls,
        });
    }
    terms
}

/// Join the cursor row's ordering values as `cur`. A missing cursor row
/// yields no rows at all.
fn render_cursor_join(w: &mut SqlWriter<'_>, key: &UniqueKey, order: &[PlannedOrder]) {
    w.push(" CROSS JOIN (SELECT ");
    w.join(order.iter().filter_map(order_column), ", ", |w, column| {
        w.column(CURSOR_SOURCE, column).push(" AS ").ident(column);
    });
    w.push(" FROM ").table(&key.entity, CURSOR_SOURCE).push(" WHERE ");
    render_predicate(w, &key.predicate(), CURSOR_SOURCE);
    w.push(") AS ").ident(CURSOR);
}

/// Rows strictly after the cursor in `order`.
fn render_cursor_condition(w: &mut SqlWriter<'_>, order: &[PlannedOrder]) {
    let keys: Vec<(&str, SortOrder)> = order
        .iter()
        .filter_map(|o| order_column(o).map(|c| (c, o.order)))
        .collect();
    w.push("(");
    w.join(0..keys.len(), " OR ", |w, i| {
        w.push("(");
        for (column, _) in &keys[..i] {
            w.column(ROOT, column).push(" = ").column(CURSOR, column).push(" AND ");
        }
        let (column, order) = keys[i];
        let op = match order {
            SortOrder::Asc => " > ",
            SortOrder::Desc => " < ",
        };
        w.column(ROOT, column).push(op).column(CURSOR, column);
        w.push(")");
    });
    w.push(")");
}

fn order_column(order: &PlannedOrder) -> Option<&str> {
    match &order.key {
        OrderKey::Column(column) => Some(column),
        _ => None,
    }
}

fn render_order(w: &mut SqlWriter<'_>, terms: &[OrderTerm]) {
    if terms.is_empty() {
        return;
    }
    w.push(" ORDER BY ");
    w.join(terms, ", ", |w, term| {
        match term.nulls {
            Some(NullsOrder::First) => {
                w.push(&format!("CASE WHEN {} IS NULL THEN 0 ELSE 1 END, ", term.expr));
            }
            Some(NullsOrder::Last) => {
                w.push(&format!("CASE WHEN {} IS NULL THEN 1 ELSE 0 END, ", term.expr));
            }
            None => {}
        }
        w.push(&term.expr);
        w.push(match term.order {
            SortOrder::Asc => " ASC",
            SortOrder::Desc => " DESC",
        });
    });
}

fn render_parent_keys(w: &mut SqlWriter<'_>, remote: &[String], parents: &[Vec<Value>]) {
    if let [column] = remote {
        w.column(ROOT, column).push(" IN (");
        w.join(parents, ", ", |w, key| {
            w.bind(key[0].clone());
        });
        w.push(")");
        return;
    }
    w.push("(");
    w.join(parents, " OR ", |w, key| {
        w.push("(");
        w.join(remote.iter().zip(key), " AND ", |w, (column, value)| {
            w.column(ROOT, column).push(" = ").bind(value.clone());
        });
        w.push(")");
    });
    w.push(")");
}
