//! Parameterized SQL assembly shared by reads, aggregates and writes.

use ormkit_proto::{AggregateFunction, Aggregation, Value};

use crate::driver::{Dialect, Statement};
use crate::filter::{ComparisonOp, FieldComparison, Operand, PredicateNode, Quantifier, RelationPredicate};

/// Builds one SQL statement, binding values as positional parameters.
pub struct SqlWriter<'d> {
    dialect: &'d dyn Dialect,
    sql: String,
    params: Vec<Value>,
    aliases: usize,
}

impl<'d> SqlWriter<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
            aliases: 0,
        }
    }

    pub fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    /// Append raw SQL text.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a quoted identifier.
    pub fn ident(&mut self, name: &str) -> &mut Self {
        let quoted = self.dialect.quote(name);
        self.sql.push_str(&quoted);
        self
    }

    /// Append `alias.column`, both quoted.
    pub fn column(&mut self, alias: &str, name: &str) -> &mut Self {
        let qualified = self.qualified(alias, name);
        self.sql.push_str(&qualified);
        self
    }

    /// `alias.column` as a string.
    pub fn qualified(&self, alias: &str, name: &str) -> String {
        format!("{}.{}", self.dialect.quote(alias), self.dialect.quote(name))
    }

    /// Append `"table" AS "alias"`.
    pub fn table(&mut self, table: &str, alias: &str) -> &mut Self {
        self.ident(table).push(" AS ").ident(alias)
    }

    /// Bind a value and append its placeholder.
    pub fn bind(&mut self, value: Value) -> &mut Self {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Append items separated by `separator`.
    pub fn join<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        separator: &str,
        mut each: impl FnMut(&mut Self, T),
    ) -> &mut Self {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            each(self, item);
        }
        self
    }

    /// A fresh table alias for subqueries.
    pub fn next_alias(&mut self) -> String {
        self.aliases += 1;
        format!("t{}", self.aliases)
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Render a predicate over the table bound to `alias`.
pub fn render_predicate(w: &mut SqlWriter<'_>, node: &PredicateNode, alias: &str) {
    match node {
        PredicateNode::And(nodes) if nodes.is_empty() => {
            w.push("1=1");
        }
        PredicateNode::Or(nodes) if nodes.is_empty() => {
            w.push("1=0");
        }
        PredicateNode::And(nodes) => render_list(w, nodes, " AND ", alias),
        PredicateNode::Or(nodes) => render_list(w, nodes, " OR ", alias),
        PredicateNode::Not(inner) => {
            w.push("NOT (");
            render_predicate(w, inner, alias);
            w.push(")");
        }
        PredicateNode::Field(cmp) => render_comparison(w, cmp, alias),
        PredicateNode::Relation(rel) => render_relation(w, rel, alias),
    }
}

fn render_list(w: &mut SqlWriter<'_>, nodes: &[PredicateNode], separator: &str, alias: &str) {
    if let [only] = nodes {
        render_predicate(w, only, alias);
        return;
    }
    w.push("(");
    w.join(nodes, separator, |w, node| {
        w.push("(");
        render_predicate(w, node, alias);
        w.push(")");
    });
    w.push(")");
}

/// SQL for an aggregate over the table bound to `alias`.
pub fn aggregate_expr(w: &SqlWriter<'_>, aggregation: &Aggregation, alias: &str) -> String {
    match (&aggregation.function, &aggregation.field) {
        (AggregateFunction::Count, None) => "COUNT(*)".to_string(),
        (function, Some(field)) => format!("{}({})", function.sql_name(), w.qualified(alias, field)),
        (function, None) => format!("{}(*)", function.sql_name()),
    }
}

fn render_comparison(w: &mut SqlWriter<'_>, cmp: &FieldComparison, alias: &str) {
    let operand = match &cmp.operand {
        Operand::Column(name) => w.qualified(alias, name),
        Operand::Aggregate(aggregation) => aggregate_expr(w, aggregation, alias),
    };
    let dialect = w.dialect();
    let lhs = if cmp.insensitive {
        dialect.fold_case(&operand)
    } else {
        operand.clone()
    };

    let bind = |w: &mut SqlWriter<'_>, value: &Value| {
        if cmp.insensitive {
            w.push("LOWER(").bind(value.clone()).push(")");
        } else {
            w.bind(value.clone());
        }
    };

    match &cmp.op {
        ComparisonOp::IsNull => {
            w.push(&operand).push(" IS NULL");
        }
        ComparisonOp::IsNotNull => {
            w.push(&operand).push(" IS NOT NULL");
        }
        ComparisonOp::Equals(value) => {
            w.push(&lhs).push(" = ");
            bind(w, value);
        }
        ComparisonOp::In(values) | ComparisonOp::NotIn(values) if values.is_empty() => {
            w.push(if matches!(cmp.op, ComparisonOp::In(_)) { "1=0" } else { "1=1" });
        }
        ComparisonOp::In(values) | ComparisonOp::NotIn(values) => {
            let keyword = if matches!(cmp.op, ComparisonOp::In(_)) { " IN (" } else { " NOT IN (" };
            w.push(&lhs).push(keyword);
            w.join(values, ", ", |w, value| bind(w, value));
            w.push(")");
        }
        ComparisonOp::Lt(value) => {
            w.push(&lhs).push(" < ");
            bind(w, value);
        }
        ComparisonOp::Lte(value) => {
            w.push(&lhs).push(" <= ");
            bind(w, value);
        }
        ComparisonOp::Gt(value) => {
            w.push(&lhs).push(" > ");
            bind(w, value);
        }
        ComparisonOp::Gte(value) => {
            w.push(&lhs).push(" >= ");
            bind(w, value);
        }
        ComparisonOp::Contains(pattern) => {
            render_like(w, &lhs, format!("%{}%", escape_like(pattern)), cmp.insensitive)
        }
        ComparisonOp::StartsWith(pattern) => {
            render_like(w, &lhs, format!("{}%", escape_like(pattern)), cmp.insensitive)
        }
        ComparisonOp::EndsWith(pattern) => {
            render_like(w, &lhs, format!("%{}", escape_like(pattern)), cmp.insensitive)
        }
    }
}

fn render_like(w: &mut SqlWriter<'_>, lhs: &str, pattern: String, insensitive: bool) {
    w.push(lhs).push(" LIKE ");
    if insensitive {
        w.push("LOWER(").bind(Value::String(pattern)).push(")");
    } else {
        w.bind(Value::String(pattern));
    }
    w.push(" ESCAPE '\\'");
}

/// Escape LIKE wildcards so the pattern matches literally.
pub fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Append `remote = local` join conditions between two aliases.
pub fn render_join(
    w: &mut SqlWriter<'_>,
    remote_alias: &str,
    remote: &[String],
    local_alias: &str,
    local: &[String],
) {
    w.join(remote.iter().zip(local), " AND ", |w, (r, l)| {
        w.column(remote_alias, r).push(" = ").column(local_alias, l);
    });
}

fn render_relation(w: &mut SqlWriter<'_>, rel: &RelationPredicate, alias: &str) {
    let inner = w.next_alias();
    w.push(match rel.quantifier {
        Quantifier::Exists => "EXISTS (",
        Quantifier::NotExists | Quantifier::Every => "NOT EXISTS (",
    });
    w.push("SELECT 1 FROM ").table(&rel.target, &inner).push(" WHERE ");
    render_join(w, &inner, &rel.remote, alias, &rel.local);
    if let Some(predicate) = &rel.predicate {
        match rel.quantifier {
            Quantifier::Every => {
                w.push(" AND NOT (");
                render_predicate(w, predicate, &inner);
                w.push(")");
            }
            _ => {
                w.push(" AND (");
                render_predicate(w, predicate, &inner);
                w.push(")");
            }
        }
    }
    w.push(")");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{PostgresDialect, SqliteDialect};
    use crate::filter::FilterCompiler;
    use crate::test_support::registry;
    use ormkit_proto::{FieldFilter, Filter, RelationFilter};
    use pretty_assertions::assert_eq;

    fn render(entity: &str, filter: &Filter) -> Statement {
        let registry = registry();
        let node = FilterCompiler::new(&registry).compile(entity, filter).unwrap();
        let mut w = SqlWriter::new(&SqliteDialect);
        render_predicate(&mut w, &node, "t0");
        w.finish()
    }

    #[test]
    fn test_empty_lists_render_constants() {
        assert_eq!(render("Athlete", &Filter::new().and(vec![])).sql, "1=1");
        assert_eq!(render("Athlete", &Filter::new().or(vec![])).sql, "1=0");
        assert_eq!(
            render("Athlete", &Filter::new().field("id", FieldFilter::in_values(Vec::<i64>::new()))).sql,
            "1=0"
        );
    }

    #[test]
    fn test_insensitive_contains() {
        let stmt = render(
            "Athlete",
            &Filter::new().field("lastName", FieldFilter::contains("o_n").insensitive()),
        );
        assert_eq!(
            stmt.sql,
            "LOWER(\"t0\".\"lastName\") LIKE LOWER(?1) ESCAPE '\\'"
        );
        assert_eq!(stmt.params, vec![Value::from("%o\\_n%")]);
    }

    #[test]
    fn test_every_renders_not_exists_not() {
        let stmt = render(
            "Club",
            &Filter::new()
                .eq("city", "Oslo")
                .relation("athletes", RelationFilter::every(Filter::new().eq("belt", "BLACK"))),
        );
        assert_eq!(
            stmt.sql,
            "((\"t0\".\"city\" = ?1) AND (NOT EXISTS (SELECT 1 FROM \"Athlete\" AS \"t1\" \
             WHERE \"t1\".\"clubId\" = \"t0\".\"id\" AND NOT (\"t1\".\"belt\" = ?2))))"
        );
        assert_eq!(stmt.params, vec![Value::from("Oslo"), Value::from("BLACK")]);
    }

    #[test]
    fn test_postgres_placeholders() {
        let registry = registry();
        let node = FilterCompiler::new(&registry)
            .compile("Athlete", &Filter::new().field("weight", FieldFilter::gte(60).and(ormkit_proto::FieldOp::Lt(Value::Int(70)))))
            .unwrap();
        let mut w = SqlWriter::new(&PostgresDialect);
        render_predicate(&mut w, &node, "t0");
        assert_eq!(
            w.finish().sql,
            "((\"t0\".\"weight\" >= $1) AND (\"t0\".\"weight\" < $2))"
        );
    }
}
