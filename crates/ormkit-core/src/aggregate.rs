//! Aggregation engine: `aggregate`, `count` and `groupBy`.
//!
//! Aggregates reuse the filter compiler and the query planner, so the
//! same `where`, ordering and window rules apply as for reads. Windowed
//! aggregates run over a subquery holding the selected rows.

use ormkit_proto::{
    AggregateArgs, AggregateFunction, AggregateRecord, AggregateValue, Aggregation, CountArgs,
    FindArgs, GroupByArgs, GroupOrderTarget, GroupRecord, Having, HavingCondition, Row, SortOrder,
    Value,
};

use crate::driver::{Connection, Dialect};
use crate::error::{Error, FilterError, QueryError};
use crate::filter::{FilterCompiler, Operand, PredicateNode, Target};
use crate::materialize::decode_value;
use crate::query::{render_select, QueryPlanner, ROOT};
use crate::schema::{EntityDefinition, FieldDefinition, ScalarKind, SchemaRegistry};
use crate::sql::{aggregate_expr, render_predicate, SqlWriter};

const SUBQUERY: &str = "s";

/// Computes aggregates on a leased connection.
pub struct AggregateExecutor<'a> {
    registry: &'a SchemaRegistry,
    dialect: &'a dyn Dialect,
    max_depth: usize,
}

impl<'a> AggregateExecutor<'a> {
    pub fn new(registry: &'a SchemaRegistry, dialect: &'a dyn Dialect, max_depth: usize) -> Self {
        Self {
            registry,
            dialect,
            max_depth,
        }
    }

    /// Compute `args.aggregations` over the selected rows of `entity`.
    pub async fn aggregate(
        &self,
        conn: &mut dyn Connection,
        entity: &str,
        args: &AggregateArgs,
    ) -> Result<AggregateRecord, Error> {
        let def = self.registry.require(entity)?;
        let fields = args
            .aggregations
            .iter()
            .map(|aggregation| check_aggregation(def, aggregation))
            .collect::<Result<Vec<_>, _>>()?;

        let find = FindArgs {
            filter: args.filter.clone(),
            order_by: args.order_by.clone(),
            skip: args.skip,
            take: args.take.map(|t| i64::try_from(t).unwrap_or(i64::MAX)),
            ..FindArgs::default()
        };
        let plan = QueryPlanner::new(self.registry, self.max_depth).plan(entity, &find)?;

        let mut w = SqlWriter::new(self.dialect);
        w.push("SELECT ");
        if args.aggregations.is_empty() {
            w.push("1");
        }
        w.join(args.aggregations.iter().enumerate(), ", ", |w, (i, aggregation)| {
            let expr = aggregate_expr(w, aggregation, SUBQUERY);
            w.push(&expr).push(" AS ").ident(&format!("a{i}"));
        });
        w.push(" FROM (");
        render_select(&mut w, &plan);
        w.push(") AS ").ident(SUBQUERY);
        let statement = w.finish();

        let mut rows = conn.query(&statement).await?;
        let mut row = rows.pop().unwrap_or_default();
        let mut values = Vec::with_capacity(args.aggregations.len());
        for (i, (aggregation, field)) in args.aggregations.iter().zip(fields).enumerate() {
            let value = decode_aggregate(&mut row, &format!("a{i}"), aggregation, field)?;
            values.push(AggregateValue::new(aggregation.clone(), value));
        }
        tracing::debug!(entity = %def.name, aggregates = values.len(), "computed aggregates");
        Ok(AggregateRecord { values })
    }

    /// Count the selected rows of `entity`.
    pub async fn count(
        &self,
        conn: &mut dyn Connection,
        entity: &str,
        args: &CountArgs,
    ) -> Result<u64, Error> {
        let aggregate = AggregateArgs {
            filter: args.filter.clone(),
            skip: args.skip,
            take: args.take,
            aggregations: vec![Aggregation::count()],
            ..AggregateArgs::default()
        };
        let record = self.aggregate(conn, entity, &aggregate).await?;
        let count = record
            .get(AggregateFunction::Count, None)
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Group the filtered rows of `entity` by `args.by`.
    pub async fn group_by(
        &self,
        conn: &mut dyn Connection,
        entity: &str,
        args: &GroupByArgs,
    ) -> Result<Vec<GroupRecord>, Error> {
        let def = self.registry.require(entity)?;
        if args.by.is_empty() {
            return Err(QueryError::EmptyBy.into());
        }
        let by = args
            .by
            .iter()
            .map(|name| {
                def.field(name).ok_or_else(|| FilterError::UnknownField {
                    entity: def.name.clone(),
                    field: name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let fields = args
            .aggregations
            .iter()
            .map(|aggregation| check_aggregation(def, aggregation))
            .collect::<Result<Vec<_>, _>>()?;

        let compiler = FilterCompiler::new(self.registry);
        let predicate = compiler.compile_optional(&def.name, args.filter.as_ref())?;
        let having = match &args.having {
            Some(having) => Some(self.compile_having(&compiler, def, &args.by, having)?),
            None => None,
        };

        let mut order = Vec::with_capacity(args.order_by.len().max(by.len()));
        for entry in &args.order_by {
            match &entry.target {
                GroupOrderTarget::Field(field) => {
                    if !args.by.contains(field) {
                        return Err(QueryError::UngroupedField {
                            clause: "orderBy",
                            field: field.clone(),
                        }
                        .into());
                    }
                    order.push((Operand::Column(field.clone()), entry.order));
                }
                GroupOrderTarget::Aggregate(aggregation) => {
                    check_aggregation(def, aggregation)?;
                    order.push((Operand::Aggregate(aggregation.clone()), entry.order));
                }
            }
        }
        if order.is_empty() {
            order.extend(
                args.by
                    .iter()
                    .map(|field| (Operand::Column(field.clone()), SortOrder::Asc)),
            );
        }

        let mut w = SqlWriter::new(self.dialect);
        w.push("SELECT ");
        w.join(args.by.iter().enumerate(), ", ", |w, (i, field)| {
            w.column(ROOT, field).push(" AS ").ident(&format!("g{i}"));
        });
        for (i, aggregation) in args.aggregations.iter().enumerate() {
            let expr = aggregate_expr(&w, aggregation, ROOT);
            w.push(", ").push(&expr).push(" AS ").ident(&format!("a{i}"));
        }
        w.push(" FROM ").table(&def.name, ROOT).push(" WHERE (");
        render_predicate(&mut w, &predicate, ROOT);
        w.push(") GROUP BY ");
        w.join(&args.by, ", ", |w, field| {
            w.column(ROOT, field);
        });
        if let Some(having) = &having {
            w.push(" HAVING (");
            render_predicate(&mut w, having, ROOT);
            w.push(")");
        }
        w.push(" ORDER BY ");
        w.join(&order, ", ", |w, (operand, direction)| {
            let expr = match operand {
                Operand::Column(field) => w.qualified(ROOT, field),
                Operand::Aggregate(aggregation) => aggregate_expr(w, aggregation, ROOT),
            };
            w.push(&expr).push(match direction {
                SortOrder::Asc => " ASC",
                SortOrder::Desc => " DESC",
            });
        });
        let clause = self.dialect.limit_offset(args.take, args.skip.filter(|s| *s > 0));
        w.push(&clause);
        let statement = w.finish();

        let rows = conn.query(&statement).await?;
        let mut groups = Vec::with_capacity(rows.len());
        for mut row in rows {
            let mut keys = Vec::with_capacity(by.len());
            for (i, field) in by.iter().enumerate() {
                let column = format!("g{i}");
                let raw = row.take(&column).unwrap_or(Value::Null);
                keys.push((field.name.clone(), decode_value(&field.kind, raw, &field.name)?));
            }
            let mut aggregates = Vec::with_capacity(args.aggregations.len());
            for (i, (aggregation, field)) in args.aggregations.iter().zip(&fields).enumerate() {
                let value = decode_aggregate(&mut row, &format!("a{i}"), aggregation, *field)?;
                aggregates.push(AggregateValue::new(aggregation.clone(), value));
            }
            groups.push(GroupRecord { keys, aggregates });
        }
        tracing::debug!(entity = %def.name, groups = groups.len(), "grouped rows");
        Ok(groups)
    }

    fn compile_having(
        &self,
        compiler: &FilterCompiler<'_>,
        entity: &EntityDefinition,
        by: &[String],
        having: &Having,
    ) -> Result<PredicateNode, Error> {
        let mut nodes = Vec::with_capacity(having.conditions.len());
        for condition in &having.conditions {
            let node = match condition {
                HavingCondition::Field { field, filter } => {
                    let def = entity.field(field).ok_or_else(|| FilterError::UnknownField {
                        entity: entity.name.clone(),
                        field: field.clone(),
                    })?;
                    if !by.contains(field) {
                        return Err(QueryError::UngroupedField {
                            clause: "having",
                            field: field.clone(),
                        }
                        .into());
                    }
                    let target = Target::field(self.registry, entity, def);
                    compiler.compile_comparison(&target, &Operand::Column(field.clone()), filter)?
                }
                HavingCondition::Aggregate {
                    aggregation,
                    filter,
                } => {
                    let field = check_aggregation(entity, aggregation)?;
                    let target = Target::aggregate(self.registry, entity, aggregation, field);
                    compiler.compile_comparison(
                        &target,
                        &Operand::Aggregate(aggregation.clone()),
                        filter,
                    )?
                }
                HavingCondition::And(branches) => PredicateNode::And(
                    self.compile_branches(compiler, entity, by, branches)?,
                ),
                HavingCondition::Or(branches) => {
                    PredicateNode::Or(self.compile_branches(compiler, entity, by, branches)?)
                }
                HavingCondition::Not(branches) => PredicateNode::And(
                    self.compile_branches(compiler, entity, by, branches)?
                        .into_iter()
                        .map(|node| PredicateNode::Not(Box::new(node)))
                        .collect(),
                ),
            };
            nodes.push(node);
        }
        Ok(PredicateNode::all(nodes))
    }

    fn compile_branches(
        &self,
        compiler: &FilterCompiler<'_>,
        entity: &EntityDefinition,
        by: &[String],
        branches: &[Having],
    ) -> Result<Vec<PredicateNode>, Error> {
        branches
            .iter()
            .map(|branch| self.compile_having(compiler, entity, by, branch))
            .collect()
    }
}

/// Validate an aggregation against `entity`, returning the aggregated field.
fn check_aggregation<'e>(
    entity: &'e EntityDefinition,
    aggregation: &Aggregation,
) -> Result<Option<&'e FieldDefinition>, Error> {
    let invalid = |field: &str, kind: String| QueryError::InvalidAggregate {
        entity: entity.name.clone(),
        field: field.to_string(),
        function: aggregation.function.key().to_string(),
        kind,
    };
    let Some(name) = &aggregation.field else {
        return match aggregation.function {
            AggregateFunction::Count => Ok(None),
            _ => Err(invalid("_all", "record".to_string()).into()),
        };
    };
    let field = entity.field(name).ok_or_else(|| FilterError::UnknownField {
        entity: entity.name.clone(),
        field: name.clone(),
    })?;
    let valid = match aggregation.function {
        AggregateFunction::Count => true,
        AggregateFunction::Sum | AggregateFunction::Avg => field.kind.is_numeric(),
        AggregateFunction::Min | AggregateFunction::Max => field.kind != ScalarKind::Boolean,
    };
    if !valid {
        return Err(invalid(name, field.kind.to_string()).into());
    }
    Ok(Some(field))
}

fn decode_aggregate(
    row: &mut Row,
    column: &str,
    aggregation: &Aggregation,
    field: Option<&FieldDefinition>,
) -> Result<Value, Error> {
    let raw = row.take(column).unwrap_or(Value::Null);
    let kind = match (aggregation.function, field) {
        (AggregateFunction::Count, _) | (_, None) => ScalarKind::Int,
        (AggregateFunction::Avg, Some(_)) => ScalarKind::Float,
        (_, Some(field)) => field.kind.clone(),
    };
    Ok(decode_value(&kind, raw, &aggregation.label())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::registry;

    #[test]
    fn test_aggregation_kinds() {
        let registry = registry();
        let athlete = registry.entity("Athlete").unwrap();
        assert!(check_aggregation(athlete, &Aggregation::avg("weight")).is_ok());
        assert!(check_aggregation(athlete, &Aggregation::count()).unwrap().is_none());
        assert!(check_aggregation(athlete, &Aggregation::min("birthDate")).is_ok());
        assert!(matches!(
            check_aggregation(athlete, &Aggregation::sum("lastName")),
            Err(Error::Query(QueryError::InvalidAggregate { ref field, .. })) if field == "lastName"
        ));
        assert!(matches!(
            check_aggregation(athlete, &Aggregation::avg("height")),
            Err(Error::Filter(FilterError::UnknownField { .. }))
        ));

        let member = registry.entity("TeamMember").unwrap();
        assert!(check_aggregation(member, &Aggregation::max("captain")).is_err());
    }

    #[test]
    fn test_decode_aggregate_kinds() {
        let registry = registry();
        let athlete = registry.entity("Athlete").unwrap();
        let mut row = Row::new(vec![
            ("a0".into(), Value::Int(3)),
            ("a1".into(), Value::Int(70)),
            ("a2".into(), Value::Null),
        ]);
        let weight = athlete.field("weight");
        assert_eq!(
            decode_aggregate(&mut row, "a0", &Aggregation::count(), None).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            decode_aggregate(&mut row, "a1", &Aggregation::avg("weight"), weight).unwrap(),
            Value::Float(70.0)
        );
        assert_eq!(
            decode_aggregate(&mut row, "a2", &Aggregation::sum("weight"), weight).unwrap(),
            Value::Null
        );
    }
}
