//! Delete policies: restrict, cascade and set-null.
//!
//! Deletes are applied set-wise. Before rows of an entity are removed,
//! every dependent relation is checked: restricted dependents abort the
//! delete, cascading dependents are deleted first (recursively) and
//! set-null dependents have their foreign keys cleared.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use ormkit_proto::{Row, Selection, Value};

use crate::driver::{Connection, Dialect};
use crate::error::{Error, MutationError};
use crate::filter::{ComparisonOp, FieldComparison, Operand, PredicateNode};
use crate::query::{select_statement, QueryPlanner, ROOT};
use crate::schema::{Dependent, EntityDefinition, OnDelete, SchemaRegistry};
use crate::sql::{render_predicate, SqlWriter};

/// Maximum cascade depth.
const MAX_CASCADE_DEPTH: usize = 32;

type DeleteFuture<'b> = Pin<Box<dyn Future<Output = Result<u64, Error>> + Send + 'b>>;

/// Outcome of a cascading delete.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CascadeResult {
    /// Rows deleted from the requested entity.
    pub deleted: u64,
    /// Rows deleted from dependents.
    pub cascaded: u64,
    /// Rows whose foreign keys were cleared.
    pub nullified: u64,
}

/// Executes deletes with their referential actions.
pub struct CascadeExecutor<'a> {
    registry: &'a SchemaRegistry,
    dialect: &'a dyn Dialect,
}

impl<'a> CascadeExecutor<'a> {
    pub fn new(registry: &'a SchemaRegistry, dialect: &'a dyn Dialect) -> Self {
        Self { registry, dialect }
    }

    /// Delete `rows` of `entity`, applying every dependent's delete policy.
    ///
    /// Rows must carry the primary key and every column referenced by a
    /// dependent; [`Self::key_columns`] lists them.
    pub async fn delete_rows(
        &self,
        conn: &mut dyn Connection,
        entity: &EntityDefinition,
        rows: Vec<Row>,
    ) -> Result<CascadeResult, Error> {
        let mut result = CascadeResult::default();
        let mut visited = HashSet::new();
        let deleted = self
            .delete_level(conn, entity, rows, &mut visited, &mut result, 0)
            .await?;
        result.deleted = deleted;
        tracing::debug!(
            entity = %entity.name,
            deleted = result.deleted,
            cascaded = result.cascaded,
            nullified = result.nullified,
            "delete applied"
        );
        Ok(result)
    }

    /// Columns a row must carry to be deleted through [`Self::delete_rows`].
    pub fn key_columns(&self, entity: &EntityDefinition) -> Vec<String> {
        let mut columns = entity.primary_key.clone();
        for dependent in self.registry.dependents_of(&entity.name) {
            for column in &dependent.references {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        columns
    }

    fn delete_level<'b>(
        &'b self,
        conn: &'b mut dyn Connection,
        entity: &'b EntityDefinition,
        rows: Vec<Row>,
        visited: &'b mut HashSet<(String, String)>,
        result: &'b mut CascadeResult,
        depth: usize,
    ) -> DeleteFuture<'b> {
        Box::pin(async move {
            if depth > MAX_CASCADE_DEPTH {
                return Err(MutationError::CascadeDepthExceeded {
                    entity: entity.name.clone(),
                }
                .into());
            }
            let rows: Vec<Row> = rows
                .into_iter()
                .filter(|row| visited.insert((entity.name.clone(), row_identity(row, &entity.primary_key))))
                .collect();
            if rows.is_empty() {
                return Ok(0);
            }

            let dependents = self.registry.dependents_of(&entity.name);
            for dependent in dependents.iter().filter(|d| d.on_delete == OnDelete::Restrict) {
                let Some(predicate) = dependent_predicate(dependent, &rows) else { continue };
                let count = self.count(&mut *conn, &dependent.entity, &predicate).await?;
                if count > 0 {
                    return Err(MutationError::RestrictedRelation {
                        entity: entity.name.clone(),
                        relation: dependent.name.clone(),
                        dependent: dependent.entity.clone(),
                        count,
                    }
                    .into());
                }
            }

            for dependent in dependents {
                let Some(predicate) = dependent_predicate(dependent, &rows) else { continue };
                match dependent.on_delete {
                    OnDelete::Restrict => {}
                    OnDelete::Cascade => {
                        let child = self.registry.require(&dependent.entity)?;
                        let child_rows = self.fetch_keys(&mut *conn, child, predicate).await?;
                        let deleted = self
                            .delete_level(&mut *conn, child, child_rows, &mut *visited, &mut *result, depth + 1)
                            .await?;
                        result.cascaded += deleted;
                    }
                    OnDelete::SetNull => {
                        let mut w = SqlWriter::new(self.dialect);
                        w.push("UPDATE ").table(&dependent.entity, ROOT).push(" SET ");
                        w.join(&dependent.fields, ", ", |w, field| {
                            w.ident(field).push(" = NULL");
                        });
                        w.push(" WHERE ");
                        render_predicate(&mut w, &predicate, ROOT);
                        result.nullified += conn.execute(&w.finish()).await?;
                    }
                }
            }

            let predicate = key_predicate(
                &entity.primary_key,
                rows.iter()
                    .filter_map(|row| key_values(row, &entity.primary_key))
                    .collect(),
            );
            let mut w = SqlWriter::new(self.dialect);
            w.push("DELETE FROM ").table(&entity.name, ROOT).push(" WHERE ");
            render_predicate(&mut w, &predicate, ROOT);
            let deleted = conn.execute(&w.finish()).await?;
            Ok(deleted)
        })
    }

    async fn count(
        &self,
        conn: &mut dyn Connection,
        entity: &str,
        predicate: &PredicateNode,
    ) -> Result<u64, Error> {
        let mut w = SqlWriter::new(self.dialect);
        w.push("SELECT COUNT(*) AS ").ident("n").push(" FROM ").table(entity, ROOT);
        w.push(" WHERE ");
        render_predicate(&mut w, predicate, ROOT);
        let rows = conn.query(&w.finish()).await?;
        let count = rows
            .first()
            .and_then(|row| row.get("n"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn fetch_keys(
        &self,
        conn: &mut dyn Connection,
        entity: &EntityDefinition,
        predicate: PredicateNode,
    ) -> Result<Vec<Row>, Error> {
        let planner = QueryPlanner::new(self.registry, 0);
        let plan = planner.plan_selected(
            &entity.name,
            predicate,
            &Selection::fields(self.key_columns(entity)),
        )?;
        Ok(conn.query(&select_statement(self.dialect, &plan)).await?)
    }
}

fn key_values(row: &Row, columns: &[String]) -> Option<Vec<Value>> {
    columns
        .iter()
        .map(|column| row.get(column).filter(|v| !v.is_null()).cloned())
        .collect()
}

fn row_identity(row: &Row, columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| row.get(column).map(Value::to_json).unwrap_or_default().to_string())
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

/// `columns` matching any of `keys`.
pub(crate) fn key_predicate(columns: &[String], keys: Vec<Vec<Value>>) -> PredicateNode {
    if let [column] = columns {
        return PredicateNode::Field(FieldComparison {
            operand: Operand::Column(column.clone()),
            op: ComparisonOp::In(keys.into_iter().flatten().collect()),
            insensitive: false,
        });
    }
    PredicateNode::Or(
        keys.into_iter()
            .map(|key| {
                PredicateNode::all(
                    columns
                        .iter()
                        .zip(key)
                        .map(|(column, value)| PredicateNode::column_eq(column.clone(), value))
                        .collect(),
                )
            })
            .collect(),
    )
}

/// Rows of `dependent` pointing at any of `parents`.
fn dependent_predicate(dependent: &Dependent, parents: &[Row]) -> Option<PredicateNode> {
    let keys: Vec<Vec<Value>> = parents
        .iter()
        .filter_map(|row| key_values(row, &dependent.references))
        .collect();
    if keys.is_empty() {
        return None;
    }
    Some(key_predicate(&dependent.fields, keys))
}
