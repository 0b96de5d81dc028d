//! Plan execution: root fetch, include loading and per-parent windows.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use ormkit_proto::{EntityRecord, RelationValue, Row, Value};

use super::plan::{ExecutionPlan, IncludePlan, Window};
use super::render::{child_statements, select_statement};
use crate::driver::{Connection, Dialect};
use crate::error::Error;
use crate::materialize::{materialize, storage_value};
use crate::schema::SchemaRegistry;

type LevelFuture<'b> = Pin<Box<dyn Future<Output = Result<Vec<EntityRecord>, Error>> + Send + 'b>>;

/// Hashable form of one stored key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    Int(i64),
    Float(u64),
    Str(String),
}

fn key_part(value: &Value) -> Option<KeyPart> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(KeyPart::Int(i64::from(*b))),
        Value::Int(i) => Some(KeyPart::Int(*i)),
        Value::Float(f) => Some(KeyPart::Float(f.to_bits())),
        Value::String(s) => Some(KeyPart::Str(s.clone())),
        Value::DateTime(dt) => Some(KeyPart::Int(dt.timestamp_micros())),
    }
}

/// Key of `row` over `columns`; `None` when any part is null.
fn row_key(row: &Row, columns: &[String]) -> Option<Vec<KeyPart>> {
    columns
        .iter()
        .map(|column| row.get(column).and_then(key_part))
        .collect()
}

/// Executes read plans on a leased connection.
pub struct QueryExecutor<'a> {
    registry: &'a SchemaRegistry,
    dialect: &'a dyn Dialect,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(registry: &'a SchemaRegistry, dialect: &'a dyn Dialect) -> Self {
        Self { registry, dialect }
    }

    /// Run `plan` and materialize the matching records, includes attached.
    pub async fn fetch(
        &self,
        conn: &mut dyn Connection,
        plan: &ExecutionPlan,
    ) -> Result<Vec<EntityRecord>, Error> {
        let statement = select_statement(self.dialect, plan);
        let mut rows = conn.query(&statement).await?;
        if plan.window.is_backward() {
            rows.reverse();
        }
        tracing::debug!(entity = %plan.entity, rows = rows.len(), "fetched root rows");
        self.load_level(conn, plan, rows).await
    }

    /// Run `plan` and return the first record, if any.
    pub async fn fetch_one(
        &self,
        conn: &mut dyn Connection,
        plan: &ExecutionPlan,
    ) -> Result<Option<EntityRecord>, Error> {
        Ok(self.fetch(conn, plan).await?.into_iter().next())
    }

    fn load_level<'b>(
        &'b self,
        conn: &'b mut dyn Connection,
        plan: &'b ExecutionPlan,
        rows: Vec<Row>,
    ) -> LevelFuture<'b> {
        Box::pin(async move {
            let entity = self.registry.require(&plan.entity)?;

            let mut related = Vec::with_capacity(plan.includes.len());
            for include in &plan.includes {
                related.push(self.load_include(&mut *conn, include, &rows).await?);
            }

            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                let keys: Vec<_> = plan
                    .includes
                    .iter()
                    .map(|include| row_key(&row, &include.local))
                    .collect();
                let mut record = materialize(entity, &plan.output, row)?;
                for ((include, groups), key) in plan.includes.iter().zip(&related).zip(keys) {
                    let children = key.and_then(|key| groups.get(&key));
                    let value = if include.to_many {
                        RelationValue::Many(children.cloned().unwrap_or_default())
                    } else {
                        RelationValue::One(
                            children
                                .and_then(|records| records.first())
                                .cloned()
                                .map(Box::new),
                        )
                    };
                    record.relations.push((include.relation.clone(), value));
                }
                records.push(record);
            }
            Ok(records)
        })
    }

    /// Load one include for all `parents` with a single pass per chunk of
    /// parent keys, returning the windowed children grouped by join key.
    async fn load_include(
        &self,
        conn: &mut dyn Connection,
        include: &IncludePlan,
        parents: &[Row],
    ) -> Result<HashMap<Vec<KeyPart>, Vec<EntityRecord>>, Error> {
        let mut seen = HashSet::new();
        let mut parent_keys = Vec::new();
        for row in parents {
            let values: Option<Vec<Value>> = include
                .local
                .iter()
                .map(|column| row.get(column).filter(|v| !v.is_null()).cloned())
                .collect();
            let Some(values) = values else { continue };
            if let Some(key) = row_key(row, &include.local) {
                if seen.insert(key) {
                    parent_keys.push(values);
                }
            }
        }
        if parent_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut child_rows = Vec::new();
        for statement in child_statements(self.dialect, &include.plan, &include.remote, &parent_keys) {
            child_rows.extend(conn.query(&statement).await?);
        }
        tracing::debug!(
            relation = %include.relation,
            parents = parent_keys.len(),
            rows = child_rows.len(),
            "loaded include"
        );

        let mut order: Vec<Vec<KeyPart>> = Vec::new();
        let mut groups: HashMap<Vec<KeyPart>, Vec<Row>> = HashMap::new();
        for row in child_rows {
            let Some(key) = row_key(&row, &include.remote) else { continue };
            let group = match groups.entry(key) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    order.push(entry.key().clone());
                    entry.insert(Vec::new())
                }
            };
            group.push(row);
        }

        let mut spans = Vec::with_capacity(order.len());
        let mut flat = Vec::new();
        for key in order {
            let rows = groups.remove(&key).unwrap_or_default();
            let kept = apply_window(&include.plan.window, rows);
            spans.push((key, kept.len()));
            flat.extend(kept);
        }

        let records = self.load_level(conn, &include.plan, flat).await?;
        let mut records = records.into_iter();
        let mut grouped = HashMap::with_capacity(spans.len());
        for (key, len) in spans {
            grouped.insert(key, records.by_ref().take(len).collect());
        }
        Ok(grouped)
    }
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

fn take_front(rows: Vec<Row>, skip: u64, take: Option<i64>) -> Vec<Row> {
    let take = take.map_or(usize::MAX, |t| to_usize(t.unsigned_abs()));
    rows.into_iter().skip(to_usize(skip)).take(take).collect()
}

fn take_back(mut rows: Vec<Row>, skip: u64, take: u64) -> Vec<Row> {
    let end = rows.len().saturating_sub(to_usize(skip));
    let start = end.saturating_sub(to_usize(take));
    rows.truncate(end);
    rows.drain(..start);
    rows
}

/// Window one parent's ordered children.
fn apply_window(window: &Window, mut rows: Vec<Row>) -> Vec<Row> {
    match window {
        Window::Offset { skip, take } => match take {
            Some(t) if *t < 0 => take_back(rows, *skip, t.unsigned_abs()),
            _ => take_front(rows, *skip, *take),
        },
        Window::Cursor { key, skip, take } => {
            let target: Vec<(&str, Value)> = key
                .fields
                .iter()
                .map(|(name, value)| (name.as_str(), storage_value(value)))
                .collect();
            let position = rows.iter().position(|row| {
                target
                    .iter()
                    .all(|(name, value)| row.get(name) == Some(value))
            });
            let Some(position) = position else {
                return Vec::new();
            };
            match take {
                Some(t) if *t < 0 => {
                    rows.truncate(position);
                    take_back(rows, *skip, t.unsigned_abs())
                }
                _ => {
                    rows.drain(..=position);
                    take_front(rows, *skip, *take)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::UniqueKey;
    use pretty_assertions::assert_eq;

    fn rows(ids: impl IntoIterator<Item = i64>) -> Vec<Row> {
        ids.into_iter()
            .map(|id| Row::new(vec![("id".into(), Value::Int(id))]))
            .collect()
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter()
            .filter_map(|row| row.get("id").and_then(Value::as_i64))
            .collect()
    }

    fn cursor(id: i64, skip: u64, take: Option<i64>) -> Window {
        Window::Cursor {
            key: UniqueKey {
                entity: "Athlete".into(),
                name: "id".into(),
                fields: vec![("id".into(), Value::Int(id))],
            },
            skip,
            take,
        }
    }

    #[test]
    fn test_offset_windows() {
        let window = Window::Offset { skip: 1, take: Some(2) };
        assert_eq!(ids(&apply_window(&window, rows(1..=5))), vec![2, 3]);

        let window = Window::Offset { skip: 1, take: Some(-2) };
        assert_eq!(ids(&apply_window(&window, rows(1..=5))), vec![3, 4]);

        let window = Window::Offset { skip: 9, take: None };
        assert!(apply_window(&window, rows(1..=5)).is_empty());
    }

    #[test]
    fn test_cursor_windows_exclude_cursor_row() {
        assert_eq!(ids(&apply_window(&cursor(3, 0, Some(2)), rows(1..=6))), vec![4, 5]);
        assert_eq!(ids(&apply_window(&cursor(5, 0, Some(-3)), rows(1..=6))), vec![2, 3, 4]);
        assert_eq!(ids(&apply_window(&cursor(5, 1, Some(-3)), rows(1..=6))), vec![1, 2, 3]);
        assert_eq!(ids(&apply_window(&cursor(2, 0, None), rows(1..=4))), vec![3, 4]);
        assert!(apply_window(&cursor(42, 0, Some(2)), rows(1..=6)).is_empty());
    }

    #[test]
    fn test_row_key_skips_nulls() {
        let row = Row::new(vec![
            ("a".into(), Value::Int(1)),
            ("b".into(), Value::Null),
        ]);
        assert_eq!(row_key(&row, &["a".into()]), Some(vec![KeyPart::Int(1)]));
        assert_eq!(row_key(&row, &["a".into(), "b".into()]), None);
    }
}
