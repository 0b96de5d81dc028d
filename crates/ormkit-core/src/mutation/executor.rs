//! Write execution.

use ormkit_proto::{
    BatchCount, CreateArgs, CreateManyArgs, DeleteArgs, DeleteManyArgs, EntityRecord, Filter,
    FindArgs, OrderBy, Row, Selection, UpdateArgs, UpdateManyArgs, UpsertArgs, Value,
};

use super::cascade::CascadeExecutor;
use super::payload::{Assignment, ColumnWrite, CompiledPayload, PayloadCompiler, WriteMode};
use crate::driver::{Connection, Dialect, Statement};
use crate::error::{Error, MutationError, StorageError};
use crate::filter::{FilterCompiler, PredicateNode, UniqueKey};
use crate::query::{render_select, select_statement, QueryExecutor, QueryPlanner, ROOT};
use crate::schema::{EntityDefinition, SchemaRegistry};
use crate::sql::{render_predicate, SqlWriter};

/// Executes writes on a leased connection.
///
/// Every method expects to run inside a transaction; multi-statement
/// writes rely on it for atomicity.
pub struct MutationExecutor<'a> {
    registry: &'a SchemaRegistry,
    dialect: &'a dyn Dialect,
    max_depth: usize,
}

impl<'a> MutationExecutor<'a> {
    pub fn new(registry: &'a SchemaRegistry, dialect: &'a dyn Dialect, max_depth: usize) -> Self {
        Self {
            registry,
            dialect,
            max_depth,
        }
    }

    pub async fn create(
        &self,
        conn: &mut dyn Connection,
        entity: &str,
        args: &CreateArgs,
    ) -> Result<EntityRecord, Error> {
        let def = self.registry.require(entity)?;
        let mut payload = PayloadCompiler::new(self.registry).compile(def, &args.data, WriteMode::Create)?;
        self.resolve_connects(&mut *conn, def, &mut payload).await?;

        let statement = self.insert_statement(def, &payload, false, true);
        let rows = conn
            .query(&statement)
            .await
            .map_err(|e| unique_violation(def, e))?;
        let key = rows.into_iter().next().ok_or_else(|| MutationError::RecordNotFound {
            entity: def.name.clone(),
            action: "create",
        })?;
        tracing::debug!(entity = %def.name, "record created");
        self.refetch(conn, def, &key, &args.selection, "create").await
    }

    pub async fn create_many(
        &self,
        conn: &mut dyn Connection,
        entity: &str,
        args: &CreateManyArgs,
    ) -> Result<BatchCount, Error> {
        let def = self.registry.require(entity)?;
        let compiler = PayloadCompiler::new(self.registry);
        let payloads = args
            .data
            .iter()
            .map(|data| compiler.compile(def, data, WriteMode::Create))
            .collect::<Result<Vec<_>, _>>()?;

        let mut count = 0;
        for mut payload in payloads {
            self.resolve_connects(&mut *conn, def, &mut payload).await?;
            let statement = self.insert_statement(def, &payload, args.skip_duplicates, false);
            count += conn
                .execute(&statement)
                .await
                .map_err(|e| unique_violation(def, e))?;
        }
        tracing::debug!(entity = %def.name, requested = args.data.len(), created = count, "batch created");
        Ok(BatchCount::new(count))
    }

    pub async fn update(
        &self,
        conn: &mut dyn Connection,
        entity: &str,
        args: &UpdateArgs,
    ) -> Result<EntityRecord, Error> {
        let def = self.registry.require(entity)?;
        let key = FilterCompiler::new(self.registry).compile_unique(&def.name, &args.unique)?;
        let mut payload = PayloadCompiler::new(self.registry).compile(def, &args.data, WriteMode::Update)?;
        self.resolve_connects(&mut *conn, def, &mut payload).await?;

        let not_found = || MutationError::RecordNotFound {
            entity: def.name.clone(),
            action: "update",
        };
        let row = if payload.writes.is_empty() {
            self.find_primary_key(&mut *conn, def, key.predicate()).await?
        } else {
            let statement = self.update_statement(def, &payload, &key.predicate(), true);
            conn.query(&statement)
                .await
                .map_err(|e| unique_violation(def, e))?
                .into_iter()
                .next()
        };
        let row = row.ok_or_else(not_found)?;
        tracing::debug!(entity = %def.name, key = %key.name, "record updated");
        self.refetch(conn, def, &row, &args.selection, "update").await
    }

    pub async fn update_many(
        &self,
        conn: &mut dyn Connection,
        entity: &str,
        args: &UpdateManyArgs,
    ) -> Result<BatchCount, Error> {
        let def = self.registry.require(entity)?;
        require_order_for_limit(def, args.limit, &args.order_by)?;
        let payload = PayloadCompiler::new(self.registry).compile(def, &args.data, WriteMode::Update)?;
        if let Some(connect) = payload.connects.first() {
            return Err(MutationError::InvalidWrite {
                entity: def.name.clone(),
                member: connect.relation.clone(),
                reason: "relations cannot be connected in bulk updates".to_string(),
            }
            .into());
        }
        if payload.writes.is_empty() {
            return Ok(BatchCount::new(0));
        }

        let statement = match args.limit {
            None => {
                let predicate = FilterCompiler::new(self.registry)
                    .compile_optional(&def.name, args.filter.as_ref())?;
                self.update_statement(def, &payload, &predicate, false)
            }
            Some(limit) => {
                let mut w = SqlWriter::new(self.dialect);
                render_update_head(&mut w, def, &payload.writes);
                w.push(" WHERE ");
                self.render_limited_keys(&mut w, def, args.filter.clone(), &args.order_by, limit)?;
                w.finish()
            }
        };
        let count = conn
            .execute(&statement)
            .await
            .map_err(|e| unique_violation(def, e))?;
        tracing::debug!(entity = %def.name, updated = count, "batch updated");
        Ok(BatchCount::new(count))
    }

    pub async fn upsert(
        &self,
        conn: &mut dyn Connection,
        entity: &str,
        args: &UpsertArgs,
    ) -> Result<EntityRecord, Error> {
        let def = self.registry.require(entity)?;
        let key = FilterCompiler::new(self.registry).compile_unique(&def.name, &args.unique)?;
        let compiler = PayloadCompiler::new(self.registry);
        let mut create = compiler.compile(def, &args.create, WriteMode::Create)?;
        let mut update = compiler.compile(def, &args.update, WriteMode::Update)?;
        self.resolve_connects(&mut *conn, def, &mut create).await?;
        self.resolve_connects(&mut *conn, def, &mut update).await?;

        let native = !update.writes.is_empty()
            && key
                .fields
                .iter()
                .all(|(field, value)| create.value_of(field) == Some(value));
        let row = if native {
            let statement = self.native_upsert_statement(def, &key, &create, &update);
            conn.query(&statement)
                .await
                .map_err(|e| unique_violation(def, e))?
                .into_iter()
                .next()
        } else {
            match self.find_primary_key(&mut *conn, def, key.predicate()).await? {
                Some(existing) if update.writes.is_empty() => Some(existing),
                Some(existing) => {
                    let predicate = primary_key_predicate(def, &existing);
                    let statement = self.update_statement(def, &update, &predicate, true);
                    conn.query(&statement)
                        .await
                        .map_err(|e| unique_violation(def, e))?
                        .into_iter()
                        .next()
                }
                None => {
                    let statement = self.insert_statement(def, &create, false, true);
                    conn.query(&statement)
                        .await
                        .map_err(|e| unique_violation(def, e))?
                        .into_iter()
                        .next()
                }
            }
        };
        let row = row.ok_or_else(|| MutationError::RecordNotFound {
            entity: def.name.clone(),
            action: "upsert",
        })?;
        tracing::debug!(entity = %def.name, key = %key.name, native, "record upserted");
        self.refetch(conn, def, &row, &args.selection, "upsert").await
    }

    pub async fn delete(
        &self,
        conn: &mut dyn Connection,
        entity: &str,
        args: &DeleteArgs,
    ) -> Result<EntityRecord, Error> {
        let def = self.registry.require(entity)?;
        let key = FilterCompiler::new(self.registry).compile_unique(&def.name, &args.unique)?;
        let plan = QueryPlanner::new(self.registry, self.max_depth).plan_unique(&key, &args.selection)?;
        let record = QueryExecutor::new(self.registry, self.dialect)
            .fetch_one(&mut *conn, &plan)
            .await?
            .ok_or_else(|| MutationError::RecordNotFound {
                entity: def.name.clone(),
                action: "delete",
            })?;

        let cascade = CascadeExecutor::new(self.registry, self.dialect);
        let rows = self
            .fetch_rows(&mut *conn, def, key.predicate(), cascade.key_columns(def))
            .await?;
        cascade.delete_rows(conn, def, rows).await?;
        Ok(record)
    }

    pub async fn delete_many(
        &self,
        conn: &mut dyn Connection,
        entity: &str,
        args: &DeleteManyArgs,
    ) -> Result<BatchCount, Error> {
        let def = self.registry.require(entity)?;
        require_order_for_limit(def, args.limit, &args.order_by)?;
        let cascade = CascadeExecutor::new(self.registry, self.dialect);

        let find = FindArgs {
            filter: args.filter.clone(),
            order_by: args.order_by.clone(),
            take: args.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX)),
            selection: Selection::fields(cascade.key_columns(def)),
            ..FindArgs::default()
        };
        let plan = QueryPlanner::new(self.registry, self.max_depth).plan(&def.name, &find)?;
        let rows = conn.query(&select_statement(self.dialect, &plan)).await?;
        let result = cascade.delete_rows(conn, def, rows).await?;
        Ok(BatchCount::new(result.deleted))
    }

    /// Look up every pending connect target and copy its key into the payload.
    async fn resolve_connects(
        &self,
        conn: &mut dyn Connection,
        entity: &EntityDefinition,
        payload: &mut CompiledPayload,
    ) -> Result<(), Error> {
        for connect in std::mem::take(&mut payload.connects) {
            let target = self.registry.require(&connect.key.entity)?;
            let rows = self
                .fetch_rows(&mut *conn, target, connect.key.predicate(), connect.remote.clone())
                .await?;
            let row = rows.into_iter().next().ok_or_else(|| MutationError::ConnectTargetNotFound {
                entity: entity.name.clone(),
                relation: connect.relation.clone(),
            })?;
            let values = connect
                .remote
                .iter()
                .map(|column| row.get(column).cloned().unwrap_or(Value::Null))
                .collect();
            payload.resolve(&connect, values);
        }
        Ok(())
    }

    async fn fetch_rows(
        &self,
        conn: &mut dyn Connection,
        entity: &EntityDefinition,
        predicate: PredicateNode,
        columns: Vec<String>,
    ) -> Result<Vec<Row>, Error> {
        let plan = QueryPlanner::new(self.registry, self.max_depth).plan_selected(
            &entity.name,
            predicate,
            &Selection::fields(columns),
        )?;
        Ok(conn.query(&select_statement(self.dialect, &plan)).await?)
    }

    async fn find_primary_key(
        &self,
        conn: &mut dyn Connection,
        entity: &EntityDefinition,
        predicate: PredicateNode,
    ) -> Result<Option<Row>, Error> {
        let rows = self
            .fetch_rows(conn, entity, predicate, entity.primary_key.clone())
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Read back a written record through its primary key.
    async fn refetch(
        &self,
        conn: &mut dyn Connection,
        entity: &EntityDefinition,
        key: &Row,
        selection: &Selection,
        action: &'static str,
    ) -> Result<EntityRecord, Error> {
        let plan = QueryPlanner::new(self.registry, self.max_depth).plan_selected(
            &entity.name,
            primary_key_predicate(entity, key),
            selection,
        )?;
        QueryExecutor::new(self.registry, self.dialect)
            .fetch_one(conn, &plan)
            .await?
            .ok_or_else(|| {
                MutationError::RecordNotFound {
                    entity: entity.name.clone(),
                    action,
                }
                .into()
            })
    }

    fn insert_statement(
        &self,
        entity: &EntityDefinition,
        payload: &CompiledPayload,
        skip_duplicates: bool,
        returning: bool,
    ) -> Statement {
        let mut w = SqlWriter::new(self.dialect);
        let has_columns = render_insert(&mut w, entity, payload);
        // A conflict clause cannot follow DEFAULT VALUES, and a row of
        // defaults only has a generated key to collide on.
        if skip_duplicates && has_columns {
            w.push(" ON CONFLICT DO NOTHING");
        }
        if returning {
            render_returning(&mut w, entity);
        }
        w.finish()
    }

    fn native_upsert_statement(
        &self,
        entity: &EntityDefinition,
        key: &UniqueKey,
        create: &CompiledPayload,
        update: &CompiledPayload,
    ) -> Statement {
        let mut w = SqlWriter::new(self.dialect);
        render_insert(&mut w, entity, create);
        w.push(" ON CONFLICT (");
        w.join(&key.fields, ", ", |w, (field, _)| {
            w.ident(field);
        });
        w.push(") DO UPDATE SET ");
        render_assignments(&mut w, &update.writes, &entity.name);
        render_returning(&mut w, entity);
        w.finish()
    }

    fn update_statement(
        &self,
        entity: &EntityDefinition,
        payload: &CompiledPayload,
        predicate: &PredicateNode,
        returning: bool,
    ) -> Statement {
        let mut w = SqlWriter::new(self.dialect);
        render_update_head(&mut w, entity, &payload.writes);
        w.push(" WHERE ");
        render_predicate(&mut w, predicate, ROOT);
        if returning {
            render_returning(&mut w, entity);
        }
        w.finish()
    }

    /// `pk IN (SELECT pk ... ORDER BY ... LIMIT n)`.
    fn render_limited_keys(
        &self,
        w: &mut SqlWriter<'_>,
        entity: &EntityDefinition,
        filter: Option<Filter>,
        order_by: &[OrderBy],
        limit: u64,
    ) -> Result<(), Error> {
        let find = FindArgs {
            filter,
            order_by: order_by.to_vec(),
            take: Some(i64::try_from(limit).unwrap_or(i64::MAX)),
            selection: Selection::fields(entity.primary_key.clone()),
            ..FindArgs::default()
        };
        let plan = QueryPlanner::new(self.registry, self.max_depth).plan(&entity.name, &find)?;
        w.push("(");
        w.join(&entity.primary_key, ", ", |w, column| {
            w.column(ROOT, column);
        });
        w.push(") IN (");
        render_select(w, &plan);
        w.push(")");
        Ok(())
    }
}

/// Render the INSERT head. Returns false when the row is all defaults.
fn render_insert(w: &mut SqlWriter<'_>, entity: &EntityDefinition, payload: &CompiledPayload) -> bool {
    let values: Vec<(&str, &Value)> = payload
        .writes
        .iter()
        .filter_map(|write| match &write.assignment {
            Assignment::Set(value) => Some((write.column.as_str(), value)),
            Assignment::Arithmetic(..) => None,
        })
        .collect();
    w.push("INSERT INTO ").ident(&entity.name);
    if values.is_empty() {
        w.push(" DEFAULT VALUES");
        return false;
    }
    w.push(" (");
    w.join(&values, ", ", |w, (column, _)| {
        w.ident(column);
    });
    w.push(") VALUES (");
    w.join(&values, ", ", |w, (_, value)| {
        w.bind((*value).clone());
    });
    w.push(")");
    true
}

fn render_update_head(w: &mut SqlWriter<'_>, entity: &EntityDefinition, writes: &[ColumnWrite]) {
    w.push("UPDATE ").table(&entity.name, ROOT).push(" SET ");
    render_assignments(w, writes, ROOT);
}

/// `column = value` list. Arithmetic reads the current value through
/// `qualifier`.
fn render_assignments(w: &mut SqlWriter<'_>, writes: &[ColumnWrite], qualifier: &str) {
    w.join(writes, ", ", |w, write| {
        w.ident(&write.column).push(" = ");
        match &write.assignment {
            Assignment::Set(value) => {
                w.bind(value.clone());
            }
            Assignment::Arithmetic(op, by) => {
                w.column(qualifier, &write.column)
                    .push(" ")
                    .push(op.sql())
                    .push(" ")
                    .bind(by.clone());
            }
        }
    });
}

fn render_returning(w: &mut SqlWriter<'_>, entity: &EntityDefinition) {
    w.push(" RETURNING ");
    w.join(&entity.primary_key, ", ", |w, column| {
        w.ident(column);
    });
}

fn primary_key_predicate(entity: &EntityDefinition, row: &Row) -> PredicateNode {
    PredicateNode::all(
        entity
            .primary_key
            .iter()
            .map(|column| {
                PredicateNode::column_eq(column.clone(), row.get(column).cloned().unwrap_or(Value::Null))
            })
            .collect(),
    )
}

fn require_order_for_limit(
    entity: &EntityDefinition,
    limit: Option<u64>,
    order_by: &[OrderBy],
) -> Result<(), Error> {
    if limit.is_some() && order_by.is_empty() {
        return Err(MutationError::LimitWithoutOrder {
            entity: entity.name.clone(),
        }
        .into());
    }
    Ok(())
}

fn unique_violation(entity: &EntityDefinition, err: StorageError) -> Error {
    match err {
        StorageError::UniqueViolation(detail) => MutationError::UniqueViolation {
            entity: entity.name.clone(),
            detail,
        }
        .into(),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SqliteDialect;
    use crate::test_support::registry;
    use ormkit_proto::{Data, UniqueWhere};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_insert_and_update_sql() {
        let registry = registry();
        let executor = MutationExecutor::new(&registry, &SqliteDialect, 5);
        let club = registry.entity("Club").unwrap();

        let payload = CompiledPayload {
            writes: vec![ColumnWrite {
                column: "name".into(),
                assignment: Assignment::Set(Value::from("Dojo")),
            }],
            connects: vec![],
        };
        let insert = executor.insert_statement(club, &payload, true, false);
        assert_eq!(
            insert.sql,
            "INSERT INTO \"Club\" (\"name\") VALUES (?1) ON CONFLICT DO NOTHING"
        );

        let empty = executor.insert_statement(club, &CompiledPayload::default(), false, true);
        assert_eq!(empty.sql, "INSERT INTO \"Club\" DEFAULT VALUES RETURNING \"id\"");

        let defaults_only = executor.insert_statement(club, &CompiledPayload::default(), true, false);
        assert_eq!(defaults_only.sql, "INSERT INTO \"Club\" DEFAULT VALUES");

        let athlete = registry.entity("Athlete").unwrap();
        let payload = PayloadCompiler::new(&registry)
            .compile(athlete, &Data::new().increment("weight", 1.5), WriteMode::Update)
            .unwrap();
        let key = FilterCompiler::new(&registry)
            .compile_unique("Athlete", &UniqueWhere::by("id", 3))
            .unwrap();
        let update = executor.update_statement(athlete, &payload, &key.predicate(), true);
        assert_eq!(
            update.sql,
            "UPDATE \"Athlete\" AS \"t0\" SET \"weight\" = \"t0\".\"weight\" + ?1, \"updatedAt\" = ?2 \
             WHERE \"t0\".\"id\" = ?3 RETURNING \"id\""
        );
    }

    #[test]
    fn test_limited_keys_subquery() {
        let registry = registry();
        let executor = MutationExecutor::new(&registry, &SqliteDialect, 5);
        let entry = registry.entity("Entry").unwrap();
        let mut w = SqlWriter::new(&SqliteDialect);
        executor
            .render_limited_keys(
                &mut w,
                entry,
                Some(Filter::new().eq("status", "PENDING")),
                &[OrderBy::desc("createdAt")],
                10,
            )
            .unwrap();
        let statement = w.finish();
        assert_eq!(
            statement.sql,
            "(\"t0\".\"id\") IN (SELECT \"t0\".\"id\" AS \"id\" FROM \"Entry\" AS \"t0\" WHERE \
             (\"t0\".\"status\" = ?1) ORDER BY \"t0\".\"createdAt\" DESC, \"t0\".\"id\" ASC LIMIT 10)"
        );
    }

    #[test]
    fn test_limit_requires_order() {
        let registry = registry();
        let entry = registry.entity("Entry").unwrap();
        let err = require_order_for_limit(entry, Some(3), &[]).unwrap_err();
        assert!(matches!(err, Error::Mutation(MutationError::LimitWithoutOrder { .. })));
        assert!(require_order_for_limit(entry, None, &[]).is_ok());
    }
}
