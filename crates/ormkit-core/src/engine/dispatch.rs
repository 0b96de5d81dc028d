//! Routing of operations to the planners and executors.

use ormkit_proto::{FindArgs, Operation, OperationResult};

use super::Engine;
use crate::aggregate::AggregateExecutor;
use crate::driver::{Connection, Statement};
use crate::error::{Error, StorageError};
use crate::filter::FilterCompiler;
use crate::mutation::MutationExecutor;
use crate::query::{QueryExecutor, QueryPlanner};

/// Entity label used in error context for raw operations.
const RAW: &str = "<raw>";

impl Engine {
    /// Run `operation` on `conn`, inside whatever transaction the caller
    /// holds. Errors carry the operation and entity.
    pub(crate) async fn dispatch(
        &self,
        conn: &mut dyn Connection,
        operation: &Operation,
    ) -> Result<OperationResult, Error> {
        tracing::debug!(operation = %operation.kind(), entity = operation.entity().unwrap_or(RAW), "dispatch");
        self.dispatch_inner(conn, operation)
            .await
            .map_err(|err| err.in_operation(operation.kind(), operation.entity().unwrap_or(RAW)))
    }

    async fn dispatch_inner(
        &self,
        conn: &mut dyn Connection,
        operation: &Operation,
    ) -> Result<OperationResult, Error> {
        let registry = self.registry();
        let dialect = self.dialect();
        let depth = self.config().max_include_depth;

        let result = match operation {
            Operation::FindUnique { entity, args } => {
                let key = FilterCompiler::new(registry).compile_unique(entity, &args.unique)?;
                let plan = QueryPlanner::new(registry, depth).plan_unique(&key, &args.selection)?;
                OperationResult::Record(QueryExecutor::new(registry, dialect).fetch_one(conn, &plan).await?)
            }
            Operation::FindFirst { entity, args } => {
                let plan = QueryPlanner::new(registry, depth).plan(entity, &first_window(args))?;
                OperationResult::Record(QueryExecutor::new(registry, dialect).fetch_one(conn, &plan).await?)
            }
            Operation::FindMany { entity, args } => {
                let plan = QueryPlanner::new(registry, depth).plan(entity, args)?;
                OperationResult::Records(QueryExecutor::new(registry, dialect).fetch(conn, &plan).await?)
            }
            Operation::Create { entity, args } => OperationResult::Written(
                MutationExecutor::new(registry, dialect, depth).create(conn, entity, args).await?,
            ),
            Operation::CreateMany { entity, args } => OperationResult::Batch(
                MutationExecutor::new(registry, dialect, depth)
                    .create_many(conn, entity, args)
                    .await?,
            ),
            Operation::Update { entity, args } => OperationResult::Written(
                MutationExecutor::new(registry, dialect, depth).update(conn, entity, args).await?,
            ),
            Operation::UpdateMany { entity, args } => OperationResult::Batch(
                MutationExecutor::new(registry, dialect, depth)
                    .update_many(conn, entity, args)
                    .await?,
            ),
            Operation::Upsert { entity, args } => OperationResult::Written(
                MutationExecutor::new(registry, dialect, depth).upsert(conn, entity, args).await?,
            ),
            Operation::Delete { entity, args } => OperationResult::Written(
                MutationExecutor::new(registry, dialect, depth).delete(conn, entity, args).await?,
            ),
            Operation::DeleteMany { entity, args } => OperationResult::Batch(
                MutationExecutor::new(registry, dialect, depth)
                    .delete_many(conn, entity, args)
                    .await?,
            ),
            Operation::Aggregate { entity, args } => OperationResult::Aggregate(
                AggregateExecutor::new(registry, dialect, depth)
                    .aggregate(conn, entity, args)
                    .await?,
            ),
            Operation::GroupBy { entity, args } => OperationResult::Groups(
                AggregateExecutor::new(registry, dialect, depth)
                    .group_by(conn, entity, args)
                    .await?,
            ),
            Operation::Count { entity, args } => OperationResult::Count(
                AggregateExecutor::new(registry, dialect, depth).count(conn, entity, args).await?,
            ),
            Operation::QueryRaw { sql, params } => {
                OperationResult::Rows(conn.query(&Statement::new(sql.clone(), params.clone())).await?)
            }
            Operation::ExecuteRaw { sql, params } => {
                OperationResult::Affected(conn.execute(&Statement::new(sql.clone(), params.clone())).await?)
            }
        };
        Ok(result)
    }
}

/// `findFirst` window: one record, from the end when `take` is negative.
fn first_window(args: &FindArgs) -> FindArgs {
    let mut args = args.clone();
    args.take = Some(match args.take {
        Some(take) if take < 0 => -1,
        _ => 1,
    });
    args
}

/// Error for a result variant that does not match the operation.
pub(crate) fn unexpected(operation: &str, result: &OperationResult) -> Error {
    StorageError::Backend(format!("unexpected result for {operation}: {result:?}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_window() {
        assert_eq!(first_window(&FindArgs::new()).take, Some(1));
        assert_eq!(first_window(&FindArgs::new().with_take(10)).take, Some(1));
        assert_eq!(first_window(&FindArgs::new().with_take(-4)).take, Some(-1));
    }
}
