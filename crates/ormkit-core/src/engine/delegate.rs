//! Per-entity operation surface.

use async_trait::async_trait;
use ormkit_proto::{
    AggregateArgs, AggregateRecord, BatchCount, CountArgs, CreateArgs, CreateManyArgs, DeleteArgs,
    DeleteManyArgs, EntityRecord, FindArgs, FindUniqueArgs, GroupByArgs, GroupRecord, Operation,
    OperationKind, OperationResult, UpdateArgs, UpdateManyArgs, UpsertArgs,
};

use super::dispatch::unexpected;
use crate::error::{Error, QueryError};
use crate::schema::SchemaRegistry;

/// Something that runs operations: the engine's pool or a pinned
/// transaction.
#[async_trait]
pub trait OperationRunner: Send + Sync {
    fn registry(&self) -> &SchemaRegistry;

    async fn execute(&self, operation: Operation) -> Result<OperationResult, Error>;
}

/// Operations on one entity, bound to a runner.
///
/// ```ignore
/// let athletes = engine.entity("Athlete")?;
/// let heavy = athletes
///     .find_many(FindArgs::new().with_filter(Filter::new().field("weight", FieldFilter::gt(90))))
///     .await?;
/// ```
pub struct Delegate<'a> {
    runner: &'a dyn OperationRunner,
    entity: String,
}

impl<'a> Delegate<'a> {
    pub(crate) fn new(runner: &'a dyn OperationRunner, entity: &str) -> Result<Self, Error> {
        let def = runner.registry().require(entity)?;
        Ok(Self {
            runner,
            entity: def.name.clone(),
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub async fn find_unique(&self, args: FindUniqueArgs) -> Result<Option<EntityRecord>, Error> {
        match self.run(|entity| Operation::FindUnique { entity, args }).await? {
            OperationResult::Record(record) => Ok(record),
            other => Err(unexpected("findUnique", &other)),
        }
    }

    /// Like [`Self::find_unique`], failing with `NotFound` when no record matches.
    pub async fn find_unique_or_throw(&self, args: FindUniqueArgs) -> Result<EntityRecord, Error> {
        self.find_unique(args)
            .await?
            .ok_or_else(|| self.not_found(OperationKind::FindUnique))
    }

    pub async fn find_first(&self, args: FindArgs) -> Result<Option<EntityRecord>, Error> {
        match self.run(|entity| Operation::FindFirst { entity, args }).await? {
            OperationResult::Record(record) => Ok(record),
            other => Err(unexpected("findFirst", &other)),
        }
    }

    pub async fn find_first_or_throw(&self, args: FindArgs) -> Result<EntityRecord, Error> {
        self.find_first(args)
            .await?
            .ok_or_else(|| self.not_found(OperationKind::FindFirst))
    }

    pub async fn find_many(&self, args: FindArgs) -> Result<Vec<EntityRecord>, Error> {
        match self.run(|entity| Operation::FindMany { entity, args }).await? {
            OperationResult::Records(records) => Ok(records),
            other => Err(unexpected("findMany", &other)),
        }
    }

    pub async fn create(&self, args: CreateArgs) -> Result<EntityRecord, Error> {
        self.written("create", |entity| Operation::Create { entity, args }).await
    }

    pub async fn create_many(&self, args: CreateManyArgs) -> Result<BatchCount, Error> {
        self.batch("createMany", |entity| Operation::CreateMany { entity, args }).await
    }

    pub async fn update(&self, args: UpdateArgs) -> Result<EntityRecord, Error> {
        self.written("update", |entity| Operation::Update { entity, args }).await
    }

    pub async fn update_many(&self, args: UpdateManyArgs) -> Result<BatchCount, Error> {
        self.batch("updateMany", |entity| Operation::UpdateMany { entity, args }).await
    }

    pub async fn upsert(&self, args: UpsertArgs) -> Result<EntityRecord, Error> {
        self.written("upsert", |entity| Operation::Upsert { entity, args }).await
    }

    pub async fn delete(&self, args: DeleteArgs) -> Result<EntityRecord, Error> {
        self.written("delete", |entity| Operation::Delete { entity, args }).await
    }

    pub async fn delete_many(&self, args: DeleteManyArgs) -> Result<BatchCount, Error> {
        self.batch("deleteMany", |entity| Operation::DeleteMany { entity, args }).await
    }

    pub async fn aggregate(&self, args: AggregateArgs) -> Result<AggregateRecord, Error> {
        match self.run(|entity| Operation::Aggregate { entity, args }).await? {
            OperationResult::Aggregate(record) => Ok(record),
            other => Err(unexpected("aggregate", &other)),
        }
    }

    pub async fn group_by(&self, args: GroupByArgs) -> Result<Vec<GroupRecord>, Error> {
        match self.run(|entity| Operation::GroupBy { entity, args }).await? {
            OperationResult::Groups(groups) => Ok(groups),
            other => Err(unexpected("groupBy", &other)),
        }
    }

    pub async fn count(&self, args: CountArgs) -> Result<u64, Error> {
        match self.run(|entity| Operation::Count { entity, args }).await? {
            OperationResult::Count(count) => Ok(count),
            other => Err(unexpected("count", &other)),
        }
    }

    async fn run(&self, build: impl FnOnce(String) -> Operation) -> Result<OperationResult, Error> {
        self.runner.execute(build(self.entity.clone())).await
    }

    async fn written(
        &self,
        name: &str,
        build: impl FnOnce(String) -> Operation,
    ) -> Result<EntityRecord, Error> {
        match self.run(build).await? {
            OperationResult::Written(record) => Ok(record),
            other => Err(unexpected(name, &other)),
        }
    }

    async fn batch(&self, name: &str, build: impl FnOnce(String) -> Operation) -> Result<BatchCount, Error> {
        match self.run(build).await? {
            OperationResult::Batch(count) => Ok(count),
            other => Err(unexpected(name, &other)),
        }
    }

    fn not_found(&self, operation: OperationKind) -> Error {
        Error::from(QueryError::NotFound {
            entity: self.entity.clone(),
        })
        .in_operation(operation, &self.entity)
    }
}
