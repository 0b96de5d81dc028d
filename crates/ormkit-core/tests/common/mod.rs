//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use ormkit_core::config::DEFAULT_POOL_SIZE;
use ormkit_core::proto::json::parse_operation;
use ormkit_core::proto::{EntityRecord, OperationKind, OperationResult, Value};
use ormkit_core::{Engine, EngineConfig, Error, SchemaRegistry, SqliteConfig, SqliteDriver};
use serde_json::{json, Value as Json};

pub const TOURNAMENT_SCHEMA: &str = include_str!("../../../../schemas/tournament.json");

pub struct TestContext {
    pub engine: Engine,
    _dir: tempfile::TempDir,
}

impl TestContext {
    /// A fresh file-backed database with the tournament schema pushed.
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default(), DEFAULT_POOL_SIZE).await
    }

    pub async fn with_config(config: EngineConfig, pool_size: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::from_json(TOURNAMENT_SCHEMA).unwrap();
        let driver = SqliteDriver::new(
            SqliteConfig::new(dir.path().join("tournament.db")).with_pool_size(pool_size),
        );
        let engine = Engine::new(registry, driver, config);
        engine.push_schema().await.unwrap();
        Self { engine, _dir: dir }
    }

    /// A seeded database; see [`Self::seed`].
    pub async fn seeded() -> Self {
        let ctx = Self::new().await;
        ctx.seed().await;
        ctx
    }

    /// Run an operation given as a JSON argument document.
    pub async fn run(&self, entity: &str, operation: &str, args: Json) -> Result<OperationResult, Error> {
        let kind: OperationKind = operation.parse().unwrap();
        let operation = parse_operation(entity, kind, &args).unwrap();
        self.engine.execute(operation).await
    }

    pub async fn find_many(&self, entity: &str, args: Json) -> Vec<EntityRecord> {
        records(self.run(entity, "findMany", args).await.unwrap())
    }

    pub async fn count(&self, entity: &str, args: Json) -> u64 {
        match self.run(entity, "count", args).await.unwrap() {
            OperationResult::Count(count) => count,
            other => panic!("expected a count, got {other:?}"),
        }
    }

    /// Two clubs, five athletes, one event with two divisions, three
    /// weight classes, four entries and one team of two.
    ///
    /// | id | athlete       | club | belt  | gender | weight |
    /// |----|---------------|------|-------|--------|--------|
    /// | 1  | Ada Lovelace  | 1    | BLACK | FEMALE | 58     |
    /// | 2  | Bo Jensen     | 1    | BLUE  | MALE   | 73     |
    /// | 3  | Cy Young      | 1    | WHITE | MALE   | 81     |
    /// | 4  | Di Prince     | 2    | BROWN | FEMALE | 63     |
    /// | 5  | Ed Norton     | 2    | GREEN | MALE   | null   |
    pub async fn seed(&self) {
        self.create_many(
            "Club",
            json!([
                { "name": "Ippon Dojo", "city": "Lyon" },
                { "name": "Tora Club" }
            ]),
        )
        .await;
        self.create_many(
            "Athlete",
            json!([
                { "clubId": 1, "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com",
                  "belt": "BLACK", "gender": "FEMALE", "birthDate": "1990-01-01T00:00:00Z", "weight": 58 },
                { "clubId": 1, "firstName": "Bo", "lastName": "Jensen", "email": "bo@example.com",
                  "belt": "BLUE", "gender": "MALE", "birthDate": "1995-05-05T00:00:00Z", "weight": 73 },
                { "clubId": 1, "firstName": "Cy", "lastName": "Young",
                  "belt": "WHITE", "gender": "MALE", "birthDate": "2000-02-02T00:00:00Z", "weight": 81 },
                { "clubId": 2, "firstName": "Di", "lastName": "Prince", "email": "di@example.com",
                  "belt": "BROWN", "gender": "FEMALE", "birthDate": "1992-03-03T00:00:00Z", "weight": 63 },
                { "clubId": 2, "firstName": "Ed", "lastName": "Norton",
                  "belt": "GREEN", "gender": "MALE", "birthDate": "1998-04-04T00:00:00Z" }
            ]),
        )
        .await;
        self.create_many(
            "Event",
            json!([{ "name": "Spring Open", "startsAt": "2024-06-01T09:00:00Z", "location": "Lyon" }]),
        )
        .await;
        self.create_many(
            "Division",
            json!([
                { "eventId": 1, "name": "Adults M", "gender": "MALE", "minAge": 18, "maxAge": 35 },
                { "eventId": 1, "name": "Adults F", "gender": "FEMALE", "minAge": 18, "maxAge": 35 }
            ]),
        )
        .await;
        self.create_many(
            "WeightClass",
            json!([
                { "divisionId": 1, "label": "-73", "minWeight": 66, "maxWeight": 73 },
                { "divisionId": 1, "label": "-81", "minWeight": 73, "maxWeight": 81 },
                { "divisionId": 2, "label": "-63", "minWeight": 57, "maxWeight": 63 }
            ]),
        )
        .await;
        self.create_many(
            "Entry",
            json!([
                { "athleteId": 2, "divisionId": 1, "weightClassId": 1 },
                { "athleteId": 3, "divisionId": 1, "weightClassId": 2 },
                { "athleteId": 1, "divisionId": 2, "weightClassId": 3 },
                { "athleteId": 4, "divisionId": 2, "weightClassId": 3 }
            ]),
        )
        .await;
        self.create_many("Team", json!([{ "clubId": 1, "name": "Juniors" }])).await;
        self.create_many(
            "TeamMember",
            json!([
                { "teamId": 1, "athleteId": 2, "captain": true },
                { "teamId": 1, "athleteId": 3 }
            ]),
        )
        .await;
    }

    async fn create_many(&self, entity: &str, data: Json) {
        let expected = data.as_array().map_or(0, Vec::len) as u64;
        match self.run(entity, "createMany", json!({ "data": data })).await.unwrap() {
            OperationResult::Batch(batch) => assert_eq!(batch.count, expected, "seeding {entity}"),
            other => panic!("expected a batch count, got {other:?}"),
        }
    }
}

pub fn records(result: OperationResult) -> Vec<EntityRecord> {
    match result {
        OperationResult::Records(records) => records,
        other => panic!("expected records, got {other:?}"),
    }
}

pub fn record(result: OperationResult) -> Option<EntityRecord> {
    match result {
        OperationResult::Record(record) => record,
        OperationResult::Written(record) => Some(record),
        other => panic!("expected a record, got {other:?}"),
    }
}

pub fn batch_count(result: OperationResult) -> u64 {
    match result {
        OperationResult::Batch(batch) => batch.count,
        other => panic!("expected a batch count, got {other:?}"),
    }
}

/// Integer values of `field`, in record order.
pub fn ints(records: &[EntityRecord], field: &str) -> Vec<i64> {
    records
        .iter()
        .map(|r| r.get(field).and_then(Value::as_i64).unwrap())
        .collect()
}

pub fn ids(records: &[EntityRecord]) -> Vec<i64> {
    ints(records, "id")
}

pub fn text<'r>(record: &'r EntityRecord, field: &str) -> &'r str {
    record.get(field).and_then(Value::as_str).unwrap()
}
