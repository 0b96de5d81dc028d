//! Transaction coordinator integration tests: interactive transactions,
//! batches, deadlines, raw access and pool lifecycle.

mod common;

use std::time::{Duration, Instant};

use common::{record, text, TestContext};
use ormkit_core::proto::json::parse_operation;
use ormkit_core::proto::{
    CountArgs, CreateArgs, Data, Operation, OperationKind, OperationResult, Value,
};
use ormkit_core::{
    EngineConfig, Error, IsolationLevel, StorageError, TransactionError, TransactionOptions,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value as Json};

fn operation(entity: &str, kind: OperationKind, args: Json) -> Operation {
    parse_operation(entity, kind, &args).unwrap()
}

fn create_club(name: &str) -> Operation {
    operation("Club", OperationKind::Create, json!({ "data": { "name": name } }))
}

#[tokio::test]
async fn test_interactive_commit() {
    let ctx = TestContext::seeded().await;

    let name = ctx
        .engine
        .run_interactive(TransactionOptions::default(), |tx| async move {
            let clubs = tx.entity("Club")?;
            let club = clubs
                .create(CreateArgs::new(Data::new().set("name", "Kano Kai")))
                .await?;
            let athletes = tx.entity("Athlete")?;
            let moved = athletes
                .update_many(
                    ormkit_core::proto::UpdateManyArgs::new(Data::new().set(
                        "clubId",
                        club.get("id").cloned().unwrap_or(Value::Null),
                    ))
                    .with_filter(ormkit_core::proto::Filter::new().eq("clubId", 2)),
                )
                .await?;
            assert_eq!(moved.count, 2);
            Ok::<_, Error>(text(&club, "name").to_string())
        })
        .await
        .unwrap();

    assert_eq!(name, "Kano Kai");
    assert_eq!(ctx.count("Athlete", json!({ "where": { "club": { "is": { "name": "Kano Kai" } } } })).await, 2);
}

#[tokio::test]
async fn test_interactive_rollback_on_error() {
    let ctx = TestContext::seeded().await;

    let err = ctx
        .engine
        .run_interactive(TransactionOptions::default(), |tx| async move {
            tx.execute(create_club("Kano Kai")).await?;
            tx.execute(create_club("Tora Club")).await?;
            Ok::<_, Error>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err.root(), Error::Mutation(_)));
    assert_eq!(ctx.count("Club", json!({})).await, 2);
}

#[tokio::test]
async fn test_uncommitted_writes_are_invisible_outside() {
    let ctx = TestContext::seeded().await;
    let engine = ctx.engine.clone();

    let (inside, outside) = ctx
        .engine
        .run_interactive(TransactionOptions::default(), |tx| async move {
            tx.execute(create_club("Kano Kai")).await?;
            let inside = tx
                .entity("Club")?
                .count(CountArgs::new())
                .await?;
            let outside = engine.entity("Club")?.count(CountArgs::new()).await?;
            Ok::<_, Error>((inside, outside))
        })
        .await
        .unwrap();

    assert_eq!(inside, 3);
    assert_eq!(outside, 2);
    assert_eq!(ctx.count("Club", json!({})).await, 3);
}

#[tokio::test]
async fn test_interactive_timeout_rolls_back() {
    let ctx = TestContext::seeded().await;
    let options = TransactionOptions::default().with_timeout(Duration::from_millis(50));

    let err = ctx
        .engine
        .run_interactive(options, |tx| async move {
            tx.execute(create_club("Kano Kai")).await?;
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, Error>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Transaction(TransactionError::TimeoutExceeded { .. })
    ));
    assert_eq!(ctx.count("Club", json!({ "where": { "name": "Kano Kai" } })).await, 0);
}

#[tokio::test]
async fn test_client_is_closed_after_commit() {
    let ctx = TestContext::seeded().await;

    let client = ctx
        .engine
        .run_interactive(TransactionOptions::default(), |tx| async move {
            assert!(!tx.is_closed().await);
            Ok::<_, Error>(tx.clone())
        })
        .await
        .unwrap();

    assert!(client.is_closed().await);
    let err = client.execute(create_club("Kano Kai")).await.unwrap_err();
    assert!(matches!(err, Error::Transaction(TransactionError::Closed)));
}

#[tokio::test]
async fn test_isolation_levels() {
    let ctx = TestContext::new().await;

    let err = ctx
        .engine
        .run_interactive(
            TransactionOptions::default().with_isolation(IsolationLevel::ReadCommitted),
            |_tx| async move { Ok::<_, Error>(()) },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Transaction(TransactionError::UnsupportedIsolation { dialect: "sqlite", .. })
    ));

    ctx.engine
        .run_interactive(
            TransactionOptions::default().with_isolation(IsolationLevel::Serializable),
            |tx| async move {
                tx.execute(create_club("Kano Kai")).await?;
                Ok::<_, Error>(())
            },
        )
        .await
        .unwrap();
    assert_eq!(ctx.count("Club", json!({})).await, 1);
}

#[tokio::test]
async fn test_max_wait_exceeded_on_exhausted_pool() {
    let config = EngineConfig::default().with_transaction(
        TransactionOptions::default().with_max_wait(Duration::from_millis(100)),
    );
    let ctx = TestContext::with_config(config, 1).await;
    let engine = ctx.engine.clone();

    let inner = ctx
        .engine
        .run_interactive(TransactionOptions::default(), |_tx| async move {
            let inner = engine
                .execute(operation("Club", OperationKind::Count, json!({})))
                .await;
            Ok::<_, Error>(inner)
        })
        .await
        .unwrap();

    let err = inner.unwrap_err();
    assert!(matches!(
        err.root(),
        Error::Transaction(TransactionError::MaxWaitExceeded { .. })
    ));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_max_wait_bounds_write_lock_contention() {
    let ctx = TestContext::with_config(EngineConfig::default(), 4).await;
    let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();

    let holder = ctx
        .engine
        .run_interactive(TransactionOptions::default(), |tx| async move {
            tx.execute(create_club("Kano Kai")).await?;
            let _ = locked_tx.send(());
            tokio::time::sleep(Duration::from_millis(1000)).await;
            Ok::<_, Error>(())
        });

    let contender = async {
        locked_rx.await.unwrap();
        let started = Instant::now();
        let result = ctx
            .engine
            .run_interactive(
                TransactionOptions::default().with_max_wait(Duration::from_millis(100)),
                |tx| async move {
                    tx.execute(create_club("Tora Club")).await?;
                    Ok::<_, Error>(())
                },
            )
            .await;
        (result, started.elapsed())
    };

    let (held, (result, waited)) = tokio::join!(holder, contender);
    held.unwrap();
    let err = result.unwrap_err();
    assert!(matches!(
        err.root(),
        Error::Transaction(TransactionError::MaxWaitExceeded { .. })
    ));
    assert!(waited < Duration::from_millis(700), "waited {waited:?}");

    let names: Vec<String> = ctx
        .find_many("Club", json!({}))
        .await
        .iter()
        .map(|club| text(club, "name").to_string())
        .collect();
    assert_eq!(names, vec!["Kano Kai"]);
}

#[tokio::test]
async fn test_batch_results_in_order() {
    let ctx = TestContext::seeded().await;

    let results = ctx
        .engine
        .run_batch(vec![
            create_club("Kano Kai"),
            operation("Club", OperationKind::Count, json!({})),
            operation(
                "Athlete",
                OperationKind::UpdateMany,
                json!({ "where": { "clubId": 2 }, "data": { "belt": "BLACK" } }),
            ),
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    let club = record(results[0].clone()).unwrap();
    assert_eq!(text(&club, "name"), "Kano Kai");
    assert!(matches!(results[1], OperationResult::Count(3)));
    assert!(matches!(&results[2], OperationResult::Batch(batch) if batch.count == 2));
}

#[tokio::test]
async fn test_batch_is_atomic() {
    let ctx = TestContext::seeded().await;

    let err = ctx
        .engine
        .run_batch(vec![
            create_club("Kano Kai"),
            operation("Athlete", OperationKind::DeleteMany, json!({})),
            create_club("Tora Club"),
        ])
        .await;
    // The duplicate club name fails last; the earlier writes are undone.
    let err = err.unwrap_err();
    assert!(matches!(err.root(), Error::Mutation(_)));
    assert_eq!(ctx.count("Club", json!({})).await, 2);
    assert_eq!(ctx.count("Athlete", json!({})).await, 5);
    assert_eq!(ctx.count("Entry", json!({})).await, 4);
}

#[tokio::test]
async fn test_deadline() {
    let err = ormkit_core::Engine::with_deadline(Duration::from_millis(20), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok::<_, Error>(())
    })
    .await
    .unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded { .. }));

    let ctx = TestContext::seeded().await;
    let count = ormkit_core::Engine::with_deadline(Duration::from_secs(5), async {
        ctx.engine.entity("Athlete")?.count(CountArgs::new()).await
    })
    .await
    .unwrap();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn test_raw_access() {
    let ctx = TestContext::seeded().await;

    let rows = ctx
        .engine
        .query_raw(r#"SELECT "name" FROM "Club" WHERE "id" = ?"#, vec![Value::Int(1)])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::String("Ippon Dojo".to_string())));

    let affected = ctx
        .engine
        .execute_raw(
            r#"UPDATE "Club" SET "city" = ? WHERE "city" IS NULL"#,
            vec![Value::from("Kyoto")],
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!(ctx.count("Club", json!({ "where": { "city": "Kyoto" } })).await, 1);
}

#[tokio::test]
async fn test_disconnect() {
    let ctx = TestContext::seeded().await;
    ctx.engine.disconnect().await;

    let err = ctx
        .engine
        .execute(operation("Club", OperationKind::Count, json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), Error::Storage(StorageError::Disconnected)));
}
