//! Aggregation integration tests: aggregate, count and groupBy.

mod common;

use chrono::{TimeZone, Utc};
use common::TestContext;
use ormkit_core::proto::{
    AggregateFunction, AggregateRecord, Aggregation, Filter, GroupByArgs, GroupRecord,
    OperationResult, Value,
};
use ormkit_core::{Error, QueryError};
use pretty_assertions::assert_eq;
use serde_json::json;

fn aggregate(result: OperationResult) -> AggregateRecord {
    match result {
        OperationResult::Aggregate(record) => record,
        other => panic!("expected an aggregate, got {other:?}"),
    }
}

fn groups(result: OperationResult) -> Vec<GroupRecord> {
    match result {
        OperationResult::Groups(groups) => groups,
        other => panic!("expected groups, got {other:?}"),
    }
}

#[tokio::test]
async fn test_aggregate_functions() {
    let ctx = TestContext::seeded().await;

    let record = aggregate(
        ctx.run(
            "Athlete",
            "aggregate",
            json!({
                "_count": { "_all": true, "weight": true },
                "_sum": { "weight": true },
                "_avg": { "weight": true },
                "_max": { "weight": true },
                "_min": { "birthDate": true }
            }),
        )
        .await
        .unwrap(),
    );

    assert_eq!(record.get(AggregateFunction::Count, None), Some(&Value::Int(5)));
    // Null weights are not counted.
    assert_eq!(record.get(AggregateFunction::Count, Some("weight")), Some(&Value::Int(4)));
    assert_eq!(record.get(AggregateFunction::Sum, Some("weight")), Some(&Value::Float(275.0)));
    assert_eq!(record.get(AggregateFunction::Avg, Some("weight")), Some(&Value::Float(68.75)));
    assert_eq!(record.get(AggregateFunction::Max, Some("weight")), Some(&Value::Float(81.0)));
    assert_eq!(
        record.get(AggregateFunction::Min, Some("birthDate")),
        Some(&Value::DateTime(Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap()))
    );
}

#[tokio::test]
async fn test_aggregate_over_empty_set() {
    let ctx = TestContext::seeded().await;

    let record = aggregate(
        ctx.run(
            "Athlete",
            "aggregate",
            json!({ "where": { "firstName": "Zed" }, "_count": { "_all": true }, "_sum": { "weight": true } }),
        )
        .await
        .unwrap(),
    );
    assert_eq!(record.get(AggregateFunction::Count, None), Some(&Value::Int(0)));
    assert_eq!(record.get(AggregateFunction::Sum, Some("weight")), Some(&Value::Null));
}

#[tokio::test]
async fn test_count_with_filter_and_window() {
    let ctx = TestContext::seeded().await;

    assert_eq!(ctx.count("Athlete", json!({ "where": { "gender": "FEMALE" } })).await, 2);
    assert_eq!(ctx.count("Athlete", json!({ "skip": 1, "take": 2 })).await, 2);
    assert_eq!(ctx.count("Athlete", json!({ "skip": 4, "take": 10 })).await, 1);

    let delegate = ctx.engine.entity("Athlete").unwrap();
    let count = delegate
        .count(ormkit_core::proto::CountArgs::new().with_filter(Filter::new().eq("belt", "BLACK")))
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_group_by_with_having() {
    let ctx = TestContext::seeded().await;

    let result = groups(
        ctx.run(
            "Athlete",
            "groupBy",
            json!({
                "by": "clubId",
                "_count": { "_all": true },
                "_avg": { "weight": true },
                "having": { "weight": { "_avg": { "gt": 65 } } }
            }),
        )
        .await
        .unwrap(),
    );

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].key("clubId"), Some(&Value::Int(1)));
    assert_eq!(result[0].get(AggregateFunction::Count, None), Some(&Value::Int(3)));
}

#[tokio::test]
async fn test_group_by_order_by_count() {
    let ctx = TestContext::seeded().await;

    let result = groups(
        ctx.run(
            "Athlete",
            "groupBy",
            json!({
                "by": ["gender"],
                "_count": { "_all": true },
                "orderBy": { "_count": { "_all": "desc" } }
            }),
        )
        .await
        .unwrap(),
    );

    let keys: Vec<&str> = result
        .iter()
        .map(|g| g.key("gender").and_then(Value::as_str).unwrap())
        .collect();
    assert_eq!(keys, vec!["MALE", "FEMALE"]);
    assert_eq!(result[0].get(AggregateFunction::Count, None), Some(&Value::Int(3)));
}

#[tokio::test]
async fn test_group_by_rejects_invalid_shapes() {
    let ctx = TestContext::seeded().await;

    let err = ctx
        .run("Athlete", "groupBy", json!({ "by": [] }))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), Error::Query(QueryError::EmptyBy)));

    let err = ctx
        .run(
            "Athlete",
            "groupBy",
            json!({ "by": "clubId", "having": { "gender": "MALE" } }),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err.root(),
        Error::Query(QueryError::UngroupedField { field, .. }) if field == "gender"
    ));

    let err = ctx
        .run("Athlete", "aggregate", json!({ "_avg": { "firstName": true } }))
        .await
        .unwrap_err();
    assert!(matches!(
        err.root(),
        Error::Query(QueryError::InvalidAggregate { field, .. }) if field == "firstName"
    ));
}

#[tokio::test]
async fn test_delegate_group_by() {
    let ctx = TestContext::seeded().await;
    let entries = ctx.engine.entity("Entry").unwrap();

    let result = entries
        .group_by(GroupByArgs::new(vec!["divisionId".to_string()]).with_aggregation(Aggregation::count()))
        .await
        .unwrap();
    let counts: Vec<(i64, i64)> = result
        .iter()
        .map(|g| {
            (
                g.key("divisionId").and_then(Value::as_i64).unwrap(),
                g.get(AggregateFunction::Count, None).and_then(Value::as_i64).unwrap(),
            )
        })
        .collect();
    assert_eq!(counts, vec![(1, 2), (2, 2)]);
}
