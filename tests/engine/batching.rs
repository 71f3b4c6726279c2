//! Batching
//!
//! Writes are grouped `operation_limit` records per atomic operation.
//! A rejected chunk stops the batch; earlier chunks stay committed.

use crate::common::*;
use serde_json::json;
use std::collections::BTreeMap;

fn item(id: &str, n: i64) -> Record {
    rec(json!({ "id": id, "n": n }))
}

fn items(range: std::ops::RangeInclusive<i64>) -> Vec<Record> {
    range.map(|i| item(&format!("r{}", i), i)).collect()
}

async fn present(items: &driftkv::CrudManager, id: &str) -> bool {
    items
        .find_unique(FindManyArgs::new().where_(rec(json!({ "id": id }))))
        .await
        .unwrap()
        .is_some()
}

#[tokio::test]
async fn twenty_one_records_commit_in_three_groups() {
    let t = TestDrift::new();
    let items_table = t.items();

    let created = items_table.create_many(items(1..=21)).await.unwrap();
    assert_eq!(created.len(), 21);
    assert_eq!(t.store.commit_count(), 3);

    let mut by_version: BTreeMap<Version, usize> = BTreeMap::new();
    for record in &created {
        *by_version.entry(record.version).or_default() += 1;
    }
    assert_eq!(by_version.values().copied().collect::<Vec<_>>(), vec![10, 10, 1]);

    // returned versions are the stored ones
    let stored = items_table.find_many(FindManyArgs::new()).await.unwrap();
    assert_eq!(stored.len(), 21);
    for record in &stored {
        let returned = created
            .iter()
            .find(|c| c.value.get("id") == record.value.get("id"))
            .unwrap();
        assert_eq!(returned.version, record.version);
    }
}

#[tokio::test]
async fn conflict_in_second_chunk_keeps_the_first() {
    let t = TestDrift::new();
    let items_table = t.items();
    items_table.create(item("r15", 0)).await.unwrap();

    let err = items_table.create_many(items(1..=21)).await.unwrap_err();
    assert_eq!(
        err,
        DriftError::BatchOperation {
            operation: OperationKind::Create,
            chunk: 1,
            committed_chunks: 1,
        }
    );
    assert_eq!(t.store.commit_count(), 2);

    for i in 1..=10 {
        assert!(present(&items_table, &format!("r{}", i)).await, "r{}", i);
    }
    for i in (11..=14).chain(16..=21) {
        assert!(!present(&items_table, &format!("r{}", i)).await, "r{}", i);
    }

    // the pre-existing record is untouched
    let r15 = items_table
        .find_first(FindManyArgs::new().where_(rec(json!({"id": "r15"}))))
        .await
        .unwrap();
    assert_eq!(r15.value.get("n"), Some(&Value::Int(0)));
}

#[tokio::test]
async fn operation_limit_comes_from_config() {
    let t = TestDrift::with_config(DriftConfig {
        operation_limit: 4,
        ..DriftConfig::default()
    });
    let items_table = t.items();

    items_table.create_many(items(1..=9)).await.unwrap();
    assert_eq!(t.store.commit_count(), 3);

    let deleted = items_table.delete_many(Record::new()).await.unwrap();
    assert_eq!(deleted.len(), 9);
    assert_eq!(t.store.commit_count(), 6);
    assert!(t.store.is_empty());
}

#[tokio::test]
async fn empty_batches_do_not_commit() {
    let t = TestDrift::new();
    let items_table = t.items();

    assert!(items_table.create_many(Vec::new()).await.unwrap().is_empty());
    assert!(items_table
        .update_many(rec(json!({"n": 1})), rec(json!({"n": 2})))
        .await
        .unwrap()
        .is_empty());
    assert!(items_table
        .delete_many(rec(json!({"n": 1})))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(t.store.commit_count(), 0);
}

#[tokio::test]
async fn invalid_record_anywhere_aborts_before_writing() {
    let t = TestDrift::new();
    let items_table = t.items();

    let mut batch = items(1..=15);
    batch.push(rec(json!({"id": "bad", "n": "not a number"})));

    let err = items_table.create_many(batch).await.unwrap_err();
    assert_eq!(err.code(), "validation");
    assert_eq!(t.store.commit_count(), 0);
}
