//! MemoryStore contract tests
//!
//! Ordering, prefix isolation, commit versions and check semantics.

use crate::common::*;
use driftkv::{CommitOutcome, KeyPart, MemoryStoreOptions};
use futures::TryStreamExt;
use proptest::prelude::*;

fn key(parts: &[&str]) -> PhysicalKey {
    PhysicalKey::new(parts.iter().map(|p| KeyPart::from(*p)).collect())
}

async fn listed(store: &MemoryStore, prefix: &[&str]) -> Vec<PhysicalKey> {
    store
        .list(&key(prefix))
        .map_ok(|entry| entry.key)
        .try_collect()
        .await
        .unwrap()
}

// ============================================================================
// Prefixes and ordering
// ============================================================================

#[tokio::test]
async fn prefixes_match_whole_parts() {
    let store = MemoryStore::new();
    for parts in [
        ["user", "1"],
        ["user", "2"],
        ["user_by_unique_email", "a@x.com"],
        ["users", "9"],
    ] {
        store.set(key(&parts), Value::Int(1)).await.unwrap();
    }

    assert_eq!(
        listed(&store, &["user"]).await,
        vec![key(&["user", "1"]), key(&["user", "2"])]
    );
    assert_eq!(listed(&store, &["user_by_unique_email"]).await.len(), 1);
    assert!(listed(&store, &["use"]).await.is_empty());
}

#[tokio::test]
async fn mixed_part_types_order_by_type_first() {
    let store = MemoryStore::new();
    let int_key = PhysicalKey::new(vec!["t".into(), KeyPart::Int(-5)]);
    let str_key = key(&["t", "z"]);
    let bool_key = PhysicalKey::new(vec!["t".into(), KeyPart::Bool(false)]);
    for k in [&bool_key, &int_key, &str_key] {
        store.set(k.clone(), Value::Null).await.unwrap();
    }
    assert_eq!(listed(&store, &["t"]).await, vec![str_key, int_key, bool_key]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_list_is_sorted_and_scoped(ids in prop::collection::btree_set("[a-z0-9]{1,6}", 0..20)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = MemoryStore::new();
            for id in &ids {
                store.set(key(&["a", id.as_str()]), Value::Int(0)).await.unwrap();
                store.set(key(&["b", id.as_str()]), Value::Int(0)).await.unwrap();
            }
            let expected: Vec<PhysicalKey> = ids.iter().map(|id| key(&["a", id.as_str()])).collect();
            prop_assert_eq!(listed(&store, &["a"]).await, expected);
            Ok(())
        })?;
    }
}

// ============================================================================
// Versions and checks
// ============================================================================

#[tokio::test]
async fn versions_increase_per_commit_and_are_shared_within_one() {
    let store = MemoryStore::new();
    let v1 = store.set(key(&["k", "1"]), Value::Int(1)).await.unwrap();

    let mut op = store.atomic();
    op.set(key(&["k", "2"]), Value::Int(2))
        .set(key(&["k", "3"]), Value::Int(3));
    let v2 = op.commit().await.unwrap().version().unwrap();
    assert!(v2 > v1);

    let entries = store
        .get_many(&[key(&["k", "2"]), key(&["k", "3"])])
        .await
        .unwrap();
    assert!(entries.iter().all(|e| e.version == Some(v2)));
    assert_eq!(store.current_version(), v2);
    assert_eq!(store.commit_count(), 2);
}

#[tokio::test]
async fn failed_check_applies_nothing() {
    let store = MemoryStore::new();
    let v1 = store.set(key(&["k", "taken"]), Value::Int(1)).await.unwrap();

    let mut op = store.atomic();
    op.check(key(&["k", "fresh"]), None)
        .set(key(&["k", "fresh"]), Value::Int(2))
        .check(key(&["k", "taken"]), None)
        .set(key(&["k", "taken"]), Value::Int(3));
    assert!(matches!(op.commit().await.unwrap(), CommitOutcome::Rejected));

    assert!(!store.get(&key(&["k", "fresh"])).await.unwrap().is_present());
    let taken = store.get(&key(&["k", "taken"])).await.unwrap();
    assert_eq!(taken.value, Some(Value::Int(1)));
    assert_eq!(taken.version, Some(v1));
    assert_eq!(store.commit_count(), 1);
}

#[tokio::test]
async fn version_check_guards_against_concurrent_writes() {
    let store = MemoryStore::new();
    let k = key(&["k", "1"]);
    let v1 = store.set(k.clone(), Value::Int(1)).await.unwrap();
    store.set(k.clone(), Value::Int(2)).await.unwrap();

    let mut stale = store.atomic();
    stale.check(k.clone(), Some(v1)).set(k.clone(), Value::Int(3));
    assert!(matches!(stale.commit().await.unwrap(), CommitOutcome::Rejected));

    let current = store.get(&k).await.unwrap().version;
    let mut fresh = store.atomic();
    fresh.check(k.clone(), current).delete(k.clone());
    assert!(fresh.commit().await.unwrap().is_ok());
    assert!(store.is_empty());
}

#[tokio::test]
async fn only_one_of_two_racing_creates_wins() {
    let store = MemoryStore::new();
    let k = key(&["user_by_unique_email", "a@x.com"]);

    let attempts = (0..2).map(|i| {
        let store = store.clone();
        let k = k.clone();
        tokio::spawn(async move {
            let mut op = store.atomic();
            op.check(k.clone(), None).set(k, Value::Int(i));
            op.commit().await.unwrap().is_ok()
        })
    });
    let mut wins = 0;
    for handle in attempts.collect::<Vec<_>>() {
        if handle.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn oversized_atomic_operation_is_a_storage_error() {
    let store = MemoryStore::with_options(MemoryStoreOptions {
        max_atomic_operations: 3,
        ..MemoryStoreOptions::default()
    });

    let mut op = store.atomic();
    for i in 0..4 {
        op.set(key(&["k", &i.to_string()]), Value::Int(i));
    }
    let err = op.commit().await.unwrap_err();
    assert_eq!(err.code(), "storage");
    assert!(store.is_empty());
}
