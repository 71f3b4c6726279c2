//! CRUD Scenarios
//!
//! End-to-end create/find/update/delete behaviour:
//! - Round trip through the primary key
//! - Uniqueness enforcement across records
//! - Optimistic version checks on update and delete

use crate::common::*;
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Round trip
// ============================================================================

#[tokio::test]
async fn created_record_is_found_by_primary() {
    let t = TestDrift::new();
    let users = t.users();

    let created = users.create(user("1", "a@x.com", 30)).await.unwrap();
    let found = users
        .find_unique(FindManyArgs::new().where_(rec(json!({"id": "1"}))))
        .await
        .unwrap()
        .expect("record exists");

    assert_eq!(found, created);
}

#[tokio::test]
async fn every_access_path_returns_the_same_record() {
    let t = TestDrift::new();
    let users = t.users();
    let created = users.create(user("1", "a@x.com", 30)).await.unwrap();

    for where_ in [
        json!({"id": "1"}),
        json!({"email": "a@x.com"}),
        json!({"age": 30}),
        json!({"name": null, "id": ["1", "2"]}),
    ] {
        let found = users
            .find_many(FindManyArgs::new().where_(rec(where_.clone())))
            .await
            .unwrap();
        // `name: null` never matches a record without a name
        if where_.get("name").is_some() {
            assert!(found.is_empty(), "{}", where_);
        } else {
            assert_eq!(found, vec![created.clone()], "{}", where_);
        }
    }
}

fn round_trip_record() -> impl Strategy<Value = (String, String, i64, Option<String>)> {
    (
        "[a-z0-9]{1,12}",
        "[a-z]{1,8}@[a-z]{1,6}\\.com",
        0i64..150,
        prop::option::of("[A-Za-z ]{0,16}"),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_round_trip((id, email, age, name) in round_trip_record()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let t = TestDrift::new();
            let users = t.users();

            let mut input = user(&id, &email, age);
            if let Some(name) = &name {
                input.insert("name".to_string(), Value::from(name.as_str()));
            }
            let created = users.create(input.clone()).await.unwrap();
            let found = users
                .find_unique(FindManyArgs::new().where_(rec(json!({"id": id}))))
                .await
                .unwrap()
                .unwrap();

            prop_assert_eq!(&found.value, &input);
            prop_assert_eq!(found.version, created.version);
            Ok(())
        })?;
    }
}

// ============================================================================
// Uniqueness
// ============================================================================

#[tokio::test]
async fn duplicate_unique_value_is_a_batch_error() {
    let t = TestDrift::new();
    let users = t.users();

    users.create(user("1", "a@x.com", 30)).await.unwrap();
    let err = users.create(user("2", "a@x.com", 40)).await.unwrap_err();

    assert_eq!(
        err,
        DriftError::BatchOperation {
            operation: OperationKind::Create,
            chunk: 0,
            committed_chunks: 0,
        }
    );
    assert_eq!(err.exit_code(), 12);

    let by_age = users
        .find_many(FindManyArgs::new().where_(rec(json!({"age": 30}))))
        .await
        .unwrap();
    assert_eq!(by_age.len(), 1);
    assert_eq!(field_str(&by_age[0], "id"), "1");

    // the rejected record left nothing behind
    assert_eq!(users.count(None).await.unwrap(), 1);
    assert!(users
        .find_unique(FindManyArgs::new().where_(rec(json!({"id": "2"}))))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn duplicate_primary_is_a_batch_error() {
    let t = TestDrift::new();
    let users = t.users();

    users.create(user("1", "a@x.com", 30)).await.unwrap();
    let err = users.create(user("1", "b@x.com", 30)).await.unwrap_err();
    assert!(err.is_batch_failure());
}

#[tokio::test]
async fn duplicate_primary_within_one_create_many_commits_nothing() {
    let t = TestDrift::new();
    let users = t.users();

    let err = users
        .create_many(vec![user("1", "a@x.com", 30), user("1", "b@x.com", 40)])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DriftError::BatchOperation {
            operation: OperationKind::Create,
            chunk: 0,
            committed_chunks: 0,
        }
    );
    assert_eq!(t.store.commit_count(), 0);
    assert!(t.store.is_empty());
}

#[tokio::test]
async fn duplicate_unique_within_one_create_many_commits_nothing() {
    let t = TestDrift::new();
    let users = t.users();

    let err = users
        .create_many(vec![user("1", "a@x.com", 30), user("2", "a@x.com", 40)])
        .await
        .unwrap_err();
    assert!(err.is_batch_failure());
    assert!(t.store.is_empty());

    let by_email = users
        .find_many(FindManyArgs::new().where_(rec(json!({"email": "a@x.com"}))))
        .await
        .unwrap();
    assert!(by_email.is_empty());
}

#[tokio::test]
async fn duplicate_in_a_later_chunk_still_fails_before_any_commit() {
    let t = TestDrift::new();
    let users = t.users();

    let mut data: Vec<Record> = (0..11)
        .map(|i| user(&format!("u{}", i), &format!("{}@x.com", i), 20))
        .collect();
    data.push(user("late", "3@x.com", 20));

    let err = users.create_many(data).await.unwrap_err();
    assert_eq!(
        err,
        DriftError::BatchOperation {
            operation: OperationKind::Create,
            chunk: 1,
            committed_chunks: 0,
        }
    );
    assert_eq!(t.store.commit_count(), 0);
}

#[tokio::test]
async fn concrete_scenario_delete_then_find() {
    let t = TestDrift::new();
    let users = t.users();

    users.create(user("1", "a@x.com", 30)).await.unwrap();
    assert!(users.create(user("2", "a@x.com", 40)).await.is_err());

    let deleted = users.delete(rec(json!({"id": "1"}))).await.unwrap();
    assert_eq!(field_str(&deleted, "email"), "a@x.com");

    let found = users
        .find_unique(FindManyArgs::new().where_(rec(json!({"id": "1"}))))
        .await
        .unwrap();
    assert!(found.is_none());
    assert!(t.store.is_empty());

    let err = users.delete(rec(json!({"id": "1"}))).await.unwrap_err();
    assert!(err.is_not_found());
}

// ============================================================================
// Updates and version checks
// ============================================================================

#[tokio::test]
async fn update_many_touches_every_match() {
    let t = TestDrift::new();
    let users = t.users();
    users
        .create_many(vec![
            user("1", "a@x.com", 30),
            user("2", "b@x.com", 30),
            user("3", "c@x.com", 40),
        ])
        .await
        .unwrap();

    let updated = users
        .update_many(rec(json!({"age": 30})), rec(json!({"name": "thirty"})))
        .await
        .unwrap();
    assert_eq!(updated.len(), 2);

    let named = users
        .find_many(FindManyArgs::new().where_(rec(json!({"name": "thirty"}))))
        .await
        .unwrap();
    assert_eq!(named.len(), 2);
}

#[tokio::test]
async fn update_to_a_taken_unique_value_is_rejected() {
    let t = TestDrift::new();
    let users = t.users();
    users.create(user("1", "a@x.com", 30)).await.unwrap();
    users.create(user("2", "b@x.com", 30)).await.unwrap();

    let err = users
        .update(rec(json!({"id": "2"})), rec(json!({"email": "a@x.com"})))
        .await
        .unwrap_err();
    assert!(err.is_batch_failure());

    let two = users
        .find_first(FindManyArgs::new().where_(rec(json!({"id": "2"}))))
        .await
        .unwrap();
    assert_eq!(field_str(&two, "email"), "b@x.com");
}

#[tokio::test]
async fn update_many_cannot_give_two_records_one_unique_value() {
    let t = TestDrift::new();
    let users = t.users();
    users
        .create_many(vec![user("1", "a@x.com", 30), user("2", "b@x.com", 30)])
        .await
        .unwrap();
    let commits = t.store.commit_count();

    let err = users
        .update_many(rec(json!({"age": 30})), rec(json!({"email": "same@x.com"})))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DriftError::BatchOperation {
            operation: OperationKind::Update,
            chunk: 0,
            committed_chunks: 0,
        }
    );
    assert_eq!(t.store.commit_count(), commits);

    for (id, email) in [("1", "a@x.com"), ("2", "b@x.com")] {
        let found = users
            .find_first(FindManyArgs::new().where_(rec(json!({"id": id}))))
            .await
            .unwrap();
        assert_eq!(field_str(&found, "email"), email);
    }
}

#[tokio::test]
async fn concurrent_writer_fails_the_version_check() {
    let t = TestDrift::new();
    let users = t.users();
    users.create(user("1", "a@x.com", 30)).await.unwrap();

    // A second writer rewrites the primary key behind the engine's back
    let key = users.codec().primary_key(&Value::from("1")).unwrap();
    let stale = users
        .find_first(FindManyArgs::new().where_(rec(json!({"id": "1"}))))
        .await
        .unwrap();
    t.store
        .set(key.clone(), Value::Object(stale.value.clone()))
        .await
        .unwrap();

    // The unique key still carries the old version, the primary does not
    let err = users
        .update(rec(json!({"email": "a@x.com"})), rec(json!({"age": 31})))
        .await
        .unwrap_err();
    assert!(err.is_batch_failure());
}

#[tokio::test]
async fn validation_errors_surface_before_any_write() {
    let t = TestDrift::new();
    let users = t.users();

    let err = users
        .create(rec(json!({"id": "1", "email": "a@x.com"})))
        .await
        .unwrap_err();
    assert!(matches!(err, DriftError::Validation { field: Some(f), .. } if f == "age"));

    let err = users
        .create(rec(json!({"id": "1", "email": "a@x.com", "age": 1, "extra": true})))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation");
    assert_eq!(t.store.commit_count(), 0);
}
