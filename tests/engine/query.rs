//! Query Shaping
//!
//! Matching semantics (dates, "in" lists) and the result pipeline:
//! distinct, order, cursor, skip/take and select.

use crate::common::*;
use serde_json::json;

const NEW_YEAR_SECS: u64 = 1_704_067_200;

fn event_schema() -> Schema {
    Schema::builder()
        .primary("id", FieldKind::String)
        .index("day", FieldKind::Timestamp)
        .optional("at", FieldKind::Timestamp)
        .field("score", FieldKind::Int)
        .optional("tag", FieldKind::String)
        .build()
        .unwrap()
}

async fn seeded() -> (TestDrift, std::sync::Arc<driftkv::CrudManager>) {
    let t = TestDrift::new();
    let events = t
        .drift
        .register(EntityDef::new("event", event_schema()))
        .unwrap();

    let tags = ["a", "b", "a", "c", "b", "a", "c"];
    let records = (1..=7usize)
        .map(|i| {
            let day = if i % 2 == 0 {
                "2024-01-01T00:00:00Z"
            } else {
                "2024-01-02T00:00:00Z"
            };
            rec(json!({
                "id": format!("e{}", i),
                "day": day,
                "score": i,
                "tag": tags[i - 1],
            }))
        })
        .collect();
    events.create_many(records).await.unwrap();
    (t, events)
}

fn ids(records: &[VersionedRecord]) -> Vec<String> {
    records.iter().map(|r| field_str(r, "id")).collect()
}

// ============================================================================
// Matching
// ============================================================================

#[tokio::test]
async fn dates_match_by_instant() {
    let t = TestDrift::new();
    let events = t
        .drift
        .register(EntityDef::new("event", event_schema()))
        .unwrap();
    events
        .create(rec(json!({
            "id": "e1",
            "day": "2024-01-01T00:00:00Z",
            "at": "2024-01-01T01:00:00+01:00",
            "score": 1,
        })))
        .await
        .unwrap();

    // Same instant, different spelling, on a plain field
    let found = events
        .find_many(FindManyArgs::new().where_(rec(json!({"at": "2024-01-01T00:00:00.000Z"}))))
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["e1"]);

    // Timestamp values and strings both resolve through the index
    let mut by_value = Record::new();
    by_value.insert(
        "day".to_string(),
        Value::Timestamp(Timestamp::from_secs(NEW_YEAR_SECS)),
    );
    assert_eq!(
        events
            .find_many(FindManyArgs::new().where_(by_value))
            .await
            .unwrap()
            .len(),
        1
    );
    let by_string = rec(json!({"day": "2024-01-01T02:00:00+02:00"}));
    assert_eq!(
        events
            .find_many(FindManyArgs::new().where_(by_string))
            .await
            .unwrap()
            .len(),
        1
    );

    let other_day = rec(json!({"day": "2024-01-02T00:00:00Z"}));
    assert!(events
        .find_many(FindManyArgs::new().where_(other_day))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn stored_dates_come_back_as_timestamps() {
    let (_t, events) = seeded().await;
    let e2 = events
        .find_first(FindManyArgs::new().where_(rec(json!({"id": "e2"}))))
        .await
        .unwrap();
    assert_eq!(
        e2.value.get("day"),
        Some(&Value::Timestamp(Timestamp::from_secs(NEW_YEAR_SECS)))
    );
}

#[tokio::test]
async fn array_expectation_means_in() {
    let (_t, events) = seeded().await;

    let mut found = events
        .find_many(FindManyArgs::new().where_(rec(json!({"score": [1, 3, 99]}))))
        .await
        .unwrap();
    found.sort_by_key(|r| field_str(r, "id"));
    assert_eq!(ids(&found), vec!["e1", "e3"]);

    // on the primary this is a multi-key point read
    let found = events
        .find_many(
            FindManyArgs::new()
                .where_(rec(json!({"id": ["e2", "e9", "e4"]})))
                .order_by("id", SortOrder::Asc),
        )
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["e2", "e4"]);

    let none = events
        .find_many(FindManyArgs::new().where_(rec(json!({"score": []}))))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn every_where_field_must_match() {
    let (_t, events) = seeded().await;
    let found = events
        .find_many(FindManyArgs::new().where_(rec(json!({
            "day": "2024-01-01T00:00:00Z",
            "tag": "b",
        }))))
        .await
        .unwrap();
    assert_eq!(ids(&found), vec!["e2"]);
    assert_eq!(
        events.count(Some(rec(json!({"tag": "a"})))).await.unwrap(),
        3
    );
    assert_eq!(events.count(None).await.unwrap(), 7);
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn skip_and_take_after_descending_sort() {
    let (_t, events) = seeded().await;
    let page = events
        .find_many(
            FindManyArgs::new()
                .order_by("score", SortOrder::Desc)
                .skip(2)
                .take(3),
        )
        .await
        .unwrap();
    assert_eq!(ids(&page), vec!["e5", "e4", "e3"]);
}

#[tokio::test]
async fn optional_sort_field_puts_records_without_it_last() {
    let (_t, events) = seeded().await;
    for (id, at) in [("e2", "2024-03-01T00:00:00Z"), ("e6", "2024-02-01T00:00:00Z")] {
        events
            .update(rec(json!({"id": id})), rec(json!({"at": at})))
            .await
            .unwrap();
    }

    let asc = events
        .find_many(
            FindManyArgs::new()
                .order_by("at", SortOrder::Asc)
                .order_by("score", SortOrder::Asc),
        )
        .await
        .unwrap();
    assert_eq!(ids(&asc), vec!["e6", "e2", "e1", "e3", "e4", "e5", "e7"]);

    let desc = events
        .find_many(FindManyArgs::new().order_by("at", SortOrder::Desc).take(3))
        .await
        .unwrap();
    assert_eq!(&ids(&desc)[..2], &["e2", "e6"]);
}

#[tokio::test]
async fn cursor_starts_after_the_named_record() {
    let (_t, events) = seeded().await;
    let page = events
        .find_many(
            FindManyArgs::new()
                .order_by("score", SortOrder::Asc)
                .cursor("e3")
                .take(2),
        )
        .await
        .unwrap();
    assert_eq!(ids(&page), vec!["e4", "e5"]);
}

#[tokio::test]
async fn distinct_keeps_first_of_each_tuple() {
    let (_t, events) = seeded().await;
    let page = events
        .find_many(
            FindManyArgs::new()
                .order_by("score", SortOrder::Asc)
                .distinct(["tag"]),
        )
        .await
        .unwrap();
    assert_eq!(ids(&page), vec!["e1", "e2", "e4"]);
}

#[tokio::test]
async fn select_projects_fields() {
    let (_t, events) = seeded().await;
    let page = events
        .find_many(
            FindManyArgs::new()
                .where_(rec(json!({"id": "e1"})))
                .select(["score", "missing"]),
        )
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].value, rec(json!({"score": 1})));
}

#[tokio::test]
async fn find_first_and_unique_need_a_where() {
    let (_t, events) = seeded().await;

    let err = events.find_first(FindManyArgs::new()).await.unwrap_err();
    assert_eq!(err.code(), "invalid_query");

    let err = events
        .find_unique(FindManyArgs::new().where_(Record::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_query");

    let err = events
        .find_first(FindManyArgs::new().where_(rec(json!({"id": "nope"}))))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn raw_listing_exposes_every_physical_key() {
    let (_t, events) = seeded().await;

    assert_eq!(events.list_table().await.unwrap().len(), 7);
    assert_eq!(
        events.list_table_with_index_prefixes(&[]).await.unwrap().len(),
        7
    );

    let prefix = events
        .codec()
        .index_prefix("day", &Value::Timestamp(Timestamp::from_secs(NEW_YEAR_SECS)))
        .unwrap();
    let entries = events
        .list_table_with_index_prefixes(&[prefix])
        .await
        .unwrap();
    assert_eq!(entries.len(), 3);
}
