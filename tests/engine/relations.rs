//! Relations
//!
//! Includes across tables through `Drift::relate`, nested includes and
//! their interaction with select and pagination.

use crate::common::*;
use driftkv::Relation;
use serde_json::json;

fn post_schema() -> Schema {
    Schema::builder()
        .primary("id", FieldKind::String)
        .index("authorId", FieldKind::String)
        .field("title", FieldKind::String)
        .build()
        .unwrap()
}

async fn blog() -> TestDrift {
    let t = TestDrift::new();
    let users = t.users();
    let posts = t
        .drift
        .register(EntityDef::new("post", post_schema()))
        .unwrap();

    t.drift
        .relate("user", Relation::one_to_many("posts", "post", "id", "authorId"))
        .unwrap();
    t.drift
        .relate("post", Relation::one_to_one("author", "user", "authorId", "id"))
        .unwrap();

    users.create(user("u1", "a@x.com", 30)).await.unwrap();
    users.create(user("u2", "b@x.com", 40)).await.unwrap();
    posts
        .create_many(vec![
            rec(json!({"id": "p1", "authorId": "u1", "title": "first"})),
            rec(json!({"id": "p2", "authorId": "u1", "title": "second"})),
            rec(json!({"id": "p3", "authorId": "u9", "title": "orphan"})),
        ])
        .await
        .unwrap();
    t
}

fn as_array(value: Option<&Value>) -> &[Value] {
    value.and_then(Value::as_array).expect("array relation")
}

#[tokio::test]
async fn one_to_many_collects_children() {
    let t = blog().await;
    let users = t.drift.entity("user").unwrap();

    let found = users
        .find_many(
            FindManyArgs::new()
                .order_by("id", SortOrder::Asc)
                .include("posts", FindManyArgs::new().order_by("title", SortOrder::Desc)),
        )
        .await
        .unwrap();

    let u1_posts = as_array(found[0].value.get("posts"));
    let titles: Vec<&str> = u1_posts
        .iter()
        .filter_map(|p| p.as_object()?.get("title")?.as_str())
        .collect();
    assert_eq!(titles, vec!["second", "first"]);
    assert!(as_array(found[1].value.get("posts")).is_empty());
}

#[tokio::test]
async fn one_to_one_is_an_object_or_null() {
    let t = blog().await;
    let posts = t.drift.entity("post").unwrap();

    let found = posts
        .find_many(
            FindManyArgs::new()
                .order_by("id", SortOrder::Asc)
                .include("author", FindManyArgs::new()),
        )
        .await
        .unwrap();

    let author = found[0].value.get("author").and_then(Value::as_object).unwrap();
    assert_eq!(author.get("email"), Some(&Value::from("a@x.com")));
    assert_eq!(found[2].value.get("author"), Some(&Value::Null));
}

#[tokio::test]
async fn includes_nest() {
    let t = blog().await;
    let posts = t.drift.entity("post").unwrap();

    let p1 = posts
        .find_first(
            FindManyArgs::new()
                .where_(rec(json!({"id": "p1"})))
                .include(
                    "author",
                    FindManyArgs::new().include("posts", FindManyArgs::new()),
                ),
        )
        .await
        .unwrap();

    let author = p1.value.get("author").and_then(Value::as_object).unwrap();
    assert_eq!(as_array(author.get("posts")).len(), 2);
}

#[tokio::test]
async fn include_survives_select_and_respects_its_own_args() {
    let t = blog().await;
    let users = t.drift.entity("user").unwrap();

    let u1 = users
        .find_first(
            FindManyArgs::new()
                .where_(rec(json!({"id": "u1"})))
                .select(["email"])
                .include(
                    "posts",
                    FindManyArgs::new()
                        .where_(rec(json!({"title": "first"})))
                        .select(["title"]),
                ),
        )
        .await
        .unwrap();

    assert_eq!(u1.value.len(), 2);
    let posts = as_array(u1.value.get("posts"));
    assert_eq!(posts.len(), 1);
    assert_eq!(
        posts[0].as_object().unwrap(),
        &rec(json!({"title": "first"}))
    );
}

#[tokio::test]
async fn undeclared_include_is_rejected() {
    let t = blog().await;
    let users = t.drift.entity("user").unwrap();

    let err = users
        .find_many(FindManyArgs::new().include("comments", FindManyArgs::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_query");
}

#[tokio::test]
async fn relate_checks_tables_and_fields() {
    let t = blog().await;

    let err = t
        .drift
        .relate("user", Relation::one_to_many("notes", "note", "id", "userId"))
        .unwrap_err();
    assert_eq!(err.code(), "schema_configuration");

    let err = t
        .drift
        .relate("user", Relation::one_to_many("email", "post", "id", "authorId"))
        .unwrap_err();
    assert_eq!(err.code(), "schema_configuration");
}
