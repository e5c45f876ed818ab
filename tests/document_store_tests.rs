//! Document store end-to-end tests (spec.md §8 P1, P4, P7) against the
//! in-memory [`support::fake_document::FakeDocumentConnection`].

mod support;

use serde_json::json;
use storecraft::model::{Field, ModelSpec, SemanticType};
use storecraft::selector::parse_selector;
use storecraft::store::document::DocumentStore;
use storecraft::store::{Store, StoreOptions};
use storecraft::Record;

use support::fake_document::FakeDocumentConnection;

fn article_model() -> ModelSpec {
    ModelSpec::new("Article")
        .with_field(Field::new("title", SemanticType::String).build())
        .with_field(Field::new("views", SemanticType::Int).build())
        .with_field(Field::new("draft_notes", SemanticType::String).disable_on_document().build())
}

async fn store() -> DocumentStore<FakeDocumentConnection> {
    let store = DocumentStore::new(FakeDocumentConnection::new());
    store.register(&[article_model()]).await.unwrap();
    store
}

#[tokio::test]
async fn round_trip_insert_and_find() {
    let store = store().await;
    let item = Record::from_map(json!({"title": "Hello", "views": 10}).as_object().unwrap().clone());
    let inserted = store.insert("Article", vec![item], &StoreOptions::default()).await.unwrap();
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].get("title").unwrap(), "Hello");
    assert!(inserted[0].get("_id").is_some());

    let selector = parse_selector(&json!({"title": "Hello"})).unwrap();
    let found = store.find("Article", Some(&selector), &StoreOptions::default()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("views").unwrap(), 10);
}

#[tokio::test]
async fn and_matches_intersection_or_matches_union() {
    let store = store().await;
    store
        .insert(
            "Article",
            vec![
                Record::from_map(json!({"title": "A", "views": 5}).as_object().unwrap().clone()),
                Record::from_map(json!({"title": "B", "views": 50}).as_object().unwrap().clone()),
                Record::from_map(json!({"title": "C", "views": 500}).as_object().unwrap().clone()),
            ],
            &StoreOptions::default(),
        )
        .await
        .unwrap();

    let and_selector = parse_selector(&json!({"$and": [{"views": {"$gt": 10}}, {"views": {"$lt": 100}}]})).unwrap();
    let and_result = store.find("Article", Some(&and_selector), &StoreOptions::default()).await.unwrap();
    assert_eq!(and_result.len(), 1);
    assert_eq!(and_result[0].get("title").unwrap(), "B");

    let or_selector = parse_selector(&json!({"$or": [{"views": 5}, {"views": 500}]})).unwrap();
    let mut or_result = store.find("Article", Some(&or_selector), &StoreOptions::default()).await.unwrap();
    or_result.sort_by_key(|r| r.get("views").unwrap().as_i64().unwrap());
    assert_eq!(or_result.len(), 2);
    assert_eq!(or_result[0].get("title").unwrap(), "A");
    assert_eq!(or_result[1].get("title").unwrap(), "C");
}

#[tokio::test]
async fn update_wraps_bare_dict_in_set() {
    let store = store().await;
    store
        .insert("Article", vec![Record::from_map(json!({"title": "Old", "views": 1}).as_object().unwrap().clone())], &StoreOptions::default())
        .await
        .unwrap();

    let selector = parse_selector(&json!({"title": "Old"})).unwrap();
    let mut updates = Record::new();
    updates.set("title", "New");
    let updated = store.update("Article", Some(&selector), updates, &StoreOptions::default()).await.unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].get("title").unwrap(), "New");
    assert_eq!(updated[0].get("views").unwrap(), 1);
}

#[tokio::test]
async fn disabled_field_absent_from_document_records() {
    let store = store().await;
    let inserted = store
        .insert(
            "Article",
            vec![Record::from_map(json!({"title": "X", "draft_notes": "secret"}).as_object().unwrap().clone())],
            &StoreOptions::default(),
        )
        .await
        .unwrap();
    assert!(inserted[0].get("draft_notes").is_none());

    let selector = parse_selector(&json!({"draft_notes": "secret"})).unwrap();
    let result = store.find("Article", Some(&selector), &StoreOptions::default()).await;
    assert!(result.is_err());
}
