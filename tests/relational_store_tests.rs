//! Relational store end-to-end tests (spec.md §8 P1, P5, P6, P7) against a
//! real in-memory SQLite database via the `sqlx` adapter — a raw-SQL driver
//! trait has no useful hand-rolled fake, so these exercise the concrete
//! adapter instead of a stand-in.

use serde_json::json;
use storecraft::model::{Cardinality, Field, ModelSpec, Relation, SemanticType};
use storecraft::selector::parse_selector;
use storecraft::store::relational::sqlx_adapter::SqlxRelationalConnection;
use storecraft::store::relational::RelationalStore;
use storecraft::store::{Store, StoreOptions};
use storecraft::Record;

async fn library_store() -> RelationalStore<SqlxRelationalConnection> {
    let connection = SqlxRelationalConnection::connect("sqlite::memory:").await.unwrap();
    let store = RelationalStore::new(connection);

    let book = ModelSpec::new("Book")
        .with_field(Field::new("title", SemanticType::String).indexed().build())
        .with_field(Field::new("available", SemanticType::Bool).build());

    let library = ModelSpec::new("Library")
        .with_field(Field::new("name", SemanticType::String).indexed().build())
        .with_relation(Relation::new("books", Cardinality::Many, "Book").cascade_delete().build());

    store.register(&[book, library]).await.unwrap();
    store
}

#[tokio::test]
async fn round_trip_insert_and_find() {
    let store = library_store().await;
    let item = Record::from_map(
        json!({ "name": "Central", "books": [{"title": "Dune", "available": true}] })
            .as_object()
            .unwrap()
            .clone(),
    );

    let inserted = store.insert("Library", vec![item], &StoreOptions::default()).await.unwrap();
    assert_eq!(inserted.len(), 1);
    let id = inserted[0].get("id").cloned().unwrap();

    let selector = parse_selector(&json!({ "id": id })).unwrap();
    let found = store.find("Library", Some(&selector), &StoreOptions::default()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("name").unwrap(), "Central");
    let books = found[0].get("books").unwrap().as_array().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].get("title").unwrap(), "Dune");
}

#[tokio::test]
async fn join_across_relation_excludes_libraries_without_matching_children() {
    let store = library_store().await;
    let with_match = json!({ "name": "HasMatch", "books": [{"title": "Dune", "available": true}] });
    let without_match = json!({ "name": "NoMatch", "books": [{"title": "Hidden", "available": false}] });
    store
        .insert(
            "Library",
            vec![
                Record::from_map(with_match.as_object().unwrap().clone()),
                Record::from_map(without_match.as_object().unwrap().clone()),
            ],
            &StoreOptions::default(),
        )
        .await
        .unwrap();

    let selector = parse_selector(&json!({ "books.title": "Dune" })).unwrap();
    let found = store.find("Library", Some(&selector), &StoreOptions::default()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("name").unwrap(), "HasMatch");
}

#[tokio::test]
async fn update_replaces_relation_children() {
    let store = library_store().await;
    let inserted = store
        .insert(
            "Library",
            vec![Record::from_map(
                json!({ "name": "Central", "books": [{"title": "Old", "available": true}] })
                    .as_object()
                    .unwrap()
                    .clone(),
            )],
            &StoreOptions::default(),
        )
        .await
        .unwrap();
    let id = inserted[0].get("id").cloned().unwrap();

    let selector = parse_selector(&json!({ "id": id })).unwrap();
    let mut updates = Record::new();
    updates.set("books", json!([{ "title": "New", "available": false }]));
    let updated = store
        .update("Library", Some(&selector), updates, &StoreOptions::default())
        .await
        .unwrap();

    assert_eq!(updated.len(), 1);
    let books = updated[0].get("books").unwrap().as_array().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].get("title").unwrap(), "New");
}

#[tokio::test]
async fn delete_returns_pre_image_and_removes_rows() {
    let store = library_store().await;
    let inserted = store
        .insert(
            "Library",
            vec![Record::from_map(json!({ "name": "Central", "books": [] }).as_object().unwrap().clone())],
            &StoreOptions::default(),
        )
        .await
        .unwrap();
    let id = inserted[0].get("id").cloned().unwrap();

    let selector = parse_selector(&json!({ "id": id })).unwrap();
    let removed = store.delete("Library", Some(&selector), &StoreOptions::default()).await.unwrap();
    assert_eq!(removed.len(), 1);

    let after = store.find("Library", Some(&selector), &StoreOptions::default()).await.unwrap();
    assert!(after.is_empty());
}

#[tokio::test]
async fn regex_selector_matches_via_installed_sqlite_function() {
    let store = library_store().await;
    store
        .insert(
            "Library",
            vec![
                Record::from_map(json!({ "name": "Central", "books": [] }).as_object().unwrap().clone()),
                Record::from_map(json!({ "name": "Annex", "books": [] }).as_object().unwrap().clone()),
            ],
            &StoreOptions::default(),
        )
        .await
        .unwrap();

    let selector = parse_selector(&json!({ "name": { "$regex": "^Cent" } })).unwrap();
    let found = store.find("Library", Some(&selector), &StoreOptions::default()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("name").unwrap(), "Central");
}

#[tokio::test]
async fn disabled_field_is_absent_from_relational_records() {
    let connection = SqlxRelationalConnection::connect("sqlite::memory:").await.unwrap();
    let store = RelationalStore::new(connection);
    let model = ModelSpec::new("Secret")
        .with_field(Field::new("title", SemanticType::String).build())
        .with_field(Field::new("internal_note", SemanticType::String).disable_on_relational().build());
    store.register(&[model]).await.unwrap();

    let inserted = store
        .insert(
            "Secret",
            vec![Record::from_map(json!({ "title": "x", "internal_note": "hidden" }).as_object().unwrap().clone())],
            &StoreOptions::default(),
        )
        .await
        .unwrap();
    assert!(inserted[0].get("internal_note").is_none());

    let selector = parse_selector(&json!({ "internal_note": "hidden" })).unwrap();
    let result = store.find("Secret", Some(&selector), &StoreOptions::default()).await;
    assert!(result.is_err());
}
