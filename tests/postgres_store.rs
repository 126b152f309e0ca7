//! PostgreSQL backend tests
//!
//! Need a running database: `DATABASE_URL=postgres://... cargo test -- --ignored`

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use smartlibrary_inventory::{
    config::{StoreBackend, StoreConfig},
    models::NewBook,
    store::{self, Document, DocumentStore, Filter, PgDocumentStore, StoreError, Update},
    AppConfig, Services,
};

async fn connect() -> PgDocumentStore {
    let config = StoreConfig {
        backend: StoreBackend::Postgres,
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
        ..StoreConfig::default()
    };
    let store = PgDocumentStore::connect(&config).await.expect("Failed to connect");
    store.migrate().await.expect("Failed to run migrations");
    store
}

/// Collection name unique to one test run
fn scratch(name: &str) -> String {
    format!("test_{}.{}", Uuid::new_v4().simple(), name)
}

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_insert_find_and_duplicate() {
    let store = connect().await;
    let books = scratch("Books");

    store
        .insert_one(&books, "b1", doc(json!({"book_id": "b1", "book_status": true})))
        .await
        .unwrap();
    let err = store
        .insert_one(&books, "b1", doc(json!({"book_id": "b1"})))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Duplicate { .. }));

    let found = store.find_one(&books, &Filter::by("book_status", true)).await.unwrap();
    assert_eq!(found.unwrap()["book_id"], "b1");
}

#[tokio::test]
#[ignore]
async fn test_nested_filters_and_updates() {
    let store = connect().await;
    let books = scratch("Books");
    for (id, title) in [("a", "Dune"), ("b", "Emma"), ("c", "Dune")] {
        store
            .insert_one(
                &books,
                id,
                doc(json!({"book_id": id, "inventory_ref": {"book_name": title, "count": 1}})),
            )
            .await
            .unwrap();
    }

    let matched = store
        .update_many(
            &books,
            &Filter::by("inventory_ref.book_name", "Dune"),
            &Update::new().set("inventory_ref", json!({"book_name": "Dune", "count": 2})),
        )
        .await
        .unwrap();
    assert_eq!(matched, 2);
    assert_eq!(
        store.count(&books, &Filter::by("inventory_ref.count", 2)).await.unwrap(),
        2
    );

    let deleted = store.delete_one(&books, &Filter::by("book_id", "b")).await.unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(store.find_many(&books, &Filter::new()).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore]
async fn test_guarded_decrement_and_null_filter() {
    let store = connect().await;
    let inventory = scratch("BookInventory");
    store
        .insert_one(&inventory, "i", doc(json!({"book_name": "Dune", "count": 1, "closed": null})))
        .await
        .unwrap();

    let guarded = Filter::by("book_name", "Dune").gt("count", 0);
    let dec = Update::new().inc("count", -1);
    let first = store.find_one_and_update(&inventory, &guarded, &dec).await.unwrap();
    assert_eq!(first.unwrap()["count"], 0);
    assert!(store.find_one_and_update(&inventory, &guarded, &dec).await.unwrap().is_none());

    assert_eq!(store.count(&inventory, &Filter::by("closed", Value::Null)).await.unwrap(), 1);
    assert_eq!(store.count(&inventory, &Filter::by("absent", Value::Null)).await.unwrap(), 1);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_upserts_create_one_document() {
    let store = Arc::new(connect().await);
    let inventory = scratch("BookInventory");

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..10 {
        let store = store.clone();
        let inventory = inventory.clone();
        tasks.spawn(async move {
            store
                .upsert_one(
                    &inventory,
                    &Filter::by("book_name", "Dune"),
                    &Update::new().inc("count", 1),
                    doc(json!({"author": "Herbert"})),
                )
                .await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let all = store.find_many(&inventory, &Filter::new()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["count"], 10);
}

#[tokio::test]
#[ignore]
async fn test_services_over_postgres() {
    let mut config = AppConfig::default();
    config.store.backend = StoreBackend::Postgres;
    config.store.url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    config.store.namespace = format!("test_{}", Uuid::new_v4().simple());

    let services = Services::from_store(store::open(&config.store).await.unwrap(), &config);
    services
        .inventory
        .add_book(NewBook::new("b1", "Dune", "Herbert", "SF"))
        .await
        .unwrap();
    services
        .inventory
        .add_book(NewBook::new("b2", "Dune", "Herbert", "SF"))
        .await
        .unwrap();
    services.inventory.delete_book("b1").await.unwrap();

    let report = services.inventory.check_consistency("Dune").await.unwrap();
    assert!(report.is_consistent(), "{:?}", report);
    assert_eq!(report.recorded_count, 1);
}
