//! Per-call deadline tests with a deliberately slow store

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use smartlibrary_inventory::{
    error::ErrorCode,
    models::NewBook,
    repository::Repository,
    services::inventory::InventoryService,
    store::{Document, DocumentStore, Filter, MemoryStore, StoreResult, Update},
    AppError,
};

/// Delegates to a memory store after sleeping on every call
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowStore {
    async fn pause(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

#[async_trait]
impl DocumentStore for SlowStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        self.pause().await;
        self.inner.find_one(collection, filter).await
    }

    async fn find_many(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        self.pause().await;
        self.inner.find_many(collection, filter).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.pause().await;
        self.inner.count(collection, filter).await
    }

    async fn insert_one(&self, collection: &str, id: &str, document: Document) -> StoreResult<()> {
        self.pause().await;
        self.inner.insert_one(collection, id, document).await
    }

    async fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<u64> {
        self.pause().await;
        self.inner.update_one(collection, filter, update).await
    }

    async fn update_many(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<u64> {
        self.pause().await;
        self.inner.update_many(collection, filter, update).await
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<Option<Document>> {
        self.pause().await;
        self.inner.find_one_and_update(collection, filter, update).await
    }

    async fn upsert_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        on_insert: Document,
    ) -> StoreResult<Document> {
        self.pause().await;
        self.inner.upsert_one(collection, filter, update, on_insert).await
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.pause().await;
        self.inner.delete_one(collection, filter).await
    }
}

fn inventory(delay: Duration, timeout: Duration) -> InventoryService {
    let store = SlowStore {
        inner: MemoryStore::new(),
        delay,
    };
    InventoryService::new(Repository::new(Arc::new(store), "SMLS", timeout))
}

#[tokio::test]
async fn test_slow_store_call_times_out() {
    let service = inventory(Duration::from_secs(5), Duration::from_millis(50));

    let err = service
        .add_book(NewBook::new("b1", "Dune", "Herbert", "SF"))
        .await
        .unwrap_err();

    match &err {
        AppError::Timeout { operation, after } => {
            assert_eq!(*operation, "find_one");
            assert_eq!(*after, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(err.is_store_failure());
    assert_eq!(err.code(), ErrorCode::Timeout);
}

#[tokio::test]
async fn test_calls_within_deadline_succeed() {
    let service = inventory(Duration::from_millis(1), Duration::from_secs(5));

    let outcome = service
        .add_book(NewBook::new("b1", "Dune", "Herbert", "SF"))
        .await
        .unwrap();
    assert!(outcome.is_created());
    assert_eq!(service.get_book_count("Dune").await.unwrap(), 1);
}
