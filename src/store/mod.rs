//! Generic document-store boundary
//!
//! The inventory layer only needs equality/threshold filters on named
//! (dotted) fields, `$set`/`$inc` style partial updates, an atomic upsert
//! and bulk "update everything matching" writes. Backends implement
//! [`DocumentStore`]; documents are plain JSON objects.

pub mod memory;
pub mod postgres;
pub mod query;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use query::{Condition, Filter, Update};

/// A stored document: a JSON object
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Errors raised by store backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document '{id}' already exists in {collection}")]
    Duplicate { collection: String, id: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Point and bulk operations over named collections.
///
/// Every call is atomic on its own; nothing spans calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document matching `filter`, if any
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;

    /// All documents matching `filter`, in insertion order
    async fn find_many(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>>;

    /// Number of documents matching `filter`
    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Insert `document` under `id`. Fails with [`StoreError::Duplicate`] if the id is taken.
    async fn insert_one(&self, collection: &str, id: &str, document: Document) -> StoreResult<()>;

    /// Apply `update` to the first matching document; returns the matched count (0 or 1)
    async fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<u64>;

    /// Apply `update` to every matching document; returns the matched count
    async fn update_many(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<u64>;

    /// Apply `update` to the first matching document and return its new state
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<Option<Document>>;

    /// Apply `update` to the first matching document, or create one from the
    /// filter's equality fields plus `on_insert` and apply `update` to it.
    /// Returns the resulting document. Concurrent upserts with the same
    /// filter never create two documents.
    async fn upsert_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        on_insert: Document,
    ) -> StoreResult<Document>;

    /// Delete the first matching document; returns the deleted count (0 or 1)
    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;
}

/// Open the configured backend. PostgreSQL connections run the embedded
/// migrations first.
pub async fn open(config: &StoreConfig) -> StoreResult<Arc<dyn DocumentStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Postgres => {
            let store = PgDocumentStore::connect(config).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
    }
}
