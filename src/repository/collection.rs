//! Typed, deadline-bounded access to one collection

use std::{future::Future, sync::Arc, time::Duration};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    store::{Document, DocumentStore, Filter, StoreResult, Update},
};

#[derive(Clone)]
pub struct Collection {
    store: Arc<dyn DocumentStore>,
    name: String,
    timeout: Duration,
}

impl Collection {
    pub fn new(store: Arc<dyn DocumentStore>, namespace: &str, name: &str, timeout: Duration) -> Self {
        Self {
            store,
            name: format!("{}.{}", namespace, name),
            timeout,
        }
    }

    /// Run one store call under the per-call deadline
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> AppResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::error!(
                    "Store call {} on {} abandoned after {:?}",
                    operation, self.name, self.timeout
                );
                Err(AppError::Timeout {
                    operation,
                    after: self.timeout,
                })
            }
        }
    }

    pub async fn find_one<T: DeserializeOwned>(&self, filter: &Filter) -> AppResult<Option<T>> {
        self.bounded("find_one", self.store.find_one(&self.name, filter))
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn find_many<T: DeserializeOwned>(&self, filter: &Filter) -> AppResult<Vec<T>> {
        self.bounded("find_many", self.store.find_many(&self.name, filter))
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn count(&self, filter: &Filter) -> AppResult<u64> {
        self.bounded("count", self.store.count(&self.name, filter)).await
    }

    pub async fn insert<T: Serialize>(&self, id: &str, value: &T) -> AppResult<()> {
        let document = to_document(value)?;
        self.bounded("insert_one", self.store.insert_one(&self.name, id, document))
            .await
    }

    pub async fn update_one(&self, filter: &Filter, update: &Update) -> AppResult<u64> {
        self.bounded("update_one", self.store.update_one(&self.name, filter, update))
            .await
    }

    pub async fn update_many(&self, filter: &Filter, update: &Update) -> AppResult<u64> {
        self.bounded("update_many", self.store.update_many(&self.name, filter, update))
            .await
    }

    pub async fn find_one_and_update<T: DeserializeOwned>(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> AppResult<Option<T>> {
        self.bounded(
            "find_one_and_update",
            self.store.find_one_and_update(&self.name, filter, update),
        )
        .await?
        .map(from_document)
        .transpose()
    }

    pub async fn upsert<T: DeserializeOwned>(
        &self,
        filter: &Filter,
        update: &Update,
        on_insert: Document,
    ) -> AppResult<T> {
        let document = self
            .bounded("upsert_one", self.store.upsert_one(&self.name, filter, update, on_insert))
            .await?;
        from_document(document)
    }

    pub async fn delete_one(&self, filter: &Filter) -> AppResult<u64> {
        self.bounded("delete_one", self.store.delete_one(&self.name, filter))
            .await
    }
}

/// Serialize a model into a store document
pub fn to_document<T: Serialize>(value: &T) -> AppResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(document) => Ok(document),
        other => Err(AppError::Serialization(<serde_json::Error as serde::ser::Error>::custom(
            format!("expected a JSON object, got {}", other),
        ))),
    }
}

/// Deserialize a store document into a model
pub fn from_document<T: DeserializeOwned>(document: Document) -> AppResult<T> {
    Ok(serde_json::from_value(Value::Object(document))?)
}
