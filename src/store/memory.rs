//! In-memory document store
//!
//! A single async `RwLock` guards every collection, so each call (upserts
//! included) is atomic with respect to every other call. Intended for
//! tests, development and small single-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Document, DocumentStore, Filter, StoreError, StoreResult, Update};

type Collection = IndexMap<String, Document>;

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.values().find(|doc| filter.matches(doc)))
            .cloned())
    }

    async fn find_many(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|docs| docs.values().filter(|doc| filter.matches(doc)).cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|docs| docs.values().filter(|doc| filter.matches(doc)).count() as u64)
            .unwrap_or(0))
    }

    async fn insert_one(&self, collection: &str, id: &str, document: Document) -> StoreResult<()> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::Duplicate {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        docs.insert(id.to_string(), document);
        Ok(())
    }

    async fn update_one(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<u64> {
        Ok(self
            .find_one_and_update(collection, filter, update)
            .await?
            .map_or(0, |_| 1))
    }

    async fn update_many(&self, collection: &str, filter: &Filter, update: &Update) -> StoreResult<u64> {
        let mut guard = self.collections.write().await;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(0);
        };

        // Stage the changes so a failing update leaves the collection untouched
        let mut staged = Vec::new();
        for (id, doc) in docs.iter() {
            if filter.matches(doc) {
                let mut next = doc.clone();
                update.apply(&mut next)?;
                staged.push((id.clone(), next));
            }
        }

        let matched = staged.len() as u64;
        for (id, next) in staged {
            docs.insert(id, next);
        }
        Ok(matched)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<Option<Document>> {
        let mut guard = self.collections.write().await;
        let Some(doc) = guard
            .get_mut(collection)
            .and_then(|docs| docs.values_mut().find(|doc| filter.matches(doc)))
        else {
            return Ok(None);
        };

        let mut next = doc.clone();
        update.apply(&mut next)?;
        *doc = next.clone();
        Ok(Some(next))
    }

    async fn upsert_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        on_insert: Document,
    ) -> StoreResult<Document> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();

        if let Some(doc) = docs.values_mut().find(|doc| filter.matches(doc)) {
            let mut next = doc.clone();
            update.apply(&mut next)?;
            *doc = next.clone();
            return Ok(next);
        }

        let mut created = filter.seed();
        created.extend(on_insert);
        update.apply(&mut created)?;
        docs.insert(Uuid::new_v4().to_string(), created.clone());
        Ok(created)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let mut guard = self.collections.write().await;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let Some(index) = docs.values().position(|doc| filter.matches(doc)) else {
            return Ok(0);
        };
        docs.shift_remove_index(index);
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_duplicate_id() {
        let store = MemoryStore::new();
        store.insert_one("Books", "b1", doc(json!({"book_id": "b1"}))).await.unwrap();
        let err = store
            .insert_one("Books", "b1", doc(json!({"book_id": "b1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_update_many_scoped_by_filter() {
        let store = MemoryStore::new();
        store.insert_one("Books", "a", doc(json!({"t": "Dune", "s": 1}))).await.unwrap();
        store.insert_one("Books", "b", doc(json!({"t": "Emma", "s": 1}))).await.unwrap();
        store.insert_one("Books", "c", doc(json!({"t": "Dune", "s": 1}))).await.unwrap();

        let matched = store
            .update_many("Books", &Filter::by("t", "Dune"), &Update::new().set("s", 2))
            .await
            .unwrap();
        assert_eq!(matched, 2);
        assert_eq!(store.count("Books", &Filter::by("s", 2)).await.unwrap(), 2);
        assert_eq!(store.count("Books", &Filter::by("t", "Emma").eq("s", 1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_creates_then_increments() {
        let store = MemoryStore::new();
        let filter = Filter::by("book_name", "Dune");
        let update = Update::new().inc("count", 1);

        let first = store
            .upsert_one("Inv", &filter, &update, doc(json!({"author": "Herbert"})))
            .await
            .unwrap();
        assert_eq!(first["count"], 1);
        assert_eq!(first["book_name"], "Dune");
        assert_eq!(first["author"], "Herbert");

        let second = store
            .upsert_one("Inv", &filter, &update, doc(json!({"author": "ignored"})))
            .await
            .unwrap();
        assert_eq!(second["count"], 2);
        assert_eq!(second["author"], "Herbert");
        assert_eq!(store.count("Inv", &Filter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_single_document() {
        let store = Arc::new(MemoryStore::new());
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let store = store.clone();
            tasks.spawn(async move {
                store
                    .upsert_one(
                        "Inv",
                        &Filter::by("book_name", "Dune"),
                        &Update::new().inc("count", 1),
                        Document::new(),
                    )
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        let all = store.find_many("Inv", &Filter::new()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0]["count"], 16);
    }

    #[tokio::test]
    async fn test_guarded_update_does_not_match() {
        let store = MemoryStore::new();
        store.insert_one("Inv", "i", doc(json!({"book_name": "Dune", "count": 0}))).await.unwrap();
        let result = store
            .find_one_and_update(
                "Inv",
                &Filter::by("book_name", "Dune").gt("count", 0),
                &Update::new().inc("count", -1),
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_one_preserves_order() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c"] {
            store.insert_one("Books", id, doc(json!({"id": id}))).await.unwrap();
        }
        assert_eq!(store.delete_one("Books", &Filter::by("id", "b")).await.unwrap(), 1);
        assert_eq!(store.delete_one("Books", &Filter::by("id", "b")).await.unwrap(), 0);
        let ids: Vec<_> = store
            .find_many("Books", &Filter::new())
            .await
            .unwrap()
            .into_iter()
            .map(|d| d["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("a"), json!("c")]);
    }
}
