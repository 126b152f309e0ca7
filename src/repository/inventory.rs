//! BookInventory (per-title aggregate) repository

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::collection::Collection;
use crate::{
    error::{AppError, AppResult},
    models::{BookInventory, InventoryPatch, NewBook},
    store::{Document, Filter, Update},
};

#[derive(Clone)]
pub struct InventoryRepository {
    collection: Collection,
}

impl InventoryRepository {
    pub fn new(collection: Collection) -> Self {
        Self { collection }
    }

    pub async fn find_by_name(&self, book_name: &str) -> AppResult<Option<BookInventory>> {
        self.collection.find_one(&Filter::by("book_name", book_name)).await
    }

    pub async fn get_by_name(&self, book_name: &str) -> AppResult<BookInventory> {
        self.find_by_name(book_name).await?.ok_or_else(|| {
            AppError::NotFound(format!("Inventory for '{}' not found", book_name))
        })
    }

    /// Count one more copy of the title, creating the aggregate on first
    /// sight. A single atomic upsert, so concurrent first copies of the same
    /// title still end up in one aggregate.
    pub async fn add_copy(&self, book: &NewBook, added_date: DateTime<Utc>) -> AppResult<BookInventory> {
        let mut on_insert = Document::new();
        on_insert.insert("author".into(), Value::from(book.author.as_str()));
        on_insert.insert("book_dept".into(), Value::from(book.book_dept.as_str()));
        on_insert.insert("added_date".into(), serde_json::to_value(added_date)?);

        self.collection
            .upsert(
                &Filter::by("book_name", book.book_name.as_str()),
                &Update::new().inc("count", 1),
                on_insert,
            )
            .await
    }

    /// Count one copy less. `None` when the aggregate is missing or already
    /// at zero; nothing is written in that case.
    pub async fn remove_copy(&self, book_name: &str) -> AppResult<Option<BookInventory>> {
        self.collection
            .find_one_and_update(
                &Filter::by("book_name", book_name).gt("count", 0),
                &Update::new().inc("count", -1),
            )
            .await
    }

    /// Unconditional count adjustment, used to undo a step
    pub async fn adjust_count(&self, book_name: &str, by: i64) -> AppResult<Option<BookInventory>> {
        self.collection
            .find_one_and_update(&Filter::by("book_name", book_name), &Update::new().inc("count", by))
            .await
    }

    /// Force the count of a title, recreating the aggregate from `template`
    /// if it has gone missing
    pub async fn restore(&self, template: &BookInventory, count: i64) -> AppResult<BookInventory> {
        let mut on_insert = Document::new();
        on_insert.insert("author".into(), Value::from(template.author.as_str()));
        on_insert.insert("book_dept".into(), Value::from(template.book_dept.as_str()));
        on_insert.insert("added_date".into(), serde_json::to_value(template.added_date)?);

        self.collection
            .upsert(
                &Filter::by("book_name", template.book_name.as_str()),
                &Update::new().set("count", count),
                on_insert,
            )
            .await
    }

    /// Apply a prepared partial update and return the new state
    pub async fn apply(&self, book_name: &str, update: &Update) -> AppResult<Option<BookInventory>> {
        self.collection
            .find_one_and_update(&Filter::by("book_name", book_name), update)
            .await
    }

    pub async fn count_by_dept(&self, book_dept: &str) -> AppResult<u64> {
        self.collection.count(&Filter::by("book_dept", book_dept)).await
    }

    pub async fn find_by_dept(&self, book_dept: &str) -> AppResult<Vec<BookInventory>> {
        self.collection.find_many(&Filter::by("book_dept", book_dept)).await
    }

    pub async fn list(&self) -> AppResult<Vec<BookInventory>> {
        self.collection.find_many(&Filter::new()).await
    }
}

/// Fields of `patch` that would change `current`
pub fn patch_update(current: &BookInventory, patch: &InventoryPatch) -> AppResult<Update> {
    let mut update = Update::new();

    let text_fields = [
        ("book_name", &patch.book_name, &current.book_name),
        ("author", &patch.author, &current.author),
        ("book_dept", &patch.book_dept, &current.book_dept),
    ];
    for (field, wanted, stored) in text_fields {
        if let Some(value) = wanted {
            if !value.trim().is_empty() && value != stored {
                update = update.set(field, value.as_str());
            }
        }
    }

    if let Some(added_date) = patch.added_date {
        if added_date != current.added_date {
            update = update.set("added_date", serde_json::to_value(added_date)?);
        }
    }
    if let Some(count) = patch.count {
        if count != current.count {
            update = update.set("count", count);
        }
    }

    Ok(update)
}
