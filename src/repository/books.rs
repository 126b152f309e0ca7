//! Books (copies) repository

use serde_json::Value;

use super::collection::{to_document, Collection};
use crate::{
    error::{AppError, AppResult},
    models::{Book, BookInventory},
    store::{Filter, Update},
};

const SNAPSHOT_TITLE: &str = "inventory_ref.book_name";

#[derive(Clone)]
pub struct BooksRepository {
    collection: Collection,
}

impl BooksRepository {
    pub fn new(collection: Collection) -> Self {
        Self { collection }
    }

    /// Find a copy by its identifier
    pub async fn find_by_id(&self, book_id: &str) -> AppResult<Option<Book>> {
        self.collection.find_one(&Filter::by("book_id", book_id)).await
    }

    /// Get a copy by its identifier
    pub async fn get_by_id(&self, book_id: &str) -> AppResult<Book> {
        self.find_by_id(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))
    }

    /// Insert a new copy; the book id doubles as the document id
    pub async fn create(&self, book: &Book) -> AppResult<()> {
        self.collection.insert(&book.book_id, book).await
    }

    /// Delete a copy, but only while it is on the shelf
    pub async fn delete_on_shelf(&self, book_id: &str) -> AppResult<bool> {
        let deleted = self
            .collection
            .delete_one(&Filter::by("book_id", book_id).eq("book_status", true))
            .await?;
        Ok(deleted == 1)
    }

    /// Flip `book_status` from `from` to `to`. Returns false when no copy
    /// with that id currently has status `from`.
    pub async fn switch_status(&self, book_id: &str, from: bool, to: bool) -> AppResult<bool> {
        let matched = self
            .collection
            .update_one(
                &Filter::by("book_id", book_id).eq("book_status", from),
                &Update::new().set("book_status", to),
            )
            .await?;
        Ok(matched == 1)
    }

    /// Overwrite the embedded snapshot on every copy of `title`
    pub async fn broadcast_snapshot(&self, title: &str, snapshot: &BookInventory) -> AppResult<u64> {
        let snapshot = Value::Object(to_document(snapshot)?);
        self.collection
            .update_many(
                &Filter::by(SNAPSHOT_TITLE, title),
                &Update::new().set("inventory_ref", snapshot),
            )
            .await
    }

    /// All copies of a title
    pub async fn list_copies(&self, title: &str) -> AppResult<Vec<Book>> {
        self.collection.find_many(&Filter::by(SNAPSHOT_TITLE, title)).await
    }

    pub async fn count_copies(&self, title: &str) -> AppResult<u64> {
        self.collection.count(&Filter::by(SNAPSHOT_TITLE, title)).await
    }

    /// Copies of a title currently on the shelf
    pub async fn count_on_shelf(&self, title: &str) -> AppResult<u64> {
        self.collection
            .count(&Filter::by(SNAPSHOT_TITLE, title).eq("book_status", true))
            .await
    }

    /// Copies of a title whose snapshot matches `snapshot` exactly
    pub async fn count_current_snapshots(&self, snapshot: &BookInventory) -> AppResult<u64> {
        let expected = Value::Object(to_document(snapshot)?);
        self.collection
            .count(&Filter::by(SNAPSHOT_TITLE, snapshot.book_name.as_str()).eq("inventory_ref", expected))
            .await
    }

    /// Distinct titles referenced by any copy, in first-seen order
    pub async fn titles(&self) -> AppResult<Vec<String>> {
        let books: Vec<Book> = self.collection.find_many(&Filter::new()).await?;
        let mut titles: Vec<String> = Vec::new();
        for book in books {
            if !titles.iter().any(|t| t == book.title()) {
                titles.push(book.inventory_ref.book_name);
            }
        }
        Ok(titles)
    }
}
