//! Inventory service: copies, per-title aggregates and their snapshots
//!
//! Three views of the same facts have to agree: the aggregate `count` of a
//! title, the number of copies of that title, and the aggregate snapshot
//! embedded in every copy. The aggregate and the copies are authoritative;
//! a step that fails after one of them changed undoes the earlier change.
//! Snapshots are derived data: a failed fan-out is logged and left for
//! [`InventoryService::reconcile`], except after a rename, where the snapshot
//! title is the only link from a copy to its aggregate and a failed fan-out
//! undoes the rename.

use chrono::Utc;
use serde_json::Value;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{AddOutcome, Book, BookInventory, ConsistencyReport, InventoryPatch, NewBook},
    repository::{collection::to_document, inventory::patch_update, Repository},
    store::{StoreError, Update},
};

#[derive(Clone)]
pub struct InventoryService {
    repository: Repository,
}

impl InventoryService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Register a new copy of a title
    pub async fn add_book(&self, book: NewBook) -> AppResult<AddOutcome> {
        book.validate()?;

        if self.repository.books.find_by_id(&book.book_id).await?.is_some() {
            tracing::info!("Book {} already exists, nothing added", book.book_id);
            return Ok(AddOutcome::AlreadyExists { book_id: book.book_id });
        }

        let aggregate = self.repository.inventory.add_copy(&book, Utc::now()).await?;

        let copy = Book {
            book_id: book.book_id.clone(),
            book_status: true,
            inventory_ref: aggregate.clone(),
        };
        if let Err(e) = self.repository.books.create(&copy).await {
            self.undo_count_change(&book.book_name, -1).await;
            return match e {
                AppError::Store(StoreError::Duplicate { .. }) => {
                    tracing::info!("Book {} was added concurrently, nothing added", book.book_id);
                    Ok(AddOutcome::AlreadyExists { book_id: book.book_id })
                }
                e => Err(e),
            };
        }

        self.broadcast(&aggregate.book_name, &aggregate).await;

        tracing::info!(
            "Added book {} of '{}' ({} copies)",
            copy.book_id, aggregate.book_name, aggregate.count
        );
        Ok(AddOutcome::Created(copy))
    }

    /// Apply the changed fields of `patch` to the aggregate of `current`
    /// and refresh every copy of that title. Returns the aggregate as stored.
    pub async fn update_book(
        &self,
        current: &BookInventory,
        patch: &InventoryPatch,
    ) -> AppResult<BookInventory> {
        patch.validate()?;

        let existing = self.repository.inventory.get_by_name(&current.book_name).await?;
        let update = patch_update(&existing, patch)?;
        if update.is_empty() {
            tracing::debug!("Nothing to update for '{}'", existing.book_name);
            return Ok(existing);
        }

        let renamed_to = patch
            .book_name
            .as_deref()
            .filter(|name| !name.trim().is_empty() && *name != existing.book_name);
        if let Some(new_name) = renamed_to {
            if self.repository.inventory.find_by_name(new_name).await?.is_some() {
                return Err(AppError::AlreadyExists(format!(
                    "Inventory for '{}' already exists",
                    new_name
                )));
            }
        }

        let updated = self
            .repository
            .inventory
            .apply(&existing.book_name, &update)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Inventory for '{}' not found", existing.book_name))
            })?;

        // Copies still carry the old title at this point. After a rename
        // they are only linked to the aggregate through the snapshot, so the
        // fan-out has to succeed or the rename is undone.
        if renamed_to.is_some() {
            if let Err(e) = self
                .repository
                .books
                .broadcast_snapshot(&existing.book_name, &updated)
                .await
            {
                self.undo_update(&existing, &updated, &update).await;
                return Err(e);
            }
        } else {
            self.broadcast(&existing.book_name, &updated).await;
        }

        tracing::info!("Updated inventory of '{}'", updated.book_name);
        if updated.count != existing.count {
            if let Err(e) = self.check_consistency(&updated.book_name).await {
                tracing::warn!(
                    "Consistency check after updating '{}' failed: {}",
                    updated.book_name, e
                );
            }
        }
        Ok(updated)
    }

    /// Remove a copy and count it out of its title. Returns the aggregate
    /// after the removal.
    pub async fn delete_book(&self, book_id: &str) -> AppResult<BookInventory> {
        let book = self.repository.books.get_by_id(book_id).await?;
        if !book.book_status {
            return Err(AppError::CopyBorrowed(format!(
                "Book {} is on loan and cannot be deleted",
                book_id
            )));
        }
        let title = book.title().to_string();

        let Some(updated) = self.repository.inventory.remove_copy(&title).await? else {
            let message = match self.repository.inventory.find_by_name(&title).await? {
                Some(aggregate) => format!(
                    "Inventory for '{}' counts {} copies but book {} still exists",
                    title, aggregate.count, book_id
                ),
                None => format!("Book {} refers to missing inventory '{}'", book_id, title),
            };
            tracing::warn!("{}", message);
            return Err(AppError::ConsistencyViolation(message));
        };

        match self.repository.books.delete_on_shelf(book_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.undo_count_change(&title, 1).await;
                return Err(match self.repository.books.find_by_id(book_id).await? {
                    Some(_) => AppError::CopyBorrowed(format!(
                        "Book {} is on loan and cannot be deleted",
                        book_id
                    )),
                    None => AppError::NotFound(format!("Book with id {} not found", book_id)),
                });
            }
            Err(e) => {
                self.undo_count_change(&title, 1).await;
                return Err(e);
            }
        }

        self.broadcast(&title, &updated).await;

        tracing::info!(
            "Deleted book {} of '{}' ({} copies left)",
            book_id, title, updated.count
        );
        Ok(updated)
    }

    /// Number of copies recorded for a title, 0 if the title is unknown
    pub async fn get_book_count(&self, book_name: &str) -> AppResult<i64> {
        Ok(self
            .repository
            .inventory
            .find_by_name(book_name)
            .await?
            .map_or(0, |aggregate| aggregate.count))
    }

    /// Number of titles in a department
    pub async fn get_category_count(&self, book_dept: &str) -> AppResult<u64> {
        self.repository.inventory.count_by_dept(book_dept).await
    }

    /// Titles in a department
    pub async fn find_category(&self, book_dept: &str) -> AppResult<Vec<BookInventory>> {
        self.repository.inventory.find_by_dept(book_dept).await
    }

    /// Whether a copy of the title can be borrowed right now
    pub async fn is_available(&self, book_name: &str) -> AppResult<bool> {
        if self.get_book_count(book_name).await? <= 0 {
            return Ok(false);
        }
        Ok(self.repository.books.count_on_shelf(book_name).await? > 0)
    }

    pub async fn get_book(&self, book_id: &str) -> AppResult<Book> {
        self.repository.books.get_by_id(book_id).await
    }

    pub async fn get_inventory(&self, book_name: &str) -> AppResult<BookInventory> {
        self.repository.inventory.get_by_name(book_name).await
    }

    pub async fn list_inventory(&self) -> AppResult<Vec<BookInventory>> {
        self.repository.inventory.list().await
    }

    pub async fn list_copies(&self, book_name: &str) -> AppResult<Vec<Book>> {
        self.repository.books.list_copies(book_name).await
    }

    /// Compare a title's aggregate with its copies
    pub async fn check_consistency(&self, book_name: &str) -> AppResult<ConsistencyReport> {
        let aggregate = self.repository.inventory.find_by_name(book_name).await?;
        let copies = self.repository.books.count_copies(book_name).await?;
        let current = match &aggregate {
            Some(aggregate) => self.repository.books.count_current_snapshots(aggregate).await?,
            None => 0,
        };

        let report = ConsistencyReport {
            book_name: book_name.to_string(),
            recorded_count: aggregate.as_ref().map_or(0, |a| a.count),
            copies,
            stale_snapshots: copies.saturating_sub(current),
            aggregate_missing: aggregate.is_none(),
        };

        if !report.is_consistent() {
            tracing::warn!(
                "Inventory of '{}' is inconsistent: count={} copies={} stale_snapshots={} aggregate_missing={}",
                report.book_name,
                report.recorded_count,
                report.copies,
                report.stale_snapshots,
                report.aggregate_missing
            );
        }
        Ok(report)
    }

    /// Make a title's aggregate count match its copies and refresh every
    /// snapshot. Returns the report after repair.
    pub async fn reconcile(&self, book_name: &str) -> AppResult<ConsistencyReport> {
        let before = self.check_consistency(book_name).await?;
        if before.is_consistent() {
            return Ok(before);
        }

        let template = match self.repository.inventory.find_by_name(book_name).await? {
            Some(aggregate) => aggregate,
            None => self
                .repository
                .books
                .list_copies(book_name)
                .await?
                .into_iter()
                .next()
                .map(|copy| copy.inventory_ref)
                .ok_or_else(|| {
                    AppError::NotFound(format!("No inventory or copies for '{}'", book_name))
                })?,
        };

        let copies = i64::try_from(before.copies)
            .map_err(|_| AppError::ConsistencyViolation(format!("Too many copies of '{}'", book_name)))?;
        let repaired = self.repository.inventory.restore(&template, copies).await?;
        self.repository.books.broadcast_snapshot(book_name, &repaired).await?;

        tracing::info!(
            "Reconciled '{}': count {} -> {}, {} snapshot(s) refreshed",
            book_name, before.recorded_count, repaired.count, before.stale_snapshots
        );
        self.check_consistency(book_name).await
    }

    /// Check every known title, optionally repairing the inconsistent ones
    pub async fn audit(&self, repair: bool) -> AppResult<Vec<ConsistencyReport>> {
        let mut titles: Vec<String> = self
            .repository
            .inventory
            .list()
            .await?
            .into_iter()
            .map(|aggregate| aggregate.book_name)
            .collect();
        for title in self.repository.books.titles().await? {
            if !titles.contains(&title) {
                titles.push(title);
            }
        }

        let mut reports = Vec::with_capacity(titles.len());
        for title in &titles {
            let report = if repair {
                self.reconcile(title).await?
            } else {
                self.check_consistency(title).await?
            };
            reports.push(report);
        }
        Ok(reports)
    }

    async fn broadcast(&self, title: &str, snapshot: &BookInventory) {
        match self.repository.books.broadcast_snapshot(title, snapshot).await {
            Ok(n) => tracing::debug!("Refreshed '{}' snapshot on {} copies", title, n),
            Err(e) => tracing::warn!(
                "Snapshot fan-out for '{}' failed, copies stay stale until reconciled: {}",
                title, e
            ),
        }
    }

    /// Put back the fields `update` changed, addressing the aggregate by its
    /// new name
    async fn undo_update(&self, existing: &BookInventory, updated: &BookInventory, update: &Update) {
        let revert = match to_document(existing) {
            Ok(previous) => update.sets().iter().fold(Update::new(), |revert, (field, _)| {
                revert.set(field.as_str(), previous.get(field).cloned().unwrap_or(Value::Null))
            }),
            Err(e) => {
                tracing::error!("Failed to roll back update of '{}': {}", existing.book_name, e);
                return;
            }
        };
        match self.repository.inventory.apply(&updated.book_name, &revert).await {
            Ok(Some(_)) => tracing::warn!(
                "Rolled back update of '{}' after a failed fan-out",
                existing.book_name
            ),
            Ok(None) => tracing::error!(
                "Failed to roll back update of '{}': '{}' no longer exists",
                existing.book_name, updated.book_name
            ),
            Err(e) => tracing::error!(
                "Failed to roll back update of '{}': {}",
                existing.book_name, e
            ),
        }
    }

    async fn undo_count_change(&self, book_name: &str, by: i64) {
        match self.repository.inventory.adjust_count(book_name, by).await {
            Ok(_) => tracing::warn!("Rolled back inventory count of '{}' by {}", book_name, by),
            Err(e) => tracing::error!(
                "Failed to roll back inventory count of '{}' by {}: {}",
                book_name, by, e
            ),
        }
    }
}
