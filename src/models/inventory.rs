//! Per-title aggregate (BookInventory) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Aggregate record for one title, keyed by `book_name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookInventory {
    pub book_name: String,
    pub author: String,
    pub book_dept: String,
    pub added_date: DateTime<Utc>,
    /// Number of copies of this title
    pub count: i64,
}

/// Sparse update of an aggregate. `None` means "leave as is"; blank
/// strings and values equal to the stored ones are ignored too.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct InventoryPatch {
    #[validate(length(max = 256, message = "Book name must be at most 256 characters"))]
    pub book_name: Option<String>,
    #[validate(length(max = 256, message = "Author must be at most 256 characters"))]
    pub author: Option<String>,
    #[validate(length(max = 128, message = "Department must be at most 128 characters"))]
    pub book_dept: Option<String>,
    pub added_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0, message = "Count cannot be negative"))]
    pub count: Option<i64>,
}

/// Result of comparing an aggregate with its copies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub book_name: String,
    /// `count` on the aggregate, 0 if the aggregate is missing
    pub recorded_count: i64,
    /// Copies whose snapshot names this title
    pub copies: u64,
    /// Copies whose snapshot differs from the aggregate
    pub stale_snapshots: u64,
    pub aggregate_missing: bool,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        if self.aggregate_missing {
            return self.copies == 0;
        }
        self.stale_snapshots == 0
            && u64::try_from(self.recorded_count).map_or(false, |n| n == self.copies)
    }
}
