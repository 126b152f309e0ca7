//! Data models for the SmartLibrary inventory

pub mod book;
pub mod inventory;
pub mod loan;
pub mod student;

use validator::ValidationError;

// Re-export commonly used types
pub use book::{AddOutcome, Book, NewBook};
pub use inventory::{BookInventory, ConsistencyReport, InventoryPatch};
pub use loan::Loan;
pub use student::Student;

/// Rejects strings made only of whitespace
pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}
