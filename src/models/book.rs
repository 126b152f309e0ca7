//! Book (physical copy) model and related types

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::inventory::BookInventory;

/// One loanable copy of a title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub book_id: String,
    /// true = on the shelf, false = borrowed
    pub book_status: bool,
    /// Denormalized copy of the title's aggregate record
    pub inventory_ref: BookInventory,
}

impl Book {
    pub fn title(&self) -> &str {
        &self.inventory_ref.book_name
    }
}

/// Add book request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewBook {
    #[validate(
        length(min = 1, max = 64, message = "Book id must be 1 to 64 characters"),
        custom(function = "crate::models::not_blank", message = "Book id must not be blank")
    )]
    pub book_id: String,
    #[validate(
        length(min = 1, max = 256, message = "Book name must be 1 to 256 characters"),
        custom(function = "crate::models::not_blank", message = "Book name must not be blank")
    )]
    pub book_name: String,
    #[validate(length(max = 256, message = "Author must be at most 256 characters"))]
    pub author: String,
    #[validate(length(max = 128, message = "Department must be at most 128 characters"))]
    pub book_dept: String,
}

impl NewBook {
    pub fn new(
        book_id: impl Into<String>,
        book_name: impl Into<String>,
        author: impl Into<String>,
        book_dept: impl Into<String>,
    ) -> Self {
        Self {
            book_id: book_id.into(),
            book_name: book_name.into(),
            author: author.into(),
            book_dept: book_dept.into(),
        }
    }
}

/// What an add request did
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Created(Book),
    /// A copy with this id was already present; nothing was written
    AlreadyExists { book_id: String },
}

impl AddOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, AddOutcome::Created(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_book_validation() {
        assert!(NewBook::new("b1", "Dune", "Herbert", "SF").validate().is_ok());
        assert!(NewBook::new("", "Dune", "Herbert", "SF").validate().is_err());
        assert!(NewBook::new("b1", "   ", "Herbert", "SF").validate().is_err());
        assert!(NewBook::new("b1", "Dune", "", "").validate().is_ok());
    }
}
