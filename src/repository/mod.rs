//! Repository layer over the document store
//!
//! Every collection lives in one logical namespace; reads and writes never
//! address different namespaces.

pub mod books;
pub mod collection;
pub mod inventory;
pub mod loans;

use std::{sync::Arc, time::Duration};

use crate::store::DocumentStore;

pub use collection::Collection;

pub const BOOKS: &str = "Books";
pub const BOOK_INVENTORY: &str = "BookInventory";
pub const LOANS: &str = "Loans";

/// Main repository struct holding one handle per collection
#[derive(Clone)]
pub struct Repository {
    pub books: books::BooksRepository,
    pub inventory: inventory::InventoryRepository,
    pub loans: loans::LoansRepository,
}

impl Repository {
    /// Create a new repository over `store`, bounding each call by `timeout`
    pub fn new(store: Arc<dyn DocumentStore>, namespace: &str, timeout: Duration) -> Self {
        let collection = |name: &str| Collection::new(store.clone(), namespace, name, timeout);
        Self {
            books: books::BooksRepository::new(collection(BOOKS)),
            inventory: inventory::InventoryRepository::new(collection(BOOK_INVENTORY)),
            loans: loans::LoansRepository::new(collection(LOANS)),
        }
    }
}
