//! Business logic services

pub mod inventory;
pub mod loans;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Repository, store::DocumentStore};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub inventory: inventory::InventoryService,
    pub loans: loans::LoansService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        Self {
            inventory: inventory::InventoryService::new(repository.clone()),
            loans: loans::LoansService::new(repository, config.loans.clone()),
        }
    }

    /// Wire the repository and services over an opened store
    pub fn from_store(store: Arc<dyn DocumentStore>, config: &AppConfig) -> Self {
        let repository = Repository::new(
            store,
            &config.store.namespace,
            config.store.operation_timeout(),
        );
        Self::new(repository, config)
    }
}
