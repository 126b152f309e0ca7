//! SmartLibrary inventory
//!
//! Data-access layer for a small library: per-title inventory counts,
//! individual copies with an embedded snapshot of their title's record,
//! and loans, kept consistent on top of a generic document store.

pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod store;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use services::Services;
