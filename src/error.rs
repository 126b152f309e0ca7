//! Error types for the SmartLibrary inventory layer

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

/// Stable error codes handed to the outer HTTP/CLI layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    DbFailure = 3,
    NoSuchItem = 5,
    ItemNotAvailable = 7,
    Duplicate = 8,
    Timeout = 10,
    MaxBorrowsReached = 11,
    SpecimenBorrowed = 13,
    BadValue = 18,
    Inconsistent = 22,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Operation '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("Not available: {0}")]
    AlreadyBorrowed(String),

    #[error("Copy is on loan: {0}")]
    CopyBorrowed(String),

    #[error("Limit reached: {0}")]
    LimitReached(String),

    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Numeric code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::NotFound(_) => ErrorCode::NoSuchItem,
            AppError::AlreadyExists(_) => ErrorCode::Duplicate,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Store(StoreError::Duplicate { .. }) => ErrorCode::Duplicate,
            AppError::Store(_) => ErrorCode::DbFailure,
            AppError::Timeout { .. } => ErrorCode::Timeout,
            AppError::ConsistencyViolation(_) => ErrorCode::Inconsistent,
            AppError::AlreadyBorrowed(_) => ErrorCode::ItemNotAvailable,
            AppError::CopyBorrowed(_) => ErrorCode::SpecimenBorrowed,
            AppError::LimitReached(_) => ErrorCode::MaxBorrowsReached,
            AppError::BusinessRule(_) => ErrorCode::Failure,
            AppError::Serialization(_) => ErrorCode::Failure,
        }
    }

    /// True for failures of the underlying store, including deadlines
    pub fn is_store_failure(&self) -> bool {
        matches!(self, AppError::Store(_) | AppError::Timeout { .. })
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
