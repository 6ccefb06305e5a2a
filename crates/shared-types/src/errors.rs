//! # Error Types
//!
//! Storage errors shared by the entity store and its callers.

use thiserror::Error;

/// Errors raised by the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Entity or index entry not present.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A strict index entry already exists with a different value.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Stored bytes could not be decoded.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// The underlying key-value engine failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
