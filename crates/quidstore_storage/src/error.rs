//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The document id cannot be used as a storage key.
    #[error("invalid document id: {0:?}")]
    InvalidId(String),

    /// The storage location is missing or is not usable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write was attempted through a read-only handle.
    #[error("storage is read-only: {0}")]
    ReadOnly(String),
}
