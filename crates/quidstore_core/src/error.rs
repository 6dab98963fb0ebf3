//! Error types for QuidStore core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in QuidStore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] quidstore_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored document could not be decoded.
    #[error("document {id} is corrupted: {message}")]
    Codec {
        /// The id of the unreadable document.
        id: String,
        /// Description of the problem.
        message: String,
    },

    /// Schema definition is malformed.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of the problem.
        message: String,
    },

    /// Filter expression is malformed.
    #[error("invalid filter: {message}")]
    InvalidFilter {
        /// Description of the problem.
        message: String,
    },

    /// Update expression is malformed.
    #[error("invalid update: {message}")]
    InvalidUpdate {
        /// Description of the problem.
        message: String,
    },

    /// A value does not have the type required by the field.
    #[error("type mismatch on field '{field}': expected {expected}, found {found}")]
    FieldTypeMismatch {
        /// Path of the field.
        field: String,
        /// The accepted type(s).
        expected: String,
        /// The type of the rejected value.
        found: String,
    },

    /// The field is neither present on the document nor declared by the schema.
    #[error("unknown field '{field}'")]
    UnknownField {
        /// Path of the field.
        field: String,
    },

    /// The field is locked and cannot be modified after creation.
    #[error("field '{field}' is locked")]
    LockedField {
        /// Path of the field.
        field: String,
    },

    /// No unused document id could be generated.
    #[error("could not allocate a unique id after {attempts} attempts")]
    IdExhausted {
        /// Number of ids tried.
        attempts: u32,
    },

    /// Document not found.
    #[error("document {uuid} not found in collection {collection}")]
    DocumentNotFound {
        /// The collection searched.
        collection: String,
        /// The id that was not found.
        uuid: String,
    },

    /// Store directory is locked by another process.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a codec error for the document `id`.
    pub fn codec(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Codec {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Creates an invalid update error.
    pub fn invalid_update(message: impl Into<String>) -> Self {
        Self::InvalidUpdate {
            message: message.into(),
        }
    }

    /// Creates a field type mismatch error.
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::FieldTypeMismatch {
            field: field.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(field: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
        }
    }

    /// Creates a locked field error.
    pub fn locked_field(field: impl Into<String>) -> Self {
        Self::LockedField {
            field: field.into(),
        }
    }

    /// Creates a document not found error.
    pub fn not_found(collection: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self::DocumentNotFound {
            collection: collection.into(),
            uuid: uuid.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
