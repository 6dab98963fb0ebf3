//! Storage backend trait definition.

use crate::error::{StorageError, StorageResult};

/// A keyed storage backend for one QuidStore collection.
///
/// Backends are **opaque byte stores** keyed by document id. Every write
/// replaces the whole entry. QuidStore owns the encoding - backends do not
/// understand JSON, schemas or filters.
///
/// # Invariants
///
/// - `read` returns exactly the bytes of the last successful `write` for that id
/// - A `write` is all-or-nothing: readers never observe a partial entry
/// - `list` returns every stored id exactly once, in ascending order
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::DirectoryBackend`] - For persistent storage
pub trait DocumentBackend: Send + Sync {
    /// Returns the ids of all stored documents in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing location cannot be listed.
    fn list(&self) -> StorageResult<Vec<String>>;

    /// Reads the entry stored under `id`.
    ///
    /// Returns `None` if no entry exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or an I/O error occurs.
    fn read(&self, id: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Writes `data` under `id`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or an I/O error occurs.
    fn write(&self, id: &str, data: &[u8]) -> StorageResult<()>;

    /// Removes the entry stored under `id`.
    ///
    /// Returns `true` if an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or an I/O error occurs.
    fn remove(&self, id: &str) -> StorageResult<bool>;

    /// Returns `true` if an entry exists under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or an I/O error occurs.
    fn exists(&self, id: &str) -> StorageResult<bool>;

    /// Returns the size in bytes of the entry stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or an I/O error occurs.
    fn entry_size(&self, id: &str) -> StorageResult<Option<u64>>;
}

/// Checks that `id` is usable as a storage key.
///
/// Ids must be non-empty and consist only of ASCII alphanumerics, `-` and `_`,
/// so they can never escape a collection directory.
///
/// # Errors
///
/// Returns [`StorageError::InvalidId`] for any other id.
pub fn validate_id(id: &str) -> StorageResult<()> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidId(id.to_string()))
    }
}
