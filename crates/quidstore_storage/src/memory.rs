//! In-memory storage backend for testing.

use crate::backend::{validate_id, DocumentBackend};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory storage backend.
///
/// This backend keeps every entry in a sorted map and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Example
///
/// ```rust
/// use quidstore_storage::{DocumentBackend, InMemoryBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.write("x", b"{}").unwrap();
/// assert!(backend.exists("x").unwrap());
/// assert_eq!(backend.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-populated with entries.
    ///
    /// Useful for testing migration of legacy documents.
    #[must_use]
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clears all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl DocumentBackend for InMemoryBackend {
    fn list(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn read(&self, id: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_id(id)?;
        Ok(self.entries.read().get(id).cloned())
    }

    fn write(&self, id: &str, data: &[u8]) -> StorageResult<()> {
        validate_id(id)?;
        self.entries.write().insert(id.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&self, id: &str) -> StorageResult<bool> {
        validate_id(id)?;
        Ok(self.entries.write().remove(id).is_some())
    }

    fn exists(&self, id: &str) -> StorageResult<bool> {
        validate_id(id)?;
        Ok(self.entries.read().contains_key(id))
    }

    fn entry_size(&self, id: &str) -> StorageResult<Option<u64>> {
        validate_id(id)?;
        Ok(self.entries.read().get(id).map(|d| d.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn memory_write_and_read() {
        let backend = InMemoryBackend::new();
        backend.write("a", b"hello").unwrap();
        assert_eq!(backend.read("a").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(backend.entry_size("a").unwrap(), Some(5));
    }

    #[test]
    fn memory_overwrite() {
        let backend = InMemoryBackend::new();
        backend.write("a", b"one").unwrap();
        backend.write("a", b"two").unwrap();
        assert_eq!(backend.read("a").unwrap(), Some(b"two".to_vec()));
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn memory_list_sorted() {
        let backend = InMemoryBackend::new();
        backend.write("c", b"").unwrap();
        backend.write("a", b"").unwrap();
        backend.write("b", b"").unwrap();
        assert_eq!(backend.list().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn memory_remove() {
        let backend = InMemoryBackend::new();
        backend.write("a", b"x").unwrap();
        assert!(backend.remove("a").unwrap());
        assert!(!backend.remove("a").unwrap());
        assert!(backend.is_empty());
    }

    #[test]
    fn memory_with_entries() {
        let backend =
            InMemoryBackend::with_entries(vec![("legacy".to_string(), b"{}".to_vec())]);
        assert!(backend.exists("legacy").unwrap());
    }

    #[test]
    fn memory_rejects_invalid_id() {
        let backend = InMemoryBackend::new();
        assert!(matches!(
            backend.write("a/b", b""),
            Err(StorageError::InvalidId(_))
        ));
    }

    #[test]
    fn memory_clear() {
        let backend = InMemoryBackend::new();
        backend.write("a", b"x").unwrap();
        backend.clear();
        assert!(backend.is_empty());
    }
}
