//! Test fixtures and store helpers.
//!
//! Provides stores backed by temporary directories and the sample game
//! schemas used across the test suites.

use quidstore_core::{Collection, CollectionStore, Config, Schema};
use quidstore_storage::DirectoryBackend;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: CollectionStore,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self {
            store: CollectionStore::in_memory(Config::default()),
            temp_dir: None,
        }
    }

    /// Creates a new store in a temporary directory.
    ///
    /// Writes are not fsynced, to keep tests fast.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = CollectionStore::open(temp_dir.path(), test_config())
            .expect("Failed to open file store");
        Self {
            store,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store root if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Closes the store and opens it again on the same directory.
    ///
    /// # Panics
    ///
    /// Panics for in-memory stores.
    pub fn reopen(self) -> Self {
        let temp_dir = self.temp_dir.expect("Only file stores can be reopened");
        drop(self.store);
        let store = CollectionStore::open(temp_dir.path(), test_config())
            .expect("Failed to reopen file store");
        Self {
            store,
            temp_dir: Some(temp_dir),
        }
    }

    /// Opens the raw backend of `collection`, bypassing the store.
    ///
    /// Lets tests plant or corrupt files behind the store's back.
    ///
    /// # Panics
    ///
    /// Panics for in-memory stores.
    pub fn raw_backend(&self, collection: &str) -> DirectoryBackend {
        let root = self.path().expect("Only file stores have a raw backend");
        DirectoryBackend::open(&root.join(collection), true).expect("Failed to open backend")
    }

    /// Opens the `profiles` collection with [`profile_schema`].
    pub fn profiles(&self) -> Arc<Collection> {
        self.store
            .collection("profiles", profile_schema())
            .expect("Failed to open profiles")
    }

    /// Opens the `servers` collection with [`server_schema`].
    pub fn servers(&self) -> Arc<Collection> {
        self.store
            .collection("servers", server_schema())
            .expect("Failed to open servers")
    }
}

impl std::ops::Deref for TestStore {
    type Target = CollectionStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Configuration used by file-based test stores.
pub fn test_config() -> Config {
    Config::default().sync_on_write(false)
}

/// Schema of a player profile holding quids.
pub fn profile_schema() -> Schema {
    Schema::from_json(&json!({
        "userId": {"type": "string", "locked": true},
        "serverId": {"type": "string", "locked": true},
        "name": "",
        "experience": 0,
        "hp": 100,
        "rank": "Youngling",
        "inventory": {"type": "object", "default": {
            "herbs": {"type": "nest", "default": {"type": "number", "default": 0}},
            "meat": {"type": "nest", "default": {"type": "number", "default": 0}},
        }},
        "quids": {"type": "nest", "default": {
            "name": "",
            "species": "",
            "pronouns": {"type": "array", "default": [{"type": "string"}]},
            "energy": 100,
        }},
        "settings": {"type": "object", "default": {}},
        "lastActive": {"type": ["undefined", "number"]},
    }))
    .expect("Profile schema is valid")
}

/// Schema of a server (guild).
pub fn server_schema() -> Schema {
    Schema::from_json(&json!({
        "serverId": {"type": "string", "locked": true},
        "name": "",
        "dens": {"type": "object", "default": {
            "sleeping": {"type": "object", "default": {"structure": 100, "bedding": 100}},
            "food": {"type": "object", "default": {"structure": 100, "bedding": 100}},
        }},
        "blockedEntrance": {"type": ["object", "any"], "default": null},
        "proxySettings": {"type": "object", "default": {}},
    }))
    .expect("Server schema is valid")
}

/// Typed view of a profile, for tests that read documents through serde.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Document id.
    pub uuid: String,
    /// Discord user id.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Hit points.
    pub hp: i64,
    /// Experience points.
    pub experience: i64,
    /// Rank title.
    pub rank: String,
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust,ignore
/// use quidstore_testkit::with_temp_store;
///
/// #[test]
/// fn my_test() {
///     with_temp_store(|store| {
///         let profiles = store.collection("profiles", profile_schema()).unwrap();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&CollectionStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a store in a temporary directory.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&CollectionStore, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store
        .path()
        .expect("File store should have a path")
        .to_path_buf();
    f(&test_store.store, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use quidstore_core::Document;

    /// Creates a store with `count` profiles spread over three users and
    /// two servers.
    pub fn populated_profiles(count: usize) -> (TestStore, Vec<Document>) {
        let test_store = TestStore::memory();
        let profiles = test_store.profiles();
        let created = (0..count)
            .map(|i| {
                profiles
                    .create(json!({
                        "userId": format!("user-{}", i % 3),
                        "serverId": format!("server-{}", i % 2),
                        "name": format!("Quid {i}"),
                        "experience": i,
                    }))
                    .expect("Failed to create profile")
            })
            .collect();
        (test_store, created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store() {
        let store = TestStore::memory();
        assert!(store.path().is_none());
        let profiles = store.profiles();
        assert_eq!(profiles.len().unwrap(), 0);
    }

    #[test]
    fn file_store_reopens() {
        let store = TestStore::file();
        let rex = store.profiles().create(json!({"name": "Rex"})).unwrap();

        let store = store.reopen();
        let found = store.profiles().get(rex.uuid().unwrap()).unwrap();
        assert_eq!(found, Some(rex));
    }

    #[test]
    fn profile_defaults() {
        with_temp_store(|store| {
            let profiles = store.collection("profiles", profile_schema()).unwrap();
            let doc = profiles.create(json!({"userId": "u1"})).unwrap();
            let profile: Profile = doc.deserialize().unwrap();
            assert_eq!(profile.hp, 100);
            assert_eq!(profile.rank, "Youngling");
            assert_eq!(doc.get("inventory"), Some(&json!({"herbs": {}, "meat": {}})));
            assert!(doc.get("lastActive").is_none());
        });
    }

    #[test]
    fn populated_scenario() {
        let (store, created) = scenarios::populated_profiles(6);
        assert_eq!(created.len(), 6);
        assert_eq!(store.profiles().count(&json!({"userId": "user-0"})).unwrap(), 2);
    }
}
