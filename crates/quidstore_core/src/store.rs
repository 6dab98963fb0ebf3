//! The collection registry.

use crate::change_feed::{ChangeEvent, ChangeFeed};
use crate::collection::{Collection, Wiring};
use crate::config::Config;
use crate::context::{ContextResolver, RawIds};
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult};
use crate::id::{IdAllocator, IdGenerator, UuidV4};
use crate::schema::Schema;
use parking_lot::RwLock;
use quidstore_storage::{validate_id, DirectoryBackend, DocumentBackend, InMemoryBackend};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Owns the collections of one store.
///
/// A store is either rooted in a directory (one sub-directory per
/// collection, guarded by a `LOCK` file) or held entirely in memory. All
/// collections share one change feed, one context resolver and one id
/// generator.
///
/// # Example
///
/// ```rust,ignore
/// use quidstore_core::{CollectionStore, Config, Schema};
///
/// let store = CollectionStore::open("data", Config::default())?;
/// let profiles = store.collection("profiles", Schema::from_json(&json!({"name": "", "hp": 100}))?)?;
/// let rex = profiles.create(json!({"name": "Rex"}))?;
/// ```
pub struct CollectionStore {
    dir: Option<StoreDir>,
    config: Config,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    feed: Arc<ChangeFeed>,
    resolver: Arc<dyn ContextResolver>,
    generator: Arc<dyn IdGenerator>,
}

impl CollectionStore {
    /// Opens a store rooted at `root`, taking its lock.
    ///
    /// # Errors
    ///
    /// Returns `StoreLocked` if another process has the store open, or an
    /// error if the directory is missing (and may not be created) or
    /// unusable.
    pub fn open(root: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let dir = StoreDir::open(root.as_ref(), config.create_if_missing)?;
        tracing::debug!(root = %dir.path().display(), "opened store");
        Ok(Self::build(Some(dir), config))
    }

    /// Creates a store whose collections live in memory.
    #[must_use]
    pub fn in_memory(config: Config) -> Self {
        Self::build(None, config)
    }

    fn build(dir: Option<StoreDir>, config: Config) -> Self {
        Self {
            dir,
            feed: Arc::new(ChangeFeed::with_max_history(config.change_feed_history)),
            config,
            collections: RwLock::new(HashMap::new()),
            resolver: Arc::new(RawIds),
            generator: Arc::new(UuidV4),
        }
    }

    /// Sets the resolver used to label update log lines.
    ///
    /// Applies to collections opened afterwards.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ContextResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Sets the document id generator.
    ///
    /// Applies to collections opened afterwards.
    #[must_use]
    pub fn with_id_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Opens collection `name` with `schema`, or returns the open handle.
    ///
    /// Opening builds the collection index and, unless disabled in the
    /// config, migrates every stored document to `schema`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the name is not a valid directory name
    /// or the collection is already open with a different schema, and any
    /// error of [`Collection::open`].
    pub fn collection(&self, name: &str, mut schema: Schema) -> CoreResult<Arc<Collection>> {
        validate_id(name).map_err(|_| {
            CoreError::invalid_operation(format!("invalid collection name '{name}'"))
        })?;
        schema.ensure_uuid();

        let mut collections = self.collections.write();
        if let Some(existing) = collections.get(name) {
            if existing.schema() != &schema {
                return Err(CoreError::invalid_operation(format!(
                    "collection '{name}' is already open with a different schema"
                )));
            }
            return Ok(Arc::clone(existing));
        }

        let backend: Box<dyn DocumentBackend> = match &self.dir {
            Some(dir) => Box::new(
                DirectoryBackend::open(&dir.collection_path(name), true)?
                    .with_sync_on_write(self.config.sync_on_write),
            ),
            None => Box::new(InMemoryBackend::new()),
        };
        let wiring = Wiring {
            feed: Arc::clone(&self.feed),
            resolver: Arc::clone(&self.resolver),
            ids: IdAllocator::new(Arc::clone(&self.generator), self.config.max_id_attempts),
        };
        let collection = Arc::new(Collection::open_wired(
            name.to_string(),
            schema,
            backend,
            &self.config,
            wiring,
        )?);
        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Returns an already opened collection.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// Returns the names of the opened collections, sorted.
    #[must_use]
    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Lists the collection directories present on disk, sorted.
    ///
    /// An in-memory store lists its opened collections.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be read.
    pub fn collection_names_on_disk(&self) -> CoreResult<Vec<String>> {
        match &self.dir {
            Some(dir) => dir.collection_names(),
            None => Ok(self.registered()),
        }
    }

    /// Subscribes to the changes of every collection.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    /// Returns the shared change feed.
    #[must_use]
    pub fn change_feed(&self) -> &Arc<ChangeFeed> {
        &self.feed
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the root directory, or `None` for an in-memory store.
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.dir.as_ref().map(StoreDir::path)
    }
}

impl fmt::Debug for CollectionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionStore")
            .field("root", &self.root())
            .field("collections", &self.registered())
            .finish_non_exhaustive()
    }
}
