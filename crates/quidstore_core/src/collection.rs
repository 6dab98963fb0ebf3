//! Collections: schema-bound sets of documents.

use crate::change_feed::{ChangeEvent, ChangeFeed};
use crate::config::Config;
use crate::context::{ActorContext, ContextResolver, RawIds};
use crate::diff::reduce;
use crate::document::{Document, UUID_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::filter::Filter;
use crate::id::IdAllocator;
use crate::index::FieldIndex;
use crate::migrate::{reconcile, MigrationReport};
use crate::schema::{FieldSchema, Schema};
use crate::update::{apply_update, FieldChange, UpdateSpec};
use parking_lot::{Mutex, RwLock};
use quidstore_storage::{validate_id, DocumentBackend};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Shared services a collection is wired to.
pub(crate) struct Wiring {
    pub(crate) feed: Arc<ChangeFeed>,
    pub(crate) resolver: Arc<dyn ContextResolver>,
    pub(crate) ids: IdAllocator,
}

/// A named set of documents sharing one schema.
///
/// All operations are synchronous and safe to call from many threads.
/// Writes to one document are serialized; reads never block on writers and
/// see either the previous or the new version of a document.
///
/// Results are ordered by ascending `uuid`.
///
/// # Example
///
/// ```rust,ignore
/// let profiles = store.collection("profiles", Schema::from_json(&json!({
///     "userId": "",
///     "name": "",
///     "hp": 100,
/// }))?)?;
///
/// let rex = profiles.create(json!({"userId": "u1", "name": "Rex"}))?;
/// profiles.find_one_and_update(&json!({"uuid": rex.uuid()}), &json!({"$inc": {"hp": -30}}))?;
/// ```
pub struct Collection {
    name: String,
    schema: Schema,
    backend: Box<dyn DocumentBackend>,
    index: RwLock<FieldIndex>,
    /// One mutex per document id, serializing read-modify-write cycles.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Serializes id allocation with the first write of a new document.
    create_lock: Mutex<()>,
    ids: IdAllocator,
    feed: Arc<ChangeFeed>,
    resolver: Arc<dyn ContextResolver>,
}

impl Collection {
    /// Opens a collection over `backend`.
    ///
    /// Builds the field index and, when `config.migrate_on_open` is set,
    /// reconciles every stored document with `schema`. The collection gets
    /// its own change feed; use [`crate::CollectionStore`] to share one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be listed or a document cannot
    /// be rewritten. Undecodable documents are skipped with a warning.
    pub fn open(
        name: impl Into<String>,
        schema: Schema,
        backend: Box<dyn DocumentBackend>,
        config: &Config,
    ) -> CoreResult<Self> {
        let wiring = Wiring {
            feed: Arc::new(ChangeFeed::with_max_history(config.change_feed_history)),
            resolver: Arc::new(RawIds),
            ids: IdAllocator::new(Arc::new(crate::id::UuidV4), config.max_id_attempts),
        };
        Self::open_wired(name.into(), schema, backend, config, wiring)
    }

    pub(crate) fn open_wired(
        name: String,
        mut schema: Schema,
        backend: Box<dyn DocumentBackend>,
        config: &Config,
        wiring: Wiring,
    ) -> CoreResult<Self> {
        schema.ensure_uuid();
        let collection = Self {
            name,
            schema,
            backend,
            index: RwLock::new(FieldIndex::new(config.index_fields.iter().cloned())),
            locks: Mutex::new(HashMap::new()),
            create_lock: Mutex::new(()),
            ids: wiring.ids,
            feed: wiring.feed,
            resolver: wiring.resolver,
        };

        if config.migrate_on_open {
            let report = collection.migrate_all()?;
            tracing::debug!(
                collection = %collection.name,
                scanned = report.scanned,
                rewritten = report.rewritten,
                skipped = report.skipped,
                "opened collection"
            );
        } else {
            let indexed = collection.rebuild_index()?;
            tracing::debug!(collection = %collection.name, indexed, "opened collection");
        }
        Ok(collection)
    }

    /// Returns the collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the collection schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the ids of every stored document, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be listed.
    pub fn ids(&self) -> CoreResult<Vec<String>> {
        Ok(self.backend.list()?)
    }

    /// Returns the number of stored documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be listed.
    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.backend.list()?.len())
    }

    /// Returns `true` if the collection holds no documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be listed.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns the stored size in bytes of a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn stored_size(&self, uuid: &str) -> CoreResult<Option<u64>> {
        Ok(self.backend.entry_size(uuid)?)
    }

    /// Reads a document by id.
    ///
    /// Returns `Ok(None)` for ids that are not stored or not valid ids.
    ///
    /// # Errors
    ///
    /// Returns `Codec` if the stored document is corrupted.
    pub fn get(&self, uuid: &str) -> CoreResult<Option<Document>> {
        if validate_id(uuid).is_err() {
            return Ok(None);
        }
        self.load(uuid)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Returns every document matching a JSON filter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` for a malformed filter, `Codec` for an
    /// unreadable candidate document, or a storage error.
    pub fn find(&self, filter: &Value) -> CoreResult<Vec<Document>> {
        self.find_where(&Filter::parse(filter)?)
    }

    /// Returns every document matching a compiled filter.
    ///
    /// # Errors
    ///
    /// See [`Collection::find`].
    pub fn find_where(&self, filter: &Filter) -> CoreResult<Vec<Document>> {
        let mut found = Vec::new();
        for id in self.candidate_ids(filter)? {
            if let Some(doc) = self.load(&id)? {
                if filter.matches(&doc) {
                    found.push(doc);
                }
            }
        }
        Ok(found)
    }

    /// Returns the first document (lowest `uuid`) matching a JSON filter.
    ///
    /// # Errors
    ///
    /// See [`Collection::find`].
    pub fn find_one(&self, filter: &Value) -> CoreResult<Option<Document>> {
        self.find_one_where(&Filter::parse(filter)?)
    }

    /// Returns the first document matching a compiled filter.
    ///
    /// # Errors
    ///
    /// See [`Collection::find`].
    pub fn find_one_where(&self, filter: &Filter) -> CoreResult<Option<Document>> {
        for id in self.candidate_ids(filter)? {
            if let Some(doc) = self.load(&id)? {
                if filter.matches(&doc) {
                    return Ok(Some(doc));
                }
            }
        }
        Ok(None)
    }

    /// Counts the documents matching a JSON filter.
    ///
    /// # Errors
    ///
    /// See [`Collection::find`].
    pub fn count(&self, filter: &Value) -> CoreResult<usize> {
        Ok(self.find(filter)?.len())
    }

    /// Returns the document ids worth evaluating `filter` against, sorted.
    ///
    /// An equality on `uuid` is a direct read; equalities on indexed fields
    /// narrow through the index; anything else scans the collection.
    fn candidate_ids(&self, filter: &Filter) -> CoreResult<Vec<String>> {
        if let Some(value) = filter.required_equality(UUID_FIELD) {
            return Ok(match value.as_str() {
                Some(id) if validate_id(id).is_ok() && self.backend.exists(id)? => {
                    vec![id.to_string()]
                }
                _ => Vec::new(),
            });
        }
        if let Some(ids) = self.index.read().candidates(filter) {
            return Ok(ids.into_iter().collect());
        }
        Ok(self.backend.list()?)
    }

    /// Like [`Collection::find`], but always scans every document.
    ///
    /// # Errors
    ///
    /// See [`Collection::find`].
    pub fn scan(&self, filter: &Filter) -> CoreResult<Vec<Document>> {
        let mut found = Vec::new();
        for id in self.backend.list()? {
            if let Some(doc) = self.load(&id)? {
                if filter.matches(&doc) {
                    found.push(doc);
                }
            }
        }
        Ok(found)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Creates a document from `partial` merged over the schema defaults.
    ///
    /// Returns the document exactly as stored, including its new `uuid`.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if `partial` is not an object or sets `uuid`
    /// - `UnknownField` / `FieldTypeMismatch` if `partial` does not fit the schema
    /// - `IdExhausted` if no free id could be generated
    pub fn create(&self, partial: Value) -> CoreResult<Document> {
        let mut partial = Document::from_value(partial)?;
        match partial.remove(UUID_FIELD) {
            None => {}
            Some(Value::String(s)) if s.is_empty() => {}
            Some(other) => {
                return Err(CoreError::invalid_operation(format!(
                    "uuid is assigned by the store, got {other}"
                )))
            }
        }
        self.schema.check(partial.as_map())?;
        let mut document = reconcile(&partial, &self.schema).document;

        let _guard = self.create_lock.lock();
        let id = self
            .ids
            .allocate(|candidate| Ok(self.backend.exists(candidate)?))?;
        document.insert(UUID_FIELD, Value::String(id.clone()));

        self.write(&id, &document)?;
        self.feed
            .emit(ChangeEvent::insert(&self.name, &id, document.clone()));
        tracing::info!(
            collection = %self.name,
            uuid = %id,
            actor = %ActorContext::resolve(&document, self.resolver.as_ref()),
            "created document"
        );
        Ok(document)
    }

    /// Applies a JSON update to the first document matching a JSON filter.
    ///
    /// Returns the updated document, or `None` if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` / `InvalidUpdate` for malformed input, and the
    /// errors of [`crate::apply_update`]. A failed update persists nothing.
    pub fn find_one_and_update(&self, filter: &Value, update: &Value) -> CoreResult<Option<Document>> {
        self.find_one_and_update_where(&Filter::parse(filter)?, &UpdateSpec::parse(update)?)
    }

    /// Applies a compiled update to the first document matching `filter`.
    ///
    /// # Errors
    ///
    /// See [`Collection::find_one_and_update`].
    pub fn find_one_and_update_where(
        &self,
        filter: &Filter,
        update: &UpdateSpec,
    ) -> CoreResult<Option<Document>> {
        let mut apply = |doc: &Document| -> CoreResult<(Document, Vec<FieldChange>)> {
            let outcome = apply_update(doc, update, &self.schema)?;
            Ok((outcome.document, outcome.changes))
        };
        for id in self.candidate_ids(filter)? {
            if let Some(doc) = self.modify(&id, filter, &mut apply)? {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    /// Applies a JSON update to every matching document.
    ///
    /// Returns the number of matched documents. Documents are updated one by
    /// one; an error stops the run, leaving earlier documents updated.
    ///
    /// # Errors
    ///
    /// See [`Collection::find_one_and_update`].
    pub fn update_many(&self, filter: &Value, update: &Value) -> CoreResult<usize> {
        let filter = Filter::parse(filter)?;
        let update = UpdateSpec::parse(update)?;
        let mut apply = |doc: &Document| -> CoreResult<(Document, Vec<FieldChange>)> {
            let outcome = apply_update(doc, &update, &self.schema)?;
            Ok((outcome.document, outcome.changes))
        };
        let mut matched = 0;
        for id in self.candidate_ids(&filter)? {
            if self.modify(&id, &filter, &mut apply)?.is_some() {
                matched += 1;
            }
        }
        Ok(matched)
    }

    /// Runs `edit` on the first document matching `filter` and stores the
    /// result.
    ///
    /// The edited document must still fit the schema, keep its `uuid` and
    /// leave locked fields alone.
    ///
    /// # Errors
    ///
    /// Returns `LockedField`, `UnknownField` or `FieldTypeMismatch` if the
    /// edit breaks those rules; nothing is stored in that case.
    pub fn find_one_and_modify<F>(&self, filter: &Value, edit: F) -> CoreResult<Option<Document>>
    where
        F: FnOnce(&mut Document),
    {
        let filter = Filter::parse(filter)?;
        let mut edit = Some(edit);
        let mut apply = |doc: &Document| -> CoreResult<(Document, Vec<FieldChange>)> {
            let edit = edit
                .take()
                .ok_or_else(|| CoreError::invalid_operation("edit already applied"))?;
            let mut next = doc.clone();
            edit(&mut next);
            let changes = self.validate_edit(doc, &next)?;
            Ok((next, changes))
        };
        for id in self.candidate_ids(&filter)? {
            if let Some(doc) = self.modify(&id, &filter, &mut apply)? {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    fn validate_edit(&self, old: &Document, new: &Document) -> CoreResult<Vec<FieldChange>> {
        let keys: BTreeSet<&String> = old.as_map().keys().chain(new.as_map().keys()).collect();
        let mut changes = Vec::new();
        for key in keys {
            let before = old.get(key);
            let after = new.get(key);
            if before == after {
                continue;
            }
            let field = self.schema.field(key);
            if key == UUID_FIELD || field.is_some_and(FieldSchema::is_locked) {
                return Err(CoreError::locked_field(key.as_str()));
            }
            if let (Some(field), Some(before)) = (field, before) {
                if let Some(locked) = field.locked_change(key, before, after) {
                    return Err(CoreError::locked_field(locked));
                }
            }
            changes.push(FieldChange {
                path: key.clone(),
                old: before.cloned(),
                new: after.cloned().unwrap_or(Value::Null),
            });
        }
        self.schema.check(new.as_map())?;
        Ok(changes)
    }

    /// Runs one read-modify-write cycle on document `id` under its lock.
    ///
    /// Returns `None` if the document vanished or no longer matches.
    fn modify<F>(&self, id: &str, filter: &Filter, apply: &mut F) -> CoreResult<Option<Document>>
    where
        F: FnMut(&Document) -> CoreResult<(Document, Vec<FieldChange>)>,
    {
        let lock = self.document_lock(id);
        let _guard = lock.lock();

        let Some(current) = self.load(id)? else {
            return Ok(None);
        };
        if !filter.matches(&current) {
            return Ok(None);
        }
        let (next, changes) = apply(&current)?;
        if !changes.is_empty() {
            self.write(id, &next)?;
            self.feed
                .emit(ChangeEvent::update(&self.name, id, next.clone()));
            self.log_changes(id, &next, &changes);
        }
        Ok(Some(next))
    }

    /// Deletes the first document matching a JSON filter.
    ///
    /// Returns the deleted document, or `None` if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` for a malformed filter or a storage error.
    pub fn find_one_and_delete(&self, filter: &Value) -> CoreResult<Option<Document>> {
        let filter = Filter::parse(filter)?;
        for id in self.candidate_ids(&filter)? {
            let lock = self.document_lock(&id);
            let guard = lock.lock();

            let Some(doc) = self.load(&id)? else {
                continue;
            };
            if !filter.matches(&doc) {
                continue;
            }
            self.backend.remove(&id)?;
            self.index.write().remove(&id);
            drop(guard);
            self.release_lock(&id, &lock);

            self.feed
                .emit(ChangeEvent::delete(&self.name, &id, Some(doc.clone())));
            tracing::info!(
                collection = %self.name,
                uuid = %id,
                actor = %ActorContext::resolve(&doc, self.resolver.as_ref()),
                "deleted document"
            );
            return Ok(Some(doc));
        }
        Ok(None)
    }

    /// Stores `document` as is, replacing any previous version.
    ///
    /// No schema validation is done.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the document has no non-empty string
    /// `uuid`, or a storage error (including an invalid id).
    pub fn save(&self, document: &Document) -> CoreResult<()> {
        let id = match document.uuid() {
            Some(id) if !id.is_empty() => id,
            _ => {
                return Err(CoreError::invalid_operation(
                    "cannot save a document without a uuid",
                ))
            }
        };
        let lock = self.document_lock(id);
        let _guard = lock.lock();

        let existed = self.backend.exists(id)?;
        self.write(id, document)?;
        let event = if existed {
            ChangeEvent::update(&self.name, id, document.clone())
        } else {
            ChangeEvent::insert(&self.name, id, document.clone())
        };
        self.feed.emit(event);
        tracing::debug!(collection = %self.name, uuid = %id, "saved document");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Migration
    // ------------------------------------------------------------------

    /// Reconciles one document with the schema, rewriting it if needed.
    ///
    /// Returns the reconciled document.
    ///
    /// # Errors
    ///
    /// Returns `DocumentNotFound` if no document has this id, or `Codec` if
    /// it cannot be decoded.
    pub fn update(&self, uuid: &str) -> CoreResult<Document> {
        if validate_id(uuid).is_err() {
            return Err(CoreError::not_found(&self.name, uuid));
        }
        self.reconcile_stored(uuid)
            .map(|(document, _)| document)
    }

    /// Reconciles every stored document with the schema and rebuilds the
    /// index.
    ///
    /// Undecodable documents are skipped with a warning and counted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be listed or written.
    pub fn migrate_all(&self) -> CoreResult<MigrationReport> {
        let mut report = MigrationReport::default();
        self.index.write().clear();
        for id in self.backend.list()? {
            report.scanned += 1;
            match self.reconcile_stored(&id) {
                Ok((_, true)) => report.rewritten += 1,
                Ok((_, false)) => {}
                Err(CoreError::Codec { message, .. }) => {
                    tracing::warn!(collection = %self.name, uuid = %id, %message, "skipping corrupted document");
                    report.skipped += 1;
                }
                Err(CoreError::DocumentNotFound { .. }) => report.scanned -= 1,
                Err(e) => return Err(e),
            }
        }
        if report.rewritten > 0 {
            tracing::info!(
                collection = %self.name,
                scanned = report.scanned,
                rewritten = report.rewritten,
                "migrated collection"
            );
        }
        Ok(report)
    }

    /// Rebuilds the field index from storage.
    ///
    /// Returns the number of indexed documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be listed or read.
    pub fn rebuild_index(&self) -> CoreResult<usize> {
        let mut index = self.index.write();
        index.clear();
        for id in self.backend.list()? {
            match self.load(&id) {
                Ok(Some(doc)) => index.insert(&id, &doc),
                Ok(None) => {}
                Err(CoreError::Codec { message, .. }) => {
                    tracing::warn!(collection = %self.name, uuid = %id, %message, "skipping corrupted document");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(index.len())
    }

    fn reconcile_stored(&self, id: &str) -> CoreResult<(Document, bool)> {
        let lock = self.document_lock(id);
        let _guard = lock.lock();

        let current = self
            .load(id)?
            .ok_or_else(|| CoreError::not_found(&self.name, id))?;
        let mut document = reconcile(&current, &self.schema).document;
        document.insert(UUID_FIELD, Value::String(id.to_string()));

        if document == current {
            self.index.write().insert(id, &document);
            return Ok((document, false));
        }
        self.write(id, &document)?;
        self.feed
            .emit(ChangeEvent::update(&self.name, id, document.clone()));
        tracing::info!(collection = %self.name, uuid = %id, "reconciled document with schema");
        Ok((document, true))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn load(&self, id: &str) -> CoreResult<Option<Document>> {
        match self.backend.read(id)? {
            Some(bytes) => Document::decode(id, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Persists `document` and refreshes its index entry.
    fn write(&self, id: &str, document: &Document) -> CoreResult<()> {
        self.backend.write(id, &document.encode()?)?;
        self.index.write().insert(id, document);
        Ok(())
    }

    fn document_lock(&self, id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.lock().entry(id.to_string()).or_default())
    }

    /// Drops the table entry for `id` unless another caller still holds it.
    ///
    /// Clones are only handed out under the table lock, so a count of two
    /// (the table and `held`) means nobody else can be waiting on it.
    fn release_lock(&self, id: &str, held: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        let unshared = Arc::strong_count(held) == 2;
        if unshared && locks.get(id).is_some_and(|entry| Arc::ptr_eq(entry, held)) {
            locks.remove(id);
        }
    }

    fn log_changes(&self, id: &str, document: &Document, changes: &[FieldChange]) {
        let actor = ActorContext::resolve(document, self.resolver.as_ref());
        for change in changes {
            let (old, new) = match &change.old {
                Some(old) => reduce(old, &change.new),
                None => (Value::Null, change.new.clone()),
            };
            tracing::info!(
                collection = %self.name,
                uuid = %id,
                actor = %actor,
                field = %change.path,
                old = %old,
                new = %new,
                "updated field"
            );
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("fields", &self.schema.len())
            .field("indexed", &self.index.read().len())
            .finish_non_exhaustive()
    }
}
