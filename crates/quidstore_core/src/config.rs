//! Store configuration.

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create directories that don't exist yet.
    pub create_if_missing: bool,

    /// Whether to fsync every document write (safer but slower).
    pub sync_on_write: bool,

    /// Whether to reconcile every document with its schema when a collection opens.
    pub migrate_on_open: bool,

    /// How many ids the allocator may try before giving up.
    pub max_id_attempts: u32,

    /// Top-level fields kept in the in-memory equality index.
    pub index_fields: Vec<String>,

    /// Number of change events kept for polling.
    pub change_feed_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
            migrate_on_open: true,
            max_id_attempts: 8,
            index_fields: vec!["userId".to_string(), "serverId".to_string()],
            change_feed_history: 10_000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create missing directories.
    #[must_use]
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync every document write.
    #[must_use]
    pub fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether collections are migrated when opened.
    #[must_use]
    pub fn migrate_on_open(mut self, value: bool) -> Self {
        self.migrate_on_open = value;
        self
    }

    /// Sets the id allocation attempt bound.
    #[must_use]
    pub fn max_id_attempts(mut self, attempts: u32) -> Self {
        self.max_id_attempts = attempts.max(1);
        self
    }

    /// Replaces the indexed fields.
    #[must_use]
    pub fn index_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the change feed history size.
    #[must_use]
    pub fn change_feed_history(mut self, size: usize) -> Self {
        self.change_feed_history = size;
        self
    }
}
