//! Find command implementation.

use super::open_store;
use quidstore_core::{Collection, Config, Filter, Schema};
use quidstore_storage::DirectoryBackend;
use std::path::Path;
use tracing::info;

/// Runs the find command, printing one JSON document per line.
pub fn run(
    path: &Path,
    collection: &str,
    filter: &str,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = Filter::parse(&serde_json::from_str(filter)?)?;
    let store = open_store(path)?;
    if !store.collection_names_on_disk()?.iter().any(|n| n == collection) {
        return Err(format!("Collection '{collection}' not found").into());
    }

    // Nothing is migrated or written, so any schema will do for reading.
    let backend = DirectoryBackend::open_read_only(&path.join(collection))?;
    let config = Config::default().migrate_on_open(false);
    let documents =
        Collection::open(collection, Schema::new(), Box::new(backend), &config)?.find_where(&filter)?;
    info!(collection, matched = documents.len(), "query finished");

    for document in documents.iter().take(limit.unwrap_or(usize::MAX)) {
        println!("{document}");
    }
    Ok(())
}
