//! CLI command implementations.

pub mod find;
pub mod inspect;
pub mod migrate;
pub mod verify;

use quidstore_core::{CollectionStore, Config};
use std::path::Path;

/// Opens an existing store without migrating anything on open.
fn open_store(path: &Path) -> Result<CollectionStore, Box<dyn std::error::Error>> {
    let config = Config::default()
        .create_if_missing(false)
        .migrate_on_open(false);
    Ok(CollectionStore::open(path, config)?)
}
