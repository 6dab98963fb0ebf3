//! Migrate command implementation.

use super::open_store;
use quidstore_core::{reconcile, Document, MigrationReport, Schema, UUID_FIELD};
use quidstore_storage::{DirectoryBackend, DocumentBackend};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Runs the migrate command.
pub fn run(
    path: &Path,
    collection: &str,
    schema_path: &Path,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = load_schema(schema_path)?;
    let store = open_store(path)?;
    if !store.collection_names_on_disk()?.iter().any(|n| n == collection) {
        return Err(format!("Collection '{collection}' not found").into());
    }

    let report = if dry_run {
        let backend = DirectoryBackend::open_read_only(&path.join(collection))?;
        preview(&backend, &schema)?
    } else {
        store.collection(collection, schema)?.migrate_all()?
    };
    info!(collection, dry_run, "migration finished");

    println!("Migration of '{collection}'{}", if dry_run { " (dry run)" } else { "" });
    println!("  Scanned:   {}", report.scanned);
    println!(
        "  {}: {}",
        if dry_run { "Would rewrite" } else { "Rewritten" },
        report.rewritten
    );
    println!("  Skipped:   {}", report.skipped);
    Ok(())
}

/// Reads a schema file written in the JSON shorthand.
pub fn load_schema(path: &Path) -> Result<Schema, Box<dyn std::error::Error>> {
    let raw: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    Ok(Schema::from_json(&raw)?)
}

/// Counts the documents a migration would rewrite, without writing.
pub fn preview(backend: &dyn DocumentBackend, schema: &Schema) -> Result<MigrationReport, Box<dyn std::error::Error>> {
    let mut report = MigrationReport::default();
    for id in backend.list()? {
        let Some(bytes) = backend.read(&id)? else {
            continue;
        };
        report.scanned += 1;
        let current = match Document::decode(&id, &bytes) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(uuid = %id, error = %e, "skipping corrupted document");
                report.skipped += 1;
                continue;
            }
        };
        let mut migrated = reconcile(&current, schema).document;
        migrated.insert(UUID_FIELD, Value::String(id.clone()));
        if migrated != current {
            report.rewritten += 1;
        }
    }
    Ok(report)
}
