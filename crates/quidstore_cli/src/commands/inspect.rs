//! Inspect command implementation.

use super::open_store;
use quidstore_storage::{DirectoryBackend, DocumentBackend};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store root.
    pub path: String,
    /// Total number of documents.
    pub document_count: usize,
    /// Total size of all documents in bytes.
    pub total_size: u64,
    /// Per-collection statistics.
    pub collections: Vec<CollectionStats>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Number of documents.
    pub document_count: usize,
    /// Total document size in bytes.
    pub data_size: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let result = inspect(path, &store.collection_names_on_disk()?)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        "text" => print_text(&result),
        other => return Err(format!("Unknown format '{other}' (expected text or json)").into()),
    }
    Ok(())
}

/// Collects statistics for `names` under `path`.
pub fn inspect(path: &Path, names: &[String]) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let mut result = InspectResult {
        path: path.display().to_string(),
        document_count: 0,
        total_size: 0,
        collections: Vec::with_capacity(names.len()),
    };

    for name in names {
        let backend = DirectoryBackend::open_read_only(&path.join(name))?;
        let ids = backend.list()?;
        let mut data_size = 0;
        for id in &ids {
            data_size += backend.entry_size(id)?.unwrap_or(0);
        }
        result.document_count += ids.len();
        result.total_size += data_size;
        result.collections.push(CollectionStats {
            name: name.clone(),
            document_count: ids.len(),
            data_size,
        });
    }
    Ok(result)
}

fn print_text(result: &InspectResult) {
    println!("QuidStore Inspection");
    println!("====================");
    println!("  Path: {}", result.path);
    println!("  Documents: {}", result.document_count);
    println!("  Total size: {} bytes", result.total_size);

    if result.collections.is_empty() {
        println!("\n  No collections.");
        return;
    }
    println!("\nCollections:");
    for stats in &result.collections {
        println!(
            "  {:<24} {:>8} documents {:>12} bytes",
            stats.name, stats.document_count, stats.data_size
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn counts_documents_per_collection() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("profiles")).unwrap();
        fs::create_dir(temp.path().join("servers")).unwrap();
        fs::write(temp.path().join("profiles").join("a.json"), b"{}").unwrap();
        fs::write(temp.path().join("profiles").join("b.json"), b"{\"x\":1}").unwrap();
        fs::write(temp.path().join("profiles").join("notes.txt"), b"ignored").unwrap();

        let names = vec!["profiles".to_string(), "servers".to_string()];
        let result = inspect(temp.path(), &names).unwrap();
        assert_eq!(result.document_count, 2);
        assert_eq!(result.total_size, 9);
        assert_eq!(result.collections[0].document_count, 2);
        assert_eq!(result.collections[1].document_count, 0);
    }

    #[test]
    fn leaves_interrupted_writes_in_place() {
        let temp = tempdir().unwrap();
        let profiles = temp.path().join("profiles");
        fs::create_dir(&profiles).unwrap();
        fs::write(profiles.join("a.json"), b"{}").unwrap();
        fs::write(profiles.join("b.json.tmp"), b"{\"half").unwrap();

        let result = inspect(temp.path(), &["profiles".to_string()]).unwrap();
        assert_eq!(result.document_count, 1);
        assert!(profiles.join("b.json.tmp").exists());
    }
}
