//! Verify command implementation.

use super::open_store;
use quidstore_core::{CoreError, Document};
use quidstore_storage::{DirectoryBackend, DocumentBackend};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of documents checked.
    pub documents_checked: usize,
    /// Number of valid documents.
    pub valid_documents: usize,
    /// Number of corrupt documents.
    pub corrupt_documents: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.corrupt_documents == 0 && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, only: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {}", path.display());
    println!();

    let store = open_store(path)?;
    let names: Vec<String> = store
        .collection_names_on_disk()?
        .into_iter()
        .filter(|name| only.is_none_or(|wanted| wanted == name.as_str()))
        .collect();
    if let Some(wanted) = only {
        if names.is_empty() {
            return Err(format!("Collection '{wanted}' not found").into());
        }
    }

    let mut all_ok = true;
    for name in &names {
        let backend = DirectoryBackend::open_read_only(&path.join(name))?;
        let result = verify_collection(&backend)?;
        print_result(name, &result);
        all_ok &= result.is_ok();
    }

    println!();
    if all_ok {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err("Verification failed".into())
    }
}

/// Checks every document of one collection.
pub fn verify_collection(backend: &dyn DocumentBackend) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();

    for id in backend.list()? {
        result.documents_checked += 1;
        let Some(bytes) = backend.read(&id)? else {
            // Removed while scanning.
            result.documents_checked -= 1;
            continue;
        };
        match Document::decode(&id, &bytes) {
            Ok(doc) if doc.uuid() == Some(id.as_str()) => result.valid_documents += 1,
            Ok(doc) => {
                result.corrupt_documents += 1;
                result.errors.push(format!(
                    "{id}: uuid field is {}",
                    doc.uuid().map_or("missing".to_string(), |u| format!("'{u}'"))
                ));
            }
            Err(CoreError::Codec { message, .. }) => {
                result.corrupt_documents += 1;
                result.errors.push(format!("{id}: {message}"));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(result)
}

fn print_result(name: &str, result: &VerifyResult) {
    println!("  {name}:");
    println!("    Documents checked: {}", result.documents_checked);
    println!("    Valid: {}", result.valid_documents);
    println!("    Corrupt: {}", result.corrupt_documents);

    if !result.errors.is_empty() {
        println!("    Errors:");
        for error in result.errors.iter().take(10) {
            println!("      - {error}");
        }
        if result.errors.len() > 10 {
            println!("      ... and {} more", result.errors.len() - 10);
        }
    }
}
