//! Store directory management.
//!
//! On-disk layout:
//!
//! ```text
//! <root>/
//! ├─ LOCK                # Advisory lock for single-writer
//! ├─ profiles/           # One directory per collection
//! │  ├─ <uuid>.json
//! │  └─ ...
//! └─ servers/
//! ```
//!
//! The LOCK file ensures only one process writes to the store at a time.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use quidstore_storage::validate_id;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";

/// Holds the store root and its exclusive lock.
///
/// Only one `StoreDir` can exist per directory at a time, across processes.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    /// Held for exclusive access; released on drop.
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates a store directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path is not a directory
    /// - Another process holds the lock (returns `StoreLocked`)
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_operation(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_operation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the directory of collection `name`.
    #[must_use]
    pub fn collection_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Lists the collection directories under the root, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be read.
    pub fn collection_names(&self) -> CoreResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_id(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
