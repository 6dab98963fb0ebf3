//! Directory-based storage backend for persistent storage.

use crate::backend::{validate_id, DocumentBackend};
use crate::error::{StorageError, StorageResult};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// File extension of stored documents.
pub const DOCUMENT_EXTENSION: &str = "json";

/// Suffix of in-flight writes.
const TEMP_SUFFIX: &str = ".json.tmp";

/// A directory-based storage backend.
///
/// Every document lives in its own file named `<id>.json` inside the
/// backend directory:
///
/// ```text
/// <collection_dir>/
/// ├─ 0b6f1c1e-....json
/// └─ 8d1e44a0-....json
/// ```
///
/// # Durability
///
/// Writes use the write-then-rename pattern: the bytes go to
/// `<id>.json.tmp`, which is renamed over `<id>.json`. A crash leaves either
/// the old or the new document, never a torn one. With `sync_on_write`
/// the temporary file and the directory are fsynced as well.
///
/// A crash between the two steps leaves a `<id>.json.tmp` behind. [`open`]
/// deletes those; [`open_read_only`] leaves the directory exactly as found.
///
/// [`open`]: DirectoryBackend::open
/// [`open_read_only`]: DirectoryBackend::open_read_only
///
/// # Example
///
/// ```no_run
/// use quidstore_storage::{DirectoryBackend, DocumentBackend};
/// use std::path::Path;
///
/// let backend = DirectoryBackend::open(Path::new("database/profiles"), true).unwrap();
/// backend.write("a1", b"{}").unwrap();
/// ```
#[derive(Debug)]
pub struct DirectoryBackend {
    path: PathBuf,
    sync_on_write: bool,
    read_only: bool,
}

impl DirectoryBackend {
    /// Opens a backend over the given directory.
    ///
    /// Leftover temporary files from an interrupted write are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist and
    /// `create_if_missing` is false, if the path is not a directory, or if
    /// an I/O error occurs.
    pub fn open(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        let backend = Self::at(path, create_if_missing, false)?;
        backend.remove_stale_temp_files()?;
        Ok(backend)
    }

    /// Opens an existing directory for reading only.
    ///
    /// Nothing in the directory is created, changed, or removed; `write`
    /// and `remove` fail with [`StorageError::ReadOnly`].
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or is not a
    /// directory.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        Self::at(path, false, true)
    }

    fn at(path: &Path, create_if_missing: bool, read_only: bool) -> StorageResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::Unavailable(format!(
                    "directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            sync_on_write: false,
            read_only,
        })
    }

    /// Sets whether every write is fsynced before it becomes visible.
    #[must_use]
    pub fn with_sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Returns `true` if the backend was opened with [`open_read_only`].
    ///
    /// [`open_read_only`]: DirectoryBackend::open_read_only
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns the backend directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the file that stores `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid.
    pub fn document_path(&self, id: &str) -> StorageResult<PathBuf> {
        validate_id(id)?;
        Ok(self.path.join(format!("{id}.{DOCUMENT_EXTENSION}")))
    }

    fn temp_path(&self, id: &str) -> PathBuf {
        self.path.join(format!("{id}{TEMP_SUFFIX}"))
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly(self.path.display().to_string()));
        }
        Ok(())
    }

    fn remove_stale_temp_files(&self) -> StorageResult<()> {
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().ends_with(TEMP_SUFFIX) {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl DocumentBackend for DirectoryBackend {
    fn list(&self) -> StorageResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_id(stem).is_ok() {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn read(&self, id: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.document_path(id)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, id: &str, data: &[u8]) -> StorageResult<()> {
        self.ensure_writable()?;
        let target = self.document_path(id)?;
        let temp = self.temp_path(id);

        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        if self.sync_on_write {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&temp, &target)?;

        if self.sync_on_write {
            self.sync_directory()?;
        }
        Ok(())
    }

    fn remove(&self, id: &str) -> StorageResult<bool> {
        self.ensure_writable()?;
        let path = self.document_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                if self.sync_on_write {
                    self.sync_directory()?;
                }
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, id: &str) -> StorageResult<bool> {
        Ok(self.document_path(id)?.is_file())
    }

    fn entry_size(&self, id: &str) -> StorageResult<Option<u64>> {
        let path = self.document_path(id)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
