//! # QuidStore Storage
//!
//! Keyed storage backends for QuidStore.
//!
//! This crate provides the lowest-level storage abstraction for QuidStore.
//! Backends are **opaque keyed byte stores** - they map a document id to
//! the bytes of that document and do not interpret what they store.
//!
//! ## Design Principles
//!
//! - One entry per document id, replaced as a whole on write
//! - No knowledge of JSON, schemas or queries
//! - Must be `Send + Sync` for concurrent access
//! - QuidStore core owns all encoding and validation
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`DirectoryBackend`] - One `<id>.json` file per document in a directory
//!
//! ## Example
//!
//! ```rust
//! use quidstore_storage::{DocumentBackend, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.write("a1", b"{}").unwrap();
//! assert_eq!(backend.read("a1").unwrap(), Some(b"{}".to_vec()));
//! assert_eq!(backend.list().unwrap(), vec!["a1".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod directory;
mod error;
mod memory;

pub use backend::{validate_id, DocumentBackend};
pub use directory::{DirectoryBackend, DOCUMENT_EXTENSION};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryBackend;
