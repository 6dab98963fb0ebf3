//! # QuidStore Core
//!
//! Embedded, schema-validated JSON document store.
//!
//! This crate provides:
//! - Schemas with typed, defaulted and locked fields, written as JSON
//!   shorthand or with a builder
//! - Collections of JSON documents, one file per document
//! - A MongoDB-style filter dialect (`$or`, `$gt`, `$nin`, ...)
//! - `$set` / `$inc` updates with type checks and per-field change logging
//! - Schema migration of stored documents
//! - An in-memory equality index and a change feed
//!
//! ## Example
//!
//! ```rust
//! use quidstore_core::{CollectionStore, Config, Schema};
//! use serde_json::json;
//!
//! let store = CollectionStore::in_memory(Config::default());
//! let profiles = store
//!     .collection("profiles", Schema::from_json(&json!({"name": "", "hp": 100})).unwrap())
//!     .unwrap();
//!
//! let rex = profiles.create(json!({"name": "Rex"})).unwrap();
//! let hurt = profiles
//!     .find_one_and_update(&json!({"uuid": rex.uuid()}), &json!({"$inc": {"hp": -30}}))
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(hurt.get("hp"), Some(&json!(70)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod collection;
mod config;
mod context;
mod diff;
mod dir;
mod document;
mod error;
mod filter;
mod id;
mod index;
mod migrate;
mod schema;
mod store;
mod update;

pub use change_feed::{ChangeEvent, ChangeFeed, ChangeType};
pub use collection::Collection;
pub use config::Config;
pub use context::{ActorContext, ContextResolver, RawIds};
pub use diff::reduce;
pub use dir::StoreDir;
pub use document::{json_eq, Document, ValueKind, UUID_FIELD};
pub use error::{CoreError, CoreResult};
pub use filter::{Comparison, Filter, Predicate};
pub use id::{IdAllocator, IdGenerator, UuidV4};
pub use index::FieldIndex;
pub use migrate::{reconcile, MigrationReport, Reconciled};
pub use schema::{FieldSchema, FieldType, Schema, SchemaBuilder, Shape};
pub use store::CollectionStore;
pub use update::{apply_update, FieldChange, UpdateOp, UpdateOutcome, UpdateSpec};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
