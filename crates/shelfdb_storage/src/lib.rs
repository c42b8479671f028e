//! # ShelfDB Storage
//!
//! Storage engines and the pure utilities they build on.
//!
//! Engines store JSON documents as opaque bytes addressed by string keys.
//! They do not normalize keys or parse documents; that is the job of the
//! collection layer in `shelfdb_core`.
//!
//! ## Design Principles
//!
//! - One [`StorageEngine`] contract, two structurally different backends
//! - Pure, I/O free path codec ([`pairtree`]) and version arithmetic ([`version`])
//! - Every failure is surfaced as a [`StorageError`], never retried or swallowed
//! - No internal locking; a single writer is assumed for the tree backend
//!
//! ## Available Backends
//!
//! - [`TreeEngine`] - One JSON file per object in a pairtree, indexed by `keymap.json`
//! - [`SqlEngine`] - One row per object in a SQLite table
//!
//! ## Example
//!
//! ```rust
//! use shelfdb_storage::{StorageEngine, TreeEngine};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut engine = TreeEngine::init(&dir.path().join("books.ds")).unwrap();
//! engine.create("abcd", br#"{"title":"Dune"}"#).unwrap();
//! assert_eq!(engine.keys().unwrap(), vec!["abcd"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod dsn;
mod error;
mod key;
pub mod pairtree;
mod sql;
mod tree;
pub mod version;

pub use backend::{StorageEngine, StorageType};
pub use dsn::{Dsn, MEMORY_TARGET};
pub use error::{ErrorKind, StorageError, StorageResult};
pub use key::{checked_key, is_normalized, normalize_key};
pub use sql::{sql_timestamp, table_name, SqlEngine, SQLITE_SCHEME, SQL_TIME_FORMAT};
pub use tree::{
    classify_file_name, object_file_name, read_keymap, version_file_name, write_atomic,
    write_keymap, KeyMap, TreeEngine, TreeFile, KEYMAP_FILE, PAIRTREE_DIR, VERSION_DELIMITER,
};
pub use version::{sort_versions, Version, VersioningPolicy};
