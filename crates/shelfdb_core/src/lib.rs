//! # ShelfDB Core
//!
//! Collections of JSON objects on top of the `shelfdb_storage` engines.
//!
//! This crate provides:
//! - [`Collection`], the façade every caller goes through
//! - Optional per-object version history under a [`VersioningPolicy`]
//! - Frames: named, cached projections over a key list ([`Frame`])
//! - Attachments: files bound to an object key ([`AttachmentInfo`])
//! - Cloning and random sampling into new collections
//! - A consistency checker and best-effort repair ([`check`], [`repair`])
//!
//! ## Example
//!
//! ```rust
//! use shelfdb_core::{Collection, Config, VersioningPolicy};
//! use serde_json::json;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = Config::new().versioning(VersioningPolicy::Patch);
//! let mut c = Collection::init(dir.path().join("notes.ds"), config).unwrap();
//!
//! c.create("n1", &json!({"text": "draft"})).unwrap();
//! c.update("n1", &json!({"text": "final"})).unwrap();
//! assert_eq!(c.read_version("n1", "0.0.1").unwrap()["text"], "draft");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attachment;
mod check;
mod collection;
mod config;
mod dir;
pub mod dotpath;
mod error;
mod frame;
mod metadata;
mod registry;

pub use attachment::AttachmentInfo;
pub use check::{analyze, check, repair, CheckReport};
pub use collection::{Collection, SampleSplit};
pub use config::{Config, DSN_ENV_VAR};
pub use dir::{ATTACHMENTS_DIR, FRAMES_DIR, LOCK_FILE, METADATA_FILE};
pub use dotpath::DotPath;
pub use error::{CoreError, CoreResult};
pub use frame::{Frame, FrameDef, FrameObject};
pub use metadata::{CollectionMeta, Metadata};
pub use registry::CollectionRegistry;

pub use shelfdb_storage::{ErrorKind, StorageType, Version, VersioningPolicy};

/// Crate version, recorded in `collection.json`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
