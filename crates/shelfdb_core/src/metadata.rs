//! The `collection.json` metadata document.
//!
//! ```json
//! {
//!   "shelfdb": "0.3.0",
//!   "name": "books.ds",
//!   "storage_type": "relational",
//!   "dsn_uri": "sqlite://collection.sqlite",
//!   "versioning": "patch",
//!   "created": "2024-05-01T12:00:00Z",
//!   "frames": ["titles"],
//!   "metadata": { "license": "CC0", "contacts": ["ada@example.org"] }
//! }
//! ```

use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelfdb_storage::{write_atomic, StorageType, VersioningPolicy};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Free-form descriptive metadata of a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    /// Human readable description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// License name or URL.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub license: String,
    /// Contact addresses.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,
    /// Author names.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Subject keywords.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// Persistent settings of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    /// ShelfDB version that wrote the file.
    #[serde(rename = "shelfdb", default)]
    pub shelfdb_version: String,
    /// Collection name (the directory name).
    pub name: String,
    /// Backend chosen at creation time.
    pub storage_type: StorageType,
    /// Connection descriptor for the relational backend.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dsn_uri: String,
    /// Versioning policy applied on update.
    #[serde(default)]
    pub versioning: VersioningPolicy,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Names of the frames defined on the collection.
    #[serde(default)]
    pub frames: BTreeSet<String>,
    /// Descriptive metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl CollectionMeta {
    /// Creates metadata for a new collection.
    #[must_use]
    pub fn new(name: impl Into<String>, storage_type: StorageType) -> Self {
        Self {
            shelfdb_version: crate::VERSION.to_string(),
            name: name.into(),
            storage_type,
            dsn_uri: String::new(),
            versioning: VersioningPolicy::None,
            created: Utc::now(),
            frames: BTreeSet::new(),
            metadata: Metadata::default(),
        }
    }

    /// Reads and parses a metadata file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if unreadable or a JSON error if it does not parse.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Writes the metadata file atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let data = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("collection.json");

        let mut meta = CollectionMeta::new("books.ds", StorageType::Relational);
        meta.dsn_uri = "sqlite://collection.sqlite".into();
        meta.versioning = VersioningPolicy::Minor;
        meta.frames.insert("titles".into());
        meta.metadata.license = "CC0".into();
        meta.save(&path).unwrap();

        let loaded = CollectionMeta::load(&path).unwrap();
        assert_eq!(loaded, meta);
    }

    #[test]
    fn accepts_legacy_names() {
        let json = r#"{
            "dataset": "2.1.0",
            "name": "old.ds",
            "storage_type": "pairtree",
            "versioning": "",
            "created": "2021-01-02T03:04:05Z"
        }"#;
        let meta: CollectionMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.storage_type, StorageType::Tree);
        assert_eq!(meta.versioning, VersioningPolicy::None);
        assert!(meta.frames.is_empty());
        assert!(meta.shelfdb_version.is_empty());
    }

    #[test]
    fn empty_metadata_is_omitted() {
        let meta = CollectionMeta::new("c.ds", StorageType::Tree);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["metadata"], serde_json::json!({}));
        assert!(json.get("dsn_uri").is_none());
    }
}
