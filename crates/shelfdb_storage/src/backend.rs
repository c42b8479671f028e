//! Storage engine trait definition.

use crate::error::{StorageError, StorageResult};
use crate::version::{Version, VersioningPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which backend a collection was created with.
///
/// The storage type is fixed when a collection is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Pairtree directories, one JSON file per object.
    #[serde(alias = "pairtree")]
    Tree,
    /// One row per object in a SQL table.
    #[serde(alias = "sqlstore")]
    Relational,
}

impl StorageType {
    /// Returns the canonical name used in collection metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tree => "tree",
            Self::Relational => "relational",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tree" | "pairtree" => Ok(Self::Tree),
            "relational" | "sqlstore" => Ok(Self::Relational),
            other => Err(StorageError::malformed(format!(
                "unknown storage type {other:?}"
            ))),
        }
    }
}

/// A keyed store of JSON documents with optional version history.
///
/// Engines store opaque JSON bytes; they never parse or validate them.
/// Keys arrive already normalized, normalization is the caller's job.
///
/// # Contract
///
/// - `create` fails on an existing key, `update` and `delete` fail on a
///   missing one. Overwrite-on-create is decided above the engine.
/// - When the versioning policy is enabled, `update` snapshots the
///   pre-update content under the next version identifier before the
///   object is overwritten.
/// - `delete` removes the object together with all its versions.
/// - `keys` is sorted ascending.
///
/// Engines hold no internal lock. Callers sharing an engine across
/// threads must serialize access themselves.
pub trait StorageEngine: Send {
    /// Returns which backend this is.
    fn storage_type(&self) -> StorageType;

    /// Stores a new object.
    ///
    /// # Errors
    ///
    /// Returns `KeyExists` if the key is already present, or an I/O or
    /// database error.
    fn create(&mut self, key: &str, src: &[u8]) -> StorageResult<()>;

    /// Reads the current content of an object.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the key is absent.
    fn read(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Replaces the content of an existing object.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the key is absent.
    fn update(&mut self, key: &str, src: &[u8]) -> StorageResult<()>;

    /// Removes an object and its version history.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the key is absent.
    fn delete(&mut self, key: &str) -> StorageResult<()>;

    /// Lists all keys in ascending order. O(n) in the key count.
    ///
    /// # Errors
    ///
    /// Returns a database error if the key projection fails.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Returns true if the key is present.
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    fn has_key(&self, key: &str) -> StorageResult<bool>;

    /// Returns the number of stored objects.
    ///
    /// # Errors
    ///
    /// Returns a database error if the count fails.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true if no objects are stored.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`StorageEngine::len`].
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns the active versioning policy.
    fn versioning(&self) -> VersioningPolicy;

    /// Changes the versioning policy for subsequent updates.
    fn set_versioning(&mut self, policy: VersioningPolicy);

    /// Lists the recorded versions of a key, ascending.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the key is absent.
    fn versions(&self, key: &str) -> StorageResult<Vec<Version>>;

    /// Reads a historical snapshot of an object.
    ///
    /// # Errors
    ///
    /// Returns `VersioningDisabled` when the policy is `none`,
    /// `KeyNotFound` or `VersionNotFound` when absent.
    fn read_version(&self, key: &str, version: &Version) -> StorageResult<Vec<u8>>;

    /// Lists keys whose last modification falls in `[start, end]`,
    /// oldest first. O(n) in the key count.
    ///
    /// # Errors
    ///
    /// Returns an I/O or database error.
    fn updated_keys(&self, start: DateTime<Utc>, end: DateTime<Utc>)
        -> StorageResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_type_names() {
        assert_eq!("pairtree".parse::<StorageType>().unwrap(), StorageType::Tree);
        assert_eq!("SQLStore".parse::<StorageType>().unwrap(), StorageType::Relational);
        assert!("s3".parse::<StorageType>().is_err());

        let json = serde_json::to_string(&StorageType::Relational).unwrap();
        assert_eq!(json, "\"relational\"");
        let parsed: StorageType = serde_json::from_str("\"pairtree\"").unwrap();
        assert_eq!(parsed, StorageType::Tree);
    }
}
