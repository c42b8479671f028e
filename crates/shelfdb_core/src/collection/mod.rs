//! The collection façade.

mod sample;
mod typed;

pub use sample::SampleSplit;

use crate::config::{Config, DSN_ENV_VAR};
use crate::dir::{CollectionDir, PresenceMarker};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{CollectionMeta, Metadata};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use shelfdb_storage::{
    checked_key, Dsn, StorageEngine, StorageType, SqlEngine, TreeEngine, Version,
    VersioningPolicy, SQLITE_SCHEME,
};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// A named set of JSON objects addressed by case-insensitive keys.
///
/// `Collection` owns its storage engine, its metadata and the advisory
/// presence marker for as long as it is open. Frames and attachments are
/// reached through it, never around it.
///
/// # Example
///
/// ```rust
/// use shelfdb_core::{Collection, Config};
/// use serde_json::json;
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut books = Collection::init(dir.path().join("books.ds"), Config::default()).unwrap();
///
/// books.create("Dune", &json!({"title": "Dune"})).unwrap();
/// assert_eq!(books.read("dune").unwrap()["title"], "Dune");
/// assert_eq!(books.keys().unwrap(), vec!["dune"]);
/// ```
///
/// # Concurrency
///
/// No operation takes an internal lock. An application sharing a
/// collection between threads must serialize access itself, and only
/// one process may write to a tree-backed collection at a time.
pub struct Collection {
    pub(crate) dir: CollectionDir,
    pub(crate) meta: CollectionMeta,
    pub(crate) engine: Box<dyn StorageEngine>,
    marker: Option<PresenceMarker>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("path", &self.dir.path())
            .field("storage_type", &self.meta.storage_type)
            .field("versioning", &self.meta.versioning)
            .finish_non_exhaustive()
    }
}

impl Collection {
    /// Creates a new collection and opens it.
    ///
    /// An empty DSN in `config` selects the tree backend, anything else the
    /// relational backend.
    ///
    /// # Errors
    ///
    /// Returns `CollectionExists` if the path exists, an invalid input error
    /// for a malformed or unsupported DSN, or an I/O or database error. A
    /// failed init removes the directory it created.
    pub fn init(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let path = path.as_ref();
        let storage_type = config.storage_type();
        if storage_type == StorageType::Relational {
            check_dsn(&Dsn::parse(&config.dsn)?)?;
        }

        let dir = CollectionDir::create(path)?;
        let mut meta = CollectionMeta::new(dir.name(), storage_type);
        meta.dsn_uri = config.dsn.trim().to_string();
        meta.versioning = config.versioning;
        meta.metadata = config.metadata;

        let prepared = (|| -> CoreResult<()> {
            dir.save_meta(&meta)?;
            match storage_type {
                StorageType::Tree => drop(TreeEngine::init(dir.path())?),
                StorageType::Relational => {
                    drop(SqlEngine::open(dir.path(), &Dsn::parse(&meta.dsn_uri)?)?)
                }
            }
            Ok(())
        })();
        if let Err(e) = prepared {
            if let Err(cleanup) = fs::remove_dir_all(dir.path()) {
                warn!(
                    path = %dir.path().display(),
                    error = %cleanup,
                    "failed to remove partially initialized collection"
                );
            }
            return Err(e);
        }

        info!(path = %path.display(), storage = %storage_type, "initialized collection");
        Self::open(path)
    }

    /// Opens an existing collection.
    ///
    /// The backend is chosen from the metadata. A relational collection
    /// without a recorded DSN falls back to the `SHELFDB_DSN_URI`
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if the directory or its metadata is
    /// missing, or any error raised while opening the engine.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let dir = CollectionDir::existing(path.as_ref())?;
        if !dir.metadata_path().is_file() {
            return Err(CoreError::collection_not_found(dir.metadata_path()));
        }
        let meta = dir.load_meta()?;
        let mut engine = open_engine(&dir, &meta)?;
        engine.set_versioning(meta.versioning);
        let marker = dir.acquire_marker()?;

        info!(
            path = %dir.path().display(),
            storage = %meta.storage_type,
            versioning = %meta.versioning,
            "opened collection"
        );
        Ok(Self {
            dir,
            meta,
            engine,
            marker: Some(marker),
        })
    }

    /// Closes the collection, releasing the engine and the presence marker.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the marker cannot be removed.
    pub fn close(mut self) -> CoreResult<()> {
        if let Some(marker) = self.marker.take() {
            marker.release()?;
        }
        info!(path = %self.dir.path().display(), "closed collection");
        Ok(())
    }

    /// Returns the collection directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Returns the backend in use.
    #[must_use]
    pub fn storage_type(&self) -> StorageType {
        self.meta.storage_type
    }

    /// Returns the full metadata document.
    #[must_use]
    pub fn meta(&self) -> &CollectionMeta {
        &self.meta
    }

    /// Returns the descriptive metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.meta.metadata
    }

    /// Replaces the descriptive metadata and rewrites `collection.json`.
    ///
    /// # Errors
    ///
    /// Returns an I/O or JSON error.
    pub fn set_metadata(&mut self, metadata: Metadata) -> CoreResult<()> {
        self.meta.metadata = metadata;
        self.dir.save_meta(&self.meta)
    }

    /// Returns the versioning policy.
    #[must_use]
    pub fn versioning(&self) -> VersioningPolicy {
        self.meta.versioning
    }

    /// Changes the versioning policy and rewrites `collection.json`.
    ///
    /// # Errors
    ///
    /// Returns an I/O or JSON error.
    pub fn set_versioning(&mut self, policy: VersioningPolicy) -> CoreResult<()> {
        self.meta.versioning = policy;
        self.engine.set_versioning(policy);
        self.dir.save_meta(&self.meta)
    }

    /// Stores a new object.
    ///
    /// # Errors
    ///
    /// Returns an `AlreadyExists` error if the key is taken.
    pub fn create(&mut self, key: &str, object: &Value) -> CoreResult<()> {
        let key = checked_key(key)?;
        let src = serde_json::to_vec_pretty(object)?;
        self.engine.create(&key, &src)?;
        debug!(key = %key, "created object");
        Ok(())
    }

    /// Stores an object, updating it if the key is taken.
    ///
    /// Updating goes through versioning like [`Collection::update`].
    ///
    /// # Errors
    ///
    /// Returns an I/O or database error.
    pub fn create_or_replace(&mut self, key: &str, object: &Value) -> CoreResult<()> {
        let key = checked_key(key)?;
        if self.engine.has_key(&key)? {
            self.update(&key, object)
        } else {
            self.create(&key, object)
        }
    }

    /// Reads an object.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the key is absent, or a JSON error if
    /// the stored document does not parse.
    pub fn read(&self, key: &str) -> CoreResult<Value> {
        Ok(serde_json::from_slice(&self.read_json(key)?)?)
    }

    /// Replaces an object, recording a version first if versioning is on.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the key is absent.
    pub fn update(&mut self, key: &str, object: &Value) -> CoreResult<()> {
        let key = checked_key(key)?;
        let src = serde_json::to_vec_pretty(object)?;
        self.engine.update(&key, &src)?;
        debug!(key = %key, "updated object");
        Ok(())
    }

    /// Removes an object together with its versions and attachments.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the key is absent.
    pub fn delete(&mut self, key: &str) -> CoreResult<()> {
        let key = checked_key(key)?;
        self.engine.delete(&key)?;
        self.remove_attachments(&key)?;
        debug!(key = %key, "deleted object");
        Ok(())
    }

    /// Stores a new object from raw JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an invalid input error if the bytes are not JSON, or an
    /// `AlreadyExists` error if the key is taken.
    pub fn create_json(&mut self, key: &str, src: &[u8]) -> CoreResult<()> {
        let key = checked_key(key)?;
        validate_json(&key, src)?;
        self.engine.create(&key, src)?;
        Ok(())
    }

    /// Reads the stored JSON bytes of an object.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the key is absent.
    pub fn read_json(&self, key: &str) -> CoreResult<Vec<u8>> {
        let key = checked_key(key)?;
        Ok(self.engine.read(&key)?)
    }

    /// Replaces an object from raw JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an invalid input error if the bytes are not JSON, or a
    /// `NotFound` error if the key is absent.
    pub fn update_json(&mut self, key: &str, src: &[u8]) -> CoreResult<()> {
        let key = checked_key(key)?;
        validate_json(&key, src)?;
        self.engine.update(&key, src)?;
        Ok(())
    }

    /// Lists all keys in ascending order. O(n) in the key count.
    ///
    /// # Errors
    ///
    /// Returns an engine error.
    pub fn keys(&self) -> CoreResult<Vec<String>> {
        Ok(self.engine.keys()?)
    }

    /// Returns true if an object is stored under the key.
    ///
    /// # Errors
    ///
    /// Returns an engine error.
    pub fn has_key(&self, key: &str) -> CoreResult<bool> {
        let key = checked_key(key)?;
        Ok(self.engine.has_key(&key)?)
    }

    /// Returns the number of objects.
    ///
    /// # Errors
    ///
    /// Returns an engine error.
    pub fn len(&self) -> CoreResult<u64> {
        Ok(self.engine.len()?)
    }

    /// Returns true if the collection holds no objects.
    ///
    /// # Errors
    ///
    /// Returns an engine error.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.engine.is_empty()?)
    }

    /// Lists the recorded versions of an object, ascending.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the key is absent.
    pub fn versions(&self, key: &str) -> CoreResult<Vec<Version>> {
        let key = checked_key(key)?;
        Ok(self.engine.versions(&key)?)
    }

    /// Reads an object as it was at a recorded version.
    ///
    /// # Errors
    ///
    /// Returns a policy violation if versioning is disabled, an invalid
    /// input error for a malformed identifier, or `NotFound`.
    pub fn read_version(&self, key: &str, version: &str) -> CoreResult<Value> {
        let key = checked_key(key)?;
        let version = Version::parse(version)?;
        let src = self.engine.read_version(&key, &version)?;
        Ok(serde_json::from_slice(&src)?)
    }

    /// Lists keys modified within `[start, end]`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an invalid input error if `start` is after `end`.
    pub fn updated_keys(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CoreResult<Vec<String>> {
        if start > end {
            return Err(CoreError::invalid_input(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(self.engine.updated_keys(start, end)?)
    }

    /// Like [`Collection::updated_keys`], parsing the bounds from text.
    ///
    /// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`. A bare date
    /// covers the whole day: midnight for `start`, the last instant for `end`.
    ///
    /// # Errors
    ///
    /// Returns an invalid input error if either bound does not parse.
    pub fn updated_keys_between(&self, start: &str, end: &str) -> CoreResult<Vec<String>> {
        let start = parse_timestamp(start, false)?;
        let end = parse_timestamp(end, true)?;
        self.updated_keys(start, end)
    }
}

fn check_dsn(dsn: &Dsn) -> CoreResult<()> {
    if dsn.scheme() != SQLITE_SCHEME {
        return Err(CoreError::invalid_input(format!(
            "unsupported DSN scheme {:?}",
            dsn.scheme()
        )));
    }
    Ok(())
}

/// Resolves the DSN of a relational collection.
pub(crate) fn resolve_dsn(meta: &CollectionMeta) -> CoreResult<Dsn> {
    let uri = if meta.dsn_uri.trim().is_empty() {
        std::env::var(DSN_ENV_VAR).unwrap_or_default()
    } else {
        meta.dsn_uri.clone()
    };
    if uri.trim().is_empty() {
        return Err(CoreError::invalid_input(format!(
            "relational collection {} has no DSN and {DSN_ENV_VAR} is not set",
            meta.name
        )));
    }
    Ok(Dsn::parse(&uri)?)
}

fn open_engine(dir: &CollectionDir, meta: &CollectionMeta) -> CoreResult<Box<dyn StorageEngine>> {
    Ok(match meta.storage_type {
        StorageType::Tree => Box::new(TreeEngine::open(dir.path())?),
        StorageType::Relational => Box::new(SqlEngine::open(dir.path(), &resolve_dsn(meta)?)?),
    })
}

fn validate_json(key: &str, src: &[u8]) -> CoreResult<()> {
    serde_json::from_slice::<serde::de::IgnoredAny>(src)
        .map(|_| ())
        .map_err(|e| CoreError::invalid_input(format!("object {key} is not valid JSON: {e}")))
}

fn parse_timestamp(text: &str, end_of_day: bool) -> CoreResult<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Ok(time.with_timezone(&Utc));
    }
    if let Ok(time) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Ok(time.and_utc());
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| CoreError::invalid_input(format!("unrecognized timestamp {text:?}")))?;
    let time = if end_of_day {
        date.and_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| CoreError::invalid_input(format!("unrecognized timestamp {text:?}")))
}
