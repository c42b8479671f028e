//! Pairtree storage engine.
//!
//! Layout inside a collection directory:
//!
//! ```text
//! <collection>/
//! ├─ keymap.json                     # key -> pairtree path index
//! └─ pairtree/
//!    └─ ab/cd/                       # pairtree path of key "abcd"
//!       ├─ abcd.json                 # current object
//!       └─ abcd^0.0.1.json           # version snapshot
//! ```
//!
//! The key map is authoritative: a key missing from it is not found even if
//! a stray file sits on disk. It is rewritten in full after every mutation,
//! which makes each write O(n) in the key count and assumes a single writer.

use crate::backend::{StorageEngine, StorageType};
use crate::error::{StorageError, StorageResult};
use crate::pairtree;
use crate::version::{Version, VersioningPolicy};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory holding the pairtree, relative to the collection.
pub const PAIRTREE_DIR: &str = "pairtree";
/// Key map file name, relative to the collection.
pub const KEYMAP_FILE: &str = "keymap.json";
/// Separates the encoded key from the version in snapshot file names.
pub const VERSION_DELIMITER: char = '^';

const JSON_EXT: &str = ".json";

/// Key to relative pairtree path, sorted by key.
pub type KeyMap = BTreeMap<String, String>;

/// File name of the current object for a key.
#[must_use]
pub fn object_file_name(key: &str) -> String {
    format!("{}{JSON_EXT}", pairtree::char_encode(key))
}

/// File name of a version snapshot for a key.
#[must_use]
pub fn version_file_name(key: &str, version: &Version) -> String {
    format!(
        "{}{VERSION_DELIMITER}{version}{JSON_EXT}",
        pairtree::char_encode(key)
    )
}

/// What a file found in a pairtree leaf holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeFile {
    /// The current content of `key`.
    Object {
        /// The decoded key.
        key: String,
    },
    /// A snapshot of `key` at `version`.
    Version {
        /// The decoded key.
        key: String,
        /// The snapshot identifier.
        version: Version,
    },
}

/// Classifies a file name found inside the pairtree.
///
/// Encoded keys never contain `.`, while version identifiers always do,
/// so a `^` followed by a parseable identifier marks a snapshot.
#[must_use]
pub fn classify_file_name(name: &str) -> Option<TreeFile> {
    let stem = name.strip_suffix(JSON_EXT)?;
    if stem.is_empty() {
        return None;
    }
    if let Some((encoded, tail)) = stem.rsplit_once(VERSION_DELIMITER) {
        if tail.contains('.') {
            let version = Version::parse(tail).ok()?;
            return Some(TreeFile::Version {
                key: pairtree::char_decode(encoded),
                version,
            });
        }
    }
    Some(TreeFile::Object {
        key: pairtree::char_decode(stem),
    })
}

/// Writes a file by writing a sibling temp file and renaming it into place.
///
/// # Errors
///
/// Returns an error if the temp file cannot be written or renamed.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    let mut file = File::create(&temp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp, path)
}

/// Reads a key map file.
///
/// # Errors
///
/// Returns an I/O error if the file is unreadable, or a JSON error if it
/// does not parse.
pub fn read_keymap(path: &Path) -> StorageResult<KeyMap> {
    let data = fs::read(path)?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(KeyMap::new());
    }
    Ok(serde_json::from_slice(&data)?)
}

/// Replaces the key map of a collection.
///
/// # Errors
///
/// Returns an error if serialization or the atomic write fails.
pub fn write_keymap(collection_dir: &Path, keymap: &KeyMap) -> StorageResult<()> {
    let data = serde_json::to_vec_pretty(keymap)?;
    write_atomic(&collection_dir.join(KEYMAP_FILE), &data)?;
    Ok(())
}

/// Storage engine keeping one JSON file per object in a pairtree.
#[derive(Debug)]
pub struct TreeEngine {
    /// Collection directory.
    root: PathBuf,
    /// In-memory copy of `keymap.json`.
    index: KeyMap,
    policy: VersioningPolicy,
}

impl TreeEngine {
    /// Prepares the pairtree layout in a collection directory and opens it.
    ///
    /// An existing key map is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories or the key map cannot be written.
    pub fn init(collection_dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(collection_dir.join(PAIRTREE_DIR))?;
        let keymap_path = collection_dir.join(KEYMAP_FILE);
        if !keymap_path.exists() {
            write_keymap(collection_dir, &KeyMap::new())?;
        }
        Self::open(collection_dir)
    }

    /// Opens an existing pairtree, loading its key map.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the key map is missing or does not parse.
    pub fn open(collection_dir: &Path) -> StorageResult<Self> {
        let keymap_path = collection_dir.join(KEYMAP_FILE);
        if !keymap_path.exists() {
            return Err(StorageError::corrupted(format!(
                "{} is missing",
                keymap_path.display()
            )));
        }
        let index = read_keymap(&keymap_path).map_err(|e| {
            StorageError::corrupted(format!("{}: {e}", keymap_path.display()))
        })?;
        debug!(path = %collection_dir.display(), keys = index.len(), "opened pairtree");

        Ok(Self {
            root: collection_dir.to_path_buf(),
            index,
            policy: VersioningPolicy::None,
        })
    }

    /// Returns the collection directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Returns the root of the pairtree.
    #[must_use]
    pub fn pairtree_root(&self) -> PathBuf {
        self.root.join(PAIRTREE_DIR)
    }

    /// Returns the on-disk location of an indexed object.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the key is not indexed.
    pub fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        Ok(self.leaf_dir(key)?.join(object_file_name(key)))
    }

    fn leaf_dir(&self, key: &str) -> StorageResult<PathBuf> {
        let rel = self
            .index
            .get(key)
            .ok_or_else(|| StorageError::key_not_found(key))?;
        Ok(self.pairtree_root().join(rel))
    }

    fn save_index(&self) -> StorageResult<()> {
        write_keymap(&self.root, &self.index)?;
        debug!(keys = self.index.len(), "rewrote key map");
        Ok(())
    }

    fn list_versions(dir: &Path, key: &str) -> StorageResult<Vec<Version>> {
        let mut versions = Vec::new();
        if !dir.is_dir() {
            return Ok(versions);
        }
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(TreeFile::Version { key: owner, version }) =
                classify_file_name(&name.to_string_lossy())
            {
                if owner == key {
                    versions.push(version);
                }
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Removes empty directories from `dir` up to, not including, the pairtree root.
    fn prune_empty_dirs(&self, mut dir: PathBuf) -> StorageResult<()> {
        let stop = self.pairtree_root();
        while dir.starts_with(&stop) && dir != stop {
            if fs::read_dir(&dir)?.next().is_some() {
                break;
            }
            fs::remove_dir(&dir)?;
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => break,
            }
        }
        Ok(())
    }
}

impl StorageEngine for TreeEngine {
    fn storage_type(&self) -> StorageType {
        StorageType::Tree
    }

    fn create(&mut self, key: &str, src: &[u8]) -> StorageResult<()> {
        if self.index.contains_key(key) {
            return Err(StorageError::key_exists(key));
        }
        let rel = pairtree::encode(key);
        let dir = self.pairtree_root().join(&rel);
        fs::create_dir_all(&dir)?;
        write_atomic(&dir.join(object_file_name(key)), src)?;

        self.index.insert(key.to_string(), rel);
        if let Err(e) = self.save_index() {
            self.index.remove(key);
            return Err(e);
        }
        Ok(())
    }

    fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.object_path(key)?;
        Ok(fs::read(path)?)
    }

    fn update(&mut self, key: &str, src: &[u8]) -> StorageResult<()> {
        let dir = self.leaf_dir(key)?;
        let object = dir.join(object_file_name(key));

        let latest = Self::list_versions(&dir, key)?.pop();
        if let Some(next) = self.policy.next(latest.as_ref()) {
            fs::copy(&object, dir.join(version_file_name(key, &next)))?;
            debug!(key, version = %next, "recorded version");
        }
        write_atomic(&object, src)?;
        self.save_index()
    }

    fn delete(&mut self, key: &str) -> StorageResult<()> {
        let dir = self.leaf_dir(key)?;
        let removed = self.index.remove(key);
        if let Err(e) = self.save_index() {
            if let Some(rel) = removed {
                self.index.insert(key.to_string(), rel);
            }
            return Err(e);
        }

        let object = dir.join(object_file_name(key));
        if object.exists() {
            fs::remove_file(&object)?;
        }
        for version in Self::list_versions(&dir, key)? {
            fs::remove_file(dir.join(version_file_name(key, &version)))?;
        }
        if dir.is_dir() {
            self.prune_empty_dirs(dir)?;
        }
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.index.keys().cloned().collect())
    }

    fn has_key(&self, key: &str) -> StorageResult<bool> {
        Ok(self.index.contains_key(key))
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.index.len() as u64)
    }

    fn versioning(&self) -> VersioningPolicy {
        self.policy
    }

    fn set_versioning(&mut self, policy: VersioningPolicy) {
        self.policy = policy;
    }

    fn versions(&self, key: &str) -> StorageResult<Vec<Version>> {
        let dir = self.leaf_dir(key)?;
        Self::list_versions(&dir, key)
    }

    fn read_version(&self, key: &str, version: &Version) -> StorageResult<Vec<u8>> {
        if !self.policy.is_enabled() {
            return Err(StorageError::versioning_disabled(format!(
                "cannot read version {version} of {key}"
            )));
        }
        let path = self.leaf_dir(key)?.join(version_file_name(key, version));
        if !path.is_file() {
            return Err(StorageError::version_not_found(key, version.to_string()));
        }
        Ok(fs::read(path)?)
    }

    fn updated_keys(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<String>> {
        let mut hits = Vec::new();
        for key in self.index.keys() {
            let modified: DateTime<Utc> = fs::metadata(self.object_path(key)?)?.modified()?.into();
            if modified >= start && modified <= end {
                hits.push((modified, key.clone()));
            }
        }
        hits.sort();
        Ok(hits.into_iter().map(|(_, key)| key).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::Duration;
    use tempfile::tempdir;

    fn engine() -> (tempfile::TempDir, TreeEngine) {
        let dir = tempdir().unwrap();
        let engine = TreeEngine::init(&dir.path().join("books.ds")).unwrap();
        (dir, engine)
    }

    #[test]
    fn tree_create_and_read() {
        let (_dir, mut engine) = engine();
        engine.create("abcd", br#"{"one":1}"#).unwrap();

        assert_eq!(engine.read("abcd").unwrap(), br#"{"one":1}"#);
        assert!(engine.has_key("abcd").unwrap());
        assert_eq!(engine.len().unwrap(), 1);

        let path = engine.object_path("abcd").unwrap();
        assert!(path.ends_with("pairtree/ab/cd/abcd.json"));
    }

    #[test]
    fn failed_index_write_leaves_index_unchanged() {
        let (dir, mut engine) = engine();
        engine.create("kept", b"{}").unwrap();

        let keymap = dir.path().join("books.ds").join(KEYMAP_FILE);
        fs::remove_file(&keymap).unwrap();
        fs::create_dir(&keymap).unwrap();
        fs::write(keymap.join("blocker"), b"").unwrap();

        assert!(engine.create("new", b"{}").is_err());
        assert!(!engine.has_key("new").unwrap());
        assert!(engine.delete("kept").is_err());
        assert!(engine.has_key("kept").unwrap());
        assert_eq!(engine.read("kept").unwrap(), b"{}");
        assert_eq!(engine.keys().unwrap(), vec!["kept"]);
    }

    #[test]
    fn tree_create_existing_fails() {
        let (_dir, mut engine) = engine();
        engine.create("k", b"{}").unwrap();
        let err = engine.create("k", b"{}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn tree_missing_key_errors() {
        let (_dir, mut engine) = engine();
        assert_eq!(engine.read("nope").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(engine.update("nope", b"{}").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(engine.delete("nope").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn tree_index_is_authoritative() {
        let (_dir, engine) = engine();
        let stray = engine.pairtree_root().join("zz");
        fs::create_dir_all(&stray).unwrap();
        fs::write(stray.join("zz.json"), b"{}").unwrap();

        assert!(!engine.has_key("zz").unwrap());
        assert_eq!(engine.read("zz").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn tree_keys_sorted_and_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.ds");
        {
            let mut engine = TreeEngine::init(&path).unwrap();
            engine.create("2", b"{}").unwrap();
            engine.create("1", b"{}").unwrap();
            engine.create("10", b"{}").unwrap();
        }
        let engine = TreeEngine::open(&path).unwrap();
        assert_eq!(engine.keys().unwrap(), vec!["1", "10", "2"]);

        let keymap = read_keymap(&path.join(KEYMAP_FILE)).unwrap();
        assert_eq!(keymap.get("10").map(String::as_str), Some("10/"));
    }

    #[test]
    fn tree_open_without_keymap_is_corrupted() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(PAIRTREE_DIR)).unwrap();
        let err = TreeEngine::open(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
    }

    #[test]
    fn tree_update_snapshots_previous_content() {
        let (_dir, mut engine) = engine();
        engine.set_versioning(VersioningPolicy::Patch);
        engine.create("k1", br#"{"v":1}"#).unwrap();
        engine.update("k1", br#"{"v":2}"#).unwrap();
        engine.update("k1", br#"{"v":3}"#).unwrap();

        let versions = engine.versions("k1").unwrap();
        assert_eq!(versions, vec![Version::new(0, 0, 1), Version::new(0, 0, 2)]);
        assert_eq!(engine.read_version("k1", &versions[0]).unwrap(), br#"{"v":1}"#);
        assert_eq!(engine.read_version("k1", &versions[1]).unwrap(), br#"{"v":2}"#);
        assert_eq!(engine.read("k1").unwrap(), br#"{"v":3}"#);

        let missing = engine.read_version("k1", &Version::new(0, 0, 9)).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn tree_read_version_needs_policy() {
        let (_dir, mut engine) = engine();
        engine.create("k1", b"{}").unwrap();
        engine.update("k1", b"[]").unwrap();
        assert!(engine.versions("k1").unwrap().is_empty());

        let err = engine.read_version("k1", &Version::new(0, 0, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PolicyViolation);
    }

    #[test]
    fn tree_delete_removes_versions_and_keeps_nested_keys() {
        let (_dir, mut engine) = engine();
        engine.set_versioning(VersioningPolicy::Minor);
        engine.create("ab", b"{}").unwrap();
        engine.create("abcd", b"{}").unwrap();
        engine.update("ab", b"[]").unwrap();

        engine.delete("ab").unwrap();
        assert!(!engine.has_key("ab").unwrap());
        assert_eq!(engine.read("abcd").unwrap(), b"{}");

        let leaf = engine.pairtree_root().join("ab");
        assert!(!leaf.join("ab.json").exists());
        assert!(!leaf.join("ab^0.1.0.json").exists());

        engine.delete("abcd").unwrap();
        assert!(!leaf.exists());
        assert!(engine.pairtree_root().exists());
    }

    #[test]
    fn tree_updated_keys_window() {
        let (_dir, mut engine) = engine();
        let before = Utc::now() - Duration::seconds(5);
        engine.create("a", b"{}").unwrap();
        engine.create("b", b"{}").unwrap();
        let after = Utc::now() + Duration::seconds(5);

        let mut keys = engine.updated_keys(before, after).unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(engine
            .updated_keys(after, after + Duration::seconds(1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn classify_names() {
        assert_eq!(
            classify_file_name("abcd.json"),
            Some(TreeFile::Object { key: "abcd".into() })
        );
        assert_eq!(
            classify_file_name("ark+=13030.json"),
            Some(TreeFile::Object { key: "ark:/13030".into() })
        );
        assert_eq!(
            classify_file_name("what^2a^0.0.3.json"),
            Some(TreeFile::Version {
                key: "what*".into(),
                version: Version::new(0, 0, 3),
            })
        );
        assert_eq!(
            classify_file_name("what^2a.json"),
            Some(TreeFile::Object { key: "what*".into() })
        );
        assert_eq!(classify_file_name("notes.txt"), None);
        assert_eq!(classify_file_name(".json"), None);
    }
}
