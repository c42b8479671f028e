//! Collection directory management.
//!
//! This module handles the file system layout of a collection:
//!
//! ```text
//! <collection>/
//! ├─ collection.json   # Metadata (storage type, versioning, frames)
//! ├─ LOCK              # Advisory presence marker holding the owner's pid
//! ├─ keymap.json       # Key index (tree backend)
//! ├─ pairtree/         # Objects (tree backend)
//! ├─ _frames/          # One JSON document per frame
//! └─ attachments/      # Attachment files, laid out as a pairtree
//! ```
//!
//! The LOCK marker is advisory. A second opener gets a warning, not an
//! error, and nothing blocks.

use crate::error::{CoreError, CoreResult};
use crate::metadata::CollectionMeta;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File names within the collection directory.
pub const METADATA_FILE: &str = "collection.json";
/// Advisory presence marker.
pub const LOCK_FILE: &str = "LOCK";
/// Directory holding frame documents.
pub const FRAMES_DIR: &str = "_frames";
/// Directory holding attachments.
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Paths of an existing collection directory.
#[derive(Debug, Clone)]
pub struct CollectionDir {
    path: PathBuf,
}

impl CollectionDir {
    /// Creates a new collection directory.
    ///
    /// # Errors
    ///
    /// Returns `CollectionExists` if anything already exists at the path.
    pub fn create(path: &Path) -> CoreResult<Self> {
        if path.exists() {
            return Err(CoreError::collection_exists(path));
        }
        fs::create_dir_all(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Wraps an existing collection directory.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if the path is not a directory.
    pub fn existing(path: &Path) -> CoreResult<Self> {
        if !path.is_dir() {
            return Err(CoreError::collection_not_found(path));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Returns the collection directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the collection name (the directory's final component).
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Returns the path to `collection.json`.
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.path.join(METADATA_FILE)
    }

    /// Returns the frames directory.
    #[must_use]
    pub fn frames_dir(&self) -> PathBuf {
        self.path.join(FRAMES_DIR)
    }

    /// Returns the attachments directory.
    #[must_use]
    pub fn attachments_dir(&self) -> PathBuf {
        self.path.join(ATTACHMENTS_DIR)
    }

    /// Loads `collection.json`.
    ///
    /// # Errors
    ///
    /// Returns an I/O or JSON error.
    pub fn load_meta(&self) -> CoreResult<CollectionMeta> {
        CollectionMeta::load(&self.metadata_path())
    }

    /// Rewrites `collection.json` atomically.
    ///
    /// # Errors
    ///
    /// Returns an I/O or JSON error.
    pub fn save_meta(&self, meta: &CollectionMeta) -> CoreResult<()> {
        meta.save(&self.metadata_path())
    }

    /// Places the advisory presence marker.
    ///
    /// # Errors
    ///
    /// Returns an error only if the marker file cannot be opened at all.
    pub fn acquire_marker(&self) -> CoreResult<PresenceMarker> {
        PresenceMarker::acquire(&self.path.join(LOCK_FILE))
    }
}

/// Removes empty directories from `dir` upward, stopping at `stop`.
///
/// # Errors
///
/// Returns an I/O error if a directory cannot be read or removed.
pub fn remove_empty_dirs(mut dir: PathBuf, stop: &Path) -> CoreResult<()> {
    while dir.starts_with(stop) && dir != stop {
        if !dir.is_dir() || fs::read_dir(&dir)?.next().is_some() {
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

/// Advisory marker signalling that a process has the collection open.
///
/// Holds an `fs2` exclusive lock on the LOCK file when it can get one.
/// Dropping the marker releases the lock and removes the file if this
/// process owned it.
#[derive(Debug)]
pub struct PresenceMarker {
    path: PathBuf,
    /// Lock file handle, `None` if another process already held it.
    file: Option<File>,
}

impl PresenceMarker {
    fn acquire(path: &Path) -> CoreResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            warn!(path = %path.display(), "collection is already open in another process");
            return Ok(Self {
                path: path.to_path_buf(),
                file: None,
            });
        }

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_all()?;
        debug!(path = %path.display(), "placed presence marker");

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    /// Returns true if this process holds the marker.
    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.file.is_some()
    }

    /// Releases the marker.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the marker file cannot be removed.
    pub fn release(mut self) -> CoreResult<()> {
        self.remove()
    }

    fn remove(&mut self) -> CoreResult<()> {
        if let Some(file) = self.file.take() {
            drop(file);
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            debug!(path = %self.path.display(), "released presence marker");
        }
        Ok(())
    }
}

impl Drop for PresenceMarker {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!(path = %self.path.display(), error = %e, "failed to release presence marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_refuses_existing_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("books.ds");
        let created = CollectionDir::create(&path).unwrap();
        assert_eq!(created.name(), "books.ds");
        assert!(CollectionDir::create(&path).is_err());
    }

    #[test]
    fn existing_requires_directory() {
        let dir = tempdir().unwrap();
        assert!(CollectionDir::existing(&dir.path().join("missing.ds")).is_err());
        let found = CollectionDir::existing(dir.path()).unwrap();
        assert_eq!(found.metadata_path(), dir.path().join(METADATA_FILE));
    }

    #[test]
    fn marker_written_and_released() {
        let dir = tempdir().unwrap();
        let cdir = CollectionDir::existing(dir.path()).unwrap();
        let marker = cdir.acquire_marker().unwrap();
        assert!(marker.is_owner());

        let lock_path = dir.path().join(LOCK_FILE);
        let pid = fs::read_to_string(&lock_path).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());

        marker.release().unwrap();
        assert!(!lock_path.exists());
    }

    #[test]
    fn empty_dirs_pruned_up_to_stop() {
        let dir = tempdir().unwrap();
        let stop = dir.path().join("attachments");
        let leaf = stop.join("ab").join("cd");
        fs::create_dir_all(&leaf).unwrap();
        fs::write(stop.join("ab").join("keep.txt"), b"x").unwrap();

        remove_empty_dirs(leaf.clone(), &stop).unwrap();
        assert!(!leaf.exists());
        assert!(stop.join("ab").exists());
        assert!(stop.exists());
    }
}
