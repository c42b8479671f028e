//! Attachment store.
//!
//! Files attached to an object live beside the storage engine, under the
//! pairtree path of the object key:
//!
//! ```text
//! attachments/<pairtree>/files/<basename>
//! attachments/<pairtree>/versions/<basename>/<version>
//! ```
//!
//! Pairtree segments are at most two characters, so `files` and `versions`
//! never collide with the directory of a longer key.

use crate::collection::Collection;
use crate::dir::remove_empty_dirs;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shelfdb_storage::{checked_key, pairtree, StorageError, Version};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FILES_DIR: &str = "files";
const VERSIONS_DIR: &str = "versions";

/// Description of one attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    /// Basename of the attached file.
    pub name: String,
    /// Size in bytes of the current copy.
    pub size: u64,
    /// Hex SHA-256 of the current copy.
    pub sha256: String,
    /// Recorded versions, ascending. Empty when versioning was off.
    pub versions: Vec<String>,
}

fn basename(name: &str) -> CoreResult<&str> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control);
    if valid {
        Ok(name)
    } else {
        Err(CoreError::invalid_input(format!("invalid attachment name {name:?}")))
    }
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn list_versions(dir: &Path) -> io::Result<Vec<Version>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut versions = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        if let Ok(version) = Version::parse(&name.to_string_lossy()) {
            versions.push(version);
        }
    }
    versions.sort();
    Ok(versions)
}

impl Collection {
    fn attachment_root(&self, key: &str) -> PathBuf {
        self.dir.attachments_dir().join(pairtree::encode_path(key))
    }

    fn attachment_key(&self, key: &str) -> CoreResult<String> {
        let key = checked_key(key)?;
        if !self.engine.has_key(&key)? {
            return Err(StorageError::key_not_found(&key).into());
        }
        Ok(key)
    }

    fn current_copy(&self, key: &str, name: &str) -> CoreResult<PathBuf> {
        let path = self.attachment_root(key).join(FILES_DIR).join(basename(name)?);
        if !path.is_file() {
            return Err(CoreError::attachment_not_found(key, name));
        }
        Ok(path)
    }

    /// Copies a file into the attachment area of `key`.
    ///
    /// The stored name is the file's basename; attaching the same name again
    /// replaces the current copy. Under a versioning policy the copy is also
    /// recorded as the next version of that attachment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key or the source file is missing.
    pub fn attach_file(&mut self, key: &str, file: impl AsRef<Path>) -> CoreResult<AttachmentInfo> {
        let key = self.attachment_key(key)?;
        let source = file.as_ref();
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                CoreError::invalid_input(format!("{} has no file name", source.display()))
            })?;
        basename(&name)?;
        fs::metadata(source)?;

        let root = self.attachment_root(&key);
        let files = root.join(FILES_DIR);
        fs::create_dir_all(&files)?;
        let current = files.join(&name);
        fs::copy(source, &current)?;

        let version_dir = root.join(VERSIONS_DIR).join(&name);
        let latest = list_versions(&version_dir)?.pop();
        if let Some(next) = self.meta.versioning.next(latest.as_ref()) {
            fs::create_dir_all(&version_dir)?;
            fs::copy(&current, version_dir.join(next.to_string()))?;
            debug!(key = %key, name = %name, version = %next, "recorded attachment version");
        }

        info!(key = %key, name = %name, "attached file");
        self.attachment_info(&key, &name)
    }

    fn attachment_info(&self, key: &str, name: &str) -> CoreResult<AttachmentInfo> {
        let root = self.attachment_root(key);
        let current = root.join(FILES_DIR).join(name);
        let versions = list_versions(&root.join(VERSIONS_DIR).join(name))?;
        Ok(AttachmentInfo {
            name: name.to_string(),
            size: fs::metadata(&current)?.len(),
            sha256: sha256_file(&current)?,
            versions: versions.iter().map(ToString::to_string).collect(),
        })
    }

    /// Lists the attachments of `key`, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is missing.
    pub fn attachments(&self, key: &str) -> CoreResult<Vec<AttachmentInfo>> {
        let key = self.attachment_key(key)?;
        let files = self.attachment_root(&key).join(FILES_DIR);
        if !files.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&files)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        names
            .iter()
            .map(|name| self.attachment_info(&key, name))
            .collect()
    }

    /// Lists the recorded versions of one attachment, ascending.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key or the attachment is missing.
    pub fn attachment_versions(&self, key: &str, name: &str) -> CoreResult<Vec<Version>> {
        let key = self.attachment_key(key)?;
        self.current_copy(&key, name)?;
        let dir = self.attachment_root(&key).join(VERSIONS_DIR).join(name);
        Ok(list_versions(&dir)?)
    }

    /// Copies the current copy of an attachment into `dest_dir`.
    ///
    /// Returns the path written.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key or the attachment is missing.
    pub fn retrieve_file(
        &self,
        key: &str,
        name: &str,
        dest_dir: impl AsRef<Path>,
    ) -> CoreResult<PathBuf> {
        let key = self.attachment_key(key)?;
        let source = self.current_copy(&key, name)?;
        let dest = dest_dir.as_ref().join(name);
        fs::copy(&source, &dest)?;
        debug!(key = %key, name, dest = %dest.display(), "retrieved attachment");
        Ok(dest)
    }

    /// Writes the current copy of an attachment to `out`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key or the attachment is missing, or the
    /// writer's I/O error.
    pub fn retrieve_stream<W: Write + ?Sized>(
        &self,
        key: &str,
        name: &str,
        out: &mut W,
    ) -> CoreResult<u64> {
        let key = self.attachment_key(key)?;
        let source = self.current_copy(&key, name)?;
        Ok(io::copy(&mut File::open(source)?, out)?)
    }

    /// Copies a recorded version of an attachment into `dest_dir`.
    ///
    /// # Errors
    ///
    /// Returns an invalid input error for a malformed version, or
    /// `NotFound` if the key, attachment or version is missing.
    pub fn retrieve_version_file(
        &self,
        key: &str,
        name: &str,
        version: &str,
        dest_dir: impl AsRef<Path>,
    ) -> CoreResult<PathBuf> {
        let key = self.attachment_key(key)?;
        let version = Version::parse(version)?;
        let source = self
            .attachment_root(&key)
            .join(VERSIONS_DIR)
            .join(basename(name)?)
            .join(version.to_string());
        if !source.is_file() {
            return Err(CoreError::attachment_not_found(&key, format!("{name}@{version}")));
        }
        let dest = dest_dir.as_ref().join(name);
        fs::copy(&source, &dest)?;
        Ok(dest)
    }

    /// Removes an attachment together with all its versions.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key or the attachment is missing.
    pub fn prune(&mut self, key: &str, name: &str) -> CoreResult<()> {
        let key = self.attachment_key(key)?;
        let current = self.current_copy(&key, name)?;
        fs::remove_file(&current)?;

        let root = self.attachment_root(&key);
        let versions = root.join(VERSIONS_DIR).join(name);
        if versions.is_dir() {
            fs::remove_dir_all(&versions)?;
        }
        remove_empty_dirs(root.join(VERSIONS_DIR), &self.dir.attachments_dir())?;
        remove_empty_dirs(root.join(FILES_DIR), &self.dir.attachments_dir())?;
        info!(key = %key, name, "pruned attachment");
        Ok(())
    }

    /// Removes every attachment of `key`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is missing.
    pub fn prune_all(&mut self, key: &str) -> CoreResult<()> {
        let key = self.attachment_key(key)?;
        self.remove_attachments(&key)
    }

    /// Removes the attachment area of a key, whether or not the key exists.
    pub(crate) fn remove_attachments(&self, key: &str) -> CoreResult<()> {
        let root = self.attachment_root(key);
        let mut removed = false;
        for sub in [FILES_DIR, VERSIONS_DIR] {
            let dir = root.join(sub);
            if dir.is_dir() {
                fs::remove_dir_all(&dir)?;
                removed = true;
            }
        }
        if removed {
            remove_empty_dirs(root, &self.dir.attachments_dir())?;
            debug!(key, "removed attachments");
        }
        Ok(())
    }
}
