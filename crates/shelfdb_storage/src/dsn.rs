//! Connection descriptors for the relational backend.

use crate::error::{StorageError, StorageResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The in-memory SQLite target.
pub const MEMORY_TARGET: &str = ":memory:";

/// A parsed `scheme://target` descriptor.
///
/// Only the scheme is interpreted here; the target is handed to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    scheme: String,
    target: String,
}

impl Dsn {
    /// Parses a DSN of the form `scheme://target`.
    ///
    /// # Errors
    ///
    /// Returns a malformed input error if the separator is missing or
    /// either side is empty.
    pub fn parse(uri: &str) -> StorageResult<Self> {
        let (scheme, target) = uri
            .trim()
            .split_once("://")
            .ok_or_else(|| StorageError::malformed(format!("DSN {uri:?} is not scheme://target")))?;
        if scheme.is_empty() || target.is_empty() {
            return Err(StorageError::malformed(format!(
                "DSN {uri:?} needs both a scheme and a target"
            )));
        }
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            target: target.to_string(),
        })
    }

    /// Returns the lowercased scheme.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the driver-specific part after `://`.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns true for `sqlite://:memory:`.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.target == MEMORY_TARGET
    }

    /// Resolves a file target against the collection directory.
    ///
    /// Relative targets live inside the collection directory; absolute
    /// targets are used as given.
    #[must_use]
    pub fn resolve_file(&self, collection_dir: &Path) -> PathBuf {
        let target = Path::new(&self.target);
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            collection_dir.join(target)
        }
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.target)
    }
}

impl FromStr for Dsn {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
