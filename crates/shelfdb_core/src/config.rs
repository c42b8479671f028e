//! Collection configuration.

use crate::metadata::Metadata;
use shelfdb_storage::{StorageType, VersioningPolicy};

/// Environment variable consulted when a relational collection has no DSN
/// recorded in its metadata.
pub const DSN_ENV_VAR: &str = "SHELFDB_DSN_URI";

/// Configuration for initializing a collection.
///
/// An empty DSN selects the tree backend; any DSN selects the relational one.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Connection descriptor, e.g. `sqlite://collection.sqlite`.
    pub dsn: String,

    /// Versioning policy recorded in the metadata.
    pub versioning: VersioningPolicy,

    /// Descriptive metadata recorded in the metadata.
    pub metadata: Metadata,
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the DSN of the relational backend.
    #[must_use]
    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = dsn.into();
        self
    }

    /// Sets the versioning policy.
    #[must_use]
    pub const fn versioning(mut self, policy: VersioningPolicy) -> Self {
        self.versioning = policy;
        self
    }

    /// Sets the descriptive metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the backend this configuration selects.
    #[must_use]
    pub fn storage_type(&self) -> StorageType {
        if self.dsn.trim().is_empty() {
            StorageType::Tree
        } else {
            StorageType::Relational
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.storage_type(), StorageType::Tree);
        assert_eq!(config.versioning, VersioningPolicy::None);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .dsn("sqlite://collection.sqlite")
            .versioning(VersioningPolicy::Patch)
            .metadata(Metadata {
                license: "CC0".into(),
                ..Metadata::default()
            });

        assert_eq!(config.storage_type(), StorageType::Relational);
        assert_eq!(config.versioning, VersioningPolicy::Patch);
        assert_eq!(config.metadata.license, "CC0");
    }
}
