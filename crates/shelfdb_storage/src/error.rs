//! Error types for storage operations.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// The closed set of failure categories shared by every ShelfDB layer.
///
/// Callers should match on the kind rather than on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A key, version, attachment, frame or collection is absent.
    NotFound,
    /// A create collided with an existing entry.
    AlreadyExists,
    /// Bad JSON, a bad DSN, a bad version identifier or bad arguments.
    MalformedInput,
    /// A filesystem or database failure.
    Io,
    /// Index and on-disk (or in-table) state disagree.
    ConsistencyViolation,
    /// The operation is not allowed under the collection's policy.
    PolicyViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::MalformedInput => "malformed input",
            Self::Io => "I/O failure",
            Self::ConsistencyViolation => "consistency violation",
            Self::PolicyViolation => "policy violation",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The relational database reported an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored or supplied JSON document could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The key is not present in the engine.
    #[error("key not found: {key}")]
    KeyNotFound {
        /// The missing key.
        key: String,
    },

    /// A create collided with an existing key.
    #[error("key already exists: {key}")]
    KeyExists {
        /// The colliding key.
        key: String,
    },

    /// The requested version of a key does not exist.
    #[error("version {version} not found for key {key}")]
    VersionNotFound {
        /// The key that was looked up.
        key: String,
        /// The version identifier that was requested.
        version: String,
    },

    /// Malformed input (bad DSN, bad version identifier, bad JSON bytes).
    #[error("malformed input: {message}")]
    Malformed {
        /// Description of what was wrong.
        message: String,
    },

    /// Versioning is disabled for this engine.
    #[error("versioning is disabled: {message}")]
    VersioningDisabled {
        /// The operation that was attempted.
        message: String,
    },

    /// The on-disk index is inconsistent with the data it describes.
    #[error("index corrupted: {message}")]
    Corrupted {
        /// Description of the inconsistency.
        message: String,
    },
}

impl StorageError {
    /// Creates a key not found error.
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Creates a key exists error.
    pub fn key_exists(key: impl Into<String>) -> Self {
        Self::KeyExists { key: key.into() }
    }

    /// Creates a version not found error.
    pub fn version_not_found(key: impl Into<String>, version: impl Into<String>) -> Self {
        Self::VersionNotFound {
            key: key.into(),
            version: version.into(),
        }
    }

    /// Creates a malformed input error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a versioning disabled error.
    pub fn versioning_disabled(message: impl Into<String>) -> Self {
        Self::VersioningDisabled {
            message: message.into(),
        }
    }

    /// Creates a corrupted index error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(e) if e.kind() == io::ErrorKind::NotFound => ErrorKind::NotFound,
            Self::Io(_) | Self::Database(_) => ErrorKind::Io,
            Self::Json(_) | Self::Malformed { .. } => ErrorKind::MalformedInput,
            Self::KeyNotFound { .. } | Self::VersionNotFound { .. } => ErrorKind::NotFound,
            Self::KeyExists { .. } => ErrorKind::AlreadyExists,
            Self::VersioningDisabled { .. } => ErrorKind::PolicyViolation,
            Self::Corrupted { .. } => ErrorKind::ConsistencyViolation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(StorageError::key_not_found("a").kind(), ErrorKind::NotFound);
        assert_eq!(StorageError::key_exists("a").kind(), ErrorKind::AlreadyExists);
        assert_eq!(
            StorageError::version_not_found("a", "0.0.9").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(StorageError::malformed("dsn").kind(), ErrorKind::MalformedInput);
        assert_eq!(
            StorageError::versioning_disabled("read").kind(),
            ErrorKind::PolicyViolation
        );
        assert_eq!(
            StorageError::corrupted("keymap").kind(),
            ErrorKind::ConsistencyViolation
        );
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = StorageError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = StorageError::from(io::Error::new(io::ErrorKind::PermissionDenied, "no"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn messages_carry_context() {
        let err = StorageError::version_not_found("k1", "0.1.0");
        assert_eq!(err.to_string(), "version 0.1.0 not found for key k1");
    }
}
