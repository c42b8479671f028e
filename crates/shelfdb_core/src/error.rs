//! Error types for ShelfDB core.

use shelfdb_storage::{ErrorKind, StorageError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ShelfDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage engine error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No collection exists at the path.
    #[error("collection not found: {}", path.display())]
    CollectionNotFound {
        /// The collection directory.
        path: PathBuf,
    },

    /// A collection already exists at the path.
    #[error("collection already exists: {}", path.display())]
    CollectionExists {
        /// The collection directory.
        path: PathBuf,
    },

    /// Frame not found.
    #[error("frame not found: {name}")]
    FrameNotFound {
        /// Name of the frame.
        name: String,
    },

    /// A frame with this name already exists.
    #[error("frame already exists: {name}")]
    FrameExists {
        /// Name of the frame.
        name: String,
    },

    /// Attachment not found.
    #[error("attachment {name} not found for key {key}")]
    AttachmentNotFound {
        /// The object key.
        key: String,
        /// The attachment basename (and version, if one was requested).
        name: String,
    },

    /// Invalid arguments or malformed input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of what was wrong.
        message: String,
    },

    /// The operation is not allowed under the collection's settings.
    #[error("policy violation: {message}")]
    PolicyViolation {
        /// Description of the violation.
        message: String,
    },

    /// The consistency checker found problems.
    #[error("{path}: {errors} errors, {warnings} warnings")]
    Inconsistent {
        /// The collection directory, for display.
        path: String,
        /// Number of unrecoverable problems.
        errors: usize,
        /// Number of recoverable problems.
        warnings: usize,
    },
}

impl CoreError {
    /// Creates a collection not found error.
    pub fn collection_not_found(path: impl Into<PathBuf>) -> Self {
        Self::CollectionNotFound { path: path.into() }
    }

    /// Creates a collection exists error.
    pub fn collection_exists(path: impl Into<PathBuf>) -> Self {
        Self::CollectionExists { path: path.into() }
    }

    /// Creates a frame not found error.
    pub fn frame_not_found(name: impl Into<String>) -> Self {
        Self::FrameNotFound { name: name.into() }
    }

    /// Creates a frame exists error.
    pub fn frame_exists(name: impl Into<String>) -> Self {
        Self::FrameExists { name: name.into() }
    }

    /// Creates an attachment not found error.
    pub fn attachment_not_found(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AttachmentNotFound {
            key: key.into(),
            name: name.into(),
        }
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a policy violation error.
    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::PolicyViolation {
            message: message.into(),
        }
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(e) => e.kind(),
            Self::Io(e) if e.kind() == io::ErrorKind::NotFound => ErrorKind::NotFound,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) | Self::InvalidInput { .. } => ErrorKind::MalformedInput,
            Self::CollectionNotFound { .. }
            | Self::FrameNotFound { .. }
            | Self::AttachmentNotFound { .. } => ErrorKind::NotFound,
            Self::CollectionExists { .. } | Self::FrameExists { .. } => ErrorKind::AlreadyExists,
            Self::PolicyViolation { .. } => ErrorKind::PolicyViolation,
            Self::Inconsistent { .. } => ErrorKind::ConsistencyViolation,
        }
    }
}
