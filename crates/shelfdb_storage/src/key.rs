//! Key normalization.
//!
//! Object keys are case-insensitive. Every entry point that accepts a key
//! funnels it through [`normalize_key`] so the rule lives in one place.

use crate::error::{StorageError, StorageResult};

/// Returns the canonical (lowercase) form of a key.
///
/// Normalization is idempotent: `normalize_key(&normalize_key(k)) == normalize_key(k)`.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.to_lowercase()
}

/// Normalizes a key and rejects keys that cannot address an object.
///
/// # Errors
///
/// Returns a malformed input error for an empty (or all-whitespace) key.
pub fn checked_key(key: &str) -> StorageResult<String> {
    if key.trim().is_empty() {
        return Err(StorageError::malformed("object key must not be empty"));
    }
    Ok(normalize_key(key))
}

/// Returns true if the key is already in canonical form.
#[must_use]
pub fn is_normalized(key: &str) -> bool {
    normalize_key(key) == key
}
