//! Typed access to collection objects via serde.

use super::Collection;
use crate::error::CoreResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

impl Collection {
    /// Stores a new object serialized from `value`.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if `value` does not serialize, or the errors of
    /// [`Collection::create`].
    pub fn create_from<T: Serialize>(&mut self, key: &str, value: &T) -> CoreResult<()> {
        let object = serde_json::to_value(value)?;
        self.create(key, &object)
    }

    /// Reads an object into `T`.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the stored document does not match `T`.
    pub fn read_as<T: DeserializeOwned>(&self, key: &str) -> CoreResult<T> {
        Ok(serde_json::from_slice(&self.read_json(key)?)?)
    }

    /// Replaces an object with one serialized from `value`.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if `value` does not serialize, or the errors of
    /// [`Collection::update`].
    pub fn update_from<T: Serialize>(&mut self, key: &str, value: &T) -> CoreResult<()> {
        let object = serde_json::to_value(value)?;
        self.update(key, &object)
    }
}
