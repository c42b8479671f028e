//! Caller-owned map of open collections.

use crate::collection::Collection;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Open collections by name.
///
/// The registry is an ordinary value: an embedding layer that needs to hand
/// out collections by name owns one and passes it around. Collections are
/// still usable on their own without it.
#[derive(Debug, Default)]
pub struct CollectionRegistry {
    open: BTreeMap<String, Collection>,
}

impl CollectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, name: &str, collection: Collection) -> &mut Collection {
        debug!(name, path = %collection.path().display(), "registered collection");
        self.open.entry(name.to_string()).or_insert(collection)
    }

    /// Opens a collection and registers it under `name`.
    ///
    /// Returns the already registered collection if `name` is open.
    ///
    /// # Errors
    ///
    /// Returns any error of [`Collection::open`].
    pub fn open(&mut self, name: &str, path: impl AsRef<Path>) -> CoreResult<&mut Collection> {
        if !self.open.contains_key(name) {
            let collection = Collection::open(path)?;
            return Ok(self.insert(name, collection));
        }
        self.get_mut(name)
    }

    /// Initializes a new collection and registers it under `name`.
    ///
    /// # Errors
    ///
    /// Returns an invalid input error if `name` is already registered, or
    /// any error of [`Collection::init`].
    pub fn init(
        &mut self,
        name: &str,
        path: impl AsRef<Path>,
        config: Config,
    ) -> CoreResult<&mut Collection> {
        if self.open.contains_key(name) {
            return Err(CoreError::invalid_input(format!("{name} is already open")));
        }
        let collection = Collection::init(path, config)?;
        Ok(self.insert(name, collection))
    }

    /// Returns a registered collection.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if `name` is not registered.
    pub fn get(&self, name: &str) -> CoreResult<&Collection> {
        self.open
            .get(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    /// Returns a registered collection for mutation.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if `name` is not registered.
    pub fn get_mut(&mut self, name: &str) -> CoreResult<&mut Collection> {
        self.open
            .get_mut(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn is_open(&self, name: &str) -> bool {
        self.open.contains_key(name)
    }

    /// Lists registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.open.keys().cloned().collect()
    }

    /// Closes and unregisters a collection.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if `name` is not registered, or any
    /// error of [`Collection::close`].
    pub fn close(&mut self, name: &str) -> CoreResult<()> {
        let collection = self
            .open
            .remove(name)
            .ok_or_else(|| CoreError::collection_not_found(name))?;
        collection.close()
    }

    /// Closes every registered collection.
    ///
    /// All collections are unregistered even if closing one fails; the
    /// first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns the first error of [`Collection::close`].
    pub fn close_all(&mut self) -> CoreResult<()> {
        let mut first = None;
        for (_, collection) in std::mem::take(&mut self.open) {
            if let Err(e) = collection.close() {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shelfdb_storage::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn init_open_get_close() {
        let dir = tempdir().unwrap();
        let mut registry = CollectionRegistry::new();

        registry
            .init("books", dir.path().join("books.ds"), Config::default())
            .unwrap()
            .create("dune", &json!({"title": "Dune"}))
            .unwrap();
        assert!(registry.is_open("books"));
        assert_eq!(registry.get("books").unwrap().len().unwrap(), 1);

        let err = registry
            .init("books", dir.path().join("other.ds"), Config::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);

        registry.close("books").unwrap();
        assert!(!registry.is_open("books"));
        assert_eq!(registry.get("books").unwrap_err().kind(), ErrorKind::NotFound);

        let books = registry.open("books", dir.path().join("books.ds")).unwrap();
        assert!(books.has_key("DUNE").unwrap());
    }

    #[test]
    fn close_all_empties_registry() {
        let dir = tempdir().unwrap();
        let mut registry = CollectionRegistry::new();
        registry.init("b", dir.path().join("b.ds"), Config::default()).unwrap();
        registry.init("a", dir.path().join("a.ds"), Config::default()).unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);

        registry.close_all().unwrap();
        assert!(registry.names().is_empty());
        assert_eq!(registry.close("a").unwrap_err().kind(), ErrorKind::NotFound);
    }
}
