//! Test fixtures and collection helpers.
//!
//! Provides convenience functions for setting up temporary collections
//! and common test scenarios.

use shelfdb_core::{Collection, Config, VersioningPolicy};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// DSN used for relational test collections.
pub const TEST_SQLITE_DSN: &str = "sqlite://collection.sqlite";

/// A test collection with automatic cleanup.
pub struct TestCollection {
    /// The collection instance.
    pub collection: Collection,
    /// The temporary directory, removed on drop after the collection closes.
    temp_dir: TempDir,
}

impl TestCollection {
    /// Creates a tree-backed test collection.
    pub fn tree() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a relational test collection backed by a SQLite file.
    pub fn relational() -> Self {
        Self::with_config(Config::new().dsn(TEST_SQLITE_DSN))
    }

    /// Creates a test collection with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let collection = Collection::init(temp_dir.path().join("test.ds"), config)
            .expect("Failed to initialize collection");
        Self {
            collection,
            temp_dir,
        }
    }

    /// Creates a test collection on the backend a DSN selects, with a
    /// versioning policy.
    pub fn versioned(dsn: &str, policy: VersioningPolicy) -> Self {
        Self::with_config(Config::new().dsn(dsn).versioning(policy))
    }

    /// Returns the collection directory.
    pub fn path(&self) -> &Path {
        self.collection.path()
    }

    /// Returns a path inside the temporary directory, next to the collection.
    pub fn sibling(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}

impl std::ops::Deref for TestCollection {
    type Target = Collection;

    fn deref(&self) -> &Self::Target {
        &self.collection
    }
}

impl std::ops::DerefMut for TestCollection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.collection
    }
}

/// Runs a test with a temporary tree-backed collection.
///
/// # Example
///
/// ```rust
/// use shelfdb_testkit::with_temp_collection;
///
/// with_temp_collection(|c| {
///     assert!(c.is_empty().unwrap());
/// });
/// ```
pub fn with_temp_collection<F, R>(f: F) -> R
where
    F: FnOnce(&mut Collection) -> R,
{
    let mut test = TestCollection::tree();
    f(&mut test.collection)
}

/// Runs a test with a temporary relational collection.
pub fn with_relational_collection<F, R>(f: F) -> R
where
    F: FnOnce(&mut Collection) -> R,
{
    let mut test = TestCollection::relational();
    f(&mut test.collection)
}

/// Runs the same test once per backend, each time on a fresh collection.
pub fn with_each_backend<F>(mut f: F)
where
    F: FnMut(&mut Collection),
{
    for mut test in [TestCollection::tree(), TestCollection::relational()] {
        f(&mut test.collection);
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use serde_json::json;

    /// Creates a collection holding `count` objects keyed `k0`, `k1`, ...
    pub fn populated_collection(dsn: &str, count: usize) -> TestCollection {
        let mut test = TestCollection::with_config(Config::new().dsn(dsn));
        for i in 0..count {
            test.create(&format!("k{i}"), &json!({ "index": i, "even": i % 2 == 0 }))
                .expect("Failed to create object");
        }
        test
    }

    /// Creates a small catalog of books with nested fields and arrays.
    pub fn books(dsn: &str) -> TestCollection {
        let mut test = TestCollection::with_config(Config::new().dsn(dsn));
        let books = [
            (
                "dune",
                json!({"title": "Dune", "year": 1965, "authors": [{"name": "Herbert"}]}),
            ),
            (
                "good-omens",
                json!({
                    "title": "Good Omens",
                    "year": 1990,
                    "authors": [{"name": "Pratchett"}, {"name": "Gaiman"}]
                }),
            ),
            ("untitled", json!({"year": 2001})),
        ];
        for (key, book) in books {
            test.create(key, &book).expect("Failed to create book");
        }
        test
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shelfdb_core::StorageType;

    #[test]
    fn tree_and_relational_fixtures() {
        let tree = TestCollection::tree();
        assert_eq!(tree.storage_type(), StorageType::Tree);
        let relational = TestCollection::relational();
        assert_eq!(relational.storage_type(), StorageType::Relational);
        assert!(relational.path().join("collection.sqlite").is_file());
    }

    #[test]
    fn each_backend_runs_twice() {
        let mut runs = 0;
        with_each_backend(|c| {
            c.create("x", &json!({})).unwrap();
            assert_eq!(c.len().unwrap(), 1);
            runs += 1;
        });
        assert_eq!(runs, 2);
    }

    #[test]
    fn populated_scenario() {
        let test = scenarios::populated_collection("", 4);
        assert_eq!(test.keys().unwrap(), vec!["k0", "k1", "k2", "k3"]);
        assert_eq!(test.read("k3").unwrap()["even"], json!(false));
    }

    #[test]
    fn books_scenario() {
        let test = scenarios::books(TEST_SQLITE_DSN);
        assert_eq!(test.len().unwrap(), 3);
        assert_eq!(test.read("good-omens").unwrap()["authors"][1]["name"], "Gaiman");
    }
}
