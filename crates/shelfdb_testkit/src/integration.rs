//! Cross-crate integration test helpers.
//!
//! Provides a harness that applies operations to a real collection and to an
//! in-memory model side by side, asserting they agree.

use crate::fixtures::TestCollection;
use crate::generators::CollectionOperation;
use serde_json::Value;
use shelfdb_core::{Collection, ErrorKind};
use shelfdb_storage::normalize_key;
use std::collections::BTreeMap;

/// A test harness for integration testing.
pub struct CollectionHarness {
    /// The collection under test.
    pub test: TestCollection,
    /// Expected objects by normalized key.
    expected: BTreeMap<String, Value>,
}

impl CollectionHarness {
    /// Creates a harness around a fresh collection.
    pub fn new(test: TestCollection) -> Self {
        Self {
            test,
            expected: BTreeMap::new(),
        }
    }

    /// Returns the collection under test.
    pub fn collection(&mut self) -> &mut Collection {
        &mut self.test.collection
    }

    /// Applies one operation to both the collection and the model, asserting
    /// the outcome the model predicts.
    pub fn apply(&mut self, op: &CollectionOperation) {
        match op {
            CollectionOperation::Create { key, value } => {
                let result = self.test.create(key, value);
                let normal = normalize_key(key);
                if self.expected.contains_key(&normal) {
                    let err = result.expect_err("create over an existing key must fail");
                    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
                } else {
                    result.expect("Failed to create object");
                    self.expected.insert(normal, value.clone());
                }
            }
            CollectionOperation::Update { key, value } => {
                let result = self.test.update(key, value);
                let normal = normalize_key(key);
                if let Some(slot) = self.expected.get_mut(&normal) {
                    result.expect("Failed to update object");
                    *slot = value.clone();
                } else {
                    let err = result.expect_err("update of a missing key must fail");
                    assert_eq!(err.kind(), ErrorKind::NotFound);
                }
            }
            CollectionOperation::Delete { key } => {
                let result = self.test.delete(key);
                if self.expected.remove(&normalize_key(key)).is_some() {
                    result.expect("Failed to delete object");
                } else {
                    let err = result.expect_err("delete of a missing key must fail");
                    assert_eq!(err.kind(), ErrorKind::NotFound);
                }
            }
            CollectionOperation::Read { key } => self.read_and_verify(key),
        }
    }

    /// Reads a key and verifies it matches the model.
    pub fn read_and_verify(&self, key: &str) {
        let actual = self.test.read(key);
        match self.expected.get(&normalize_key(key)) {
            Some(expected) => {
                assert_eq!(&actual.expect("Failed to read object"), expected, "key {key}");
            }
            None => {
                let err = actual.expect_err("read of a missing key must fail");
                assert_eq!(err.kind(), ErrorKind::NotFound);
            }
        }
    }

    /// Verifies keys, length and every object against the model.
    pub fn verify_all(&self) {
        let keys: Vec<String> = self.expected.keys().cloned().collect();
        assert_eq!(self.test.keys().expect("Failed to list keys"), keys);
        assert_eq!(
            self.test.len().expect("Failed to count objects"),
            self.expected.len() as u64
        );
        for (key, expected) in &self.expected {
            assert!(self.test.has_key(key).expect("Failed to check key"));
            assert_eq!(&self.test.read(key).expect("Failed to read object"), expected);
        }
    }

    /// Returns the count of tracked objects.
    pub fn tracked_count(&self) -> usize {
        self.expected.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn harness_tracks_operations() {
        let mut harness = CollectionHarness::new(TestCollection::tree());
        let ops = [
            CollectionOperation::Create { key: "A".into(), value: json!({"v": 1}) },
            CollectionOperation::Create { key: "a".into(), value: json!({"v": 2}) },
            CollectionOperation::Update { key: "b".into(), value: json!({}) },
            CollectionOperation::Update { key: "a".into(), value: json!({"v": 3}) },
            CollectionOperation::Read { key: "A".into() },
            CollectionOperation::Delete { key: "c".into() },
        ];
        for op in &ops {
            harness.apply(op);
        }
        assert_eq!(harness.tracked_count(), 1);
        harness.verify_all();

        harness.apply(&CollectionOperation::Delete { key: "a".into() });
        harness.verify_all();
        assert!(harness.collection().is_empty().unwrap());
    }
}
