//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random keys, documents and
//! operation sequences.

use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for keys drawn from the full character range, including the
/// characters the pairtree codec escapes and substitutes.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => "[a-zA-Z0-9_-]{1,24}",
        2 => r#"[a-z0-9/:.^"*+,<=>?|\\ ]{1,16}"#,
        1 => any::<String>(),
    ]
    .prop_filter("key must not be blank", |k| !k.trim().is_empty())
}

/// Strategy for short lowercase keys that are already normalized.
pub fn simple_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,7}").expect("Invalid regex")
}

/// Strategy for scalar JSON values.
pub fn json_scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::String),
    ]
}

/// Strategy for JSON objects up to two levels deep.
pub fn json_object_strategy() -> impl Strategy<Value = Value> {
    let field = "[a-z]{1,8}";
    let nested = prop::collection::btree_map(field, json_scalar_strategy(), 0..4)
        .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>()));
    let member = prop_oneof![
        3 => json_scalar_strategy(),
        1 => nested,
        1 => prop::collection::vec(json_scalar_strategy(), 0..4).prop_map(Value::Array),
    ];
    prop::collection::btree_map(field, member, 0..6)
        .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>()))
}

/// A collection operation for sequence tests.
#[derive(Debug, Clone)]
pub enum CollectionOperation {
    /// Create an object
    Create {
        /// Object key
        key: String,
        /// Object content
        value: Value,
    },
    /// Update an object
    Update {
        /// Object key
        key: String,
        /// Object content
        value: Value,
    },
    /// Delete an object
    Delete {
        /// Object key
        key: String,
    },
    /// Read an object
    Read {
        /// Object key
        key: String,
    },
}

/// Strategy for generating collection operations over a small key space,
/// so that collisions and missing keys both occur.
pub fn collection_operation_strategy() -> impl Strategy<Value = CollectionOperation> {
    let key = prop::sample::select(vec!["a", "B", "c", "A", "d"]).prop_map(String::from);
    prop_oneof![
        3 => (key.clone(), json_object_strategy())
            .prop_map(|(key, value)| CollectionOperation::Create { key, value }),
        2 => (key.clone(), json_object_strategy())
            .prop_map(|(key, value)| CollectionOperation::Update { key, value }),
        1 => key.clone().prop_map(|key| CollectionOperation::Delete { key }),
        2 => key.prop_map(|key| CollectionOperation::Read { key }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<CollectionOperation>> {
    prop::collection::vec(collection_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    ///
    /// Collection tests touch the file system, so this is the usual choice.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn keys_are_not_blank(key in key_strategy()) {
            prop_assert!(!key.trim().is_empty());
        }

        #[test]
        fn objects_are_objects(value in json_object_strategy()) {
            prop_assert!(value.is_object());
        }

        #[test]
        fn sequences_respect_bounds(ops in operation_sequence_strategy(2, 10)) {
            prop_assert!(ops.len() >= 2 && ops.len() < 10);
        }
    }

    #[test]
    fn config_presets() {
        assert!(PropTestConfig::quick().cases < PropTestConfig::default().cases);
        assert!(PropTestConfig::thorough().cases > PropTestConfig::default().cases);
    }
}
