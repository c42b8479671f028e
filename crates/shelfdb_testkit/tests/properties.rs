//! Property tests across the codec, both backends and sampling.

use proptest::prelude::*;
use shelfdb_storage::{normalize_key, pairtree};
use shelfdb_testkit::prelude::*;
use std::collections::HashSet;

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn pairtree_round_trips_normalized_keys(key in key_strategy()) {
        let normal = normalize_key(&key);
        prop_assert_eq!(pairtree::decode(&pairtree::encode(&normal)), normal.clone());
        prop_assert_eq!(normalize_key(&normal), normal);
    }
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn tree_matches_model(ops in operation_sequence_strategy(1, 24)) {
        let mut harness = CollectionHarness::new(TestCollection::tree());
        for op in &ops {
            harness.apply(op);
        }
        harness.verify_all();
    }

    #[test]
    fn relational_matches_model(ops in operation_sequence_strategy(1, 24)) {
        let mut harness = CollectionHarness::new(TestCollection::relational());
        for op in &ops {
            harness.apply(op);
        }
        harness.verify_all();
    }

    #[test]
    fn sample_returns_distinct_bounded_keys(size in 0usize..12, n in 0usize..16) {
        let test = scenarios::populated_collection("", size);
        let picked = test.sample(n, false).unwrap();
        prop_assert_eq!(picked.len(), n.min(size));
        let distinct: HashSet<&String> = picked.iter().collect();
        prop_assert_eq!(distinct.len(), picked.len());
        prop_assert_eq!(test.sample(n, true).is_err(), n > size);
    }

    #[test]
    fn stored_objects_read_back(key in simple_key_strategy(), value in json_object_strategy()) {
        with_each_backend(|c| {
            c.create(&key, &value).unwrap();
            assert_eq!(c.read(&key).unwrap(), value);
        });
    }
}
