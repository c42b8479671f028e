//! Cloning and random sampling.
//!
//! All operations here read the full key list and are O(n) in the key count.

use super::Collection;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use rand::seq::SliceRandom;
use rand::Rng;
use shelfdb_storage::{normalize_key, ErrorKind};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Object counts written by [`Collection::clone_sample`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleSplit {
    /// Objects copied into the training collection.
    pub training: usize,
    /// Objects copied into the test collection.
    pub test: usize,
}

impl Collection {
    /// Copies objects into a newly initialized collection.
    ///
    /// An empty `keys` slice copies every key. Keys that differ only by case
    /// are copied once. Keys that are not in this collection are skipped
    /// with a warning. Versions, frames and
    /// attachments are not copied. Returns the number of objects copied.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination cannot be initialized or a
    /// read or write fails for a key that exists.
    pub fn clone_to(
        &self,
        dest: impl AsRef<Path>,
        dest_dsn: &str,
        keys: &[String],
        verbose: bool,
    ) -> CoreResult<usize> {
        let keys = if keys.is_empty() { self.keys()? } else { distinct_keys(keys) };
        self.copy_keys(dest.as_ref(), dest_dsn, &keys, verbose)
    }

    /// Splits a random sample of keys into a training and a test collection.
    ///
    /// `sample_size` shuffled keys go to `training`, the rest to `test`.
    /// With `test` set to `None` the remainder is discarded. An empty
    /// `keys` slice samples from every key.
    ///
    /// # Errors
    ///
    /// Returns an invalid input error if `sample_size` is zero or larger
    /// than the key list, or any error of [`Collection::clone_to`].
    pub fn clone_sample(
        &self,
        training: impl AsRef<Path>,
        training_dsn: &str,
        test: Option<(&Path, &str)>,
        keys: &[String],
        sample_size: usize,
        verbose: bool,
    ) -> CoreResult<SampleSplit> {
        let mut keys = if keys.is_empty() { self.keys()? } else { distinct_keys(keys) };
        if sample_size < 1 {
            return Err(CoreError::invalid_input("sample size must be at least 1"));
        }
        if sample_size > keys.len() {
            return Err(CoreError::invalid_input(format!(
                "sample size {sample_size} exceeds {} keys",
                keys.len()
            )));
        }

        keys.shuffle(&mut rand::thread_rng());
        let (train_keys, test_keys) = keys.split_at(sample_size);

        let mut split = SampleSplit {
            training: self.copy_keys(training.as_ref(), training_dsn, train_keys, verbose)?,
            test: 0,
        };
        if let Some((test_path, test_dsn)) = test {
            split.test = self.copy_keys(test_path, test_dsn, test_keys, verbose)?;
        }
        Ok(split)
    }

    /// Picks `n` distinct keys uniformly at random.
    ///
    /// Returns `min(n, len)` keys. With `strict` set, asking for more keys
    /// than exist is an error instead.
    ///
    /// # Errors
    ///
    /// Returns an invalid input error in strict mode when `n` exceeds the
    /// key count.
    pub fn sample(&self, n: usize, strict: bool) -> CoreResult<Vec<String>> {
        self.sample_with_rng(n, strict, &mut rand::thread_rng())
    }

    /// [`Collection::sample`] with a caller supplied random source.
    ///
    /// # Errors
    ///
    /// See [`Collection::sample`].
    pub fn sample_with_rng<R: Rng + ?Sized>(
        &self,
        n: usize,
        strict: bool,
        rng: &mut R,
    ) -> CoreResult<Vec<String>> {
        let mut keys = self.keys()?;
        if strict && n > keys.len() {
            return Err(CoreError::invalid_input(format!(
                "cannot sample {n} keys from {}",
                keys.len()
            )));
        }
        let amount = n.min(keys.len());
        let (picked, _) = keys.partial_shuffle(rng, amount);
        Ok(picked.to_vec())
    }

    fn copy_keys(
        &self,
        dest: &Path,
        dest_dsn: &str,
        keys: &[String],
        verbose: bool,
    ) -> CoreResult<usize> {
        let mut target = Collection::init(dest, Config::new().dsn(dest_dsn))?;
        let mut copied = 0;
        for key in keys {
            let src = match self.engine.read(key) {
                Ok(src) => src,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if verbose {
                        warn!(key = %key, collection = %self.name(), "skipping missing key");
                    } else {
                        debug!(key = %key, collection = %self.name(), "skipping missing key");
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            target.engine.create(key, &src)?;
            copied += 1;
        }
        info!(
            from = %self.path().display(),
            to = %dest.display(),
            copied,
            "cloned collection"
        );
        target.close()?;
        Ok(copied)
    }
}

/// Normalizes keys, keeping the first occurrence of each.
fn distinct_keys(keys: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    keys.iter()
        .map(|key| normalize_key(key))
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::{Collection, Config};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use shelfdb_storage::ErrorKind;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn populated(dir: &std::path::Path, n: usize) -> Collection {
        let mut c = Collection::init(dir.join("source.ds"), Config::default()).unwrap();
        for i in 0..n {
            c.create(&format!("k{i}"), &json!({ "i": i })).unwrap();
        }
        c
    }

    #[test]
    fn clone_copies_subset_and_skips_missing() {
        let dir = tempdir().unwrap();
        let source = populated(dir.path(), 5);
        let keys = vec!["k1".to_string(), "K3".to_string(), "ghost".to_string()];

        let copied = source.clone_to(dir.path().join("copy.ds"), "", &keys, true).unwrap();
        assert_eq!(copied, 2);

        let copy = Collection::open(dir.path().join("copy.ds")).unwrap();
        assert_eq!(copy.keys().unwrap(), vec!["k1", "k3"]);
        assert_eq!(copy.read("k3").unwrap(), json!({"i": 3}));
    }

    #[test]
    fn clone_copies_case_variants_once() {
        let dir = tempdir().unwrap();
        let source = populated(dir.path(), 3);
        let keys = vec!["k1".to_string(), "K1".to_string(), "k2".to_string(), "k1".to_string()];

        let copied = source.clone_to(dir.path().join("copy.ds"), "", &keys, false).unwrap();
        assert_eq!(copied, 2);

        let copy = Collection::open(dir.path().join("copy.ds")).unwrap();
        assert_eq!(copy.keys().unwrap(), vec!["k1", "k2"]);
    }

    #[test]
    fn clone_sample_counts_distinct_keys() {
        let dir = tempdir().unwrap();
        let source = populated(dir.path(), 3);
        let keys = vec!["k0".to_string(), "K0".to_string()];
        let err = source
            .clone_sample(dir.path().join("t.ds"), "", None, &keys, 2, false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);

        let split = source
            .clone_sample(dir.path().join("t.ds"), "", None, &keys, 1, false)
            .unwrap();
        assert_eq!(split.training, 1);
    }

    #[test]
    fn clone_all_into_relational() {
        let dir = tempdir().unwrap();
        let source = populated(dir.path(), 3);
        let copied = source
            .clone_to(dir.path().join("rel.ds"), "sqlite://collection.sqlite", &[], false)
            .unwrap();
        assert_eq!(copied, 3);

        let copy = Collection::open(dir.path().join("rel.ds")).unwrap();
        assert_eq!(copy.len().unwrap(), 3);
    }

    #[test]
    fn clone_refuses_existing_destination() {
        let dir = tempdir().unwrap();
        let source = populated(dir.path(), 1);
        let err = source.clone_to(dir.path().join("source.ds"), "", &[], false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn clone_sample_partitions_keys() {
        let dir = tempdir().unwrap();
        let source = populated(dir.path(), 10);
        let test_path = dir.path().join("test.ds");

        let split = source
            .clone_sample(
                dir.path().join("train.ds"),
                "",
                Some((test_path.as_path(), "")),
                &[],
                4,
                false,
            )
            .unwrap();
        assert_eq!(split.training, 4);
        assert_eq!(split.test, 6);

        let train: HashSet<String> = Collection::open(dir.path().join("train.ds"))
            .unwrap()
            .keys()
            .unwrap()
            .into_iter()
            .collect();
        let test: HashSet<String> = Collection::open(&test_path)
            .unwrap()
            .keys()
            .unwrap()
            .into_iter()
            .collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), 10);
    }

    #[test]
    fn clone_sample_size_bounds() {
        let dir = tempdir().unwrap();
        let source = populated(dir.path(), 2);
        for size in [0, 3] {
            let err = source
                .clone_sample(dir.path().join("t.ds"), "", None, &[], size, false)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedInput);
        }
        assert!(!dir.path().join("t.ds").exists());
    }

    #[test]
    fn sample_bounds() {
        let dir = tempdir().unwrap();
        let source = populated(dir.path(), 5);
        let mut rng = StdRng::seed_from_u64(7);

        let picked = source.sample_with_rng(3, true, &mut rng).unwrap();
        assert_eq!(picked.len(), 3);
        let distinct: HashSet<&String> = picked.iter().collect();
        assert_eq!(distinct.len(), 3);

        assert_eq!(source.sample(9, false).unwrap().len(), 5);
        let err = source.sample(9, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert!(source.sample(0, true).unwrap().is_empty());
    }
}
