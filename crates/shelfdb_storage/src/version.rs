//! Version identifiers and the versioning policy.
//!
//! Identifiers follow a `major.minor.patch` shape. Parsing accepts an
//! optional leading `v`, a missing patch field and a `-suffix`; ordering is
//! numeric per field, left to right.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A semantic-version-style identifier for one historical snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major field.
    pub major: u64,
    /// Minor field.
    pub minor: u64,
    /// Patch field.
    pub patch: u64,
    /// Optional suffix after a `-`, kept for display only.
    pub suffix: Option<String>,
}

impl Version {
    /// Creates a version without a suffix.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            suffix: None,
        }
    }

    /// Parses an identifier such as `1.2.3`, `v0.1` or `2.0.0-rc1`.
    ///
    /// # Errors
    ///
    /// Returns a malformed input error if the string does not hold at least
    /// two numeric fields.
    pub fn parse(s: &str) -> StorageResult<Self> {
        let bad = || StorageError::malformed(format!("invalid version identifier {s:?}"));
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let (numbers, suffix) = match trimmed.split_once('-') {
            Some((numbers, suffix)) => (numbers, Some(suffix.to_string())),
            None => (trimmed, None),
        };

        let fields: Vec<&str> = numbers.split('.').collect();
        if fields.len() < 2 || fields.len() > 3 {
            return Err(bad());
        }
        let parse_field = |field: &str| field.parse::<u64>().map_err(|_| bad());
        let major = parse_field(fields[0])?;
        let minor = parse_field(fields[1])?;
        let patch = match fields.get(2) {
            Some(field) => parse_field(field)?,
            None => 0,
        };

        Ok(Self {
            major,
            minor,
            patch,
            suffix,
        })
    }

    /// Returns the identifier with the patch field incremented.
    #[must_use]
    pub fn next_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }

    /// Returns the identifier with the minor field incremented and patch zeroed.
    #[must_use]
    pub fn next_minor(&self) -> Self {
        Self::new(self.major, self.minor + 1, 0)
    }

    /// Returns the identifier with the major field incremented, minor and patch zeroed.
    #[must_use]
    pub fn next_major(&self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(suffix) = &self.suffix {
            write!(f, "-{suffix}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| self.suffix.cmp(&other.suffix))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Parses and sorts identifiers ascending, skipping malformed entries.
#[must_use]
pub fn sort_versions<S: AsRef<str>>(identifiers: &[S]) -> Vec<Version> {
    let mut versions: Vec<Version> = identifiers
        .iter()
        .filter_map(|s| Version::parse(s.as_ref()).ok())
        .collect();
    versions.sort();
    versions
}

/// Collection-wide rule governing how version identifiers increment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersioningPolicy {
    /// No versions are recorded.
    #[default]
    #[serde(alias = "")]
    None,
    /// Increment the patch field.
    Patch,
    /// Increment the minor field, zero patch.
    Minor,
    /// Increment the major field, zero minor and patch.
    Major,
}

impl VersioningPolicy {
    /// Returns true unless the policy is [`VersioningPolicy::None`].
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Computes the identifier that follows `latest` under this policy.
    ///
    /// With no prior version the count starts from `0.0.0`, so the first
    /// identifier is `0.0.1`, `0.1.0` or `1.0.0`. Returns `None` when
    /// versioning is disabled.
    #[must_use]
    pub fn next(self, latest: Option<&Version>) -> Option<Version> {
        let base = latest.cloned().unwrap_or_default();
        match self {
            Self::None => None,
            Self::Patch => Some(base.next_patch()),
            Self::Minor => Some(base.next_minor()),
            Self::Major => Some(base.next_major()),
        }
    }

    /// Returns the canonical name used in collection metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Patch => "patch",
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }
}

impl fmt::Display for VersioningPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersioningPolicy {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "patch" => Ok(Self::Patch),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            other => Err(StorageError::malformed(format!(
                "unknown versioning policy {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_and_display() {
        assert_eq!(Version::parse("1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(Version::parse("v0.1").unwrap(), Version::new(0, 1, 0));
        let rc = Version::parse("2.0.0-rc1").unwrap();
        assert_eq!(rc.suffix.as_deref(), Some("rc1"));
        assert_eq!(rc.to_string(), "2.0.0-rc1");
        assert!(Version::parse("1").is_err());
        assert!(Version::parse("a.b.c").is_err());
        assert!(Version::parse("1.2.3.4").is_err());
    }

    #[test]
    fn first_version_per_policy() {
        assert_eq!(VersioningPolicy::None.next(None), None);
        assert_eq!(VersioningPolicy::Patch.next(None), Some(Version::new(0, 0, 1)));
        assert_eq!(VersioningPolicy::Minor.next(None), Some(Version::new(0, 1, 0)));
        assert_eq!(VersioningPolicy::Major.next(None), Some(Version::new(1, 0, 0)));
    }

    #[test]
    fn increments_zero_lower_fields() {
        let v = Version::new(1, 2, 3);
        assert_eq!(VersioningPolicy::Patch.next(Some(&v)), Some(Version::new(1, 2, 4)));
        assert_eq!(VersioningPolicy::Minor.next(Some(&v)), Some(Version::new(1, 3, 0)));
        assert_eq!(VersioningPolicy::Major.next(Some(&v)), Some(Version::new(2, 0, 0)));
    }

    #[test]
    fn sort_is_numeric_and_skips_garbage() {
        let sorted = sort_versions(&["0.0.10", "junk", "0.0.9", "0.1.0", "v0.0.2"]);
        let shown: Vec<String> = sorted.iter().map(ToString::to_string).collect();
        assert_eq!(shown, vec!["0.0.2", "0.0.9", "0.0.10", "0.1.0"]);
    }

    #[test]
    fn policy_names() {
        assert_eq!("".parse::<VersioningPolicy>().unwrap(), VersioningPolicy::None);
        assert_eq!("Minor".parse::<VersioningPolicy>().unwrap(), VersioningPolicy::Minor);
        assert!("weekly".parse::<VersioningPolicy>().is_err());
        let json = serde_json::to_string(&VersioningPolicy::Patch).unwrap();
        assert_eq!(json, "\"patch\"");
        let parsed: VersioningPolicy = serde_json::from_str("\"\"").unwrap();
        assert_eq!(parsed, VersioningPolicy::None);
    }

    proptest! {
        #[test]
        fn successive_patches_are_strictly_increasing(n in 1usize..50) {
            let mut latest: Option<Version> = None;
            for i in 1..=n {
                let next = VersioningPolicy::Patch.next(latest.as_ref()).unwrap();
                if let Some(prev) = &latest {
                    prop_assert!(next > *prev);
                }
                prop_assert_eq!(next.patch, i as u64);
                latest = Some(next);
            }
        }
    }
}
