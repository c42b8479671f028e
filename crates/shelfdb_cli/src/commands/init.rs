//! Init command implementation.

use shelfdb_core::{Collection, Config, VersioningPolicy};
use std::path::Path;

/// Runs the init command.
pub fn run(
    path: &Path,
    dsn: &str,
    versioning: VersioningPolicy,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::new().dsn(dsn).versioning(versioning);
    let collection = Collection::init(path, config)?;
    println!(
        "Created {} collection at {}",
        collection.storage_type(),
        collection.path().display()
    );
    collection.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfdb_core::StorageType;
    use tempfile::tempdir;

    #[test]
    fn init_then_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cli.ds");
        run(&path, "sqlite://collection.sqlite", VersioningPolicy::Patch).unwrap();

        let c = Collection::open(&path).unwrap();
        assert_eq!(c.storage_type(), StorageType::Relational);
        assert_eq!(c.versioning(), VersioningPolicy::Patch);
        assert!(run(&path, "", VersioningPolicy::None).is_err());
    }
}
