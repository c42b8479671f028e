//! Check command implementation.

use shelfdb_core::{analyze, CheckReport};
use std::path::Path;

/// Runs the check command.
pub fn run(path: &Path, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Checking collection at {}", path.display());
    println!();

    let report = analyze(path)?;
    print_report(&report, verbose);

    println!();
    if report.is_ok() {
        println!("✓ Collection check passed");
        Ok(())
    } else {
        println!("✗ Collection check failed");
        Err(format!(
            "{}: {} errors, {} warnings",
            path.display(),
            report.errors.len(),
            report.warnings.len()
        )
        .into())
    }
}

/// Prints errors always and warnings when `verbose` is set.
pub fn print_report(report: &CheckReport, verbose: bool) {
    println!(
        "  {} errors, {} warnings",
        report.errors.len(),
        report.warnings.len()
    );
    for error in &report.errors {
        println!("    error: {error}");
    }
    if verbose {
        for warning in &report.warnings {
            println!("    warning: {warning}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfdb_core::{Collection, Config, METADATA_FILE};
    use tempfile::tempdir;

    #[test]
    fn fails_without_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.ds");
        Collection::init(&path, Config::default()).unwrap().close().unwrap();
        run(&path, true).unwrap();

        std::fs::remove_file(path.join(METADATA_FILE)).unwrap();
        let err = run(&path, false).unwrap_err();
        assert!(err.to_string().contains("1 errors"), "{err}");
    }
}
