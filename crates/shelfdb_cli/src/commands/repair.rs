//! Repair command implementation.

use super::check::print_report;
use shelfdb_core::{analyze, repair};
use std::path::Path;

/// Runs the repair command.
pub fn run(path: &Path, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Repairing collection at {}", path.display());
    println!();

    println!("Before:");
    print_report(&analyze(path)?, verbose);

    let report = repair(path, verbose)?;
    println!("After:");
    print_report(&report, verbose);

    println!();
    println!("✓ Collection repaired");
    Ok(())
}
