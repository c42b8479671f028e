//! ShelfDB CLI
//!
//! Command-line tools for ShelfDB collection management.
//!
//! # Commands
//!
//! - `init` - Create a new collection
//! - `inspect` - Display collection metadata and counts
//! - `check` - Check collection consistency
//! - `repair` - Rebuild indexes and metadata, then check again

mod commands;

use clap::{Parser, Subcommand};
use shelfdb_core::VersioningPolicy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ShelfDB command-line collection tools.
#[derive(Parser)]
#[command(name = "shelfdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the collection directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new collection
    Init {
        /// DSN of a relational backend, e.g. sqlite://collection.sqlite
        #[arg(short, long, default_value = "")]
        dsn: String,

        /// Versioning policy (none, patch, minor, major)
        #[arg(long, default_value = "none")]
        versioning: VersioningPolicy,
    },

    /// Display collection metadata and counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check collection consistency
    Check,

    /// Rebuild indexes and metadata, then check again
    Repair,

    /// Show version information
    Version,
}

/// Level used when `--verbose` is off and `RUST_LOG` is unset.
const DEFAULT_LOG_LEVEL: &str = "info";

fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { dsn, versioning } => {
            let path = cli.path.ok_or("Collection path required for init")?;
            commands::init::run(&path, &dsn, versioning)?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Collection path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Check => {
            let path = cli.path.ok_or("Collection path required for check")?;
            commands::check::run(&path, cli.verbose)?;
        }
        Commands::Repair => {
            let path = cli.path.ok_or("Collection path required for repair")?;
            commands::repair::run(&path, cli.verbose)?;
        }
        Commands::Version => {
            println!("ShelfDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("ShelfDB Core v{}", shelfdb_core::VERSION);
        }
    }

    Ok(())
}
