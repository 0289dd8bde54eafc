//! BurrowDB CLI
//!
//! Command-line tools for BurrowDB database management.
//!
//! # Commands
//!
//! - `inspect` - Display key counts and log size
//! - `verify` - Check the log for torn or corrupt records
//! - `compact` - Shrink the log to one record per live key
//! - `dump` - Dump log records for debugging

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// BurrowDB command-line database tools.
#[derive(Parser)]
#[command(name = "burrow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database log file
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
    /// Display key counts and log size
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Check the log for torn or corrupt records without modifying it
    Verify {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Shrink the log to one record per live key
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Dump log records for debugging
    Dump {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this offset (must be a record boundary)
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, format)?;
        }
        Commands::Verify { format } => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path, format)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Database path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Dump {
            limit,
            offset,
            format,
        } => {
            let path = cli.path.ok_or("Database path required for dump")?;
            commands::dump::run(&path, limit, offset, format)?;
        }
        Commands::Version => {
            println!("BurrowDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("BurrowDB Core v{}", burrow_core::VERSION);
        }
    }

    Ok(())
}
