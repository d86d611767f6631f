//! Offsync CLI
//!
//! Maintenance tools for an offsync store directory.
//!
//! # Commands
//!
//! - `inspect` - Display storage statistics and queue contents
//! - `requeue` - Put parked or failed queue items back in line
//! - `purge-cache` - Remove expired cache rows
//! - `compact` - Rewrite the store log without superseded records
//! - `clear` - Remove all data

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Offsync command-line store tools.
#[derive(Parser)]
#[command(name = "offsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
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
    /// Display storage statistics and queue contents
    Inspect {
        /// List every queue item
        #[arg(short, long)]
        items: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Put parked or failed queue items back in line
    Requeue {
        /// Item to re-queue
        #[arg(required_unless_present = "all_parked", conflicts_with = "all_parked")]
        item_id: Option<String>,

        /// Re-queue every item awaiting manual resolution
        #[arg(long)]
        all_parked: bool,
    },

    /// Remove expired cache rows
    PurgeCache,

    /// Rewrite the store log without superseded records
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Remove every queued change, local snapshot and cache row
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { items, format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            let format: commands::OutputFormat = format.parse()?;
            commands::inspect::run(&path, items, format)?;
        }
        Commands::Requeue {
            item_id,
            all_parked,
        } => {
            let path = cli.path.ok_or("Store path required for requeue")?;
            let target = match item_id {
                Some(id) if !all_parked => commands::requeue::Target::Item(id),
                _ => commands::requeue::Target::AllParked,
            };
            commands::requeue::run(&path, target)?;
        }
        Commands::PurgeCache => {
            let path = cli.path.ok_or("Store path required for purge-cache")?;
            commands::purge_cache::run(&path)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Clear { yes } => {
            let path = cli.path.ok_or("Store path required for clear")?;
            commands::clear::run(&path, yes)?;
        }
        Commands::Version => {
            println!("Offsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
