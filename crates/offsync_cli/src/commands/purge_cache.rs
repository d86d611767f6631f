//! Purge-cache command implementation.

use super::{open_engine, CliError};
use std::path::Path;

/// Runs the purge-cache command.
pub fn run(path: &Path) -> Result<(), CliError> {
    let engine = open_engine(path)?;
    let removed = engine.clear_expired_cache()?;
    println!("Removed {removed} expired cache row(s)");
    Ok(())
}
