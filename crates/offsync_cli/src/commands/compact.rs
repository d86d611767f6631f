//! Compact command implementation.

use super::{open_engine, CliError};
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), CliError> {
    let engine = open_engine(path)?;
    let stats = engine.store_stats()?;

    println!("Compacting store at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let reclaimable = stats.size_bytes.saturating_sub(stats.live_bytes);
    println!("Compaction Analysis:");
    println!("  Size before: {} bytes", stats.size_bytes);
    println!("  Size after:  {} bytes", stats.live_bytes);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        reclaimable,
        if stats.size_bytes > 0 {
            (reclaimable as f64 / stats.size_bytes as f64) * 100.0
        } else {
            0.0
        }
    );

    if dry_run {
        return Ok(());
    }
    println!();
    if reclaimable == 0 {
        println!("No compaction needed - store is already optimal");
        return Ok(());
    }

    println!("Performing compaction...");
    if let Some(done) = engine.compact()? {
        println!(
            "✓ Compaction complete: {} records, {} -> {} bytes",
            done.records, done.bytes_before, done.bytes_after
        );
    }
    Ok(())
}
