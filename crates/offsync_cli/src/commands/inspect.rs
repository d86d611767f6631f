//! Inspect command implementation.

use super::{open_engine, CliError, OutputFormat};
use chrono::{DateTime, Utc};
use offsync_protocol::{StorageMode, SyncQueueItem};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Durable or memory-only.
    pub storage_mode: StorageMode,
    /// Log file size in bytes.
    pub size_bytes: u64,
    /// Bytes a compaction would keep.
    pub live_bytes: u64,
    /// Records replayed at open.
    pub recovered_records: usize,
    /// Torn tail bytes dropped at open.
    pub truncated_bytes: u64,
    /// Row count per collection.
    pub collections: Vec<CollectionStats>,
    /// Items the next pass would attempt.
    pub pending: usize,
    /// Items parked for manual resolution.
    pub awaiting_resolution: usize,
    /// End of the last sync pass, if any.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Every queue item (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<SyncQueueItem>>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Number of rows.
    pub rows: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_items: bool, format: OutputFormat) -> Result<(), CliError> {
    let result = collect(path, show_items)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text(&result),
    }
    Ok(())
}

fn collect(path: &Path, show_items: bool) -> Result<InspectResult, CliError> {
    let engine = open_engine(path)?;
    let stats = engine.store_stats()?;
    let status = engine.status();
    let items = if show_items {
        Some(engine.queued_items()?)
    } else {
        None
    };

    Ok(InspectResult {
        path: path.display().to_string(),
        storage_mode: stats.mode,
        size_bytes: stats.size_bytes,
        live_bytes: stats.live_bytes,
        recovered_records: stats.recovered_records,
        truncated_bytes: stats.truncated_bytes,
        collections: stats
            .collections
            .into_iter()
            .map(|(name, rows)| CollectionStats { name, rows })
            .collect(),
        pending: status.pending_sync_count,
        awaiting_resolution: status.awaiting_resolution_count,
        last_sync_time: status.last_sync_time,
        items,
    })
}

fn print_text(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Log size:          {} bytes", result.size_bytes);
    println!("  Live data:         {} bytes", result.live_bytes);
    println!("  Recovered records: {}", result.recovered_records);
    if result.truncated_bytes > 0 {
        println!("  Torn tail dropped: {} bytes", result.truncated_bytes);
    }
    println!();
    println!("Collections:");
    for collection in &result.collections {
        println!("  {:<12} {}", collection.name, collection.rows);
    }
    println!();
    println!("Queue:");
    println!("  Pending:             {}", result.pending);
    println!("  Awaiting resolution: {}", result.awaiting_resolution);
    match result.last_sync_time {
        Some(at) => println!("  Last sync:           {}", at.to_rfc3339()),
        None => println!("  Last sync:           never"),
    }

    if let Some(items) = &result.items {
        println!();
        println!("Items:");
        for item in items {
            let parked = if item.awaiting_resolution { " (parked)" } else { "" };
            println!(
                "  {} {:<6} {}:{} {}{} retries={}",
                item.id,
                item.change_type,
                item.resource_kind,
                item.resource_id,
                item.status,
                parked,
                item.retry_count
            );
            if let Some(error) = &item.last_error {
                println!("      last error: {error}");
            }
        }
    }
}
