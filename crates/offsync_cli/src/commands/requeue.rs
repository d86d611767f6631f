//! Requeue command implementation.

use super::{open_engine, CliError};
use offsync_protocol::ItemId;
use std::path::Path;

/// What to re-queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// One item, by id.
    Item(String),
    /// Every item parked for manual resolution.
    AllParked,
}

/// Runs the requeue command.
pub fn run(path: &Path, target: Target) -> Result<(), CliError> {
    let engine = open_engine(path)?;
    match target {
        Target::Item(raw) => {
            let id: ItemId = raw.parse().map_err(|_| CliError::InvalidItemId(raw.clone()))?;
            let item = engine.requeue(id)?;
            println!(
                "Re-queued {} ({} {}:{})",
                item.id, item.change_type, item.resource_kind, item.resource_id
            );
        }
        Target::AllParked => {
            let count = engine.requeue_parked()?;
            println!("Re-queued {count} parked item(s)");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_malformed_id() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(dir.path(), Target::Item("not-a-uuid".into())).unwrap_err();
        assert!(matches!(err, CliError::InvalidItemId(_)));
    }

    #[tokio::test]
    async fn unknown_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(dir.path(), Target::Item(ItemId::new().to_string())).unwrap_err();
        assert!(matches!(
            err,
            CliError::Engine(offsync_engine::EngineError::NotFound(_))
        ));
    }
}
