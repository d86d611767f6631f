//! Clear command implementation.

use super::{open_engine, CliError};
use std::path::Path;

/// Runs the clear command.
pub fn run(path: &Path, confirmed: bool) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ConfirmationRequired);
    }
    let engine = open_engine(path)?;
    engine.clear_all()?;
    println!("✓ Store cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            run(dir.path(), false),
            Err(CliError::ConfirmationRequired)
        ));
    }
}
