//! Verify command implementation.

use super::{CliError, CliResult};
use std::path::Path;
use sylva_core::{Config, HierarchyIndex, HierarchyIndexStoragePart};

/// Runs the verify command.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying hierarchy at {}", path.display());
    let nodes = verify(path)?;
    println!("OK: {nodes} nodes, all invariants hold");
    Ok(())
}

/// Loads the storage part at `path` with invariant checking enabled.
///
/// Returns the number of stored nodes.
pub fn verify(path: &Path) -> CliResult<usize> {
    let part = HierarchyIndexStoragePart::read_from(path)?;
    let config = Config::new().verify_on_load(true);
    let index = HierarchyIndex::from_storage_part_with_config(&part, config)
        .map_err(|error| CliError::Input(format!("verification failed: {error}")))?;
    Ok(index.get_hierarchy_size_including_orphans())
}
