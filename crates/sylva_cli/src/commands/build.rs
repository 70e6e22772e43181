//! Build command implementation.

use super::{CliError, CliResult};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use sylva_core::HierarchyIndex;
use tracing::{info, warn};

/// One entry of the input node list.
#[derive(Debug, Deserialize)]
struct NodeRecord {
    id: i32,
    parent: Option<i32>,
}

/// Outcome of a build.
#[derive(Debug)]
pub struct BuildResult {
    /// Number of attached nodes.
    pub attached: usize,
    /// Nodes whose parent chain does not reach a root.
    pub orphans: Vec<i32>,
}

/// Runs the build command.
pub fn run(input: &Path, output: &Path, index_key: i32) -> CliResult<()> {
    let result = build(input, output, index_key)?;
    println!(
        "Wrote {} attached nodes to {}",
        result.attached,
        output.display()
    );
    if !result.orphans.is_empty() {
        println!("Orphans: {:?}", result.orphans);
    }
    Ok(())
}

/// Reads the node list, indexes it in file order and writes the storage part.
pub fn build(input: &Path, output: &Path, index_key: i32) -> CliResult<BuildResult> {
    let records: Vec<NodeRecord> = serde_json::from_str(&fs::read_to_string(input)?)?;

    let mut index = HierarchyIndex::new();
    for record in &records {
        index.add_node(record.id, record.parent)?;
    }

    let part = index
        .create_storage_part(index_key)
        .ok_or_else(|| CliError::Input(format!("{} lists no nodes", input.display())))?;
    part.write_to(output)?;

    let orphans = index.get_orphan_hierarchy_nodes().to_vec();
    if !orphans.is_empty() {
        warn!(count = orphans.len(), "some nodes never reached a root");
    }
    info!(nodes = records.len(), index_key, "storage part written");

    Ok(BuildResult {
        attached: index.get_hierarchy_size(),
        orphans,
    })
}
