//! Inspect command implementation.

use super::{CliResult, OutputFormat};
use serde::Serialize;
use std::path::Path;
use sylva_core::{AcceptAll, HierarchyIndex, HierarchyIndexStoragePart};

/// Summary of a stored hierarchy.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Storage part path.
    pub path: String,
    /// Key of the index within its owning collection.
    pub index_key: i32,
    /// Number of attached nodes.
    pub attached: usize,
    /// Number of stored nodes, orphans included.
    pub total: usize,
    /// Depth of the deepest attached node.
    pub depth: u32,
    /// Root node ids.
    pub roots: Vec<i32>,
    /// Orphaned node ids.
    pub orphans: Vec<i32>,
    /// Rendered tree.
    #[serde(skip)]
    pub tree: String,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: OutputFormat) -> CliResult<()> {
    let result = inspect(path)?;
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

/// Loads the storage part at `path` and summarizes it.
pub fn inspect(path: &Path) -> CliResult<InspectResult> {
    let part = HierarchyIndexStoragePart::read_from(path)?;
    let index = HierarchyIndex::from_storage_part(&part)?;

    let depth = index
        .list_hierarchy_nodes_from_root(&AcceptAll)
        .iter()
        .filter_map(|id| index.compute_level(id))
        .max()
        .unwrap_or(0);

    Ok(InspectResult {
        path: path.display().to_string(),
        index_key: part.index_key,
        attached: index.get_hierarchy_size(),
        total: index.get_hierarchy_size_including_orphans(),
        depth,
        roots: index.get_root_hierarchy_nodes(&AcceptAll).to_vec(),
        orphans: index.get_orphan_hierarchy_nodes().to_vec(),
        tree: index.to_string(),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Hierarchy: {}", result.path);
    println!("Index key: {}", result.index_key);
    println!(
        "Nodes: {} attached, {} total, depth {}",
        result.attached, result.total, result.depth
    );
    println!();
    println!("{}", result.tree);
}
