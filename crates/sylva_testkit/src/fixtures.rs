//! Test fixtures and index helpers.
//!
//! Provides the canonical category tree shared by the tests, builders for
//! indexes described as `(id, parent)` pairs, and a temporary location for
//! storage part files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sylva_core::{
    ChildrenTraverser, CoreResult, HierarchyIndex, HierarchyIndexStoragePart, HierarchyNode,
    HierarchyVisitor,
};
use tempfile::TempDir;

/// The canonical category tree, in an order that exercises orphan promotion.
///
/// ```text
/// 6
///    3
///       1
///       2
///    8
///       9
///          10
///          11
///          12
/// 7
///    4
///    5
///       0
/// ```
pub const CANONICAL_TREE: [(i32, Option<i32>); 13] = [
    (0, Some(5)),
    (1, Some(3)),
    (2, Some(3)),
    (3, Some(6)),
    (4, Some(7)),
    (5, Some(7)),
    (6, None),
    (7, None),
    (8, Some(6)),
    (9, Some(8)),
    (10, Some(9)),
    (11, Some(9)),
    (12, Some(9)),
];

/// Rendering of [`CANONICAL_TREE`] by `HierarchyIndex`'s `Display`.
pub const CANONICAL_RENDERING: &str = "6\n   3\n      1\n      2\n   8\n      9\n         10\n         11\n         12\n7\n   4\n   5\n      0\nOrphans: []";

/// One node of a JSON tree description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node id
    pub id: i32,
    /// Parent id, `null` for a root
    pub parent: Option<i32>,
}

/// Builds an index by adding the pairs in order.
///
/// # Errors
///
/// Propagates the first error reported by `add_node`.
pub fn build_index(pairs: &[(i32, Option<i32>)]) -> CoreResult<HierarchyIndex> {
    let mut index = HierarchyIndex::new();
    for &(id, parent) in pairs {
        index.add_node(id, parent)?;
    }
    Ok(index)
}

/// Builds the canonical category tree.
///
/// # Panics
///
/// Panics if the index rejects the fixture.
#[must_use]
pub fn canonical_index() -> HierarchyIndex {
    build_index(&CANONICAL_TREE).expect("canonical tree must build")
}

/// Parses a JSON array of `{"id": .., "parent": ..}` records.
///
/// # Errors
///
/// Returns the JSON error if the text is not such an array.
pub fn pairs_from_json(json: &str) -> serde_json::Result<Vec<(i32, Option<i32>)>> {
    let records: Vec<NodeRecord> = serde_json::from_str(json)?;
    Ok(records
        .into_iter()
        .map(|record| (record.id, record.parent))
        .collect())
}

/// Serializes pairs into the JSON record format.
///
/// # Panics
///
/// Panics if serialization fails.
#[must_use]
pub fn pairs_to_json(pairs: &[(i32, Option<i32>)]) -> String {
    let records: Vec<NodeRecord> = pairs
        .iter()
        .map(|&(id, parent)| NodeRecord { id, parent })
        .collect();
    serde_json::to_string_pretty(&records).expect("records serialize")
}

/// A temporary directory for storage part files with automatic cleanup.
pub struct TempStorage {
    dir: TempDir,
}

impl TempStorage {
    /// Creates a fresh temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Path of a file named `name` inside the directory.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Root of the directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes the storage part of `index` to `name` and returns its path.
    ///
    /// # Panics
    ///
    /// Panics if the index has no unsaved changes or the file cannot be
    /// written.
    pub fn persist(&self, index: &HierarchyIndex, name: &str) -> PathBuf {
        let path = self.path(name);
        let part: HierarchyIndexStoragePart = index
            .create_storage_part(1)
            .expect("dirty index produces a storage part");
        part.write_to(&path).expect("Failed to write storage part");
        path
    }
}

impl Default for TempStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Visitor recording `(node, level, distance)` in pre-order, descending
/// everywhere.
#[derive(Debug, Default)]
pub struct RecordingVisitor {
    /// Visited nodes in order.
    pub visited: Vec<(i32, u32, u32)>,
}

impl RecordingVisitor {
    /// Visited node ids in order.
    #[must_use]
    pub fn ids(&self) -> Vec<i32> {
        self.visited.iter().map(|(id, _, _)| *id).collect()
    }
}

impl HierarchyVisitor for RecordingVisitor {
    fn visit(
        &mut self,
        node: &HierarchyNode,
        level: u32,
        distance: u32,
        traverser: &mut ChildrenTraverser<'_>,
    ) {
        self.visited
            .push((node.entity_primary_key(), level, distance));
        traverser.traverse(self);
    }
}
