//! Reference model of a hierarchy.
//!
//! The model only remembers the declared parent of every node and derives
//! everything else by walking parent pointers. It is slow but obviously
//! correct, which makes it a good oracle for [`HierarchyIndex`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use sylva_core::{AcceptAll, HierarchyIndex};

/// Naive parent-pointer tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceHierarchy {
    parents: BTreeMap<i32, Option<i32>>,
}

impl ReferenceHierarchy {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a model by adding every pair in order.
    #[must_use]
    pub fn from_pairs(pairs: &[(i32, Option<i32>)]) -> Self {
        let mut model = Self::new();
        for &(id, parent) in pairs {
            model.add(id, parent);
        }
        model
    }

    /// Places `id` under `parent`. Returns false for a self reference.
    pub fn add(&mut self, id: i32, parent: Option<i32>) -> bool {
        if parent == Some(id) {
            return false;
        }
        self.parents.insert(id, parent);
        true
    }

    /// Removes `id`, returning its declared parent if it was present.
    pub fn remove(&mut self, id: i32) -> Option<Option<i32>> {
        self.parents.remove(&id)
    }

    /// Returns true if `id` is known, attached or not.
    #[must_use]
    pub fn contains(&self, id: i32) -> bool {
        self.parents.contains_key(&id)
    }

    /// Returns the declared parent of `id`.
    #[must_use]
    pub fn parent(&self, id: i32) -> Option<Option<i32>> {
        self.parents.get(&id).copied()
    }

    /// Depth of `id` if its parent chain reaches a root.
    #[must_use]
    pub fn level(&self, id: i32) -> Option<u32> {
        let mut seen = BTreeSet::new();
        let mut current = id;
        let mut level = 1;
        loop {
            if !seen.insert(current) {
                return None;
            }
            match self.parents.get(&current)? {
                None => return Some(level),
                Some(parent) => {
                    current = *parent;
                    level += 1;
                }
            }
        }
    }

    /// Returns true if the parent chain of `id` reaches a root.
    #[must_use]
    pub fn is_attached(&self, id: i32) -> bool {
        self.level(id).is_some()
    }

    /// Attached nodes, ascending.
    #[must_use]
    pub fn attached(&self) -> Vec<i32> {
        self.parents
            .keys()
            .copied()
            .filter(|id| self.is_attached(*id))
            .collect()
    }

    /// Known nodes that are not attached, ascending.
    #[must_use]
    pub fn orphans(&self) -> Vec<i32> {
        self.parents
            .keys()
            .copied()
            .filter(|id| !self.is_attached(*id))
            .collect()
    }

    /// Nodes without a parent, ascending.
    #[must_use]
    pub fn roots(&self) -> Vec<i32> {
        self.parents
            .iter()
            .filter(|(_, parent)| parent.is_none())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Direct children of an attached node, ascending. Empty otherwise.
    #[must_use]
    pub fn children(&self, id: i32) -> Vec<i32> {
        if !self.is_attached(id) {
            return Vec::new();
        }
        self.parents
            .iter()
            .filter(|(_, parent)| **parent == Some(id))
            .map(|(child, _)| *child)
            .collect()
    }

    /// Descendants of an attached node up to `max_distance` hops, ascending.
    #[must_use]
    pub fn descendants(&self, id: i32, max_distance: Option<u32>) -> Vec<i32> {
        let mut found = BTreeSet::new();
        let mut frontier = vec![(id, 0u32)];
        while let Some((node, distance)) = frontier.pop() {
            if max_distance.is_some_and(|max| distance >= max) {
                continue;
            }
            for child in self.children(node) {
                found.insert(child);
                frontier.push((child, distance + 1));
            }
        }
        found.into_iter().collect()
    }

    /// Ancestors of an attached node from its root down, excluding the node.
    #[must_use]
    pub fn path_to_root(&self, id: i32) -> Vec<i32> {
        if !self.is_attached(id) {
            return Vec::new();
        }
        let mut path = Vec::new();
        let mut current = self.parent(id).flatten();
        while let Some(node) = current {
            path.push(node);
            current = self.parent(node).flatten();
        }
        path.reverse();
        path
    }

    /// Number of attached nodes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.attached().len()
    }

    /// Number of known nodes.
    #[must_use]
    pub fn size_including_orphans(&self) -> usize {
        self.parents.len()
    }

    /// Renders the tree the way `HierarchyIndex` displays itself.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for root in self.roots() {
            self.render_node(&mut out, root, 0);
        }
        let _ = write!(out, "Orphans: {:?}", self.orphans());
        out
    }

    fn render_node(&self, out: &mut String, id: i32, depth: usize) {
        let _ = writeln!(out, "{:indent$}{id}", "", indent = 3 * depth);
        for child in self.children(id) {
            self.render_node(out, child, depth + 1);
        }
    }
}

/// Asserts that `index` answers the structural queries exactly as `model`.
///
/// # Panics
///
/// Panics on the first mismatch, or if the index fails its own invariant
/// check.
pub fn assert_model_matches(index: &HierarchyIndex, model: &ReferenceHierarchy) {
    if let Err(error) = index.verify() {
        panic!("index invariants broken: {error}\n{index}");
    }
    assert_eq!(
        index.list_hierarchy_nodes_from_root(&AcceptAll).to_vec(),
        model.attached(),
        "attached nodes differ"
    );
    assert_eq!(
        index.get_orphan_hierarchy_nodes().to_vec(),
        model.orphans(),
        "orphans differ"
    );
    assert_eq!(
        index.get_root_hierarchy_nodes(&AcceptAll).to_vec(),
        model.roots(),
        "roots differ"
    );
    assert_eq!(index.get_hierarchy_size(), model.size());
    assert_eq!(
        index.get_hierarchy_size_including_orphans(),
        model.size_including_orphans()
    );
    for id in model.attached() {
        assert_eq!(index.compute_level(id), model.level(id), "level of {id}");
        assert_eq!(
            index.get_hierarchy_nodes_for_parent(id, &AcceptAll).to_vec(),
            model.children(id),
            "children of {id}"
        );
        assert_eq!(
            index
                .list_hierarchy_nodes_from_root_to_the_node(id)
                .unwrap_or_default(),
            model.path_to_root(id),
            "path to {id}"
        );
    }
    assert_eq!(index.to_string(), model.render());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_parent_chain() {
        let model = ReferenceHierarchy::from_pairs(&[(1, None), (2, Some(1)), (3, Some(2))]);
        assert_eq!(model.level(3), Some(3));
        assert_eq!(model.path_to_root(3), vec![1, 2]);
        assert_eq!(model.descendants(1, Some(1)), vec![2]);
        assert_eq!(model.descendants(1, None), vec![2, 3]);
    }

    #[test]
    fn broken_chain_is_orphaned() {
        let mut model = ReferenceHierarchy::from_pairs(&[(1, None), (2, Some(1)), (3, Some(2))]);
        model.remove(2);
        assert_eq!(model.attached(), vec![1]);
        assert_eq!(model.orphans(), vec![3]);
        assert!(model.path_to_root(3).is_empty());
    }

    #[test]
    fn cycle_is_orphaned() {
        let model = ReferenceHierarchy::from_pairs(&[(1, Some(2)), (2, Some(1))]);
        assert_eq!(model.level(1), None);
        assert_eq!(model.orphans(), vec![1, 2]);
    }

    #[test]
    fn self_reference_is_rejected() {
        let mut model = ReferenceHierarchy::new();
        assert!(!model.add(4, Some(4)));
        assert!(!model.contains(4));
    }

    #[test]
    fn render_matches_display_format() {
        let model = ReferenceHierarchy::from_pairs(&[(1, None), (2, Some(1)), (5, Some(9))]);
        assert_eq!(model.render(), "1\n   2\nOrphans: [5]");
    }
}
