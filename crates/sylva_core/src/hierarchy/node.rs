//! Hierarchy node value.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Placement of one entity in the hierarchy.
///
/// A node is replaced by a new value whenever its parent changes. Nodes order
/// and compare by entity primary key only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HierarchyNode {
    entity_primary_key: i32,
    parent_primary_key: Option<i32>,
}

impl HierarchyNode {
    /// Creates a node. `None` as parent makes the node a root.
    #[must_use]
    pub const fn new(entity_primary_key: i32, parent_primary_key: Option<i32>) -> Self {
        Self {
            entity_primary_key,
            parent_primary_key,
        }
    }

    /// Returns the entity primary key.
    #[must_use]
    pub const fn entity_primary_key(&self) -> i32 {
        self.entity_primary_key
    }

    /// Returns the declared parent, `None` for roots.
    #[must_use]
    pub const fn parent_primary_key(&self) -> Option<i32> {
        self.parent_primary_key
    }

    /// Returns true if the node declares no parent.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_primary_key.is_none()
    }
}

impl PartialEq for HierarchyNode {
    fn eq(&self, other: &Self) -> bool {
        self.entity_primary_key == other.entity_primary_key
    }
}

impl Eq for HierarchyNode {}

impl PartialOrd for HierarchyNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HierarchyNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entity_primary_key.cmp(&other.entity_primary_key)
    }
}

impl fmt::Display for HierarchyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent_primary_key {
            Some(parent) => write!(f, "{} (parent {parent})", self.entity_primary_key),
            None => write!(f, "{}", self.entity_primary_key),
        }
    }
}
