//! Property-based test generators using proptest.
//!
//! Provides strategies for random trees (in arbitrary insertion order) and
//! for random mutation sequences over a small id space, so that moves,
//! re-insertions and orphan promotions happen often.

use crate::model::ReferenceHierarchy;
use proptest::prelude::*;
use proptest::sample::Index;
use sylva_core::{CoreResult, HierarchyIndex};

/// A single mutation of a hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyOperation {
    /// Insert or move a node.
    Add {
        /// Node id
        id: i32,
        /// Parent id, `None` for a root
        parent: Option<i32>,
    },
    /// Remove a node.
    Remove {
        /// Node id
        id: i32,
    },
}

impl HierarchyOperation {
    /// Applies the operation to an index.
    ///
    /// # Errors
    ///
    /// Propagates the error the index reports for the operation.
    pub fn apply(&self, index: &mut HierarchyIndex) -> CoreResult<()> {
        match *self {
            Self::Add { id, parent } => index.add_node(id, parent),
            Self::Remove { id } => index.remove_node(id).map(|_| ()),
        }
    }

    /// Applies the operation to the model. Returns false where the index is
    /// expected to reject it.
    pub fn apply_to_model(&self, model: &mut ReferenceHierarchy) -> bool {
        match *self {
            Self::Add { id, parent } => model.add(id, parent),
            Self::Remove { id } => model.remove(id).is_some(),
        }
    }
}

/// Strategy for node ids in `0..max_id`.
pub fn node_id_strategy(max_id: i32) -> impl Strategy<Value = i32> {
    0..max_id
}

/// Strategy for a single mutation over ids in `0..max_id`.
///
/// Roots are rare so that deep trees form; self references are possible.
pub fn hierarchy_operation_strategy(max_id: i32) -> impl Strategy<Value = HierarchyOperation> {
    prop_oneof![
        6 => (node_id_strategy(max_id), node_id_strategy(max_id))
            .prop_map(|(id, parent)| HierarchyOperation::Add { id, parent: Some(parent) }),
        1 => node_id_strategy(max_id).prop_map(|id| HierarchyOperation::Add { id, parent: None }),
        2 => node_id_strategy(max_id).prop_map(|id| HierarchyOperation::Remove { id }),
    ]
}

/// Strategy for a sequence of mutations.
pub fn operation_sequence_strategy(
    max_id: i32,
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<HierarchyOperation>> {
    prop::collection::vec(hierarchy_operation_strategy(max_id), min_ops..max_ops)
}

/// Strategy for a well-formed tree of `size` nodes as `(id, parent)` pairs,
/// in random order.
///
/// Node `i` either is a root or hangs under some node `j < i`, so every node
/// is attached once all pairs have been added.
pub fn shuffled_tree_strategy(size: usize) -> impl Strategy<Value = Vec<(i32, Option<i32>)>> {
    prop::collection::vec((prop::bool::weighted(0.1), any::<Index>()), size)
        .prop_map(|choices| {
            choices
                .into_iter()
                .enumerate()
                .map(|(position, (root, parent))| {
                    let id = position as i32;
                    if position == 0 || root {
                        (id, None)
                    } else {
                        (id, Some(parent.index(position) as i32))
                    }
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

/// Proptest configuration with the given number of cases.
#[must_use]
pub fn property_config(cases: u32) -> ProptestConfig {
    ProptestConfig {
        cases,
        ..ProptestConfig::default()
    }
}
