//! Hierarchy traversal callbacks.

use super::index::HierarchyIndex;
use super::node::HierarchyNode;
use super::predicate::HierarchyFilteringPredicate;

/// Callback invoked for every node reached by a traversal.
///
/// The traversal only continues below a node when the visitor calls
/// [`ChildrenTraverser::traverse`]; a visitor that never calls it sees the
/// starting nodes only. Calling it before or after recording the node selects
/// post-order or pre-order visiting.
///
/// # Example
///
/// ```rust
/// use sylva_core::{AcceptAll, ChildrenTraverser, HierarchyIndex, HierarchyNode, HierarchyVisitor};
///
/// struct PreOrder(Vec<i32>);
///
/// impl HierarchyVisitor for PreOrder {
///     fn visit(&mut self, node: &HierarchyNode, _level: u32, _distance: u32, traverser: &mut ChildrenTraverser<'_>) {
///         self.0.push(node.entity_primary_key());
///         traverser.traverse(self);
///     }
/// }
///
/// let mut index = HierarchyIndex::new();
/// index.add_node(2, Some(1)).unwrap();
/// index.add_node(1, None).unwrap();
///
/// let mut visitor = PreOrder(Vec::new());
/// index.traverse_hierarchy(&mut visitor, &AcceptAll);
/// assert_eq!(visitor.0, vec![1, 2]);
/// ```
pub trait HierarchyVisitor {
    /// Visits `node`.
    ///
    /// `level` is the depth of the node in the tree (roots are level 1).
    /// `distance` is the number of hops from the traversal start. The full
    /// traversal starts above the roots, so roots are at distance 1 and
    /// distance equals level there. Traversals from a node, downward or
    /// toward the root, start at that node, which is at distance 0.
    fn visit(
        &mut self,
        node: &HierarchyNode,
        level: u32,
        distance: u32,
        traverser: &mut ChildrenTraverser<'_>,
    );
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Down,
    Up,
}

/// Continuation handed to [`HierarchyVisitor::visit`].
///
/// For downward traversals it visits the children of the current node that
/// pass the predicate. For traversals toward the root it visits the parent.
/// Calling [`traverse`](Self::traverse) more than once has no further effect.
pub struct ChildrenTraverser<'a> {
    index: &'a HierarchyIndex,
    predicate: &'a dyn HierarchyFilteringPredicate,
    node_id: i32,
    level: u32,
    distance: u32,
    direction: Direction,
    traversed: bool,
}

impl<'a> ChildrenTraverser<'a> {
    pub(crate) fn downward(
        index: &'a HierarchyIndex,
        predicate: &'a dyn HierarchyFilteringPredicate,
        node_id: i32,
        level: u32,
        distance: u32,
    ) -> Self {
        Self {
            index,
            predicate,
            node_id,
            level,
            distance,
            direction: Direction::Down,
            traversed: false,
        }
    }

    pub(crate) fn upward(
        index: &'a HierarchyIndex,
        predicate: &'a dyn HierarchyFilteringPredicate,
        node_id: i32,
        level: u32,
    ) -> Self {
        Self {
            index,
            predicate,
            node_id,
            level,
            distance: 0,
            direction: Direction::Up,
            traversed: false,
        }
    }

    fn step(&self, node_id: i32, level: u32) -> Self {
        Self {
            node_id,
            level,
            distance: self.distance + 1,
            traversed: false,
            ..*self
        }
    }

    /// Returns true once [`traverse`](Self::traverse) has been called.
    #[must_use]
    pub fn is_traversed(&self) -> bool {
        self.traversed
    }

    /// Continues the traversal below (or above) the current node.
    pub fn traverse<V: HierarchyVisitor + ?Sized>(&mut self, visitor: &mut V) {
        if std::mem::replace(&mut self.traversed, true) {
            return;
        }
        match self.direction {
            Direction::Down => {
                let Some(children) = self.index.children_of(self.node_id) else {
                    return;
                };
                for &child in children {
                    if !self.predicate.test(child) {
                        continue;
                    }
                    let Some(node) = self.index.node(child) else {
                        continue;
                    };
                    let mut next = self.step(child, self.level + 1);
                    visitor.visit(&node, next.level, next.distance, &mut next);
                }
            }
            Direction::Up => {
                let parent = self
                    .index
                    .node(self.node_id)
                    .and_then(|node| node.parent_primary_key())
                    .and_then(|parent| self.index.node(parent));
                if let Some(parent) = parent {
                    let mut next = self.step(
                        parent.entity_primary_key(),
                        self.level.saturating_sub(1),
                    );
                    visitor.visit(&parent, next.level, next.distance, &mut next);
                }
            }
        }
    }
}
