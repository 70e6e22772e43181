//! Hierarchy index and its traversal API.
//!
//! - [`HierarchyIndex`] maintains the tree and answers listing, counting and
//!   traversal queries
//! - [`HierarchyFilteringPredicate`] prunes subtrees out of those queries
//! - [`HierarchyVisitor`] receives nodes during traversals
//! - [`HierarchyBitmapSupplier`] backs the deferred `*_formula` listings

mod formula;
mod index;
mod node;
pub mod predicate;
mod visitor;

pub use formula::HierarchyBitmapSupplier;
pub use index::{HierarchyFormula, HierarchyIndex};
pub use node::HierarchyNode;
pub use predicate::{
    accept_all, AcceptAll, ExcludeNodeIds, FnPredicate, HierarchyFilteringPredicate,
    MatchNodeIds, SharedPredicate,
};
pub use visitor::{ChildrenTraverser, HierarchyVisitor};
