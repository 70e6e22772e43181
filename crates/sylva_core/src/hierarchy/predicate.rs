//! Node filtering predicates.
//!
//! A predicate decides which nodes a listing, count or traversal keeps. A
//! rejected node is excluded together with its whole subtree: the walk never
//! descends below it.

use crate::bitmap::Bitmap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

/// Decides whether a node is kept by a hierarchy walk.
pub trait HierarchyFilteringPredicate: Send + Sync {
    /// Returns true to keep `node_id` and descend into its children.
    fn test(&self, node_id: i32) -> bool;

    /// Hash of the predicate and its parameters, used in formula cache keys.
    fn hash(&self) -> u64;
}

/// Shared, type-erased predicate.
pub type SharedPredicate = Arc<dyn HierarchyFilteringPredicate>;

fn hash_of(tag: &str, parts: &[u64]) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(tag.as_bytes());
    for part in parts {
        hasher.write_u64(*part);
    }
    hasher.finish()
}

fn hash_ids(tag: &str, ids: &Bitmap) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(tag.as_bytes());
    for id in ids.iter() {
        hasher.write_i32(id);
    }
    hasher.finish()
}

/// Keeps every node.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl HierarchyFilteringPredicate for AcceptAll {
    fn test(&self, _node_id: i32) -> bool {
        true
    }

    fn hash(&self) -> u64 {
        hash_of("accept-all", &[])
    }
}

/// Returns the shared [`AcceptAll`] predicate.
#[must_use]
pub fn accept_all() -> SharedPredicate {
    Arc::new(AcceptAll)
}

/// Keeps only the listed nodes.
#[derive(Debug, Clone)]
pub struct MatchNodeIds {
    ids: Bitmap,
}

impl MatchNodeIds {
    /// Keeps nodes contained in `ids`.
    #[must_use]
    pub fn new(ids: Bitmap) -> Self {
        Self { ids }
    }
}

impl HierarchyFilteringPredicate for MatchNodeIds {
    fn test(&self, node_id: i32) -> bool {
        self.ids.contains(node_id)
    }

    fn hash(&self) -> u64 {
        hash_ids("match", &self.ids)
    }
}

/// Rejects the listed nodes (and therefore their subtrees).
#[derive(Debug, Clone)]
pub struct ExcludeNodeIds {
    ids: Bitmap,
}

impl ExcludeNodeIds {
    /// Rejects nodes contained in `ids`.
    #[must_use]
    pub fn new(ids: Bitmap) -> Self {
        Self { ids }
    }
}

impl HierarchyFilteringPredicate for ExcludeNodeIds {
    fn test(&self, node_id: i32) -> bool {
        !self.ids.contains(node_id)
    }

    fn hash(&self) -> u64 {
        hash_ids("exclude", &self.ids)
    }
}

/// Predicate backed by a closure.
///
/// Closures cannot be hashed, so the caller supplies the hash that
/// identifies the closure's behavior.
pub struct FnPredicate<F> {
    test: F,
    hash: u64,
}

impl<F> FnPredicate<F>
where
    F: Fn(i32) -> bool + Send + Sync,
{
    /// Wraps `test`, identified by `hash`.
    pub fn new(hash: u64, test: F) -> Self {
        Self { test, hash }
    }
}

impl<F> HierarchyFilteringPredicate for FnPredicate<F>
where
    F: Fn(i32) -> bool + Send + Sync,
{
    fn test(&self, node_id: i32) -> bool {
        (self.test)(node_id)
    }

    fn hash(&self) -> u64 {
        self.hash
    }
}

impl<F> fmt::Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPredicate")
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

struct And(SharedPredicate, SharedPredicate);

impl HierarchyFilteringPredicate for And {
    fn test(&self, node_id: i32) -> bool {
        self.0.test(node_id) && self.1.test(node_id)
    }

    fn hash(&self) -> u64 {
        hash_of("and", &[self.0.hash(), self.1.hash()])
    }
}

struct Or(SharedPredicate, SharedPredicate);

impl HierarchyFilteringPredicate for Or {
    fn test(&self, node_id: i32) -> bool {
        self.0.test(node_id) || self.1.test(node_id)
    }

    fn hash(&self) -> u64 {
        hash_of("or", &[self.0.hash(), self.1.hash()])
    }
}

struct Negate(SharedPredicate);

impl HierarchyFilteringPredicate for Negate {
    fn test(&self, node_id: i32) -> bool {
        !self.0.test(node_id)
    }

    fn hash(&self) -> u64 {
        hash_of("not", &[self.0.hash()])
    }
}

/// Keeps nodes accepted by both predicates.
#[must_use]
pub fn and(left: SharedPredicate, right: SharedPredicate) -> SharedPredicate {
    Arc::new(And(left, right))
}

/// Keeps nodes accepted by either predicate.
#[must_use]
pub fn or(left: SharedPredicate, right: SharedPredicate) -> SharedPredicate {
    Arc::new(Or(left, right))
}

/// Keeps nodes the predicate rejects.
#[must_use]
pub fn negate(predicate: SharedPredicate) -> SharedPredicate {
    Arc::new(Negate(predicate))
}
