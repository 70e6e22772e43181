//! Deferred hierarchy listings.

use super::index::{HierarchyIndex, Walk};
use super::predicate::SharedPredicate;
use crate::bitmap::Bitmap;
use crate::formula::BitmapSupplier;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::Hasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum HierarchyQuery {
    Walk(Walk),
    AllNodes,
}

/// Supplier evaluating one hierarchy listing against a borrowed index.
///
/// The supplier records the identities of the roots array and the level index
/// at creation. Evaluation always reads the index as it is at evaluation time;
/// the identities only let a cache recognize that the index has moved on.
pub struct HierarchyBitmapSupplier<'a> {
    index: &'a HierarchyIndex,
    query: HierarchyQuery,
    predicate: SharedPredicate,
    transactional_ids: [u64; 2],
}

impl<'a> HierarchyBitmapSupplier<'a> {
    pub(crate) fn new(
        index: &'a HierarchyIndex,
        query: HierarchyQuery,
        predicate: SharedPredicate,
        transactional_ids: [u64; 2],
    ) -> Self {
        Self {
            index,
            query,
            predicate,
            transactional_ids,
        }
    }
}

impl BitmapSupplier for HierarchyBitmapSupplier<'_> {
    fn get(&self) -> Bitmap {
        match self.query {
            HierarchyQuery::Walk(walk) => self.index.collect(walk, self.predicate.as_ref()),
            HierarchyQuery::AllNodes => self.index.get_all_hierarchy_nodes(),
        }
    }

    fn transactional_ids(&self) -> Vec<u64> {
        self.transactional_ids.to_vec()
    }

    fn hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        std::hash::Hash::hash(&self.query, &mut hasher);
        hasher.write_u64(self.predicate.hash());
        hasher.finish()
    }
}

impl fmt::Debug for HierarchyBitmapSupplier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HierarchyBitmapSupplier")
            .field("query", &self.query)
            .field("transactional_ids", &self.transactional_ids)
            .finish_non_exhaustive()
    }
}
