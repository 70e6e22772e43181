//! Transactional sorted integer array.

use super::version::next_id;
use super::TransactionalLayerProducer;
use crate::error::{CoreError, CoreResult};
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::iter::Peekable;
use std::slice;
use std::sync::Arc;

static NO_INSERTIONS: BTreeSet<i32> = BTreeSet::new();

/// Diff recorded against the base of a [`TransactionalIntArray`].
///
/// `insertions` never intersects the base and `removals` is always a subset
/// of it, so the merged length is `base - removals + insertions`.
#[derive(Debug, Clone, Default)]
pub struct IntArrayChanges {
    insertions: BTreeSet<i32>,
    removals: BTreeSet<i32>,
}

impl IntArrayChanges {
    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.removals.is_empty()
    }
}

/// Sorted, duplicate-free array of `i32` with copy-on-write versioning.
#[derive(Debug, Clone)]
pub struct TransactionalIntArray {
    id: u64,
    base: Arc<Vec<i32>>,
    layer: Option<IntArrayChanges>,
}

impl Default for TransactionalIntArray {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionalIntArray {
    /// Creates an empty array.
    #[must_use]
    pub fn new() -> Self {
        Self::from_sorted(Vec::new())
    }

    /// Creates an array from arbitrary values; they are sorted and deduplicated.
    #[must_use]
    pub fn from_values(mut values: Vec<i32>) -> Self {
        values.sort_unstable();
        values.dedup();
        Self::from_sorted(values)
    }

    fn from_sorted(values: Vec<i32>) -> Self {
        Self {
            id: next_id(),
            base: Arc::new(values),
            layer: None,
        }
    }

    /// Returns true if the array contains `value`.
    #[must_use]
    pub fn contains(&self, value: i32) -> bool {
        match &self.layer {
            Some(layer) => {
                layer.insertions.contains(&value)
                    || (self.base.binary_search(&value).is_ok()
                        && !layer.removals.contains(&value))
            }
            None => self.base.binary_search(&value).is_ok(),
        }
    }

    /// Adds `value`, keeping the array sorted. Returns false if it was present.
    pub fn add(&mut self, value: i32) -> bool {
        if self.contains(value) {
            return false;
        }
        match &mut self.layer {
            Some(layer) => {
                if !layer.removals.remove(&value) {
                    layer.insertions.insert(value);
                }
            }
            None => {
                let base = Arc::make_mut(&mut self.base);
                if let Err(position) = base.binary_search(&value) {
                    base.insert(position, value);
                }
            }
        }
        true
    }

    /// Adds every value of `values`.
    pub fn add_all(&mut self, values: &[i32]) {
        for &value in values {
            self.add(value);
        }
    }

    /// Removes `value`.
    ///
    /// Removing a value that is not present is a premise violation: callers
    /// track membership themselves, so an absent value means their
    /// bookkeeping is already broken.
    pub fn remove(&mut self, value: i32) -> CoreResult<()> {
        if !self.contains(value) {
            return Err(CoreError::premise_violated(format!(
                "value {value} is not present in the array"
            )));
        }
        match &mut self.layer {
            Some(layer) => {
                if !layer.insertions.remove(&value) {
                    layer.removals.insert(value);
                }
            }
            None => {
                let base = Arc::make_mut(&mut self.base);
                if let Ok(position) = base.binary_search(&value) {
                    base.remove(position);
                }
            }
        }
        Ok(())
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.layer {
            Some(layer) => self.base.len() - layer.removals.len() + layer.insertions.len(),
            None => self.base.len(),
        }
    }

    /// Returns true if the array holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates the merged view in ascending order.
    pub fn iter(&self) -> IntArrayIter<'_> {
        let (insertions, removals) = match &self.layer {
            Some(layer) => (&layer.insertions, Some(&layer.removals)),
            None => (&NO_INSERTIONS, None),
        };
        IntArrayIter {
            base: self.base.iter().peekable(),
            insertions: insertions.iter().peekable(),
            removals,
        }
    }

    /// Returns the merged view as a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<i32> {
        match &self.layer {
            Some(_) => self.iter().collect(),
            None => self.base.as_ref().clone(),
        }
    }
}

impl TransactionalLayerProducer for TransactionalIntArray {
    fn id(&self) -> u64 {
        self.id
    }

    fn begin_layer(&mut self) {
        if self.layer.is_none() {
            self.layer = Some(IntArrayChanges::default());
        }
    }

    fn has_layer(&self) -> bool {
        self.layer.is_some()
    }

    fn has_pending_changes(&self) -> bool {
        self.layer.as_ref().is_some_and(|layer| !layer.is_empty())
    }

    fn create_copy_with_merged_changes(&self) -> Self {
        if self.has_pending_changes() {
            Self::from_sorted(self.iter().collect())
        } else {
            Self {
                id: self.id,
                base: Arc::clone(&self.base),
                layer: None,
            }
        }
    }

    fn remove_layer(&mut self) {
        self.layer = None;
    }
}

/// Ascending iterator over the merged view of a [`TransactionalIntArray`].
pub struct IntArrayIter<'a> {
    base: Peekable<slice::Iter<'a, i32>>,
    insertions: Peekable<btree_set::Iter<'a, i32>>,
    removals: Option<&'a BTreeSet<i32>>,
}

impl Iterator for IntArrayIter<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        loop {
            let take_base = match (self.base.peek(), self.insertions.peek()) {
                (Some(b), Some(i)) => *b < *i,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => return None,
            };
            if !take_base {
                return self.insertions.next().copied();
            }
            let value = *self.base.next()?;
            if self.removals.is_some_and(|removed| removed.contains(&value)) {
                continue;
            }
            return Some(value);
        }
    }
}
