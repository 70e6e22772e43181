//! Transactional hash map.

use super::version::next_id;
use super::TransactionalLayerProducer;
use crate::error::{CoreError, CoreResult};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Diff recorded against the base of a [`TransactionalMap`].
///
/// `modified` holds inserted and updated entries, `removed` holds base keys
/// that were deleted and not re-inserted since.
#[derive(Debug, Clone)]
pub struct MapChanges<K, V> {
    modified: HashMap<K, V>,
    removed: HashSet<K>,
}

impl<K, V> Default for MapChanges<K, V> {
    fn default() -> Self {
        Self {
            modified: HashMap::new(),
            removed: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash, V> MapChanges<K, V> {
    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.removed.is_empty()
    }

    fn shadows(&self, key: &K) -> bool {
        self.removed.contains(key) || self.modified.contains_key(key)
    }
}

/// Hash map with copy-on-write versioning.
#[derive(Debug, Clone)]
pub struct TransactionalMap<K, V> {
    id: u64,
    base: Arc<HashMap<K, V>>,
    layer: Option<MapChanges<K, V>>,
}

impl<K, V> Default for TransactionalMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TransactionalMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::from_map(HashMap::new())
    }

    /// Wraps an existing map as the base of a new generation.
    #[must_use]
    pub fn from_map(map: HashMap<K, V>) -> Self {
        Self {
            id: next_id(),
            base: Arc::new(map),
            layer: None,
        }
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        match &self.layer {
            Some(layer) => {
                if layer.removed.contains(key) {
                    None
                } else {
                    layer.modified.get(key).or_else(|| self.base.get(key))
                }
            }
            None => self.base.get(key),
        }
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or replaces the value under `key`.
    pub fn put(&mut self, key: K, value: V) {
        match &mut self.layer {
            Some(layer) => {
                layer.removed.remove(&key);
                layer.modified.insert(key, value);
            }
            None => {
                Arc::make_mut(&mut self.base).insert(key, value);
            }
        }
    }

    /// Removes `key`, returning its former value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        match &mut self.layer {
            Some(layer) => {
                if let Some(value) = layer.modified.remove(key) {
                    if self.base.contains_key(key) {
                        layer.removed.insert(key.clone());
                    }
                    Some(value)
                } else if !layer.removed.contains(key) {
                    let value = self.base.get(key).cloned();
                    if value.is_some() {
                        layer.removed.insert(key.clone());
                    }
                    value
                } else {
                    None
                }
            }
            None => Arc::make_mut(&mut self.base).remove(key),
        }
    }

    /// Removes `key`, which the caller expects to be present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PremiseViolated`] if the key is absent.
    pub fn remove_existing(&mut self, key: &K) -> CoreResult<V>
    where
        K: Debug,
    {
        self.remove(key).ok_or_else(|| {
            CoreError::premise_violated(format!("key {key:?} unexpectedly missing"))
        })
    }

    /// Applies `update` to the value under `key` if present.
    ///
    /// Returns false when the key is absent; the map is left untouched then.
    pub fn compute_if_present<F>(&mut self, key: &K, update: F) -> bool
    where
        F: FnOnce(&mut V),
    {
        match &mut self.layer {
            Some(layer) => {
                if let Some(value) = layer.modified.get_mut(key) {
                    update(value);
                    return true;
                }
                if layer.removed.contains(key) {
                    return false;
                }
                match self.base.get(key) {
                    Some(value) => {
                        let mut value = value.clone();
                        update(&mut value);
                        layer.modified.insert(key.clone(), value);
                        true
                    }
                    None => false,
                }
            }
            None => {
                if !self.base.contains_key(key) {
                    return false;
                }
                match Arc::make_mut(&mut self.base).get_mut(key) {
                    Some(value) => {
                        update(value);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.layer {
            Some(layer) => {
                let added = layer
                    .modified
                    .keys()
                    .filter(|key| !self.base.contains_key(key))
                    .count();
                self.base.len() - layer.removed.len() + added
            }
            None => self.base.len(),
        }
    }

    /// Returns true if the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates the merged view in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        let layer = self.layer.as_ref();
        self.base
            .iter()
            .filter(move |(key, _)| layer.map_or(true, |changes| !changes.shadows(key)))
            .chain(layer.into_iter().flat_map(|changes| changes.modified.iter()))
    }

    /// Iterates the keys of the merged view in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(key, _)| key)
    }
}

impl<K, V> TransactionalLayerProducer for TransactionalMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn id(&self) -> u64 {
        self.id
    }

    fn begin_layer(&mut self) {
        if self.layer.is_none() {
            self.layer = Some(MapChanges::default());
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
            let merged = self
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            Self::from_map(merged)
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
