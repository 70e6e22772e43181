//! Hierarchy index.
//!
//! The index keeps the tree in flat transactional collections rather than in
//! linked nodes:
//!
//! - `item_index` maps every known node id to its [`HierarchyNode`]
//! - `roots` lists the nodes without a parent
//! - `level_index` maps every attached node to its children
//! - `orphans` lists nodes whose ancestor chain does not reach a root
//!
//! The tree is reconstructed by walking `roots` and descending through
//! `level_index`. Nodes may be added before their parents; such nodes wait in
//! `orphans` and are promoted into `level_index` as soon as their parent gets
//! attached.
//!
//! ## Invariants
//!
//! - `item_index` keys are exactly the attached nodes plus the orphans
//! - `level_index` keys are exactly the attached nodes
//! - children arrays and `roots` are sorted ascending and duplicate-free
//! - no node is its own parent

use super::formula::{HierarchyBitmapSupplier, HierarchyQuery};
use super::node::HierarchyNode;
use super::predicate::{AcceptAll, HierarchyFilteringPredicate, SharedPredicate};
use super::visitor::{ChildrenTraverser, HierarchyVisitor};
use crate::bitmap::Bitmap;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::formula::DeferredFormula;
use crate::storage::HierarchyIndexStoragePart;
use crate::transactional::{
    next_id, TransactionalBoolean, TransactionalIntArray, TransactionalLayerProducer,
    TransactionalMap,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, trace, warn};

/// Deferred listing produced by the `*_formula` methods of [`HierarchyIndex`].
pub type HierarchyFormula<'a> = DeferredFormula<HierarchyBitmapSupplier<'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Start {
    Roots,
    Node(i32),
}

/// Shape of a listing walk, shared by listings, counts and formulas.
///
/// `max_distance` bounds how far below the starting nodes the walk descends;
/// the starting nodes themselves are at distance zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Walk {
    start: Start,
    include_start: bool,
    max_distance: Option<u32>,
}

impl Walk {
    const fn from_root(max_distance: Option<u32>) -> Self {
        Self {
            start: Start::Roots,
            include_start: true,
            max_distance,
        }
    }

    const fn from_node(node: i32, include_start: bool, max_distance: Option<u32>) -> Self {
        Self {
            start: Start::Node(node),
            include_start,
            max_distance,
        }
    }
}

fn insert_sorted(values: &mut Vec<i32>, value: i32) {
    if let Err(position) = values.binary_search(&value) {
        values.insert(position, value);
    }
}

fn remove_sorted(values: &mut Vec<i32>, value: i32) -> bool {
    match values.binary_search(&value) {
        Ok(position) => {
            values.remove(position);
            true
        }
        Err(_) => false,
    }
}

/// Tree-structured index over entity primary keys.
///
/// All mutations go through the transactional collections: outside a
/// transaction they apply immediately (copying any base still shared with a
/// snapshot), inside one they are recorded in the collections' layers until
/// [`create_copy_with_merged_changes`](TransactionalLayerProducer::create_copy_with_merged_changes)
/// produces the next generation.
///
/// # Example
///
/// ```rust
/// use sylva_core::{AcceptAll, HierarchyIndex};
///
/// let mut index = HierarchyIndex::new();
/// index.add_node(3, Some(2)).unwrap();
/// index.add_node(2, Some(1)).unwrap();
/// assert_eq!(index.get_orphan_hierarchy_nodes().to_vec(), vec![2, 3]);
///
/// index.add_node(1, None).unwrap();
/// assert!(index.get_orphan_hierarchy_nodes().is_empty());
/// assert_eq!(index.list_hierarchy_nodes_from_root(&AcceptAll).to_vec(), vec![1, 2, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct HierarchyIndex {
    id: u64,
    config: Config,
    /// Set when the contents changed since the last persisted snapshot.
    dirty: TransactionalBoolean,
    item_index: TransactionalMap<i32, HierarchyNode>,
    roots: TransactionalIntArray,
    level_index: TransactionalMap<i32, Vec<i32>>,
    orphans: TransactionalIntArray,
    /// Orphans grouped by their declared parent. Derived from `item_index`
    /// and `orphans`; never persisted.
    orphan_children: TransactionalMap<i32, Vec<i32>>,
    all_nodes: OnceLock<Bitmap>,
}

impl Default for HierarchyIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchyIndex {
    /// Creates an empty index with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an empty index.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            id: next_id(),
            config,
            dirty: TransactionalBoolean::default(),
            item_index: TransactionalMap::new(),
            roots: TransactionalIntArray::new(),
            level_index: TransactionalMap::new(),
            orphans: TransactionalIntArray::new(),
            orphan_children: TransactionalMap::new(),
            all_nodes: OnceLock::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Seeds an empty index with root nodes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexNotEmpty`] if any node was added before.
    pub fn init_root_nodes(&mut self, ids: &[i32]) -> CoreResult<()> {
        if !self.item_index.is_empty() {
            return Err(CoreError::IndexNotEmpty);
        }
        for &id in ids {
            self.item_index.put(id, HierarchyNode::new(id, None));
            self.roots.add(id);
            self.level_index.put(id, Vec::new());
        }
        self.touch();
        debug!(count = ids.len(), "initialized root nodes");
        Ok(())
    }

    /// Places `id` under `parent`, or among the roots when `parent` is `None`.
    ///
    /// A node that already exists is detached from its previous location
    /// first and moves together with its subtree. When the parent is not
    /// attached yet the node becomes an orphan. Attaching a node promotes
    /// every orphan waiting for it, transitively.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SelfReference`] if `parent` equals `id`, or
    /// [`CoreError::PremiseViolated`] if the internal bookkeeping is broken.
    pub fn add_node(&mut self, id: i32, parent: Option<i32>) -> CoreResult<()> {
        if parent == Some(id) {
            return Err(CoreError::SelfReference { node: id });
        }
        if let Some(previous) = self.item_index.get(&id).copied() {
            self.detach(&previous)?;
        }
        self.item_index.put(id, HierarchyNode::new(id, parent));

        match parent {
            None => {
                self.roots.add(id);
                self.attach(id)?;
            }
            Some(parent) if self.level_index.contains_key(&parent) => {
                self.level_index
                    .compute_if_present(&parent, |children| insert_sorted(children, id));
                self.attach(id)?;
            }
            Some(parent) => {
                self.orphans.add(id);
                self.register_orphan(parent, id);
                trace!(node = id, parent, "node waits for its parent");
            }
        }
        self.touch();
        Ok(())
    }

    /// Removes `id` and returns its former parent.
    ///
    /// The attached subtree of the node becomes orphaned; it is re-attached
    /// when a node with the same id is added again.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] if the node is not indexed.
    pub fn remove_node(&mut self, id: i32) -> CoreResult<Option<i32>> {
        let previous = self.require_node(id)?;
        self.detach(&previous)?;
        self.item_index.remove_existing(&id)?;
        self.touch();
        trace!(node = id, "node removed");
        Ok(previous.parent_primary_key())
    }

    fn touch(&mut self) {
        self.dirty.set_to_true();
        self.all_nodes = OnceLock::new();
    }

    /// Moves `node` out of its current location, leaving it in `item_index`.
    fn detach(&mut self, node: &HierarchyNode) -> CoreResult<()> {
        let id = node.entity_primary_key();
        if self.orphans.contains(id) {
            self.orphans.remove(id)?;
            let parent = node.parent_primary_key().ok_or_else(|| {
                CoreError::premise_violated(format!("orphan {id} declares no parent"))
            })?;
            return self.unregister_orphan(parent, id);
        }

        self.make_orphans_recursively(id)?;
        match node.parent_primary_key() {
            None => self.roots.remove(id)?,
            Some(parent) => {
                let mut found = false;
                self.level_index
                    .compute_if_present(&parent, |children| found = remove_sorted(children, id));
                if !found {
                    return Err(CoreError::premise_violated(format!(
                        "node {id} unexpectedly missing from the children of {parent}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Demotes the attached subtree below `id` into orphans, removing `id`
    /// and its descendants from `level_index`.
    fn make_orphans_recursively(&mut self, id: i32) -> CoreResult<()> {
        let mut pending = vec![id];
        let mut demoted = 0usize;
        while let Some(node_id) = pending.pop() {
            let children = self.level_index.remove_existing(&node_id)?;
            if children.is_empty() {
                continue;
            }
            demoted += children.len();
            self.orphans.add_all(&children);
            pending.extend_from_slice(&children);
            if self.orphan_children.contains_key(&node_id) {
                for child in children {
                    self.register_orphan(node_id, child);
                }
            } else {
                self.orphan_children.put(node_id, children);
            }
        }
        if demoted > 0 {
            debug!(node = id, demoted, "subtree became orphaned");
        }
        Ok(())
    }

    /// Gives `id` a children entry and promotes every orphan waiting for it,
    /// transitively.
    fn attach(&mut self, id: i32) -> CoreResult<()> {
        let mut pending = vec![id];
        let mut promoted = 0usize;
        while let Some(node_id) = pending.pop() {
            let children = self.orphan_children.remove(&node_id).unwrap_or_default();
            for &child in &children {
                self.orphans.remove(child)?;
            }
            promoted += children.len();
            pending.extend_from_slice(&children);
            self.level_index.put(node_id, children);
        }
        if promoted > 0 {
            debug!(node = id, promoted, "promoted orphans");
        }
        Ok(())
    }

    fn register_orphan(&mut self, parent: i32, id: i32) {
        let present = self
            .orphan_children
            .compute_if_present(&parent, |waiting| insert_sorted(waiting, id));
        if !present {
            self.orphan_children.put(parent, vec![id]);
        }
    }

    fn unregister_orphan(&mut self, parent: i32, id: i32) -> CoreResult<()> {
        let mut found = false;
        let mut emptied = false;
        self.orphan_children.compute_if_present(&parent, |waiting| {
            found = remove_sorted(waiting, id);
            emptied = waiting.is_empty();
        });
        if !found {
            return Err(CoreError::premise_violated(format!(
                "orphan {id} unexpectedly not registered under {parent}"
            )));
        }
        if emptied {
            self.orphan_children.remove(&parent);
        }
        Ok(())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Returns the node stored under `id`, attached or orphaned.
    #[must_use]
    pub fn node(&self, id: i32) -> Option<HierarchyNode> {
        self.item_index.get(&id).copied()
    }

    /// Returns true if `id` is reachable from a root.
    #[must_use]
    pub fn is_attached(&self, id: i32) -> bool {
        self.level_index.contains_key(&id)
    }

    pub(crate) fn children_of(&self, id: i32) -> Option<&[i32]> {
        self.level_index.get(&id).map(Vec::as_slice)
    }

    fn require_node(&self, id: i32) -> CoreResult<HierarchyNode> {
        self.node(id).ok_or_else(|| CoreError::node_not_found(id))
    }

    /// Returns the declared parent of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] if the node is not indexed.
    pub fn get_parent_node(&self, id: i32) -> CoreResult<Option<i32>> {
        Ok(self.require_node(id)?.parent_primary_key())
    }

    /// Returns the depth of an attached node (roots are level 1), or `None`
    /// for nodes that are not part of the tree.
    #[must_use]
    pub fn compute_level(&self, id: i32) -> Option<u32> {
        if !self.is_attached(id) {
            return None;
        }
        let mut level = 1u32;
        let mut current = id;
        loop {
            match self.item_index.get(&current)?.parent_primary_key() {
                None => return Some(level),
                Some(parent) => {
                    if !self.is_attached(parent) || level as usize > self.level_index.len() {
                        return None;
                    }
                    level += 1;
                    current = parent;
                }
            }
        }
    }

    /// Lists the ancestors of `id`, starting at its root.
    ///
    /// Nodes that are not attached have no path, so the result is empty for
    /// them even when some of their ancestors are indexed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] if the node is not indexed.
    pub fn list_hierarchy_nodes_from_root_to_the_node(&self, id: i32) -> CoreResult<Vec<i32>> {
        let node = self.require_node(id)?;
        if !self.is_attached(id) {
            return Ok(Vec::new());
        }
        let mut path = Vec::new();
        let mut current = node.parent_primary_key();
        while let Some(parent) = current {
            if !self.is_attached(parent) || path.len() >= self.level_index.len() {
                return Ok(Vec::new());
            }
            path.push(parent);
            current = self.node(parent).and_then(|n| n.parent_primary_key());
        }
        path.reverse();
        Ok(path)
    }

    /// Same as [`list_hierarchy_nodes_from_root_to_the_node`](Self::list_hierarchy_nodes_from_root_to_the_node)
    /// with `id` appended.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] if the node is not indexed.
    pub fn list_hierarchy_nodes_from_root_to_the_node_including_self(
        &self,
        id: i32,
    ) -> CoreResult<Vec<i32>> {
        let mut path = self.list_hierarchy_nodes_from_root_to_the_node(id)?;
        if self.is_attached(id) {
            path.push(id);
        }
        Ok(path)
    }

    /// Returns the input ids together with all their attached ancestors.
    ///
    /// The upward walk stops at the first ancestor that is orphaned or not
    /// indexed; such ancestors are not included.
    #[must_use]
    pub fn list_nodes_including_parents(&self, ids: &Bitmap) -> Bitmap {
        let mut result: HashSet<i32> = HashSet::with_capacity(ids.len());
        for id in ids.iter() {
            result.insert(id);
            let mut current = self.node(id).and_then(|n| n.parent_primary_key());
            while let Some(parent) = current {
                if !self.is_attached(parent) || !result.insert(parent) {
                    break;
                }
                current = self.node(parent).and_then(|n| n.parent_primary_key());
            }
        }
        result.into_iter().collect()
    }

    // ========================================================================
    // Listing
    // ========================================================================

    fn walk<F: FnMut(i32)>(
        &self,
        walk: Walk,
        predicate: &dyn HierarchyFilteringPredicate,
        mut sink: F,
    ) {
        let mut pending: Vec<(i32, u32)> = Vec::new();
        match walk.start {
            Start::Roots => {
                for root in self.roots.iter() {
                    if predicate.test(root) {
                        if walk.include_start {
                            sink(root);
                        }
                        pending.push((root, 0));
                    }
                }
            }
            Start::Node(node) => {
                if self.is_attached(node) && predicate.test(node) {
                    if walk.include_start {
                        sink(node);
                    }
                    pending.push((node, 0));
                }
            }
        }
        while let Some((node, distance)) = pending.pop() {
            if walk.max_distance.is_some_and(|max| distance >= max) {
                continue;
            }
            let Some(children) = self.level_index.get(&node) else {
                continue;
            };
            for &child in children {
                if predicate.test(child) {
                    sink(child);
                    pending.push((child, distance + 1));
                }
            }
        }
    }

    pub(crate) fn collect(&self, walk: Walk, predicate: &dyn HierarchyFilteringPredicate) -> Bitmap {
        let mut ids = Vec::new();
        self.walk(walk, predicate, |id| ids.push(id));
        Bitmap::from_values(&ids)
    }

    fn count(&self, walk: Walk, predicate: &dyn HierarchyFilteringPredicate) -> usize {
        let mut count = 0usize;
        self.walk(walk, predicate, |_| count += 1);
        count
    }

    fn formula(&self, query: HierarchyQuery, predicate: SharedPredicate) -> HierarchyFormula<'_> {
        DeferredFormula::new(HierarchyBitmapSupplier::new(
            self,
            query,
            predicate,
            [self.roots.id(), self.level_index.id()],
        ))
    }

    /// Lists every attached node reachable from the roots through nodes the
    /// predicate keeps.
    #[must_use]
    pub fn list_hierarchy_nodes_from_root(&self, predicate: &dyn HierarchyFilteringPredicate) -> Bitmap {
        self.collect(Walk::from_root(None), predicate)
    }

    /// Deferred form of [`list_hierarchy_nodes_from_root`](Self::list_hierarchy_nodes_from_root).
    #[must_use]
    pub fn list_hierarchy_nodes_from_root_formula(&self, predicate: SharedPredicate) -> HierarchyFormula<'_> {
        self.formula(HierarchyQuery::Walk(Walk::from_root(None)), predicate)
    }

    /// Lists the roots and their descendants down to `levels` below them.
    /// `levels = 0` lists the roots only.
    #[must_use]
    pub fn list_hierarchy_nodes_from_root_down_to(
        &self,
        levels: u32,
        predicate: &dyn HierarchyFilteringPredicate,
    ) -> Bitmap {
        self.collect(Walk::from_root(Some(levels)), predicate)
    }

    /// Deferred form of [`list_hierarchy_nodes_from_root_down_to`](Self::list_hierarchy_nodes_from_root_down_to).
    #[must_use]
    pub fn list_hierarchy_nodes_from_root_down_to_formula(
        &self,
        levels: u32,
        predicate: SharedPredicate,
    ) -> HierarchyFormula<'_> {
        self.formula(HierarchyQuery::Walk(Walk::from_root(Some(levels))), predicate)
    }

    /// Lists `parent` and its whole subtree. Empty when `parent` is not
    /// attached or rejected by the predicate.
    #[must_use]
    pub fn list_hierarchy_nodes_from_parent_including_itself(
        &self,
        parent: i32,
        predicate: &dyn HierarchyFilteringPredicate,
    ) -> Bitmap {
        self.collect(Walk::from_node(parent, true, None), predicate)
    }

    /// Deferred form of [`list_hierarchy_nodes_from_parent_including_itself`](Self::list_hierarchy_nodes_from_parent_including_itself).
    #[must_use]
    pub fn list_hierarchy_nodes_from_parent_including_itself_formula(
        &self,
        parent: i32,
        predicate: SharedPredicate,
    ) -> HierarchyFormula<'_> {
        self.formula(HierarchyQuery::Walk(Walk::from_node(parent, true, None)), predicate)
    }

    /// Lists `parent` and its descendants down to `levels` below it.
    #[must_use]
    pub fn list_hierarchy_nodes_from_parent_including_itself_down_to(
        &self,
        parent: i32,
        levels: u32,
        predicate: &dyn HierarchyFilteringPredicate,
    ) -> Bitmap {
        self.collect(Walk::from_node(parent, true, Some(levels)), predicate)
    }

    /// Deferred form of [`list_hierarchy_nodes_from_parent_including_itself_down_to`](Self::list_hierarchy_nodes_from_parent_including_itself_down_to).
    #[must_use]
    pub fn list_hierarchy_nodes_from_parent_including_itself_down_to_formula(
        &self,
        parent: i32,
        levels: u32,
        predicate: SharedPredicate,
    ) -> HierarchyFormula<'_> {
        self.formula(
            HierarchyQuery::Walk(Walk::from_node(parent, true, Some(levels))),
            predicate,
        )
    }

    /// Lists the whole subtree of `parent`, excluding `parent`.
    #[must_use]
    pub fn list_hierarchy_nodes_from_parent(
        &self,
        parent: i32,
        predicate: &dyn HierarchyFilteringPredicate,
    ) -> Bitmap {
        self.collect(Walk::from_node(parent, false, None), predicate)
    }

    /// Deferred form of [`list_hierarchy_nodes_from_parent`](Self::list_hierarchy_nodes_from_parent).
    #[must_use]
    pub fn list_hierarchy_nodes_from_parent_formula(
        &self,
        parent: i32,
        predicate: SharedPredicate,
    ) -> HierarchyFormula<'_> {
        self.formula(HierarchyQuery::Walk(Walk::from_node(parent, false, None)), predicate)
    }

    /// Lists descendants of `parent` at most `levels + 1` below it, so
    /// `levels = 0` lists the direct children.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] if `parent` is not indexed.
    pub fn list_hierarchy_nodes_from_parent_down_to(
        &self,
        parent: i32,
        levels: u32,
        predicate: &dyn HierarchyFilteringPredicate,
    ) -> CoreResult<Bitmap> {
        self.require_node(parent)?;
        Ok(self.collect(Self::parent_down_to(parent, levels), predicate))
    }

    /// Deferred form of [`list_hierarchy_nodes_from_parent_down_to`](Self::list_hierarchy_nodes_from_parent_down_to).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] if `parent` is not indexed.
    pub fn list_hierarchy_nodes_from_parent_down_to_formula(
        &self,
        parent: i32,
        levels: u32,
        predicate: SharedPredicate,
    ) -> CoreResult<HierarchyFormula<'_>> {
        self.require_node(parent)?;
        Ok(self.formula(HierarchyQuery::Walk(Self::parent_down_to(parent, levels)), predicate))
    }

    const fn parent_down_to(parent: i32, levels: u32) -> Walk {
        Walk::from_node(parent, false, Some(levels.saturating_add(1)))
    }

    /// Lists the roots the predicate keeps.
    #[must_use]
    pub fn get_root_hierarchy_nodes(&self, predicate: &dyn HierarchyFilteringPredicate) -> Bitmap {
        self.collect(Walk::from_root(Some(0)), predicate)
    }

    /// Deferred form of [`get_root_hierarchy_nodes`](Self::get_root_hierarchy_nodes).
    #[must_use]
    pub fn get_root_hierarchy_nodes_formula(&self, predicate: SharedPredicate) -> HierarchyFormula<'_> {
        self.formula(HierarchyQuery::Walk(Walk::from_root(Some(0))), predicate)
    }

    /// Lists the direct children of `parent` the predicate keeps.
    #[must_use]
    pub fn get_hierarchy_nodes_for_parent(
        &self,
        parent: i32,
        predicate: &dyn HierarchyFilteringPredicate,
    ) -> Bitmap {
        self.collect(Walk::from_node(parent, false, Some(1)), predicate)
    }

    /// Deferred form of [`get_hierarchy_nodes_for_parent`](Self::get_hierarchy_nodes_for_parent).
    #[must_use]
    pub fn get_hierarchy_nodes_for_parent_formula(
        &self,
        parent: i32,
        predicate: SharedPredicate,
    ) -> HierarchyFormula<'_> {
        self.formula(HierarchyQuery::Walk(Walk::from_node(parent, false, Some(1))), predicate)
    }

    /// Lists every orphaned node.
    #[must_use]
    pub fn get_orphan_hierarchy_nodes(&self) -> Bitmap {
        self.orphans.iter().collect()
    }

    /// Returns every attached node.
    ///
    /// The result is memoized until the next mutation, except while a
    /// transaction has pending changes.
    #[must_use]
    pub fn get_all_hierarchy_nodes(&self) -> Bitmap {
        if !self.config.memoize_all_nodes || self.has_pending_changes() {
            return self.attached_nodes();
        }
        self.all_nodes.get_or_init(|| self.attached_nodes()).clone()
    }

    /// Deferred form of [`get_all_hierarchy_nodes`](Self::get_all_hierarchy_nodes).
    #[must_use]
    pub fn get_all_hierarchy_nodes_formula(&self) -> HierarchyFormula<'_> {
        self.formula(HierarchyQuery::AllNodes, super::predicate::accept_all())
    }

    fn attached_nodes(&self) -> Bitmap {
        self.level_index.keys().copied().collect()
    }

    // ========================================================================
    // Counting
    // ========================================================================

    /// Counts the nodes [`list_hierarchy_nodes_from_root`](Self::list_hierarchy_nodes_from_root) returns.
    #[must_use]
    pub fn get_hierarchy_node_count_from_root(&self, predicate: &dyn HierarchyFilteringPredicate) -> usize {
        self.count(Walk::from_root(None), predicate)
    }

    /// Counts the nodes [`list_hierarchy_nodes_from_root_down_to`](Self::list_hierarchy_nodes_from_root_down_to) returns.
    #[must_use]
    pub fn get_hierarchy_node_count_from_root_down_to(
        &self,
        levels: u32,
        predicate: &dyn HierarchyFilteringPredicate,
    ) -> usize {
        self.count(Walk::from_root(Some(levels)), predicate)
    }

    /// Counts the nodes [`list_hierarchy_nodes_from_parent`](Self::list_hierarchy_nodes_from_parent) returns.
    #[must_use]
    pub fn get_hierarchy_node_count_from_parent(
        &self,
        parent: i32,
        predicate: &dyn HierarchyFilteringPredicate,
    ) -> usize {
        self.count(Walk::from_node(parent, false, None), predicate)
    }

    /// Counts the nodes [`list_hierarchy_nodes_from_parent_down_to`](Self::list_hierarchy_nodes_from_parent_down_to) returns.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] if `parent` is not indexed.
    pub fn get_hierarchy_node_count_from_parent_down_to(
        &self,
        parent: i32,
        levels: u32,
        predicate: &dyn HierarchyFilteringPredicate,
    ) -> CoreResult<usize> {
        self.require_node(parent)?;
        Ok(self.count(Self::parent_down_to(parent, levels), predicate))
    }

    /// Counts the roots the predicate keeps.
    #[must_use]
    pub fn get_root_hierarchy_node_count(&self, predicate: &dyn HierarchyFilteringPredicate) -> usize {
        self.count(Walk::from_root(Some(0)), predicate)
    }

    /// Counts the direct children of `parent` the predicate keeps.
    #[must_use]
    pub fn get_hierarchy_node_count_for_parent(
        &self,
        parent: i32,
        predicate: &dyn HierarchyFilteringPredicate,
    ) -> usize {
        self.count(Walk::from_node(parent, false, Some(1)), predicate)
    }

    /// Number of attached nodes.
    #[must_use]
    pub fn get_hierarchy_size(&self) -> usize {
        self.item_index.len() - self.orphans.len()
    }

    /// Number of indexed nodes, orphans included.
    #[must_use]
    pub fn get_hierarchy_size_including_orphans(&self) -> usize {
        self.item_index.len()
    }

    /// Returns true if no node is indexed.
    #[must_use]
    pub fn is_hierarchy_index_empty(&self) -> bool {
        self.item_index.is_empty()
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Visits the roots the predicate keeps; descending is up to the visitor.
    ///
    /// The traversal starts above the roots, so they are visited at level 1
    /// and distance 1.
    pub fn traverse_hierarchy<V: HierarchyVisitor + ?Sized>(
        &self,
        visitor: &mut V,
        predicate: &dyn HierarchyFilteringPredicate,
    ) {
        for root in self.roots.iter() {
            if !predicate.test(root) {
                continue;
            }
            if let Some(node) = self.node(root) {
                let mut traverser = ChildrenTraverser::downward(self, predicate, root, 1, 1);
                visitor.visit(&node, 1, 1, &mut traverser);
            }
        }
    }

    /// Visits `root_node` at distance 0, or its children at distance 1 when
    /// `excluding_root` is set. Nothing is visited for nodes that are not
    /// attached.
    pub fn traverse_hierarchy_from_node<V: HierarchyVisitor + ?Sized>(
        &self,
        visitor: &mut V,
        root_node: i32,
        excluding_root: bool,
        predicate: &dyn HierarchyFilteringPredicate,
    ) {
        let (Some(level), Some(node)) = (self.compute_level(root_node), self.node(root_node)) else {
            return;
        };
        if !predicate.test(root_node) {
            return;
        }
        let mut traverser = ChildrenTraverser::downward(self, predicate, root_node, level, 0);
        if excluding_root {
            traverser.traverse(visitor);
        } else {
            visitor.visit(&node, level, 0, &mut traverser);
        }
    }

    /// Visits `node` at distance 0; the traverser handed to the visitor
    /// visits the parent. Nothing is visited for nodes that are not attached.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] if the node is not indexed.
    pub fn traverse_hierarchy_to_root<V: HierarchyVisitor + ?Sized>(
        &self,
        visitor: &mut V,
        node: i32,
    ) -> CoreResult<()> {
        let start = self.require_node(node)?;
        let Some(level) = self.compute_level(node) else {
            return Ok(());
        };
        let mut traverser = ChildrenTraverser::upward(self, &AcceptAll, node, level);
        visitor.visit(&start, level, 0, &mut traverser);
        Ok(())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Returns true if the contents changed since the last [`reset_dirty`](Self::reset_dirty).
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.is_true()
    }

    /// Marks the contents as persisted.
    pub fn reset_dirty(&mut self) {
        self.dirty.reset();
    }

    /// Snapshots the index for persistence, or returns `None` when nothing
    /// changed since the last [`reset_dirty`](Self::reset_dirty).
    #[must_use]
    pub fn create_storage_part(&self, index_key: i32) -> Option<HierarchyIndexStoragePart> {
        if !self.is_dirty() {
            return None;
        }
        let mut level_index: Vec<(i32, Vec<i32>)> = self
            .level_index
            .iter()
            .map(|(parent, children)| (*parent, children.clone()))
            .collect();
        level_index.sort_unstable_by_key(|(parent, _)| *parent);

        let mut item_index: Vec<(i32, Option<i32>)> = self
            .item_index
            .iter()
            .map(|(id, node)| (*id, node.parent_primary_key()))
            .collect();
        item_index.sort_unstable_by_key(|(id, _)| *id);

        Some(HierarchyIndexStoragePart {
            index_key,
            roots: self.roots.to_vec(),
            level_index,
            item_index,
            orphans: self.orphans.to_vec(),
        })
    }

    /// Rehydrates an index from a storage part with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the part is structurally broken.
    pub fn from_storage_part(part: &HierarchyIndexStoragePart) -> CoreResult<Self> {
        Self::from_storage_part_with_config(part, Config::default())
    }

    /// Rehydrates an index from a storage part.
    ///
    /// The collections are restored as recorded, no nodes are replayed. With
    /// [`Config::verify_on_load`] the result is also checked against the tree
    /// invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the part is structurally broken
    /// or fails verification.
    pub fn from_storage_part_with_config(
        part: &HierarchyIndexStoragePart,
        config: Config,
    ) -> CoreResult<Self> {
        let item_index: HashMap<i32, HierarchyNode> = part
            .item_index
            .iter()
            .map(|&(id, parent)| (id, HierarchyNode::new(id, parent)))
            .collect();

        let mut orphan_children: HashMap<i32, Vec<i32>> = HashMap::new();
        for &orphan in &part.orphans {
            let parent = item_index
                .get(&orphan)
                .ok_or_else(|| {
                    CoreError::invalid_format(format!("orphan {orphan} has no item record"))
                })?
                .parent_primary_key()
                .ok_or_else(|| {
                    CoreError::invalid_format(format!("orphan {orphan} declares no parent"))
                })?;
            orphan_children.entry(parent).or_default().push(orphan);
        }
        for waiting in orphan_children.values_mut() {
            waiting.sort_unstable();
        }

        let level_index: HashMap<i32, Vec<i32>> = part
            .level_index
            .iter()
            .map(|(parent, children)| {
                let mut children = children.clone();
                children.sort_unstable();
                children.dedup();
                (*parent, children)
            })
            .collect();

        let index = Self {
            id: next_id(),
            config,
            dirty: TransactionalBoolean::default(),
            item_index: TransactionalMap::from_map(item_index),
            roots: TransactionalIntArray::from_values(part.roots.clone()),
            level_index: TransactionalMap::from_map(level_index),
            orphans: TransactionalIntArray::from_values(part.orphans.clone()),
            orphan_children: TransactionalMap::from_map(orphan_children),
            all_nodes: OnceLock::new(),
        };

        if let Err(err) = index.check_structure() {
            warn!(index_key = part.index_key, error = %err, "storage part is structurally broken");
            return Err(err);
        }
        if index.config.verify_on_load {
            if let Err(err) = index.verify() {
                warn!(index_key = part.index_key, error = %err, "storage part failed verification");
                return Err(CoreError::invalid_format(err.to_string()));
            }
        }
        if index.config.memoize_all_nodes {
            let _ = index.all_nodes.set(index.attached_nodes());
        }
        debug!(
            index_key = part.index_key,
            nodes = part.item_index.len(),
            orphans = part.orphans.len(),
            "hierarchy index loaded"
        );
        Ok(index)
    }

    /// Rejects loaded collections whose attached part is not a forest.
    ///
    /// Every listed node must be indexed and listed once, under the parent
    /// it declares, and every level index entry must be reachable from a
    /// root. Traversals assume this, so it runs before anything walks the
    /// tree.
    fn check_structure(&self) -> CoreResult<()> {
        let fail = |message: String| Err(CoreError::invalid_format(message));

        for (parent, _) in self.level_index.iter() {
            if !self.item_index.contains_key(parent) {
                return fail(format!("level index entry {parent} is not indexed"));
            }
        }

        let mut seen = HashSet::with_capacity(self.level_index.len());
        let mut pending = Vec::new();
        for root in self.roots.iter() {
            match self.node(root) {
                Some(node) if node.is_root() => {}
                _ => return fail(format!("root {root} is not indexed as a root")),
            }
            if !seen.insert(root) {
                return fail(format!("node {root} is listed twice"));
            }
            pending.push(root);
        }
        while let Some(parent) = pending.pop() {
            let Some(children) = self.children_of(parent) else {
                return fail(format!("attached node {parent} has no level index entry"));
            };
            for &child in children {
                let declared = self.node(child).and_then(|n| n.parent_primary_key());
                if declared != Some(parent) {
                    return fail(format!("child {child} listed under {parent} declares {declared:?}"));
                }
                if !seen.insert(child) {
                    return fail(format!("node {child} is listed twice"));
                }
                pending.push(child);
            }
        }

        if seen.len() != self.level_index.len() {
            return fail(format!(
                "{} nodes are reachable from the roots but {} are attached",
                seen.len(),
                self.level_index.len()
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Checks the tree invariants and reports the first violation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PremiseViolated`] describing the violation.
    pub fn verify(&self) -> CoreResult<()> {
        let fail = |message: String| Err(CoreError::premise_violated(message));

        for (id, node) in self.item_index.iter() {
            if node.entity_primary_key() != *id {
                return fail(format!("node {id} is stored as {}", node.entity_primary_key()));
            }
            if node.parent_primary_key() == Some(*id) {
                return fail(format!("node {id} is its own parent"));
            }
            let attached = self.is_attached(*id);
            let orphan = self.orphans.contains(*id);
            if attached == orphan {
                return fail(format!(
                    "node {id} must be either attached or orphaned (attached: {attached}, orphan: {orphan})"
                ));
            }
            if orphan {
                match node.parent_primary_key() {
                    None => return fail(format!("orphan {id} declares no parent")),
                    Some(parent) if self.is_attached(parent) => {
                        return fail(format!("orphan {id} has attached parent {parent}"));
                    }
                    Some(_) => {}
                }
            }
        }

        for orphan in self.orphans.iter() {
            if !self.item_index.contains_key(&orphan) {
                return fail(format!("orphan {orphan} is not indexed"));
            }
        }

        for root in self.roots.iter() {
            match self.node(root) {
                Some(node) if node.is_root() => {}
                _ => return fail(format!("root {root} is not indexed as a root")),
            }
        }

        for (parent, children) in self.level_index.iter() {
            if !self.item_index.contains_key(parent) {
                return fail(format!("level index entry {parent} is not indexed"));
            }
            if children.windows(2).any(|pair| pair[0] >= pair[1]) {
                return fail(format!("children of {parent} are not sorted"));
            }
            for child in children {
                let declared = self.node(*child).and_then(|n| n.parent_primary_key());
                if declared != Some(*parent) {
                    return fail(format!("child {child} listed under {parent} declares {declared:?}"));
                }
            }
        }

        for (id, node) in self.item_index.iter() {
            if !self.is_attached(*id) {
                continue;
            }
            let listed = match node.parent_primary_key() {
                None => self.roots.contains(*id),
                Some(parent) => self
                    .children_of(parent)
                    .is_some_and(|children| children.binary_search(id).is_ok()),
            };
            if !listed {
                return fail(format!("attached node {id} is not listed under its parent"));
            }
        }

        let reachable = self.count(Walk::from_root(None), &AcceptAll);
        if reachable != self.level_index.len() {
            return fail(format!(
                "{reachable} nodes are reachable from the roots but {} are attached",
                self.level_index.len()
            ));
        }
        Ok(())
    }

    fn fmt_children(&self, f: &mut fmt::Formatter<'_>, parent: i32, depth: usize) -> fmt::Result {
        let Some(children) = self.children_of(parent) else {
            return Ok(());
        };
        for &child in children {
            writeln!(f, "{:indent$}{child}", "", indent = 3 * depth)?;
            self.fmt_children(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for HierarchyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for root in self.roots.iter() {
            writeln!(f, "{root}")?;
            self.fmt_children(f, root, 1)?;
        }
        write!(f, "Orphans: {:?}", self.orphans.to_vec())
    }
}

impl TransactionalLayerProducer for HierarchyIndex {
    fn id(&self) -> u64 {
        self.id
    }

    fn begin_layer(&mut self) {
        self.dirty.begin_layer();
        self.item_index.begin_layer();
        self.roots.begin_layer();
        self.level_index.begin_layer();
        self.orphans.begin_layer();
        self.orphan_children.begin_layer();
    }

    fn has_layer(&self) -> bool {
        self.item_index.has_layer()
    }

    fn has_pending_changes(&self) -> bool {
        self.dirty.has_pending_changes()
            || self.item_index.has_pending_changes()
            || self.roots.has_pending_changes()
            || self.level_index.has_pending_changes()
            || self.orphans.has_pending_changes()
            || self.orphan_children.has_pending_changes()
    }

    fn create_copy_with_merged_changes(&self) -> Self {
        let changed = self.has_pending_changes();
        let merged = Self {
            id: if changed { next_id() } else { self.id },
            config: self.config.clone(),
            dirty: self.dirty.create_copy_with_merged_changes(),
            item_index: self.item_index.create_copy_with_merged_changes(),
            roots: self.roots.create_copy_with_merged_changes(),
            level_index: self.level_index.create_copy_with_merged_changes(),
            orphans: self.orphans.create_copy_with_merged_changes(),
            orphan_children: self.orphan_children.create_copy_with_merged_changes(),
            all_nodes: if changed {
                OnceLock::new()
            } else {
                self.all_nodes.clone()
            },
        };
        if changed {
            debug!(from = self.id, to = merged.id, "hierarchy index merged");
        }
        merged
    }

    fn remove_layer(&mut self) {
        self.dirty.remove_layer();
        self.item_index.remove_layer();
        self.roots.remove_layer();
        self.level_index.remove_layer();
        self.orphans.remove_layer();
        self.orphan_children.remove_layer();
        self.all_nodes = OnceLock::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::predicate::{accept_all, ExcludeNodeIds, FnPredicate, MatchNodeIds};
    use crate::formula::Formula;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Builds the tree used throughout these tests:
    ///
    /// ```text
    /// 6          7
    /// ├─ 3       ├─ 4
    /// │  ├─ 1    └─ 5
    /// │  └─ 2       └─ 0
    /// └─ 8
    ///    └─ 9
    ///       ├─ 10
    ///       ├─ 11
    ///       └─ 12
    /// ```
    fn canonical() -> HierarchyIndex {
        let mut index = HierarchyIndex::new();
        for (id, parent) in [
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
        ] {
            index.add_node(id, parent).unwrap();
        }
        index.verify().unwrap();
        index
    }

    fn chain() -> HierarchyIndex {
        let mut index = HierarchyIndex::new();
        index.add_node(3, Some(2)).unwrap();
        index.add_node(2, Some(1)).unwrap();
        index.add_node(1, None).unwrap();
        index
    }

    fn exclude(ids: &[i32]) -> ExcludeNodeIds {
        ExcludeNodeIds::new(Bitmap::from_values(ids))
    }

    #[derive(Default)]
    struct Recorder {
        ids: Vec<i32>,
        levels: Vec<u32>,
        distances: Vec<u32>,
        descend_first: bool,
        descend: bool,
    }

    impl Recorder {
        fn pre_order() -> Self {
            Self {
                descend: true,
                ..Self::default()
            }
        }

        fn post_order() -> Self {
            Self {
                descend: true,
                descend_first: true,
                ..Self::default()
            }
        }
    }

    impl HierarchyVisitor for Recorder {
        fn visit(
            &mut self,
            node: &HierarchyNode,
            level: u32,
            distance: u32,
            traverser: &mut ChildrenTraverser<'_>,
        ) {
            if self.descend && self.descend_first {
                traverser.traverse(self);
            }
            self.ids.push(node.entity_primary_key());
            self.levels.push(level);
            self.distances.push(distance);
            if self.descend && !self.descend_first {
                traverser.traverse(self);
            }
        }
    }

    #[test]
    fn lists_entire_tree() {
        let index = canonical();
        assert_eq!(
            index.list_hierarchy_nodes_from_root(&AcceptAll).to_vec(),
            (0..=12).collect::<Vec<_>>()
        );
        assert_eq!(index.get_hierarchy_node_count_from_root(&AcceptAll), 13);
        assert_eq!(index.get_hierarchy_size(), 13);
        assert!(index.get_orphan_hierarchy_nodes().is_empty());
    }

    #[test]
    fn finds_parent_node() {
        let index = canonical();
        assert_eq!(index.get_parent_node(3).unwrap(), Some(6));
        assert_eq!(index.get_parent_node(6).unwrap(), None);
        assert!(matches!(
            index.get_parent_node(99),
            Err(CoreError::NodeNotFound { node: 99 })
        ));
    }

    #[test]
    fn renders_tree() {
        let expected = "6\n   3\n      1\n      2\n   8\n      9\n         10\n         11\n         12\n7\n   4\n   5\n      0\nOrphans: []";
        assert_eq!(canonical().to_string(), expected);
    }

    #[test]
    fn traverses_root_nodes_only() {
        let mut visitor = Recorder::default();
        canonical().traverse_hierarchy(&mut visitor, &AcceptAll);
        assert_eq!(visitor.ids, vec![6, 7]);
        assert_eq!(visitor.levels, vec![1, 1]);
        assert_eq!(visitor.distances, vec![1, 1]);
    }

    #[test]
    fn traverses_entire_tree_top_down() {
        let mut visitor = Recorder::pre_order();
        canonical().traverse_hierarchy(&mut visitor, &AcceptAll);
        assert_eq!(visitor.ids, vec![6, 3, 1, 2, 8, 9, 10, 11, 12, 7, 4, 5, 0]);
        assert_eq!(visitor.levels, vec![1, 2, 3, 3, 2, 3, 4, 4, 4, 1, 2, 2, 3]);
        assert_eq!(visitor.distances, visitor.levels);
    }

    #[test]
    fn traverses_entire_tree_bottom_up() {
        let mut visitor = Recorder::post_order();
        canonical().traverse_hierarchy(&mut visitor, &AcceptAll);
        assert_eq!(visitor.ids, vec![1, 2, 3, 10, 11, 12, 9, 8, 6, 4, 0, 5, 7]);
        assert_eq!(visitor.levels, vec![3, 3, 2, 4, 4, 4, 3, 2, 1, 2, 3, 2, 1]);
    }

    #[test]
    fn traverses_sub_tree_excluding_inner_sub_tree() {
        let mut visitor = Recorder::post_order();
        canonical().traverse_hierarchy_from_node(&mut visitor, 6, false, &exclude(&[9]));
        assert_eq!(visitor.ids, vec![1, 2, 3, 8, 6]);
        assert_eq!(visitor.levels, vec![3, 3, 2, 2, 1]);
        assert_eq!(visitor.distances, vec![2, 2, 1, 1, 0]);
    }

    #[test]
    fn traverses_from_parent() {
        let mut visitor = Recorder::post_order();
        canonical().traverse_hierarchy_from_node(&mut visitor, 9, false, &AcceptAll);
        assert_eq!(visitor.ids, vec![10, 11, 12, 9]);
        assert_eq!(visitor.levels, vec![4, 4, 4, 3]);
        assert_eq!(visitor.distances, vec![1, 1, 1, 0]);
    }

    #[test]
    fn distance_counts_from_traversal_start() {
        let index = chain();

        let mut full = Recorder::pre_order();
        index.traverse_hierarchy(&mut full, &AcceptAll);
        assert_eq!(full.ids, vec![1, 2, 3]);
        assert_eq!(full.distances, full.levels);
        assert_eq!(full.distances, vec![1, 2, 3]);

        let mut from_root = Recorder::pre_order();
        index.traverse_hierarchy_from_node(&mut from_root, 1, false, &AcceptAll);
        assert_eq!(from_root.ids, full.ids);
        assert_eq!(from_root.levels, full.levels);
        assert_eq!(from_root.distances, vec![0, 1, 2]);

        let mut from_child = Recorder::pre_order();
        index.traverse_hierarchy_from_node(&mut from_child, 2, false, &AcceptAll);
        assert_eq!(from_child.levels, vec![2, 3]);
        assert_eq!(from_child.distances, vec![0, 1]);

        let mut upward = Recorder::pre_order();
        index.traverse_hierarchy_to_root(&mut upward, 3).unwrap();
        assert_eq!(upward.ids, vec![3, 2, 1]);
        assert_eq!(upward.distances, vec![0, 1, 2]);
    }

    #[test]
    fn traverses_from_parent_excluding_it() {
        let mut visitor = Recorder::post_order();
        canonical().traverse_hierarchy_from_node(&mut visitor, 9, true, &AcceptAll);
        assert_eq!(visitor.ids, vec![10, 11, 12]);
        assert_eq!(visitor.levels, vec![4, 4, 4]);
        assert_eq!(visitor.distances, vec![1, 1, 1]);
    }

    #[test]
    fn traverses_to_root() {
        let mut visitor = Recorder::post_order();
        canonical().traverse_hierarchy_to_root(&mut visitor, 12).unwrap();
        assert_eq!(visitor.ids, vec![6, 8, 9, 12]);
        assert_eq!(visitor.levels, vec![1, 2, 3, 4]);
        assert_eq!(visitor.distances, vec![3, 2, 1, 0]);

        let mut visitor = Recorder::post_order();
        assert!(canonical().traverse_hierarchy_to_root(&mut visitor, 99).is_err());
    }

    #[test]
    fn traverser_runs_once() {
        struct Twice(Vec<i32>);
        impl HierarchyVisitor for Twice {
            fn visit(
                &mut self,
                node: &HierarchyNode,
                _level: u32,
                _distance: u32,
                traverser: &mut ChildrenTraverser<'_>,
            ) {
                self.0.push(node.entity_primary_key());
                traverser.traverse(self);
                assert!(traverser.is_traversed());
                traverser.traverse(self);
            }
        }
        let mut visitor = Twice(Vec::new());
        canonical().traverse_hierarchy_from_node(&mut visitor, 8, false, &AcceptAll);
        assert_eq!(visitor.0, vec![8, 9, 10, 11, 12]);
    }

    #[test]
    fn lists_with_pruning_predicates() {
        let index = canonical();
        assert_eq!(
            index.list_hierarchy_nodes_from_root(&exclude(&[9, 5])).to_vec(),
            vec![1, 2, 3, 4, 6, 7, 8]
        );
        assert_eq!(
            index
                .list_hierarchy_nodes_from_parent_including_itself(8, &AcceptAll)
                .to_vec(),
            vec![8, 9, 10, 11, 12]
        );
        assert_eq!(
            index
                .list_hierarchy_nodes_from_parent_including_itself(6, &exclude(&[3, 9]))
                .to_vec(),
            vec![6, 8]
        );
        assert_eq!(
            index.list_hierarchy_nodes_from_parent(8, &AcceptAll).to_vec(),
            vec![9, 10, 11, 12]
        );
        assert_eq!(
            index.list_hierarchy_nodes_from_parent(6, &exclude(&[3, 9])).to_vec(),
            vec![8]
        );
        assert_eq!(index.get_hierarchy_node_count_from_parent(6, &exclude(&[3, 9])), 1);
        assert!(index
            .list_hierarchy_nodes_from_parent(6, &exclude(&[6]))
            .is_empty());
    }

    #[test]
    fn lists_down_to_levels() {
        let index = canonical();
        assert_eq!(
            index.list_hierarchy_nodes_from_root_down_to(0, &AcceptAll).to_vec(),
            vec![6, 7]
        );
        assert_eq!(
            index.list_hierarchy_nodes_from_root_down_to(1, &AcceptAll).to_vec(),
            vec![3, 4, 5, 6, 7, 8]
        );
        assert_eq!(index.get_hierarchy_node_count_from_root_down_to(1, &AcceptAll), 6);
        assert_eq!(
            index
                .list_hierarchy_nodes_from_parent_including_itself_down_to(6, 1, &AcceptAll)
                .to_vec(),
            vec![3, 6, 8]
        );
        assert_eq!(
            index
                .list_hierarchy_nodes_from_parent_down_to(6, 0, &AcceptAll)
                .unwrap()
                .to_vec(),
            vec![3, 8]
        );
        assert_eq!(
            index
                .list_hierarchy_nodes_from_parent_down_to(6, 1, &AcceptAll)
                .unwrap()
                .to_vec(),
            vec![1, 2, 3, 8, 9]
        );
        assert_eq!(
            index
                .get_hierarchy_node_count_from_parent_down_to(6, 1, &AcceptAll)
                .unwrap(),
            5
        );
        assert!(matches!(
            index.list_hierarchy_nodes_from_parent_down_to(99, 0, &AcceptAll),
            Err(CoreError::NodeNotFound { node: 99 })
        ));
        assert!(index
            .get_hierarchy_node_count_from_parent_down_to(99, 0, &AcceptAll)
            .is_err());
    }

    #[test]
    fn inserts_new_node() {
        let mut index = canonical();
        index.add_node(20, Some(9)).unwrap();
        assert_eq!(
            index
                .list_hierarchy_nodes_from_parent_down_to(9, 1, &AcceptAll)
                .unwrap()
                .to_vec(),
            vec![10, 11, 12, 20]
        );
    }

    #[test]
    fn inserts_orphan_and_then_interleaving_parent() {
        let mut index = canonical();
        index.add_node(30, Some(20)).unwrap();
        assert_eq!(
            index.list_hierarchy_nodes_from_parent(9, &AcceptAll).to_vec(),
            vec![10, 11, 12]
        );
        assert_eq!(index.get_orphan_hierarchy_nodes().to_vec(), vec![30]);

        index.add_node(20, Some(9)).unwrap();
        assert_eq!(
            index.list_hierarchy_nodes_from_parent(9, &AcceptAll).to_vec(),
            vec![10, 11, 12, 20, 30]
        );
        assert!(index.get_orphan_hierarchy_nodes().is_empty());
        index.verify().unwrap();
    }

    #[test]
    fn moves_existing_node_with_sub_tree() {
        let mut index = canonical();
        index.add_node(9, Some(5)).unwrap();
        assert_eq!(
            index
                .list_hierarchy_nodes_from_parent_including_itself(8, &AcceptAll)
                .to_vec(),
            vec![8]
        );
        assert_eq!(
            index
                .list_hierarchy_nodes_from_parent_including_itself(5, &AcceptAll)
                .to_vec(),
            vec![0, 5, 9, 10, 11, 12]
        );
        assert_eq!(index.compute_level(12), Some(4));
        index.verify().unwrap();
    }

    #[test]
    fn removes_node_and_leaves_orphans() {
        let mut index = canonical();
        assert_eq!(index.remove_node(9).unwrap(), Some(8));
        assert_eq!(
            index
                .list_hierarchy_nodes_from_parent_including_itself(8, &AcceptAll)
                .to_vec(),
            vec![8]
        );
        assert_eq!(index.get_orphan_hierarchy_nodes().to_vec(), vec![10, 11, 12]);
        assert_eq!(index.get_hierarchy_size(), 9);
        assert_eq!(index.get_hierarchy_size_including_orphans(), 12);
        assert!(index.node(9).is_none());
        index.verify().unwrap();
    }

    #[test]
    fn relocates_orphan() {
        let mut index = canonical();
        index.remove_node(9).unwrap();
        index.add_node(10, Some(3)).unwrap();
        assert_eq!(
            index
                .list_hierarchy_nodes_from_parent_including_itself(3, &AcceptAll)
                .to_vec(),
            vec![1, 2, 3, 10]
        );
        assert_eq!(index.get_orphan_hierarchy_nodes().to_vec(), vec![11, 12]);
        index.verify().unwrap();
    }

    #[test]
    fn circular_reference_leaves_nodes_orphaned() {
        let mut index = canonical();
        index.add_node(8, Some(10)).unwrap();
        assert_eq!(
            index
                .list_hierarchy_nodes_from_parent_including_itself(6, &AcceptAll)
                .to_vec(),
            vec![1, 2, 3, 6]
        );
        assert_eq!(index.get_orphan_hierarchy_nodes().to_vec(), vec![8, 9, 10, 11, 12]);
        assert_eq!(index.compute_level(10), None);
        index.verify().unwrap();

        index.add_node(9, Some(6)).unwrap();
        assert_eq!(
            index
                .list_hierarchy_nodes_from_parent_including_itself(6, &AcceptAll)
                .to_vec(),
            vec![1, 2, 3, 6, 8, 9, 10, 11, 12]
        );
        assert_eq!(
            index.list_hierarchy_nodes_from_root_to_the_node(8).unwrap(),
            vec![6, 9, 10]
        );
        index.verify().unwrap();
    }

    #[test]
    fn returns_roots_and_direct_children() {
        let index = canonical();
        assert_eq!(index.get_root_hierarchy_nodes(&AcceptAll).to_vec(), vec![6, 7]);
        assert_eq!(index.get_root_hierarchy_node_count(&exclude(&[7])), 1);
        assert_eq!(
            index.get_hierarchy_nodes_for_parent(9, &AcceptAll).to_vec(),
            vec![10, 11, 12]
        );
        assert_eq!(index.get_hierarchy_node_count_for_parent(9, &exclude(&[11])), 2);
        assert!(index.get_hierarchy_nodes_for_parent(99, &AcceptAll).is_empty());
    }

    #[test]
    fn returns_path_to_the_root() {
        let index = canonical();
        assert_eq!(index.list_hierarchy_nodes_from_root_to_the_node(11).unwrap(), vec![6, 8, 9]);
        assert_eq!(index.list_hierarchy_nodes_from_root_to_the_node(0).unwrap(), vec![7, 5]);
        assert_eq!(index.list_hierarchy_nodes_from_root_to_the_node(4).unwrap(), vec![7]);
        assert!(index.list_hierarchy_nodes_from_root_to_the_node(7).unwrap().is_empty());
        assert_eq!(
            index
                .list_hierarchy_nodes_from_root_to_the_node_including_self(0)
                .unwrap(),
            vec![7, 5, 0]
        );
        assert!(index.list_hierarchy_nodes_from_root_to_the_node(99).is_err());
    }

    #[test]
    fn path_of_orphan_is_empty() {
        // An orphan whose ancestors are indexed but detached has no path.
        let mut index = canonical();
        index.remove_node(8).unwrap();
        assert!(index.node(9).is_some());
        assert!(index.list_hierarchy_nodes_from_root_to_the_node(10).unwrap().is_empty());
        assert!(index
            .list_hierarchy_nodes_from_root_to_the_node_including_self(10)
            .unwrap()
            .is_empty());

        let mut visitor = Recorder::post_order();
        index.traverse_hierarchy_to_root(&mut visitor, 10).unwrap();
        assert!(visitor.ids.is_empty());
    }

    #[test]
    fn lists_nodes_including_parents() {
        let mut index = canonical();
        assert_eq!(
            index
                .list_nodes_including_parents(&Bitmap::from_values(&[12, 0]))
                .to_vec(),
            vec![0, 5, 6, 7, 8, 9, 12]
        );

        index.remove_node(8).unwrap();
        assert_eq!(
            index
                .list_nodes_including_parents(&Bitmap::from_values(&[10, 1, 50]))
                .to_vec(),
            vec![1, 3, 6, 10, 50]
        );
    }

    #[test]
    fn orphans_are_promoted_in_any_order() {
        let index = chain();
        assert_eq!(index.roots.to_vec(), vec![1]);
        assert_eq!(index.level_index.get(&1), Some(&vec![2]));
        assert_eq!(index.level_index.get(&2), Some(&vec![3]));
        assert!(index.orphans.is_empty());
        assert!(index.orphan_children.is_empty());
    }

    #[test]
    fn removal_cascades_into_orphans() {
        let mut index = chain();
        assert_eq!(index.remove_node(2).unwrap(), Some(1));

        assert!(index.item_index.contains_key(&3));
        assert!(!index.item_index.contains_key(&2));
        assert_eq!(index.orphans.to_vec(), vec![3]);
        assert!(!index.level_index.contains_key(&2));
        assert_eq!(index.level_index.get(&1), Some(&vec![]));
        index.verify().unwrap();

        index.add_node(2, Some(1)).unwrap();
        assert!(index.orphans.is_empty());
        assert_eq!(index.level_index.get(&1), Some(&vec![2]));
        assert_eq!(index.level_index.get(&2), Some(&vec![3]));
        index.verify().unwrap();
    }

    #[test]
    fn rejects_self_parent() {
        let mut index = chain();
        assert!(matches!(
            index.add_node(5, Some(5)),
            Err(CoreError::SelfReference { node: 5 })
        ));
        assert!(index.add_node(2, Some(2)).is_err());
        assert_eq!(index.get_parent_node(2).unwrap(), Some(1));
        index.verify().unwrap();
    }

    #[test]
    fn predicate_prunes_without_visiting_subtree() {
        let index = chain();
        let visited_three = AtomicBool::new(false);
        let predicate = FnPredicate::new(0, |id| {
            if id == 3 {
                visited_three.store(true, Ordering::SeqCst);
            }
            id != 2
        });
        assert!(index.list_hierarchy_nodes_from_parent(1, &predicate).is_empty());
        assert!(!visited_three.load(Ordering::SeqCst));
    }

    #[test]
    fn removes_missing_node_fails() {
        let mut index = chain();
        assert!(matches!(
            index.remove_node(42),
            Err(CoreError::NodeNotFound { node: 42 })
        ));
    }

    #[test]
    fn init_root_nodes_requires_empty_index() {
        let mut index = HierarchyIndex::new();
        index.init_root_nodes(&[2, 1]).unwrap();
        assert_eq!(index.get_root_hierarchy_nodes(&AcceptAll).to_vec(), vec![1, 2]);
        assert!(index.is_dirty());
        assert!(matches!(
            index.init_root_nodes(&[3]),
            Err(CoreError::IndexNotEmpty)
        ));
    }

    #[test]
    fn removing_everything_empties_the_index() {
        let mut index = canonical();
        for id in [9, 0, 6, 12, 3, 7, 1, 8, 2, 10, 4, 11, 5] {
            index.remove_node(id).unwrap();
            index.verify().unwrap();
        }
        assert!(index.is_hierarchy_index_empty());
        assert!(index.roots.is_empty());
        assert!(index.level_index.is_empty());
        assert!(index.orphans.is_empty());
        assert!(index.orphan_children.is_empty());
    }

    #[test]
    fn all_nodes_memo_follows_mutations() {
        let mut index = canonical();
        assert_eq!(index.get_all_hierarchy_nodes().len(), 13);
        assert!(index.all_nodes.get().is_some());

        index.add_node(40, Some(99)).unwrap();
        assert!(index.all_nodes.get().is_none());
        assert_eq!(index.get_all_hierarchy_nodes().len(), 13);

        index.add_node(99, Some(7)).unwrap();
        assert_eq!(index.get_all_hierarchy_nodes().len(), 15);
    }

    #[test]
    fn all_nodes_are_not_memoized_with_pending_changes() {
        let mut index = canonical();
        index.begin_layer();
        index.add_node(20, Some(6)).unwrap();
        assert_eq!(index.get_all_hierarchy_nodes().len(), 14);
        assert!(index.all_nodes.get().is_none());
    }

    #[test]
    fn formulas_match_eager_results() {
        let index = canonical();
        let predicate: SharedPredicate = Arc::new(exclude(&[9]));

        let formula = index.list_hierarchy_nodes_from_root_formula(Arc::clone(&predicate));
        assert_eq!(formula.compute(), &index.list_hierarchy_nodes_from_root(predicate.as_ref()));
        assert_eq!(
            formula.transactional_ids(),
            vec![index.roots.id(), index.level_index.id()]
        );

        let children = index.get_hierarchy_nodes_for_parent_formula(9, accept_all());
        assert_eq!(children.compute().to_vec(), vec![10, 11, 12]);

        let down_to = index
            .list_hierarchy_nodes_from_parent_down_to_formula(6, 0, accept_all())
            .unwrap();
        assert_eq!(down_to.compute().to_vec(), vec![3, 8]);
        assert!(index
            .list_hierarchy_nodes_from_parent_down_to_formula(99, 0, accept_all())
            .is_err());

        assert_eq!(index.get_all_hierarchy_nodes_formula().compute().len(), 13);
        assert_eq!(
            index.get_root_hierarchy_nodes_formula(accept_all()).compute().to_vec(),
            vec![6, 7]
        );
    }

    #[test]
    fn formula_hash_depends_on_query_and_predicate() {
        let index = canonical();
        let a = index.list_hierarchy_nodes_from_parent_formula(6, accept_all());
        let b = index.list_hierarchy_nodes_from_parent_formula(6, accept_all());
        let c = index.list_hierarchy_nodes_from_parent_formula(7, accept_all());
        let d = index.list_hierarchy_nodes_from_parent_formula(
            6,
            Arc::new(MatchNodeIds::new(Bitmap::from_values(&[6, 8]))),
        );
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
        assert_ne!(a.hash(), d.hash());
        assert_eq!(d.compute().to_vec(), vec![8]);
    }

    #[test]
    fn layer_is_isolated_until_merged() {
        let mut index = canonical();
        index.reset_dirty();
        let snapshot = index.clone();

        index.begin_layer();
        index.add_node(20, Some(12)).unwrap();
        index.remove_node(4).unwrap();
        assert!(index.has_pending_changes());
        assert_eq!(index.get_hierarchy_size(), 13);

        assert_eq!(snapshot.get_hierarchy_size(), 13);
        assert!(snapshot.node(20).is_none());
        assert!(!snapshot.is_dirty());

        let committed = index.create_copy_with_merged_changes();
        assert_ne!(committed.id(), snapshot.id());
        assert!(!committed.has_layer());
        assert!(committed.is_dirty());
        assert_eq!(committed.compute_level(20), Some(5));
        assert!(committed.node(4).is_none());
        committed.verify().unwrap();
        assert_eq!(snapshot.to_string(), canonical().to_string());
    }

    #[test]
    fn merge_without_changes_keeps_identity() {
        let mut index = canonical();
        index.begin_layer();
        let committed = index.create_copy_with_merged_changes();
        assert_eq!(committed.id(), index.id());
        assert_eq!(committed.roots.id(), index.roots.id());
    }

    #[test]
    fn rollback_discards_layer() {
        let mut index = canonical();
        index.begin_layer();
        index.add_node(6, Some(7)).unwrap();
        assert_eq!(index.get_root_hierarchy_nodes(&AcceptAll).to_vec(), vec![7]);

        index.remove_layer();
        assert_eq!(index.get_root_hierarchy_nodes(&AcceptAll).to_vec(), vec![6, 7]);
        assert_eq!(index.to_string(), canonical().to_string());
        index.verify().unwrap();
    }

    #[test]
    fn storage_part_round_trip_with_orphans() {
        let mut index = canonical();
        index.remove_node(8).unwrap();
        index.add_node(30, Some(20)).unwrap();

        let part = index.create_storage_part(4).unwrap();
        assert_eq!(part.index_key, 4);
        assert_eq!(part.orphans, vec![9, 10, 11, 12, 30]);

        let restored = HierarchyIndex::from_storage_part_with_config(
            &part,
            Config::new().verify_on_load(true),
        )
        .unwrap();
        assert!(!restored.is_dirty());
        assert_eq!(restored.to_string(), index.to_string());
        assert_eq!(
            restored.get_all_hierarchy_nodes(),
            index.get_all_hierarchy_nodes()
        );

        let mut restored = restored;
        restored.add_node(8, Some(6)).unwrap();
        assert_eq!(
            restored.list_hierarchy_nodes_from_parent(8, &AcceptAll).to_vec(),
            vec![9, 10, 11, 12]
        );
        restored.add_node(20, Some(12)).unwrap();
        assert!(restored.get_orphan_hierarchy_nodes().is_empty());
    }

    #[test]
    fn storage_part_requires_dirty_index() {
        let mut index = canonical();
        assert!(index.create_storage_part(1).is_some());
        index.reset_dirty();
        assert!(index.create_storage_part(1).is_none());
        index.add_node(13, None).unwrap();
        assert!(index.create_storage_part(1).is_some());
    }

    #[test]
    fn verification_rejects_inconsistent_part() {
        let mut part = canonical().create_storage_part(1).unwrap();
        part.orphans.push(3);
        assert!(HierarchyIndex::from_storage_part(&part).is_ok());
        assert!(matches!(
            HierarchyIndex::from_storage_part_with_config(&part, Config::new().verify_on_load(true)),
            Err(CoreError::InvalidFormat { .. })
        ));

        let mut part = canonical().create_storage_part(1).unwrap();
        part.orphans.push(77);
        assert!(HierarchyIndex::from_storage_part(&part).is_err());
    }

    fn part(
        roots: &[i32],
        level_index: &[(i32, &[i32])],
        item_index: &[(i32, Option<i32>)],
    ) -> HierarchyIndexStoragePart {
        HierarchyIndexStoragePart {
            index_key: 1,
            roots: roots.to_vec(),
            level_index: level_index
                .iter()
                .map(|(parent, children)| (*parent, children.to_vec()))
                .collect(),
            item_index: item_index.to_vec(),
            orphans: Vec::new(),
        }
    }

    fn assert_rejected(part: &HierarchyIndexStoragePart) {
        assert!(matches!(
            HierarchyIndex::from_storage_part(part),
            Err(CoreError::InvalidFormat { .. })
        ));
        assert!(matches!(
            HierarchyIndex::from_storage_part_with_config(part, Config::new().verify_on_load(true)),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn loading_rejects_cyclic_level_index() {
        assert_rejected(&part(
            &[1],
            &[(1, &[2]), (2, &[1])],
            &[(1, None), (2, Some(1))],
        ));
    }

    #[test]
    fn loading_rejects_detached_cycle() {
        assert_rejected(&part(
            &[1],
            &[(1, &[]), (2, &[3]), (3, &[2])],
            &[(1, None), (2, Some(3)), (3, Some(2))],
        ));
    }

    #[test]
    fn loading_rejects_child_listed_under_two_parents() {
        assert_rejected(&part(
            &[1, 2],
            &[(1, &[3]), (2, &[3]), (3, &[])],
            &[(1, None), (2, None), (3, Some(1))],
        ));
    }

    #[test]
    fn loading_rejects_unindexed_or_unlisted_nodes() {
        assert_rejected(&part(&[1], &[(1, &[2]), (2, &[])], &[(1, None)]));
        assert_rejected(&part(&[1], &[(1, &[2])], &[(1, None), (2, Some(1))]));
        assert_rejected(&part(&[1], &[(1, &[])], &[(1, Some(5))]));

        let loaded = HierarchyIndex::from_storage_part(&part(
            &[1],
            &[(1, &[2]), (2, &[])],
            &[(1, None), (2, Some(1))],
        ))
        .unwrap();
        assert_eq!(loaded.list_hierarchy_nodes_from_root(&AcceptAll).to_vec(), vec![1, 2]);
    }
}
