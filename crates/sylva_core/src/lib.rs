//! # Sylva Core
//!
//! Transactional hierarchy index for the Sylva document engine.
//!
//! This crate provides:
//! - [`HierarchyIndex`]: a parent/child tree over entity primary keys that
//!   tolerates nodes arriving before their parents
//! - Listings, counts and traversals pruned by [`HierarchyFilteringPredicate`]s
//! - Lazy [`Formula`]s whose results can be cached by the identities of the
//!   structures they read
//! - Copy-on-write [`transactional`] collections and a single-writer
//!   [`TransactionManager`] with snapshot isolation for readers
//! - A binary storage part for persisting the index
//!
//! ## Usage
//!
//! ```rust
//! use sylva_core::{AcceptAll, HierarchyIndex};
//!
//! let mut index = HierarchyIndex::new();
//! index.add_node(1, None)?;
//! index.add_node(3, Some(2))?;
//! assert_eq!(index.get_orphan_hierarchy_nodes().to_vec(), vec![3]);
//!
//! index.add_node(2, Some(1))?;
//! assert_eq!(
//!     index.list_hierarchy_nodes_from_root(&AcceptAll).to_vec(),
//!     vec![1, 2, 3]
//! );
//! # Ok::<(), sylva_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bitmap;
mod config;
mod error;
pub mod formula;
mod hierarchy;
mod storage;
mod transaction;
pub mod transactional;
mod types;

pub use bitmap::Bitmap;
pub use config::{Config, STORAGE_FORMAT_VERSION};
pub use error::{CoreError, CoreResult};
pub use formula::{
    BitmapSupplier, ConstantFormula, DeferredFormula, Formula, JunctionFormula, NotFormula,
};
pub use hierarchy::predicate;
pub use hierarchy::{
    accept_all, AcceptAll, ChildrenTraverser, ExcludeNodeIds, FnPredicate,
    HierarchyBitmapSupplier, HierarchyFilteringPredicate, HierarchyFormula, HierarchyIndex,
    HierarchyNode, HierarchyVisitor, MatchNodeIds, SharedPredicate,
};
pub use storage::HierarchyIndexStoragePart;
pub use transaction::{TransactionManager, TransactionState, WriteTransaction};
pub use transactional::{
    TransactionalBoolean, TransactionalIntArray, TransactionalLayerProducer, TransactionalMap,
};
pub use types::{SequenceNumber, TransactionId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
