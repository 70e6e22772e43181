//! Versioned primitive collections.
//!
//! Every collection here keeps an immutable, reference-counted base and an
//! optional transaction-local layer:
//!
//! - **Without a layer** mutations are applied to the base directly. The base
//!   is copied first if any other handle (a reader's snapshot) still shares it,
//!   so published generations are never modified in place.
//! - **With a layer** mutations are recorded as a diff against the base and
//!   reads merge the two views. The layer becomes visible to others only when
//!   [`TransactionalLayerProducer::create_copy_with_merged_changes`] produces
//!   a new generation.
//!
//! The presence of a layer is the "transaction available" oracle consulted
//! by higher-level structures. Collections know nothing about the domain
//! invariants of the structures built on top of them.

mod boolean;
mod int_array;
mod map;
mod version;

pub use boolean::{BooleanChanges, TransactionalBoolean};
pub use int_array::{IntArrayChanges, IntArrayIter, TransactionalIntArray};
pub use map::{MapChanges, TransactionalMap};
pub use version::next_id;

/// A structure that can record mutations into a transaction-local layer and
/// later produce an independent copy with those changes merged in.
pub trait TransactionalLayerProducer: Sized {
    /// Returns the identity of this generation.
    ///
    /// The id is stable until a new committed copy is produced. It is a cache
    /// key only and carries no correctness meaning.
    fn id(&self) -> u64;

    /// Opens a transaction-local layer. Does nothing if one is already open.
    fn begin_layer(&mut self);

    /// Returns true if a transaction-local layer is open.
    fn has_layer(&self) -> bool;

    /// Returns true if the open layer recorded any change.
    fn has_pending_changes(&self) -> bool;

    /// Produces the committed state.
    ///
    /// Returns a handle of the same generation (same id, shared base) when
    /// there is nothing to merge, otherwise a brand-new collection backed by
    /// freshly allocated storage. `self` is never modified.
    fn create_copy_with_merged_changes(&self) -> Self;

    /// Discards the transaction-local layer without committing it.
    fn remove_layer(&mut self);
}
