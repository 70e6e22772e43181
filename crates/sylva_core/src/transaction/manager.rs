//! Transaction manager.

use crate::transaction::state::WriteTransaction;
use crate::transactional::TransactionalLayerProducer;
use crate::types::{SequenceNumber, TransactionId};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Publishes generations of a versioned structure.
///
/// The transaction manager provides:
/// - Single-writer concurrency control via `begin_write()`
/// - Snapshot isolation for readers via `snapshot()`
/// - Commit ordering via sequence numbers
///
/// ## Single-Writer Guarantee
///
/// Only one write transaction can be active at a time. `begin_write()`
/// acquires an exclusive lock that is held for the transaction's lifetime.
///
/// # Example
///
/// ```rust
/// use sylva_core::{AcceptAll, HierarchyIndex, TransactionManager};
///
/// let manager = TransactionManager::new(HierarchyIndex::new());
/// let before = manager.snapshot();
///
/// let mut txn = manager.begin_write();
/// txn.add_node(1, None).unwrap();
/// txn.commit().unwrap();
///
/// assert!(before.is_hierarchy_index_empty());
/// assert_eq!(manager.snapshot().get_hierarchy_size(), 1);
/// ```
pub struct TransactionManager<T> {
    /// Current committed generation.
    current: RwLock<Arc<T>>,
    /// Next transaction ID.
    next_txid: AtomicU64,
    /// Next sequence number.
    next_seq: AtomicU64,
    /// Sequence of the current generation.
    committed_seq: AtomicU64,
    /// Write lock - only one writer at a time.
    write_lock: Mutex<()>,
}

impl<T> TransactionManager<T>
where
    T: TransactionalLayerProducer + Clone,
{
    /// Creates a manager publishing `initial` as generation zero.
    pub fn new(initial: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            next_txid: AtomicU64::new(1),
            next_seq: AtomicU64::new(1),
            committed_seq: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the current generation.
    ///
    /// The returned handle keeps observing this generation regardless of
    /// later commits.
    pub fn snapshot(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Returns the sequence number of the current generation.
    pub fn committed_seq(&self) -> SequenceNumber {
        SequenceNumber::new(self.committed_seq.load(Ordering::SeqCst))
    }

    /// Begins a write transaction.
    ///
    /// This blocks while another write transaction is alive. The lock is
    /// released when the transaction is committed, rolled back or dropped.
    pub fn begin_write(&self) -> WriteTransaction<'_, T> {
        let guard = self.write_lock.lock();
        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        let mut working = T::clone(&self.snapshot());
        working.begin_layer();
        debug!(%txid, "write transaction started");
        WriteTransaction::new(self, txid, working, guard)
    }

    /// Replaces the current generation. The caller holds the write lock.
    pub(crate) fn publish(&self, generation: T) -> SequenceNumber {
        let sequence = SequenceNumber::new(self.next_seq.fetch_add(1, Ordering::SeqCst));
        *self.current.write() = Arc::new(generation);
        self.committed_seq.store(sequence.as_u64(), Ordering::SeqCst);
        sequence
    }
}
