//! Write transaction state.

use crate::error::{CoreError, CoreResult};
use crate::transaction::manager::TransactionManager;
use crate::transactional::TransactionalLayerProducer;
use crate::types::{SequenceNumber, TransactionId};
use parking_lot::MutexGuard;
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// A write transaction holding the exclusive write lock.
///
/// Dereferences to the working copy; every mutation is recorded in the
/// transactional layers of its collections. The lock is released when the
/// transaction is dropped, and an uncommitted transaction is rolled back then.
pub struct WriteTransaction<'a, T>
where
    T: TransactionalLayerProducer + Clone,
{
    manager: &'a TransactionManager<T>,
    id: TransactionId,
    working: T,
    state: TransactionState,
    /// Write lock guard - released on drop.
    _guard: MutexGuard<'a, ()>,
}

impl<'a, T> WriteTransaction<'a, T>
where
    T: TransactionalLayerProducer + Clone,
{
    pub(crate) fn new(
        manager: &'a TransactionManager<T>,
        id: TransactionId,
        working: T,
        guard: MutexGuard<'a, ()>,
    ) -> Self {
        Self {
            manager,
            id,
            working,
            state: TransactionState::Active,
            _guard: guard,
        }
    }

    /// Returns the transaction ID.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the transaction state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns true if the transaction can still be committed.
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Merges the recorded changes into a new generation and publishes it.
    ///
    /// When nothing changed the published generation shares all storage with
    /// the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the transaction is no
    /// longer active.
    pub fn commit(&mut self) -> CoreResult<SequenceNumber> {
        if !self.is_active() {
            return Err(CoreError::invalid_operation("transaction not active"));
        }
        let merged = self.working.create_copy_with_merged_changes();
        let sequence = self.manager.publish(merged);
        self.state = TransactionState::Committed;
        debug!(txid = %self.id, %sequence, "write transaction committed");
        Ok(sequence)
    }

    /// Discards the recorded changes.
    pub fn rollback(&mut self) {
        if self.is_active() {
            self.working.remove_layer();
            self.state = TransactionState::Aborted;
            debug!(txid = %self.id, "write transaction rolled back");
        }
    }
}

impl<T> Deref for WriteTransaction<'_, T>
where
    T: TransactionalLayerProducer + Clone,
{
    type Target = T;

    fn deref(&self) -> &T {
        &self.working
    }
}

impl<T> DerefMut for WriteTransaction<'_, T>
where
    T: TransactionalLayerProducer + Clone,
{
    fn deref_mut(&mut self) -> &mut T {
        &mut self.working
    }
}

impl<T> Drop for WriteTransaction<'_, T>
where
    T: TransactionalLayerProducer + Clone,
{
    fn drop(&mut self) {
        self.rollback();
    }
}
