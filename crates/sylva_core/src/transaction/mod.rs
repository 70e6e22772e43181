//! Generation-based transactions over versioned structures.
//!
//! A single writer works on a private copy of the current generation with
//! transactional layers opened on all of its collections. Readers keep
//! whatever generation they obtained from [`TransactionManager::snapshot`];
//! commit publishes a merged generation atomically and never touches the one
//! readers hold.

mod manager;
mod state;

pub use manager::TransactionManager;
pub use state::{TransactionState, WriteTransaction};
