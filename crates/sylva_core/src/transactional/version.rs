//! Process-wide identity sequence for transactional structures.

use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Returns the next identity. Identities are monotonically increasing and
/// never reused within a process.
pub fn next_id() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}
