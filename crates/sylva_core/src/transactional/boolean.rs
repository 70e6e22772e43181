//! Transactional boolean flag.

use super::version::next_id;
use super::TransactionalLayerProducer;

/// Value recorded for a [`TransactionalBoolean`] inside a transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanChanges {
    value: Option<bool>,
}

/// Boolean flag with copy-on-write versioning.
#[derive(Debug, Clone)]
pub struct TransactionalBoolean {
    id: u64,
    value: bool,
    layer: Option<BooleanChanges>,
}

impl Default for TransactionalBoolean {
    fn default() -> Self {
        Self::new(false)
    }
}

impl TransactionalBoolean {
    /// Creates a flag with the given initial value.
    #[must_use]
    pub fn new(value: bool) -> Self {
        Self {
            id: next_id(),
            value,
            layer: None,
        }
    }

    /// Returns the current value.
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.layer
            .and_then(|layer| layer.value)
            .unwrap_or(self.value)
    }

    /// Sets the flag.
    pub fn set_to_true(&mut self) {
        self.set(true);
    }

    /// Clears the flag.
    pub fn reset(&mut self) {
        self.set(false);
    }

    fn set(&mut self, value: bool) {
        match &mut self.layer {
            Some(layer) => layer.value = Some(value),
            None => self.value = value,
        }
    }
}

impl TransactionalLayerProducer for TransactionalBoolean {
    fn id(&self) -> u64 {
        self.id
    }

    fn begin_layer(&mut self) {
        if self.layer.is_none() {
            self.layer = Some(BooleanChanges::default());
        }
    }

    fn has_layer(&self) -> bool {
        self.layer.is_some()
    }

    fn has_pending_changes(&self) -> bool {
        self.layer
            .and_then(|layer| layer.value)
            .is_some_and(|value| value != self.value)
    }

    fn create_copy_with_merged_changes(&self) -> Self {
        if self.has_pending_changes() {
            Self::new(self.is_true())
        } else {
            Self {
                id: self.id,
                value: self.value,
                layer: None,
            }
        }
    }

    fn remove_layer(&mut self) {
        self.layer = None;
    }
}
