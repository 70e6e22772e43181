//! Error types for Sylva core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Sylva core operations.
///
/// Variants fall into two groups. Faults ([`CoreError::is_fault`]) mean the
/// caller broke a documented precondition or an internal premise no longer
/// holds; they must abort the enclosing mutation. The remaining variants
/// report I/O and format problems of persisted records.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node was declared to be its own parent.
    #[error("entity {node} cannot refer to itself in a hierarchy placement")]
    SelfReference {
        /// The offending node id.
        node: i32,
    },

    /// Root nodes can only be seeded into an empty index.
    #[error("hierarchy index is not empty, root nodes cannot be initialized")]
    IndexNotEmpty,

    /// The operation requires a node that is not present in the index.
    #[error("node `{node}` is not present in the hierarchy index")]
    NodeNotFound {
        /// The node id that was not found.
        node: i32,
    },

    /// Internal bookkeeping is inconsistent.
    #[error("premise violated: {message}")]
    PremiseViolated {
        /// Description of the broken premise.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Invalid persisted record format or version.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// CBOR encoding failed.
    #[error("codec error: {0}")]
    Encode(#[from] ciborium::ser::Error<io::Error>),

    /// CBOR decoding failed.
    #[error("codec error: {0}")]
    Decode(#[from] ciborium::de::Error<io::Error>),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a node not found error.
    pub fn node_not_found(node: i32) -> Self {
        Self::NodeNotFound { node }
    }

    /// Creates a premise violation error.
    pub fn premise_violated(message: impl Into<String>) -> Self {
        Self::PremiseViolated {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Returns true for precondition and premise faults.
    ///
    /// Faults are never retried; the mutation pipeline aborts the enclosing
    /// transaction when it receives one.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::SelfReference { .. }
                | Self::IndexNotEmpty
                | Self::NodeNotFound { .. }
                | Self::PremiseViolated { .. }
                | Self::InvalidOperation { .. }
        )
    }
}
