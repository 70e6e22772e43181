//! # Sylva Testkit
//!
//! Test utilities for Sylva.
//!
//! This crate provides:
//! - A naive reference model of the hierarchy used as a test oracle
//! - Property-based generators of trees and mutation sequences
//! - The canonical category tree and index builders
//!
//! ## Usage
//!
//! ```rust
//! use sylva_testkit::prelude::*;
//!
//! let index = canonical_index();
//! let model = ReferenceHierarchy::from_pairs(&CANONICAL_TREE);
//! assert_model_matches(&index, &model);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod model;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
}

pub use fixtures::*;
pub use generators::*;
pub use model::*;
