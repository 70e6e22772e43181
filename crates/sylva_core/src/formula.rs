//! Lazy bitmap formulas.
//!
//! Query planning composes formulas into boolean expressions over bitmaps and
//! evaluates them only when the result is needed. Each formula exposes the
//! identities of the transactional structures it reads from, so an external
//! cache can tell whether a previously computed result is still current
//! without evaluating the formula again.
//!
//! This module is the boundary the hierarchy index feeds into, not a full
//! query algebra.

use crate::bitmap::Bitmap;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::sync::OnceLock;

/// A lazily evaluated bitmap expression.
pub trait Formula: Send + Sync {
    /// Evaluates the formula. The result is computed at most once.
    fn compute(&self) -> &Bitmap;

    /// Identities of the transactional structures the result depends on.
    fn transactional_ids(&self) -> Vec<u64>;

    /// Structural hash of the formula, including its parameters.
    fn hash(&self) -> u64;
}

/// Deferred producer of a bitmap, wrapped by [`DeferredFormula`].
pub trait BitmapSupplier: Send + Sync {
    /// Computes the bitmap.
    fn get(&self) -> Bitmap;

    /// Identities of the transactional structures the result depends on.
    fn transactional_ids(&self) -> Vec<u64>;

    /// Hash of the supplier kind and its parameters.
    fn hash(&self) -> u64;
}

/// Formula that defers to a [`BitmapSupplier`] and memoizes its result.
pub struct DeferredFormula<S> {
    supplier: S,
    memoized: OnceLock<Bitmap>,
}

impl<S: BitmapSupplier> DeferredFormula<S> {
    /// Wraps a supplier. Nothing is computed until [`Formula::compute`].
    pub fn new(supplier: S) -> Self {
        Self {
            supplier,
            memoized: OnceLock::new(),
        }
    }

    /// Returns the wrapped supplier.
    pub fn supplier(&self) -> &S {
        &self.supplier
    }

    /// Returns true once the result has been computed.
    pub fn is_computed(&self) -> bool {
        self.memoized.get().is_some()
    }
}

impl<S: BitmapSupplier> Formula for DeferredFormula<S> {
    fn compute(&self) -> &Bitmap {
        self.memoized.get_or_init(|| self.supplier.get())
    }

    fn transactional_ids(&self) -> Vec<u64> {
        self.supplier.transactional_ids()
    }

    fn hash(&self) -> u64 {
        self.supplier.hash()
    }
}

/// Formula over an already materialized bitmap.
pub struct ConstantFormula {
    bitmap: Bitmap,
}

impl ConstantFormula {
    /// Wraps a bitmap.
    pub fn new(bitmap: Bitmap) -> Self {
        Self { bitmap }
    }

    /// Formula producing the empty set.
    pub fn empty() -> Self {
        Self::new(Bitmap::empty())
    }
}

impl Formula for ConstantFormula {
    fn compute(&self) -> &Bitmap {
        &self.bitmap
    }

    fn transactional_ids(&self) -> Vec<u64> {
        Vec::new()
    }

    fn hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        hasher.write(b"constant");
        for value in self.bitmap.iter() {
            hasher.write_i32(value);
        }
        hasher.finish()
    }
}

#[derive(Clone, Copy)]
enum Junction {
    Or,
    And,
}

/// Union or intersection of several formulas.
pub struct JunctionFormula<'a> {
    junction: Junction,
    inner: Vec<Box<dyn Formula + 'a>>,
    memoized: OnceLock<Bitmap>,
}

impl<'a> JunctionFormula<'a> {
    /// Union of all inner formulas.
    pub fn or(inner: Vec<Box<dyn Formula + 'a>>) -> Self {
        Self {
            junction: Junction::Or,
            inner,
            memoized: OnceLock::new(),
        }
    }

    /// Intersection of all inner formulas. Empty when there are none.
    pub fn and(inner: Vec<Box<dyn Formula + 'a>>) -> Self {
        Self {
            junction: Junction::And,
            inner,
            memoized: OnceLock::new(),
        }
    }
}

impl Formula for JunctionFormula<'_> {
    fn compute(&self) -> &Bitmap {
        self.memoized.get_or_init(|| {
            let mut results = self.inner.iter().map(|formula| formula.compute());
            let Some(first) = results.next() else {
                return Bitmap::empty();
            };
            results.fold(first.clone(), |acc, next| match self.junction {
                Junction::Or => acc.union(next),
                Junction::And => acc.intersection(next),
            })
        })
    }

    fn transactional_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .inner
            .iter()
            .flat_map(|formula| formula.transactional_ids())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn hash(&self) -> u64 {
        let mut inner: Vec<u64> = self.inner.iter().map(|formula| formula.hash()).collect();
        inner.sort_unstable();
        let mut hasher = DefaultHasher::new();
        hasher.write(match self.junction {
            Junction::Or => b"or",
            Junction::And => b"and",
        });
        for hash in inner {
            hasher.write_u64(hash);
        }
        hasher.finish()
    }
}

/// Members of `superset` that are not produced by `subtracted`.
pub struct NotFormula<'a> {
    subtracted: Box<dyn Formula + 'a>,
    superset: Box<dyn Formula + 'a>,
    memoized: OnceLock<Bitmap>,
}

impl<'a> NotFormula<'a> {
    /// Creates `superset \ subtracted`.
    pub fn new(subtracted: Box<dyn Formula + 'a>, superset: Box<dyn Formula + 'a>) -> Self {
        Self {
            subtracted,
            superset,
            memoized: OnceLock::new(),
        }
    }
}

impl Formula for NotFormula<'_> {
    fn compute(&self) -> &Bitmap {
        self.memoized
            .get_or_init(|| self.superset.compute().difference(self.subtracted.compute()))
    }

    fn transactional_ids(&self) -> Vec<u64> {
        let mut ids = self.superset.transactional_ids();
        ids.extend(self.subtracted.transactional_ids());
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        hasher.write(b"not");
        hasher.write_u64(self.subtracted.hash());
        hasher.write_u64(self.superset.hash());
        hasher.finish()
    }
}
