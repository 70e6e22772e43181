//! Sorted integer sets.

use roaring::RoaringBitmap;
use std::fmt;

const SIGN_FLIP: u32 = 0x8000_0000;

// Flipping the sign bit maps i32 onto u32 preserving order, so the roaring
// iteration order is the ascending i32 order.
fn encode(value: i32) -> u32 {
    (value as u32) ^ SIGN_FLIP
}

fn decode(value: u32) -> i32 {
    (value ^ SIGN_FLIP) as i32
}

/// Immutable ascending set of entity primary keys.
#[derive(Clone, Default, PartialEq)]
pub struct Bitmap {
    inner: RoaringBitmap,
}

impl Bitmap {
    /// Returns the empty bitmap.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a bitmap from values in any order; duplicates collapse.
    #[must_use]
    pub fn from_values(values: &[i32]) -> Self {
        values.iter().copied().collect()
    }

    /// Returns true if `value` is a member.
    #[must_use]
    pub fn contains(&self, value: i32) -> bool {
        self.inner.contains(encode(value))
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len() as usize
    }

    /// Returns true if the bitmap has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the union of both bitmaps.
    #[must_use]
    pub fn union(&self, other: &Bitmap) -> Bitmap {
        Self {
            inner: &self.inner | &other.inner,
        }
    }

    /// Returns members of `self` that are not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Bitmap) -> Bitmap {
        Self {
            inner: &self.inner - &other.inner,
        }
    }

    /// Returns members present in both bitmaps.
    #[must_use]
    pub fn intersection(&self, other: &Bitmap) -> Bitmap {
        Self {
            inner: &self.inner & &other.inner,
        }
    }

    /// Returns the smallest member.
    #[must_use]
    pub fn first(&self) -> Option<i32> {
        self.inner.min().map(decode)
    }

    /// Returns the largest member.
    #[must_use]
    pub fn last(&self) -> Option<i32> {
        self.inner.max().map(decode)
    }

    /// Iterates members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.inner.iter().map(decode)
    }

    /// Returns members in ascending order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<i32> {
        self.iter().collect()
    }
}

impl FromIterator<i32> for Bitmap {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().map(encode).collect(),
        }
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
