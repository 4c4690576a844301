//! Postings sets
//!
//! A [`Postings`] is the set of TSIDs satisfying one predicate. It wraps a
//! roaring treemap so that union, intersection and difference run in time
//! roughly linear in the smaller operand, and iteration is always ascending.
//!
//! # Example
//!
//! ```rust
//! use tagtree::index::Postings;
//!
//! let a: Postings = [1, 2, 3].into_iter().collect();
//! let b: Postings = [2, 3, 4].into_iter().collect();
//!
//! assert_eq!(a.and(&b).to_tsids(), vec![2, 3]);
//! assert_eq!(a.or(&b).to_tsids(), vec![1, 2, 3, 4]);
//! assert_eq!(a.and_not(&b).to_tsids(), vec![1]);
//! ```

use roaring::RoaringTreemap;

use crate::types::Tsid;

/// Sorted set of TSIDs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Postings {
    bitmap: RoaringTreemap,
}

impl Postings {
    /// Create an empty postings set
    pub fn new() -> Self {
        Self {
            bitmap: RoaringTreemap::new(),
        }
    }

    /// Add a TSID, returning `true` if it was not already present
    pub fn insert(&mut self, tsid: Tsid) -> bool {
        self.bitmap.insert(tsid)
    }

    /// Check membership
    pub fn contains(&self, tsid: Tsid) -> bool {
        self.bitmap.contains(tsid)
    }

    /// Number of TSIDs in the set
    pub fn cardinality(&self) -> u64 {
        self.bitmap.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    /// Largest TSID in the set
    pub fn max(&self) -> Option<Tsid> {
        self.bitmap.max()
    }

    /// Intersection
    #[must_use]
    pub fn and(&self, other: &Postings) -> Postings {
        Postings {
            bitmap: &self.bitmap & &other.bitmap,
        }
    }

    /// Union
    #[must_use]
    pub fn or(&self, other: &Postings) -> Postings {
        Postings {
            bitmap: &self.bitmap | &other.bitmap,
        }
    }

    /// Difference (`self AND NOT other`)
    #[must_use]
    pub fn and_not(&self, other: &Postings) -> Postings {
        Postings {
            bitmap: &self.bitmap - &other.bitmap,
        }
    }

    /// In-place intersection
    pub fn and_inplace(&mut self, other: &Postings) {
        self.bitmap &= &other.bitmap;
    }

    /// In-place union
    pub fn or_inplace(&mut self, other: &Postings) {
        self.bitmap |= &other.bitmap;
    }

    /// In-place difference
    pub fn and_not_inplace(&mut self, other: &Postings) {
        self.bitmap -= &other.bitmap;
    }

    /// Iterate over TSIDs in ascending order
    pub fn iter(&self) -> impl Iterator<Item = Tsid> + '_ {
        self.bitmap.iter()
    }

    /// Collect TSIDs into an ascending vector
    pub fn to_tsids(&self) -> Vec<Tsid> {
        self.bitmap.iter().collect()
    }

    /// Size of the portable roaring encoding in bytes
    ///
    /// This is the on-disk size, not the heap footprint of the in-memory
    /// bitmap.
    pub fn serialized_bytes(&self) -> usize {
        self.bitmap.serialized_size()
    }
}

impl FromIterator<Tsid> for Postings {
    fn from_iter<I: IntoIterator<Item = Tsid>>(iter: I) -> Self {
        Postings {
            bitmap: iter.into_iter().collect(),
        }
    }
}

impl Extend<Tsid> for Postings {
    fn extend<I: IntoIterator<Item = Tsid>>(&mut self, iter: I) {
        self.bitmap.extend(iter);
    }
}
