//! Tag Tree: inverted index from labels to postings
//!
//! Maintains, per label name:
//!
//! - `value -> Postings`: every TSID carrying `(name, value)`
//! - a name union: every TSID carrying `name` under any value
//!
//! Values are kept in a `BTreeMap`, so enumeration is lexicographic and
//! deterministic. Names are spread over lock stripes by hash; all state for
//! one name lives in a single stripe, so a value's postings and the name
//! union are always updated under the same write lock.
//!
//! ```text
//! stripe[hash(name) & mask]
//!   └── name ──┬── union: {1, 2, 7}
//!              └── values (sorted)
//!                    ├── "dev"  → {2}
//!                    └── "prod" → {1, 7}
//! ```
//!
//! # Example
//!
//! ```rust
//! use tagtree::index::TagTree;
//!
//! let tree = TagTree::new(16);
//! tree.insert("env", "prod", 1);
//! tree.insert("env", "dev", 2);
//!
//! assert_eq!(tree.lookup_eql("env", "prod").to_tsids(), vec![1]);
//! assert_eq!(tree.name_union("env").to_tsids(), vec![1, 2]);
//! assert_eq!(tree.enumerate_values("env"), vec!["dev", "prod"]);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::postings::Postings;
use crate::labels::LabelSet;
use crate::types::Tsid;

/// Postings for every value of one label name
#[derive(Debug, Default)]
struct NameEntry {
    /// Value -> postings, lexicographic
    values: BTreeMap<String, Postings>,

    /// Union of all value postings
    union: Postings,
}

impl NameEntry {
    /// Union of postings for values accepted by `pred`
    fn union_where<F>(&self, pred: F) -> Postings
    where
        F: Fn(&str) -> bool,
    {
        let mut result = Postings::new();
        for (value, postings) in &self.values {
            if pred(value) {
                result.or_inplace(postings);
            }
        }
        result
    }
}

/// One lock stripe of the tag tree
#[derive(Debug, Default)]
struct Stripe {
    names: RwLock<HashMap<String, NameEntry>>,
}

/// Statistics for the tag tree
#[derive(Debug, Default)]
pub struct TagTreeStats {
    /// Distinct `(name, value)` pairs
    pub postings_entries: AtomicU64,

    /// Distinct label names
    pub names: AtomicU64,

    /// Insertions that added a new TSID to a postings set
    pub insertions: AtomicU64,
}

/// Inverted index from `(name, value)` to postings
#[derive(Debug)]
pub struct TagTree {
    stripes: Box<[Stripe]>,
    mask: usize,
    stats: TagTreeStats,
}

impl TagTree {
    /// Create a tag tree with `stripes` lock stripes (rounded up to a power of two)
    pub fn new(stripes: usize) -> Self {
        let count = stripes.max(1).next_power_of_two();
        Self {
            stripes: (0..count).map(|_| Stripe::default()).collect(),
            mask: count - 1,
            stats: TagTreeStats::default(),
        }
    }

    /// Number of lock stripes
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe(&self, name: &str) -> &Stripe {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) & self.mask]
    }

    /// Add `tsid` to the postings of `(name, value)` and to the name union
    ///
    /// Idempotent: returns `false` if the TSID was already present.
    pub fn insert(&self, name: &str, value: &str, tsid: Tsid) -> bool {
        let mut names = self.stripe(name).names.write();

        let entry = names.entry(name.to_string()).or_insert_with(|| {
            self.stats.names.fetch_add(1, Ordering::Relaxed);
            NameEntry::default()
        });

        let postings = entry.values.entry(value.to_string()).or_insert_with(|| {
            self.stats.postings_entries.fetch_add(1, Ordering::Relaxed);
            Postings::new()
        });

        let added = postings.insert(tsid);
        entry.union.insert(tsid);

        if added {
            self.stats.insertions.fetch_add(1, Ordering::Relaxed);
        }
        added
    }

    /// Insert postings for every label of a series
    pub fn insert_series(&self, tsid: Tsid, labels: &LabelSet) {
        for label in labels {
            self.insert(&label.name, &label.value, tsid);
        }
    }

    /// Postings for `(name, value)`, empty if never observed
    pub fn lookup_eql(&self, name: &str, value: &str) -> Postings {
        self.with_postings(name, value, Postings::clone)
            .unwrap_or_default()
    }

    /// Run `f` against the postings of `(name, value)` without cloning
    pub fn with_postings<F, R>(&self, name: &str, value: &str, f: F) -> Option<R>
    where
        F: FnOnce(&Postings) -> R,
    {
        self.stripe(name)
            .names
            .read()
            .get(name)
            .and_then(|entry| entry.values.get(value))
            .map(f)
    }

    /// Distinct values observed for `name`, in lexicographic order
    pub fn enumerate_values(&self, name: &str) -> Vec<String> {
        self.stripe(name)
            .names
            .read()
            .get(name)
            .map(|entry| entry.values.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every TSID carrying `name` under any value
    pub fn name_union(&self, name: &str) -> Postings {
        self.stripe(name)
            .names
            .read()
            .get(name)
            .map(|entry| entry.union.clone())
            .unwrap_or_default()
    }

    /// Union of postings for the values of `name` accepted by `pred`
    ///
    /// Values are visited in lexicographic order under one read lock.
    pub fn union_where<F>(&self, name: &str, pred: F) -> Postings
    where
        F: Fn(&str) -> bool,
    {
        self.stripe(name)
            .names
            .read()
            .get(name)
            .map(|entry| entry.union_where(pred))
            .unwrap_or_default()
    }

    /// Name union minus the postings of values accepted by `pred`
    ///
    /// Computed under one read lock so the union and the excluded postings
    /// come from the same state.
    pub fn name_union_excluding<F>(&self, name: &str, pred: F) -> Postings
    where
        F: Fn(&str) -> bool,
    {
        self.stripe(name)
            .names
            .read()
            .get(name)
            .map(|entry| entry.union.and_not(&entry.union_where(pred)))
            .unwrap_or_default()
    }

    /// Name union minus the postings of exactly `value`
    pub fn name_union_without(&self, name: &str, value: &str) -> Postings {
        self.stripe(name)
            .names
            .read()
            .get(name)
            .map(|entry| match entry.values.get(value) {
                Some(excluded) => entry.union.and_not(excluded),
                None => entry.union.clone(),
            })
            .unwrap_or_default()
    }

    /// All label names observed, sorted
    pub fn label_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .stripes
            .iter()
            .flat_map(|stripe| stripe.names.read().keys().cloned().collect::<Vec<_>>())
            .collect();
        names.sort();
        names
    }

    /// Number of distinct `(name, value)` pairs
    pub fn postings_count(&self) -> u64 {
        self.stats.postings_entries.load(Ordering::Relaxed)
    }

    /// Number of distinct label names
    pub fn name_count(&self) -> u64 {
        self.stats.names.load(Ordering::Relaxed)
    }

    /// Insertions that added a new TSID to a postings set
    pub fn insertion_count(&self) -> u64 {
        self.stats.insertions.load(Ordering::Relaxed)
    }

    /// Approximate size of the tree in bytes
    ///
    /// Counts name and value bytes plus the serialized size of every posting
    /// list. Allocator and map overhead is not included.
    pub fn approximate_bytes(&self) -> usize {
        self.stripes
            .iter()
            .map(|stripe| {
                stripe
                    .names
                    .read()
                    .iter()
                    .map(|(name, entry)| {
                        let values: usize = entry
                            .values
                            .iter()
                            .map(|(value, postings)| value.len() + postings.serialized_bytes())
                            .sum();
                        name.len() + entry.union.serialized_bytes() + values
                    })
                    .sum::<usize>()
            })
            .sum()
    }
}

impl Default for TagTree {
    fn default() -> Self {
        Self::new(16)
    }
}
