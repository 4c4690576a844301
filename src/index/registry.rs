//! Series Registry
//!
//! Owns the mapping between label sets and TSIDs, and each series'
//! activity interval.
//!
//! ```text
//! ┌──────────────────────┐     ┌────────────┐     ┌───────────────────────┐
//! │ LabelSet (sorted)    │────▶│ key stripe │────▶│ Tsid                  │
//! │ {env="prod",job=api} │     │ fp & mask  │     │ 7                     │
//! └──────────────────────┘     └────────────┘     └───────────────────────┘
//!                                                   │
//!                                  records: Tsid ──▶ SeriesRecord {labels, [min, max]}
//! ```
//!
//! # Registration
//!
//! Registration takes the key stripe's read lock first and returns early for
//! known series. New series take the stripe's write lock and re-check before
//! allocating, so racing registrations of the same label set always agree on
//! one TSID while unrelated label sets in other stripes proceed in parallel.
//!
//! A new TSID becomes visible in this order:
//!
//! 1. the series record is stored
//! 2. postings are inserted into the tag tree for every label
//! 3. the TSID joins the published set
//! 4. the label-set key is inserted, making the series visible to lookups
//!
//! Readers intersect every result with the published set, so a TSID whose
//! postings are still being written is never returned.
//!
//! # Lock order
//!
//! key stripe → tag tree stripe → published set. Readers never hold more
//! than one of these at a time. Import takes every key stripe, in index
//! order, before touching the rest.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::postings::Postings;
use super::tag_tree::TagTree;
use crate::error::{Error, Result};
use crate::labels::LabelSet;
use crate::types::{ActivityInterval, Tsid, INVALID_TSID};

/// Restore progress is logged once per this many series
const RESTORE_LOG_BATCH: usize = 10_000;

// ============================================================================
// Series Record
// ============================================================================

/// A registered series
///
/// The label set is immutable. The activity interval only ever widens.
#[derive(Debug)]
pub struct SeriesRecord {
    tsid: Tsid,
    labels: LabelSet,
    min_ts: AtomicI64,
    max_ts: AtomicI64,
}

impl SeriesRecord {
    fn new(tsid: Tsid, labels: LabelSet, interval: ActivityInterval) -> Self {
        Self {
            tsid,
            labels,
            min_ts: AtomicI64::new(interval.min_ts),
            max_ts: AtomicI64::new(interval.max_ts),
        }
    }

    /// The series identifier
    pub fn tsid(&self) -> Tsid {
        self.tsid
    }

    /// The series label set
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Current activity interval
    pub fn interval(&self) -> ActivityInterval {
        ActivityInterval {
            min_ts: self.min_ts.load(Ordering::Acquire),
            max_ts: self.max_ts.load(Ordering::Acquire),
        }
    }

    /// Widen the activity interval to include `timestamp`
    pub fn extend(&self, timestamp: i64) {
        self.min_ts.fetch_min(timestamp, Ordering::AcqRel);
        self.max_ts.fetch_max(timestamp, Ordering::AcqRel);
    }

    /// Serializable copy of this record
    pub fn to_snapshot(&self) -> SeriesSnapshot {
        let interval = self.interval();
        SeriesSnapshot {
            tsid: self.tsid,
            labels: self.labels.clone(),
            min_ts: interval.min_ts,
            max_ts: interval.max_ts,
        }
    }
}

/// Serializable series entry for persistence collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    /// The series identifier
    pub tsid: Tsid,

    /// The series label set
    pub labels: LabelSet,

    /// Earliest registered timestamp
    pub min_ts: i64,

    /// Latest registered timestamp
    pub max_ts: i64,
}

impl SeriesSnapshot {
    /// Activity interval of this entry
    pub fn interval(&self) -> ActivityInterval {
        ActivityInterval {
            min_ts: self.min_ts,
            max_ts: self.max_ts,
        }
    }
}

// ============================================================================
// Series Registry
// ============================================================================

/// Label set ↔ TSID registry
#[derive(Debug)]
pub struct SeriesRegistry {
    /// Label set → TSID, striped by fingerprint
    stripes: Box<[RwLock<HashMap<LabelSet, Tsid>>]>,
    mask: usize,

    /// TSID → record
    records: DashMap<Tsid, Arc<SeriesRecord>>,

    /// TSIDs whose postings are fully written
    published: RwLock<Postings>,

    /// Next TSID to allocate
    next_tsid: AtomicU64,

    /// Allocated series, including ones not yet published
    series_count: AtomicUsize,

    /// Series limit, 0 for unlimited
    max_series: usize,
}

impl SeriesRegistry {
    /// Create a registry with `stripes` key stripes (rounded up to a power of two)
    pub fn new(stripes: usize, max_series: usize) -> Self {
        let count = stripes.max(1).next_power_of_two();
        Self {
            stripes: (0..count).map(|_| RwLock::new(HashMap::new())).collect(),
            mask: count - 1,
            records: DashMap::new(),
            published: RwLock::new(Postings::new()),
            next_tsid: AtomicU64::new(1),
            series_count: AtomicUsize::new(0),
            max_series,
        }
    }

    fn stripe_index(&self, labels: &LabelSet) -> usize {
        (labels.fingerprint() as usize) & self.mask
    }

    fn stripe(&self, labels: &LabelSet) -> &RwLock<HashMap<LabelSet, Tsid>> {
        &self.stripes[self.stripe_index(labels)]
    }

    /// Register a series observed at `timestamp`
    ///
    /// Returns the TSID and whether it was newly allocated. New series have
    /// their postings published into `tags` before the TSID becomes visible.
    pub fn register(
        &self,
        timestamp: i64,
        labels: &LabelSet,
        tags: &TagTree,
    ) -> Result<(Tsid, bool)> {
        let stripe = self.stripe(labels);

        // Fast path: already registered
        let existing = stripe.read().get(labels).copied();
        if let Some(tsid) = existing {
            self.extend(tsid, timestamp)?;
            return Ok((tsid, false));
        }

        // Slow path: allocate under the stripe's write lock
        let mut keys = stripe.write();

        // Double-check after acquiring write lock
        if let Some(&tsid) = keys.get(labels) {
            drop(keys);
            self.extend(tsid, timestamp)?;
            return Ok((tsid, false));
        }

        self.reserve_slot()?;

        let tsid = match self.allocate_tsid() {
            Ok(tsid) => tsid,
            Err(e) => {
                self.series_count.fetch_sub(1, Ordering::AcqRel);
                return Err(e);
            },
        };
        let record = SeriesRecord::new(tsid, labels.clone(), ActivityInterval::at(timestamp));
        self.records.insert(tsid, Arc::new(record));

        tags.insert_series(tsid, labels);
        self.published.write().insert(tsid);
        keys.insert(labels.clone(), tsid);

        tracing::debug!(tsid, labels = labels.len(), timestamp, "Registered new series");

        Ok((tsid, true))
    }

    fn extend(&self, tsid: Tsid, timestamp: i64) -> Result<()> {
        match self.records.get(&tsid) {
            Some(record) => {
                record.extend(timestamp);
                Ok(())
            },
            None => Err(Error::Internal(format!(
                "tsid {} is keyed but has no series record",
                tsid
            ))),
        }
    }

    /// Next unused TSID; fails once the counter has no successor left
    fn allocate_tsid(&self) -> Result<Tsid> {
        self.next_tsid
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| next.checked_add(1))
            .map_err(|next| {
                tracing::warn!(next_tsid = next, "TSID space exhausted, rejecting registration");
                Error::Internal("tsid space exhausted".to_string())
            })
    }

    fn reserve_slot(&self) -> Result<()> {
        if self.max_series == 0 {
            self.series_count.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        self.series_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < self.max_series).then_some(count + 1)
            })
            .map(|_| ())
            .map_err(|count| {
                tracing::warn!(
                    series = count,
                    limit = self.max_series,
                    "Series limit reached, rejecting registration"
                );
                Error::CapacityExceeded {
                    limit: self.max_series,
                }
            })
    }

    /// Find the TSID of an already registered label set; never allocates
    pub fn lookup(&self, labels: &LabelSet) -> Option<Tsid> {
        self.stripe(labels).read().get(labels).copied()
    }

    /// Label set of a published series
    pub fn lookup_labels(&self, tsid: Tsid) -> Result<LabelSet> {
        self.published_record(tsid)
            .map(|record| record.labels().clone())
    }

    /// Record of a published series
    pub fn published_record(&self, tsid: Tsid) -> Result<Arc<SeriesRecord>> {
        if tsid == INVALID_TSID || !self.is_published(tsid) {
            return Err(Error::NotFound(tsid));
        }
        self.record(tsid).ok_or(Error::NotFound(tsid))
    }

    /// Record for `tsid`, including series still being published
    pub fn record(&self, tsid: Tsid) -> Option<Arc<SeriesRecord>> {
        self.records.get(&tsid).map(|r| Arc::clone(r.value()))
    }

    /// Whether `tsid` has been fully published
    pub fn is_published(&self, tsid: Tsid) -> bool {
        self.published.read().contains(tsid)
    }

    /// Copy of the published set
    pub fn published(&self) -> Postings {
        self.published.read().clone()
    }

    /// Intersect `postings` with the published set in place
    pub fn retain_published(&self, postings: &mut Postings) {
        postings.and_inplace(&self.published.read());
    }

    /// Number of allocated series
    pub fn series_count(&self) -> usize {
        self.series_count.load(Ordering::Relaxed)
    }

    /// TSID the next registration would receive
    pub fn next_tsid(&self) -> Tsid {
        self.next_tsid.load(Ordering::Acquire)
    }

    /// Configured series limit, 0 for unlimited
    pub fn max_series(&self) -> usize {
        self.max_series
    }

    /// Snapshot of all published series, ascending by TSID
    pub fn snapshot(&self) -> Vec<SeriesSnapshot> {
        self.published()
            .iter()
            .filter_map(|tsid| self.record(tsid))
            .map(|record| record.to_snapshot())
            .collect()
    }

    /// Load series from persistence
    ///
    /// Every entry is checked against the batch and the live registry before
    /// anything is inserted: TSID 0, `u64::MAX`, inverted intervals, TSIDs or
    /// label sets already present, and entries beyond the series limit are
    /// rejected, leaving the registry untouched. On success the TSID counter
    /// resumes past the highest loaded TSID.
    ///
    /// All key stripes stay write-locked for the duration, so no
    /// registration can allocate while the batch is checked and inserted.
    pub fn import(&self, entries: Vec<SeriesSnapshot>, tags: &TagTree) -> Result<()> {
        let mut stripes: Vec<_> = self.stripes.iter().map(|stripe| stripe.write()).collect();

        validate_import(&entries)?;

        for entry in &entries {
            let keys = &stripes[self.stripe_index(&entry.labels)];
            if let Some(existing) = keys.get(&entry.labels) {
                return Err(Error::InvalidArgument(format!(
                    "label set {} already registered as tsid {}",
                    entry.labels, existing
                )));
            }
            if self.records.contains_key(&entry.tsid) {
                return Err(Error::InvalidArgument(format!(
                    "tsid {} already registered",
                    entry.tsid
                )));
            }
        }

        let current = self.series_count.load(Ordering::Acquire);
        if self.max_series != 0 && current + entries.len() > self.max_series {
            return Err(Error::CapacityExceeded {
                limit: self.max_series,
            });
        }

        // Past this point nothing fails. Move the counter first so no
        // loaded TSID can be handed out again.
        let max_tsid = entries.iter().map(|e| e.tsid).max().unwrap_or(INVALID_TSID);
        self.next_tsid.fetch_max(max_tsid + 1, Ordering::AcqRel);

        let total = entries.len();
        self.series_count.fetch_add(total, Ordering::AcqRel);

        for (loaded, entry) in entries.into_iter().enumerate() {
            let tsid = entry.tsid;
            let interval = entry.interval();

            self.records
                .insert(tsid, Arc::new(SeriesRecord::new(tsid, entry.labels.clone(), interval)));
            tags.insert_series(tsid, &entry.labels);
            self.published.write().insert(tsid);
            let idx = self.stripe_index(&entry.labels);
            stripes[idx].insert(entry.labels, tsid);

            if (loaded + 1) % RESTORE_LOG_BATCH == 0 {
                tracing::debug!(loaded = loaded + 1, total, "Restored series batch");
            }
        }

        Ok(())
    }
}

fn validate_import(entries: &[SeriesSnapshot]) -> Result<()> {
    let mut tsids = Postings::new();
    let mut label_sets: HashMap<&LabelSet, Tsid> = HashMap::with_capacity(entries.len());

    for entry in entries {
        if entry.tsid == INVALID_TSID {
            return Err(Error::InvalidArgument(format!(
                "snapshot entry {} uses reserved tsid 0",
                entry.labels
            )));
        }
        if entry.tsid == Tsid::MAX {
            return Err(Error::InvalidArgument(
                "snapshot entry uses tsid u64::MAX, counter would overflow".to_string(),
            ));
        }
        if entry.min_ts > entry.max_ts {
            return Err(Error::InvalidArgument(format!(
                "snapshot entry {} has inverted interval [{}, {}]",
                entry.tsid, entry.min_ts, entry.max_ts
            )));
        }
        if !tsids.insert(entry.tsid) {
            return Err(Error::InvalidArgument(format!(
                "duplicate tsid {} in snapshot",
                entry.tsid
            )));
        }
        if let Some(other) = label_sets.insert(&entry.labels, entry.tsid) {
            return Err(Error::InvalidArgument(format!(
                "label set {} appears as tsid {} and {}",
                entry.labels, other, entry.tsid
            )));
        }
    }

    Ok(())
}

impl Default for SeriesRegistry {
    fn default() -> Self {
        Self::new(16, 0)
    }
}

// ============================================================================
// Tests
// ============================================================================
