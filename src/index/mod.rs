//! Label index engine
//!
//! Ties together the three internal components:
//!
//! ```text
//!            register(ts, labels)                 resolve(matchers, mint, maxt)
//!                    │                                         │
//!                    ▼                                         ▼
//! ┌───────────────────────────────┐   postings    ┌──────────────────────────┐
//! │ SeriesRegistry                │──────────────▶│ TagTree                  │
//! │ LabelSet ↔ Tsid, intervals    │               │ name → value → postings  │
//! └───────────────────────────────┘               │ name → union             │
//!                    ▲                            └──────────────────────────┘
//!                    │ records, published set                  ▲
//!                    └─────────────── MatcherResolver ─────────┘
//! ```
//!
//! [`TagIndex`] is the entry point. All operations take `&self` and are safe
//! to call from many threads at once.
//!
//! # Example
//!
//! ```rust
//! use tagtree::index::TagIndex;
//! use tagtree::labels::LabelSet;
//! use tagtree::matcher::LabelMatcher;
//!
//! let index = TagIndex::in_memory();
//!
//! let prod = LabelSet::from_pairs([("job", "api"), ("env", "prod")]).unwrap();
//! let dev = LabelSet::from_pairs([("job", "api"), ("env", "dev")]).unwrap();
//!
//! let (s1, is_new) = index.register(100, &prod).unwrap();
//! assert!(is_new);
//! let (s2, _) = index.register(100, &dev).unwrap();
//!
//! let all = index
//!     .resolve(&[LabelMatcher::eql("job", "api").unwrap()], i64::MIN, i64::MAX)
//!     .unwrap();
//! assert_eq!(all, vec![s1, s2]);
//!
//! let not_prod = index
//!     .resolve(&[LabelMatcher::neq("env", "prod").unwrap()], i64::MIN, i64::MAX)
//!     .unwrap();
//! assert_eq!(not_prod, vec![s2]);
//! ```

pub mod postings;
pub mod registry;
pub mod resolver;
pub mod tag_tree;

pub use postings::Postings;
pub use registry::{SeriesRecord, SeriesRegistry, SeriesSnapshot};
pub use resolver::MatcherResolver;
pub use tag_tree::{TagTree, TagTreeStats};

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::IndexConfig;
use crate::error::{Error, Result, ValidationError};
use crate::labels::{Label, LabelSet};
use crate::matcher::{LabelMatcher, MatchOp};
use crate::types::{ActivityInterval, TimeRange, Tsid};

// ============================================================================
// Statistics
// ============================================================================

/// Operation counters
#[derive(Debug, Default)]
struct IndexCounters {
    registrations: AtomicU64,
    rejected_registrations: AtomicU64,
    resolves: AtomicU64,
}

/// Point-in-time statistics for a [`TagIndex`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    /// Registered series
    pub series_count: usize,

    /// Distinct label names
    pub label_name_count: u64,

    /// Distinct `(name, value)` pairs
    pub postings_entries: u64,

    /// Successful `register` calls, new and existing series
    pub registrations: u64,

    /// Registrations rejected by validation or the series limit
    pub rejected_registrations: u64,

    /// Resolve calls
    pub resolves: u64,

    /// Maximum allowed series, 0 for unlimited
    pub max_series: usize,
}

impl IndexStats {
    /// Series utilization as a fraction of the limit, 0.0 when unlimited
    pub fn series_utilization(&self) -> f64 {
        if self.max_series == 0 {
            return 0.0;
        }
        self.series_count as f64 / self.max_series as f64
    }
}

// ============================================================================
// Tag Index
// ============================================================================

/// In-memory label index: series registry, tag tree and matcher resolution
#[derive(Debug)]
pub struct TagIndex {
    config: IndexConfig,
    registry: SeriesRegistry,
    tags: TagTree,
    counters: IndexCounters,
}

impl TagIndex {
    /// Create an empty index, validating `config`
    pub fn new(config: IndexConfig) -> Result<Self> {
        config.validate()?;

        tracing::info!(
            registry_stripes = config.registry_stripes,
            tag_tree_stripes = config.tag_tree_stripes,
            max_series = config.max_series,
            "Created tag index"
        );

        Ok(Self {
            registry: SeriesRegistry::new(config.registry_stripes, config.max_series),
            tags: TagTree::new(config.tag_tree_stripes),
            counters: IndexCounters::default(),
            config,
        })
    }

    /// Create an empty index with the default configuration
    pub fn in_memory() -> Self {
        let config = IndexConfig::default();
        Self {
            registry: SeriesRegistry::new(config.registry_stripes, config.max_series),
            tags: TagTree::new(config.tag_tree_stripes),
            counters: IndexCounters::default(),
            config,
        }
    }

    /// Rebuild an index from persisted series
    ///
    /// The TSID counter resumes at the highest restored TSID plus one.
    /// Entries are validated against `config` before anything is indexed.
    /// Once the counter reaches `u64::MAX`, registering a new label set
    /// fails with an internal error.
    pub fn restore(config: IndexConfig, entries: Vec<SeriesSnapshot>) -> Result<Self> {
        let index = Self::new(config)?;

        for entry in &entries {
            index.validate_labels(&entry.labels)?;
        }

        let count = entries.len();
        index.registry.import(entries, &index.tags)?;

        tracing::info!(
            series = count,
            next_tsid = index.registry.next_tsid(),
            "Restored tag index"
        );

        Ok(index)
    }

    /// Active configuration
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// The underlying series registry
    pub fn registry(&self) -> &SeriesRegistry {
        &self.registry
    }

    /// The underlying tag tree
    pub fn tag_tree(&self) -> &TagTree {
        &self.tags
    }

    /// A resolver over this index
    pub fn resolver(&self) -> MatcherResolver<'_> {
        MatcherResolver::new(&self.registry, &self.tags)
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Register a series observed at `timestamp`
    ///
    /// Returns the series' TSID and whether it was newly allocated. The same
    /// label set always yields the same TSID, whatever the label order.
    pub fn register(&self, timestamp: i64, labels: &LabelSet) -> Result<(Tsid, bool)> {
        let result = self
            .validate_labels(labels)
            .map_err(Error::from)
            .and_then(|()| self.registry.register(timestamp, labels, &self.tags));

        match &result {
            Ok(_) => self.counters.registrations.fetch_add(1, Ordering::Relaxed),
            Err(_) => self
                .counters
                .rejected_registrations
                .fetch_add(1, Ordering::Relaxed),
        };

        result
    }

    /// Register a series from `(name, value)` pairs in any order
    ///
    /// Duplicate names fail with an invalid-argument error before anything
    /// is mutated.
    pub fn register_labels<I, N, V>(&self, timestamp: i64, pairs: I) -> Result<(Tsid, bool)>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let labels = match LabelSet::from_pairs(pairs) {
            Ok(labels) => labels,
            Err(e) => {
                self.counters
                    .rejected_registrations
                    .fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            },
        };
        self.register(timestamp, &labels)
    }

    fn validate_labels(&self, labels: &LabelSet) -> std::result::Result<(), ValidationError> {
        if labels.len() > self.config.max_labels_per_series {
            return Err(ValidationError::TooManyLabels {
                count: labels.len(),
                max: self.config.max_labels_per_series,
            });
        }

        for Label { name, value } in labels {
            if name.len() > self.config.max_label_name_len {
                return Err(ValidationError::NameTooLong {
                    name: name.clone(),
                    len: name.len(),
                    max: self.config.max_label_name_len,
                });
            }
            if value.len() > self.config.max_label_value_len {
                return Err(ValidationError::ValueTooLong {
                    name: name.clone(),
                    len: value.len(),
                    max: self.config.max_label_value_len,
                });
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Label set of a series; fails with not-found for 0 or unknown TSIDs
    pub fn lookup_labels(&self, tsid: Tsid) -> Result<LabelSet> {
        self.registry.lookup_labels(tsid)
    }

    /// TSID of an existing series, without registering it
    pub fn lookup_series(&self, labels: &LabelSet) -> Option<Tsid> {
        self.registry.lookup(labels)
    }

    /// Activity interval of a series
    pub fn series_interval(&self, tsid: Tsid) -> Result<ActivityInterval> {
        self.registry
            .published_record(tsid)
            .map(|record| record.interval())
    }

    /// Distinct values of `name`, sorted
    pub fn label_values(&self, name: &str) -> Vec<String> {
        self.tags.enumerate_values(name)
    }

    /// Distinct label names, sorted
    pub fn label_names(&self) -> Vec<String> {
        self.tags.label_names()
    }

    /// Number of registered series
    pub fn series_count(&self) -> usize {
        self.registry.series_count()
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    /// Build a matcher using this index's regex limits
    pub fn matcher(
        &self,
        op: MatchOp,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<LabelMatcher> {
        LabelMatcher::with_limits(
            op,
            name,
            value,
            self.config.max_regex_pattern_len,
            self.config.regex_size_limit,
        )
    }

    /// TSIDs matching every matcher and active within `[mint, maxt]`, ascending
    ///
    /// Fails with an invalid-argument error if `mint > maxt`. An empty
    /// matcher set selects every series active in the window.
    pub fn resolve(&self, matchers: &[LabelMatcher], mint: i64, maxt: i64) -> Result<Vec<Tsid>> {
        self.resolve_range(matchers, TimeRange::new(mint, maxt)?)
    }

    /// [`resolve`](Self::resolve) with a prebuilt time range
    pub fn resolve_range(&self, matchers: &[LabelMatcher], range: TimeRange) -> Result<Vec<Tsid>> {
        self.counters.resolves.fetch_add(1, Ordering::Relaxed);
        self.resolver().resolve(matchers, range)
    }

    /// Like [`resolve`](Self::resolve), pairing each TSID with its label set
    pub fn resolve_with_labels(
        &self,
        matchers: &[LabelMatcher],
        mint: i64,
        maxt: i64,
    ) -> Result<Vec<(Tsid, LabelSet)>> {
        let range = TimeRange::new(mint, maxt)?;
        self.counters.resolves.fetch_add(1, Ordering::Relaxed);

        Ok(self
            .resolver()
            .resolve_records(matchers, range)?
            .into_iter()
            .map(|record| (record.tsid(), record.labels().clone()))
            .collect())
    }

    // ------------------------------------------------------------------------
    // Persistence and statistics
    // ------------------------------------------------------------------------

    /// Every published series, ascending by TSID
    pub fn snapshot(&self) -> Vec<SeriesSnapshot> {
        self.registry.snapshot()
    }

    /// Current statistics
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            series_count: self.registry.series_count(),
            label_name_count: self.tags.name_count(),
            postings_entries: self.tags.postings_count(),
            registrations: self.counters.registrations.load(Ordering::Relaxed),
            rejected_registrations: self
                .counters
                .rejected_registrations
                .load(Ordering::Relaxed),
            resolves: self.counters.resolves.load(Ordering::Relaxed),
            max_series: self.config.max_series,
        }
    }
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::in_memory()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        LabelSet::from_pairs(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let index = TagIndex::in_memory();
        let set = labels(&[("job", "api"), ("env", "prod")]);

        let (tsid, is_new) = index.register(100, &set).unwrap();
        assert!(is_new);
        assert_eq!(index.lookup_labels(tsid).unwrap(), set);
        assert_eq!(index.lookup_series(&set), Some(tsid));
        assert_eq!(
            index.series_interval(tsid).unwrap(),
            ActivityInterval::at(100)
        );
    }

    #[test]
    fn test_register_labels_duplicate_name() {
        let index = TagIndex::in_memory();

        let err = index
            .register_labels(0, [("job", "api"), ("job", "web")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(index.series_count(), 0);
        assert!(index.label_names().is_empty());
        assert_eq!(index.stats().rejected_registrations, 1);
    }

    #[test]
    fn test_label_limits() {
        let config = IndexConfig {
            max_labels_per_series: 2,
            max_label_name_len: 4,
            max_label_value_len: 8,
            ..Default::default()
        };
        let index = TagIndex::new(config).unwrap();

        let too_many = labels(&[("a", "1"), ("b", "2"), ("c", "3")]);
        assert!(matches!(
            index.register(0, &too_many),
            Err(Error::Validation(ValidationError::TooManyLabels { count: 3, max: 2 }))
        ));

        let long_name = labels(&[("hostname", "a")]);
        assert!(matches!(
            index.register(0, &long_name),
            Err(Error::Validation(ValidationError::NameTooLong { .. }))
        ));

        let long_value = labels(&[("host", "a-very-long-value")]);
        assert!(matches!(
            index.register(0, &long_value),
            Err(Error::Validation(ValidationError::ValueTooLong { .. }))
        ));

        assert_eq!(index.series_count(), 0);
        assert_eq!(index.stats().rejected_registrations, 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = IndexConfig {
            registry_stripes: 3,
            ..Default::default()
        };
        assert!(matches!(TagIndex::new(config), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_resolve_rejects_inverted_range() {
        let index = TagIndex::in_memory();
        let err = index.resolve(&[], 300, 200).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_resolve_with_labels() {
        let index = TagIndex::in_memory();
        let api = labels(&[("job", "api")]);
        let web = labels(&[("job", "web")]);
        let (a, _) = index.register(10, &api).unwrap();
        let (w, _) = index.register(10, &web).unwrap();

        let result = index
            .resolve_with_labels(&[LabelMatcher::eql_regex("job", ".*").unwrap()], 0, 20)
            .unwrap();
        assert_eq!(result, vec![(a, api), (w, web)]);
    }

    #[test]
    fn test_matcher_uses_configured_limits() {
        let config = IndexConfig {
            max_regex_pattern_len: 4,
            ..Default::default()
        };
        let index = TagIndex::new(config).unwrap();

        assert!(index.matcher(MatchOp::EqlRegex, "env", "pro.").is_ok());
        assert!(matches!(
            index.matcher(MatchOp::EqlRegex, "env", "prod.*"),
            Err(Error::InvalidRegex { .. })
        ));
        // Equality values are not patterns
        assert!(index.matcher(MatchOp::Eql, "env", "production").is_ok());
    }

    #[test]
    fn test_label_values_and_names() {
        let index = TagIndex::in_memory();
        index.register_labels(0, [("env", "prod"), ("job", "api")]).unwrap();
        index.register_labels(0, [("env", "dev"), ("job", "api")]).unwrap();
        index.register_labels(0, [("env", "qa")]).unwrap();

        assert_eq!(index.label_values("env"), vec!["dev", "prod", "qa"]);
        assert_eq!(index.label_values("job"), vec!["api"]);
        assert!(index.label_values("rack").is_empty());
        assert_eq!(index.label_names(), vec!["env", "job"]);
    }

    #[test]
    fn test_stats() {
        let index = TagIndex::in_memory();
        index.register_labels(0, [("host", "a"), ("dc", "east")]).unwrap();
        index.register_labels(1, [("host", "a"), ("dc", "east")]).unwrap();
        index.register_labels(0, [("host", "b"), ("dc", "east")]).unwrap();
        index.resolve(&[], i64::MIN, i64::MAX).unwrap();

        let stats = index.stats();
        assert_eq!(stats.series_count, 2);
        assert_eq!(stats.label_name_count, 2);
        assert_eq!(stats.postings_entries, 3);
        assert_eq!(stats.registrations, 3);
        assert_eq!(stats.resolves, 1);
        assert!(stats.series_utilization() > 0.0);
    }

    #[test]
    fn test_snapshot_restore() {
        let index = TagIndex::in_memory();
        index.register_labels(100, [("job", "api"), ("env", "prod")]).unwrap();
        index.register_labels(200, [("job", "api"), ("env", "dev")]).unwrap();
        index.register_labels(300, [("job", "api"), ("env", "prod")]).unwrap();

        let snapshot = index.snapshot();
        let restored = TagIndex::restore(IndexConfig::default(), snapshot.clone()).unwrap();

        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(
            restored.series_interval(1).unwrap(),
            ActivityInterval { min_ts: 100, max_ts: 300 }
        );

        let matchers = [LabelMatcher::neq("env", "dev").unwrap()];
        assert_eq!(restored.resolve(&matchers, 0, 1000).unwrap(), vec![1]);

        let (tsid, is_new) = restored.register_labels(0, [("job", "web")]).unwrap();
        assert!(is_new);
        assert_eq!(tsid, 3);
    }

    #[test]
    fn test_restore_validates_limits() {
        let entries = vec![SeriesSnapshot {
            tsid: 1,
            labels: labels(&[("a", "1"), ("b", "2")]),
            min_ts: 0,
            max_ts: 0,
        }];
        let config = IndexConfig {
            max_labels_per_series: 1,
            ..Default::default()
        };
        assert!(matches!(
            TagIndex::restore(config, entries),
            Err(Error::Validation(_))
        ));
    }
}
