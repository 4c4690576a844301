//! Host adapters
//!
//! The index only understands [`LabelSet`] and [`LabelMatcher`]. Hosts with
//! their own label and matcher types implement [`LabelAdapter`] and
//! [`MatcherAdapter`] to convert at the boundary.
//!
//! Host matcher models commonly express negation as a wrapper around
//! another matcher. Converting such a wrapper inverts the inner matcher's
//! operator instead of carrying the wrapper through:
//!
//! ```rust
//! use tagtree::adapter::{HostMatcher, MatcherAdapter, PairsAdapter};
//! use tagtree::matcher::MatchOp;
//!
//! let adapter = PairsAdapter::default();
//! let host = HostMatcher::not(HostMatcher::regexp("env", "pro."));
//!
//! let matcher = adapter.to_canonical_matcher(&host).unwrap();
//! assert_eq!(matcher.op(), MatchOp::NeqRegex);
//! assert_eq!(matcher.value(), "pro.");
//!
//! // NOT(NOT(m)) is m again
//! let twice = HostMatcher::not(host);
//! let matcher = adapter.to_canonical_matcher(&twice).unwrap();
//! assert_eq!(matcher.op(), MatchOp::EqlRegex);
//! ```

use crate::config::IndexConfig;
use crate::error::Result;
use crate::index::TagIndex;
use crate::labels::LabelSet;
use crate::matcher::{
    LabelMatcher, MatchOp, DEFAULT_MAX_REGEX_PATTERN_LEN, DEFAULT_REGEX_SIZE_LIMIT,
};
use crate::types::Tsid;

/// Converts between a host label representation and [`LabelSet`]
pub trait LabelAdapter {
    /// Host label set type
    type HostLabels;

    /// Host labels to canonical form; fails on duplicate or empty names
    fn to_canonical(&self, host: &Self::HostLabels) -> Result<LabelSet>;

    /// Canonical labels to host form
    fn from_canonical(&self, labels: &LabelSet) -> Self::HostLabels;
}

/// Converts between a host matcher representation and [`LabelMatcher`]
pub trait MatcherAdapter {
    /// Host matcher type
    type HostMatcher;

    /// Host matcher to canonical form, applying negation inversion
    fn to_canonical_matcher(&self, host: &Self::HostMatcher) -> Result<LabelMatcher>;

    /// Canonical matcher to host form
    fn from_canonical_matcher(&self, matcher: &LabelMatcher) -> Self::HostMatcher;

    /// Convert a whole matcher set, failing on the first bad matcher
    fn to_canonical_matchers(&self, hosts: &[Self::HostMatcher]) -> Result<Vec<LabelMatcher>> {
        hosts
            .iter()
            .map(|host| self.to_canonical_matcher(host))
            .collect()
    }
}

/// Host labels as plain `(name, value)` pairs
pub type HostLabels = Vec<(String, String)>;

/// Reference host matcher model with wrapper-style negation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMatcher {
    /// `name` equals `value`
    Equal {
        /// Label name
        name: String,
        /// Expected value
        value: String,
    },

    /// `name` fully matches `pattern`
    Regexp {
        /// Label name
        name: String,
        /// Regex pattern
        pattern: String,
    },

    /// Logical NOT of the inner matcher
    Not(Box<HostMatcher>),
}

impl HostMatcher {
    /// Equality matcher
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        HostMatcher::Equal {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Regex matcher
    pub fn regexp(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        HostMatcher::Regexp {
            name: name.into(),
            pattern: pattern.into(),
        }
    }

    /// Negation wrapper
    pub fn not(inner: HostMatcher) -> Self {
        HostMatcher::Not(Box::new(inner))
    }
}

/// Adapter for [`HostLabels`] and [`HostMatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairsAdapter {
    max_regex_pattern_len: usize,
    regex_size_limit: usize,
}

impl PairsAdapter {
    /// Adapter compiling regexes with the limits in `config`
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            max_regex_pattern_len: config.max_regex_pattern_len,
            regex_size_limit: config.regex_size_limit,
        }
    }
}

impl Default for PairsAdapter {
    fn default() -> Self {
        Self {
            max_regex_pattern_len: DEFAULT_MAX_REGEX_PATTERN_LEN,
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
        }
    }
}

impl LabelAdapter for PairsAdapter {
    type HostLabels = HostLabels;

    fn to_canonical(&self, host: &HostLabels) -> Result<LabelSet> {
        Ok(LabelSet::from_pairs(host.iter().cloned())?)
    }

    fn from_canonical(&self, labels: &LabelSet) -> HostLabels {
        labels.clone().into_pairs()
    }
}

impl MatcherAdapter for PairsAdapter {
    type HostMatcher = HostMatcher;

    fn to_canonical_matcher(&self, host: &HostMatcher) -> Result<LabelMatcher> {
        let (op, name, value) = match host {
            HostMatcher::Equal { name, value } => (MatchOp::Eql, name, value),
            HostMatcher::Regexp { name, pattern } => (MatchOp::EqlRegex, name, pattern),
            HostMatcher::Not(inner) => return Ok(self.to_canonical_matcher(inner)?.negate()),
        };
        LabelMatcher::with_limits(
            op,
            name.as_str(),
            value.as_str(),
            self.max_regex_pattern_len,
            self.regex_size_limit,
        )
    }

    fn from_canonical_matcher(&self, matcher: &LabelMatcher) -> HostMatcher {
        let name = matcher.name();
        let value = matcher.value();
        match matcher.op() {
            MatchOp::Eql => HostMatcher::equal(name, value),
            MatchOp::Neq => HostMatcher::not(HostMatcher::equal(name, value)),
            MatchOp::EqlRegex => HostMatcher::regexp(name, value),
            MatchOp::NeqRegex => HostMatcher::not(HostMatcher::regexp(name, value)),
        }
    }
}

// ============================================================================
// Host-facing helpers
// ============================================================================

/// Register a series given in host form
pub fn register_host<A: LabelAdapter>(
    index: &TagIndex,
    adapter: &A,
    timestamp: i64,
    host: &A::HostLabels,
) -> Result<(Tsid, bool)> {
    let labels = adapter.to_canonical(host)?;
    index.register(timestamp, &labels)
}

/// Labels of a series in host form
pub fn host_labels<A: LabelAdapter>(
    index: &TagIndex,
    adapter: &A,
    tsid: Tsid,
) -> Result<A::HostLabels> {
    index
        .lookup_labels(tsid)
        .map(|labels| adapter.from_canonical(&labels))
}

/// Resolve host matchers against the index
pub fn resolve_host<A: MatcherAdapter>(
    index: &TagIndex,
    adapter: &A,
    matchers: &[A::HostMatcher],
    mint: i64,
    maxt: i64,
) -> Result<Vec<Tsid>> {
    let matchers = adapter.to_canonical_matchers(matchers)?;
    index.resolve(&matchers, mint, maxt)
}
