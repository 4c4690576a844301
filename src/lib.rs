//! Tagtree - in-memory label index for time-series data
//!
//! This library maps label sets to stable series identifiers and answers
//! Prometheus-style matcher queries:
//! - Stable TSIDs: one per distinct label set, never reused
//! - Inverted postings index with per-name unions for negation
//! - `=`, `!=`, `=~`, `!~` matchers with anchored regexes
//! - Time-range filtering by series activity interval
//! - Lock-striped writes, concurrent reads
//!
//! ```rust
//! use tagtree::{LabelMatcher, TagIndex};
//!
//! let index = TagIndex::in_memory();
//! let (tsid, _) = index
//!     .register_labels(1_000, [("job", "api"), ("env", "prod")])
//!     .unwrap();
//!
//! let matchers = [LabelMatcher::eql_regex("env", "pro.").unwrap()];
//! assert_eq!(index.resolve(&matchers, 0, 2_000).unwrap(), vec![tsid]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod labels;
pub mod matcher;
pub mod types;

/// Configuration management with TOML support
pub mod config;

/// Series registry, tag tree and matcher resolution
pub mod index;

/// Conversion between host label/matcher models and canonical types
pub mod adapter;

// Re-export main types
pub use config::IndexConfig;
pub use error::{Error, ErrorKind, Result};
pub use index::{IndexStats, SeriesSnapshot, TagIndex};
pub use labels::{Label, LabelSet};
pub use matcher::{LabelMatcher, MatchOp};
pub use types::{ActivityInterval, TimeRange, Tsid, INVALID_TSID};
