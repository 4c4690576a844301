//! Core identifier and time types
//!
//! # Key Types
//!
//! - **`Tsid`**: Stable numeric identifier for one distinct time series
//! - **`TimeRange`**: Inclusive query window `[start, end]`
//! - **`ActivityInterval`**: Span of timestamps a series has been registered at
//!
//! # Example
//!
//! ```rust
//! use tagtree::types::{ActivityInterval, TimeRange};
//!
//! let range = TimeRange::new(1000, 2000).unwrap();
//! assert!(range.contains(1500));
//!
//! let interval = ActivityInterval::at(1800).extended(2500);
//! assert!(interval.overlaps(&range));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Time series identifier
///
/// Allocated from a counter owned by the series registry, starting at 1.
/// Once assigned to a label set it never changes and is never reused.
pub type Tsid = u64;

/// Reserved identifier that never names a series
pub const INVALID_TSID: Tsid = 0;

/// Inclusive time window for queries
///
/// # Example
///
/// ```rust
/// use tagtree::types::TimeRange;
///
/// let range = TimeRange::new(1000, 2000).unwrap();
/// assert!(range.contains(1000));
/// assert!(range.contains(2000));
/// assert!(!range.contains(2001));
///
/// assert!(TimeRange::new(2000, 1000).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive)
    pub start: i64,

    /// End timestamp (inclusive)
    pub end: i64,
}

impl TimeRange {
    /// The widest possible range, `[i64::MIN, i64::MAX]`
    pub const ALL: TimeRange = TimeRange {
        start: i64::MIN,
        end: i64::MAX,
    };

    /// Create a new time range, rejecting `start > end`
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidArgument(format!(
                "invalid time range: mint {} > maxt {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Check if a timestamp falls within this range (inclusive)
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// Length of the range, `None` on overflow
    pub fn duration(&self) -> Option<i64> {
        self.end.checked_sub(self.start)
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::ALL
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Span of timestamps over which a series has been observed
///
/// Registration only ever widens the interval; it never shrinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityInterval {
    /// Earliest registered timestamp
    pub min_ts: i64,

    /// Latest registered timestamp
    pub max_ts: i64,
}

impl ActivityInterval {
    /// Interval covering a single timestamp
    pub fn at(timestamp: i64) -> Self {
        Self {
            min_ts: timestamp,
            max_ts: timestamp,
        }
    }

    /// Return this interval widened to include `timestamp`
    #[must_use]
    pub fn extended(self, timestamp: i64) -> Self {
        Self {
            min_ts: self.min_ts.min(timestamp),
            max_ts: self.max_ts.max(timestamp),
        }
    }

    /// `min_ts <= range.end && max_ts >= range.start`
    pub fn overlaps(&self, range: &TimeRange) -> bool {
        self.min_ts <= range.end && self.max_ts >= range.start
    }
}

impl fmt::Display for ActivityInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min_ts, self.max_ts)
    }
}
