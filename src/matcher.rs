//! Label matchers
//!
//! A [`LabelMatcher`] is a single predicate on one label name, with one of
//! four operators. Regex patterns are compiled when the matcher is built, so
//! a bad pattern is rejected before any resolution work begins.
//!
//! Patterns are fully anchored: `pro.` matches `prod` but not `production`.
//!
//! # Negation
//!
//! Wrapping a matcher in a logical NOT swaps its operator:
//!
//! | matcher | negated |
//! |---|---|
//! | `=` | `!=` |
//! | `!=` | `=` |
//! | `=~` | `!~` |
//! | `!~` | `=~` |
//!
//! Negating twice yields the original matcher exactly.
//!
//! ```rust
//! use tagtree::matcher::{LabelMatcher, MatchOp};
//!
//! let m = LabelMatcher::eql_regex("env", "pro.").unwrap();
//! assert!(m.matches_value("prod"));
//! assert!(!m.matches_value("production"));
//!
//! let negated = !m.clone();
//! assert_eq!(negated.op(), MatchOp::NeqRegex);
//! assert_eq!(!negated, m);
//! ```

use std::fmt;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default maximum regex pattern length in bytes
pub const DEFAULT_MAX_REGEX_PATTERN_LEN: usize = 1024;

/// Default compiled regex size limit in bytes
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 1024 * 1024;

/// Matcher operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchOp {
    /// `name = value`
    Eql,
    /// `name != value`
    Neq,
    /// `name =~ pattern`
    EqlRegex,
    /// `name !~ pattern`
    NeqRegex,
}

impl MatchOp {
    /// Operator produced by wrapping this one in a logical NOT
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            MatchOp::Eql => MatchOp::Neq,
            MatchOp::Neq => MatchOp::Eql,
            MatchOp::EqlRegex => MatchOp::NeqRegex,
            MatchOp::NeqRegex => MatchOp::EqlRegex,
        }
    }

    /// Whether the value is a regex pattern
    pub fn is_regex(self) -> bool {
        matches!(self, MatchOp::EqlRegex | MatchOp::NeqRegex)
    }

    /// Whether the operator selects series that do *not* match a value
    pub fn is_negative(self) -> bool {
        matches!(self, MatchOp::Neq | MatchOp::NeqRegex)
    }

    /// PromQL-style operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            MatchOp::Eql => "=",
            MatchOp::Neq => "!=",
            MatchOp::EqlRegex => "=~",
            MatchOp::NeqRegex => "!~",
        }
    }
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single label predicate
///
/// Equality compares operator, name and value; the compiled regex is derived
/// from the value and carried along unchanged through negation.
#[derive(Clone)]
pub struct LabelMatcher {
    op: MatchOp,
    name: String,
    value: String,
    regex: Option<Arc<Regex>>,
}

impl LabelMatcher {
    /// Build a matcher using the default regex limits
    pub fn new(op: MatchOp, name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Self::with_limits(
            op,
            name,
            value,
            DEFAULT_MAX_REGEX_PATTERN_LEN,
            DEFAULT_REGEX_SIZE_LIMIT,
        )
    }

    /// Build a matcher with explicit regex limits
    ///
    /// `max_pattern_len` bounds the raw pattern, `size_limit` the compiled
    /// program. Both guard against pathological patterns.
    pub fn with_limits(
        op: MatchOp,
        name: impl Into<String>,
        value: impl Into<String>,
        max_pattern_len: usize,
        size_limit: usize,
    ) -> Result<Self> {
        let name = name.into();
        let value = value.into();

        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "matcher label name must not be empty".into(),
            ));
        }

        let regex = if op.is_regex() {
            Some(Arc::new(compile_anchored(&value, max_pattern_len, size_limit)?))
        } else {
            None
        };

        Ok(Self {
            op,
            name,
            value,
            regex,
        })
    }

    /// `name = value`
    pub fn eql(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Self::new(MatchOp::Eql, name, value)
    }

    /// `name != value`
    pub fn neq(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Self::new(MatchOp::Neq, name, value)
    }

    /// `name =~ pattern`
    pub fn eql_regex(name: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        Self::new(MatchOp::EqlRegex, name, pattern)
    }

    /// `name !~ pattern`
    pub fn neq_regex(name: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        Self::new(MatchOp::NeqRegex, name, pattern)
    }

    /// Operator
    pub fn op(&self) -> MatchOp {
        self.op
    }

    /// Label name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value for `=`/`!=`, pattern for `=~`/`!~`
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Matcher selecting the complement, per the negation table above
    #[must_use]
    pub fn negate(self) -> Self {
        Self {
            op: self.op.negate(),
            ..self
        }
    }

    /// Test a single label value against this matcher
    ///
    /// Does not encode the "label must be present" rule of negative
    /// operators; that lives in the resolver.
    pub fn matches_value(&self, value: &str) -> bool {
        match self.op {
            MatchOp::Eql => self.value == value,
            MatchOp::Neq => self.value != value,
            MatchOp::EqlRegex => self.pattern_matches(value),
            MatchOp::NeqRegex => !self.pattern_matches(value),
        }
    }

    /// Whether the pattern (regex operators) or value (equality operators)
    /// matches, ignoring the operator's polarity
    pub(crate) fn pattern_matches(&self, value: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(value),
            None => self.value == value,
        }
    }
}

/// Compile `pattern` anchored at both ends
fn compile_anchored(pattern: &str, max_pattern_len: usize, size_limit: usize) -> Result<Regex> {
    if pattern.len() > max_pattern_len {
        tracing::warn!(
            len = pattern.len(),
            max = max_pattern_len,
            "Rejected oversized regex pattern"
        );
        return Err(Error::invalid_regex(
            pattern,
            format!("pattern is {} bytes (max: {})", pattern.len(), max_pattern_len),
        ));
    }

    RegexBuilder::new(&format!("^(?:{})$", pattern))
        .size_limit(size_limit)
        .build()
        .map_err(|e| {
            tracing::warn!(error = %e, "Regex compilation failed");
            Error::invalid_regex(pattern, e)
        })
}

impl std::ops::Not for LabelMatcher {
    type Output = LabelMatcher;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

impl PartialEq for LabelMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op && self.name == other.name && self.value == other.value
    }
}

impl Eq for LabelMatcher {}

impl std::hash::Hash for LabelMatcher {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.op.hash(state);
        self.name.hash(state);
        self.value.hash(state);
    }
}

impl fmt::Debug for LabelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelMatcher")
            .field("op", &self.op)
            .field("name", &self.name)
            .field("value", &self.value)
            .finish()
    }
}

impl fmt::Display for LabelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.op, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_negation_table() {
        assert_eq!(MatchOp::Eql.negate(), MatchOp::Neq);
        assert_eq!(MatchOp::Neq.negate(), MatchOp::Eql);
        assert_eq!(MatchOp::EqlRegex.negate(), MatchOp::NeqRegex);
        assert_eq!(MatchOp::NeqRegex.negate(), MatchOp::EqlRegex);
    }

    #[test]
    fn test_double_negation_is_identity() {
        for op in [MatchOp::Eql, MatchOp::Neq, MatchOp::EqlRegex, MatchOp::NeqRegex] {
            let m = LabelMatcher::new(op, "env", "p").unwrap();
            let twice = !!m.clone();
            assert_eq!(twice, m);
            assert_eq!(twice.op(), op);
            assert_eq!(twice.name(), "env");
            assert_eq!(twice.value(), "p");
        }
    }

    #[test]
    fn test_regex_is_anchored() {
        let m = LabelMatcher::eql_regex("env", "pro.").unwrap();
        assert!(m.matches_value("prod"));
        assert!(!m.matches_value("production"));
        assert!(!m.matches_value("xprod"));

        // Alternation must stay inside the anchors
        let m = LabelMatcher::eql_regex("env", "dev|prod").unwrap();
        assert!(m.matches_value("dev"));
        assert!(m.matches_value("prod"));
        assert!(!m.matches_value("devx"));
        assert!(!m.matches_value("xprod"));
    }

    #[test]
    fn test_matches_value_per_op() {
        assert!(LabelMatcher::eql("a", "x").unwrap().matches_value("x"));
        assert!(!LabelMatcher::eql("a", "x").unwrap().matches_value("y"));
        assert!(LabelMatcher::neq("a", "x").unwrap().matches_value("y"));
        assert!(!LabelMatcher::neq("a", "x").unwrap().matches_value("x"));
        assert!(LabelMatcher::neq_regex("a", "x.*").unwrap().matches_value("y"));
        assert!(!LabelMatcher::neq_regex("a", "x.*").unwrap().matches_value("xyz"));
    }

    #[test]
    fn test_equality_value_is_literal() {
        // `.` is not special for equality matchers
        let m = LabelMatcher::eql("host", "a.b").unwrap();
        assert!(m.matches_value("a.b"));
        assert!(!m.matches_value("axb"));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = LabelMatcher::eql_regex("env", "pro(").unwrap_err();
        assert!(matches!(err, Error::InvalidRegex { .. }));

        let err = LabelMatcher::neq_regex("env", "[z-a]").unwrap_err();
        assert!(matches!(err, Error::InvalidRegex { .. }));

        // Not a regex operator, so not compiled
        assert!(LabelMatcher::eql("env", "pro(").is_ok());
    }

    #[test]
    fn test_pattern_length_limit() {
        let pattern = "a".repeat(64);
        assert!(LabelMatcher::with_limits(MatchOp::EqlRegex, "x", &pattern, 32, 1 << 20).is_err());
        assert!(LabelMatcher::with_limits(MatchOp::EqlRegex, "x", &pattern, 64, 1 << 20).is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            LabelMatcher::eql("", "x"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(LabelMatcher::eql("job", "api").unwrap().to_string(), r#"job="api""#);
        assert_eq!(LabelMatcher::neq("job", "api").unwrap().to_string(), r#"job!="api""#);
        assert_eq!(
            LabelMatcher::eql_regex("env", "pro.").unwrap().to_string(),
            r#"env=~"pro.""#
        );
        assert_eq!(
            LabelMatcher::neq_regex("env", "pro.").unwrap().to_string(),
            r#"env!~"pro.""#
        );
    }
}
