//! Label model
//!
//! A [`Label`] is an immutable `(name, value)` pair. A [`LabelSet`] is the
//! identity of a series: a collection of labels with unique names whose
//! identity ignores input order.
//!
//! `LabelSet` keeps its labels sorted by name, so equality, hashing and the
//! registry key are all order-independent without further work.
//!
//! # Example
//!
//! ```rust
//! use tagtree::labels::LabelSet;
//!
//! let a = LabelSet::from_pairs([("job", "api"), ("env", "prod")]).unwrap();
//! let b = LabelSet::from_pairs([("env", "prod"), ("job", "api")]).unwrap();
//! assert_eq!(a, b);
//! assert_eq!(a.fingerprint(), b.fingerprint());
//! assert_eq!(a.to_string(), r#"{env="prod", job="api"}"#);
//!
//! assert!(LabelSet::from_pairs([("job", "api"), ("job", "web")]).is_err());
//! ```

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Separator byte between names and values when fingerprinting
const FINGERPRINT_SEP: u8 = 0xff;

/// A single `(name, value)` label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label {
    /// Label name
    pub name: String,
    /// Label value
    pub value: String,
}

impl Label {
    /// Create a new label
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}", self.name, self.value)
    }
}

impl<N: Into<String>, V: Into<String>> From<(N, V)> for Label {
    fn from((name, value): (N, V)) -> Self {
        Label::new(name, value)
    }
}

/// Set of uniquely named labels identifying a series
///
/// Always sorted by name; names are non-empty and unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Label>", into = "Vec<Label>")]
pub struct LabelSet {
    labels: Vec<Label>,
}

impl LabelSet {
    /// Create an empty label set
    pub fn new() -> Self {
        Self { labels: Vec::new() }
    }

    /// Build a label set from labels in any order
    ///
    /// Fails on duplicate or empty names.
    pub fn from_labels(mut labels: Vec<Label>) -> Result<Self, ValidationError> {
        labels.sort_by(|a, b| a.name.cmp(&b.name));

        for pair in labels.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(ValidationError::DuplicateName(pair[0].name.clone()));
            }
        }
        if labels.iter().any(|l| l.name.is_empty()) {
            return Err(ValidationError::EmptyName);
        }

        Ok(Self { labels })
    }

    /// Build a label set from `(name, value)` pairs
    pub fn from_pairs<I, N, V>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        Self::from_labels(pairs.into_iter().map(Label::from).collect())
    }

    /// Value of the label called `name`, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.labels[idx].value.as_str())
    }

    /// Check whether a label called `name` is present
    pub fn contains_name(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Labels sorted by name
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Iterate over labels in name order
    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.labels.iter()
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Order-independent 64-bit fingerprint
    ///
    /// Used to pick a registry stripe. Equality of label sets is still
    /// decided by comparing labels, so collisions are harmless.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for label in &self.labels {
            hasher.write(label.name.as_bytes());
            hasher.write_u8(FINGERPRINT_SEP);
            hasher.write(label.value.as_bytes());
            hasher.write_u8(FINGERPRINT_SEP);
        }
        let h = hasher.finish();
        let h = h.wrapping_mul(0x517cc1b727220a95);
        h ^ (h >> 32)
    }

    /// Convert into `(name, value)` pairs in name order
    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.labels.into_iter().map(|l| (l.name, l.value)).collect()
    }

    /// Approximate heap usage in bytes
    pub fn memory_bytes(&self) -> usize {
        self.labels
            .iter()
            .map(|l| l.name.len() + l.value.len() + std::mem::size_of::<Label>())
            .sum()
    }
}

impl TryFrom<Vec<Label>> for LabelSet {
    type Error = ValidationError;

    fn try_from(labels: Vec<Label>) -> Result<Self, Self::Error> {
        Self::from_labels(labels)
    }
}

impl From<LabelSet> for Vec<Label> {
    fn from(set: LabelSet) -> Self {
        set.labels
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.labels.iter()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", label)?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_by_name() {
        let set = LabelSet::from_pairs([("zone", "a"), ("app", "b"), ("host", "c")]).unwrap();
        let names: Vec<_> = set.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["app", "host", "zone"]);
    }

    #[test]
    fn test_order_independent_identity() {
        let a = LabelSet::from_pairs([("job", "api"), ("env", "prod"), ("dc", "east")]).unwrap();
        let b = LabelSet::from_pairs([("dc", "east"), ("job", "api"), ("env", "prod")]).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = LabelSet::from_pairs([("job", "api"), ("env", "prod"), ("job", "web")])
            .unwrap_err();
        assert_eq!(err, ValidationError::DuplicateName("job".into()));

        // Identical pairs are still a duplicate name
        assert!(LabelSet::from_pairs([("job", "api"), ("job", "api")]).is_err());
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = LabelSet::from_pairs([("", "x")]).unwrap_err();
        assert_eq!(err, ValidationError::EmptyName);
    }

    #[test]
    fn test_empty_value_allowed() {
        let set = LabelSet::from_pairs([("env", "")]).unwrap();
        assert_eq!(set.get("env"), Some(""));
    }

    #[test]
    fn test_get() {
        let set = LabelSet::from_pairs([("job", "api"), ("env", "prod")]).unwrap();
        assert_eq!(set.get("job"), Some("api"));
        assert_eq!(set.get("env"), Some("prod"));
        assert_eq!(set.get("host"), None);
        assert!(set.contains_name("env"));
    }

    #[test]
    fn test_fingerprint_separates_name_and_value() {
        // "ab"="c" must not collide with "a"="bc"
        let a = LabelSet::from_pairs([("ab", "c")]).unwrap();
        let b = LabelSet::from_pairs([("a", "bc")]).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_display() {
        let set = LabelSet::from_pairs([("job", "api"), ("env", "prod")]).unwrap();
        assert_eq!(set.to_string(), r#"{env="prod", job="api"}"#);
        assert_eq!(LabelSet::new().to_string(), "{}");
    }

    #[test]
    fn test_serde_enforces_invariants() {
        let set = LabelSet::from_pairs([("job", "api"), ("env", "prod")]).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        let back: LabelSet = serde_json::from_str(&json).unwrap();
        assert_eq!(set, back);

        let dup = r#"[{"name":"a","value":"1"},{"name":"a","value":"2"}]"#;
        assert!(serde_json::from_str::<LabelSet>(dup).is_err());
    }
}
