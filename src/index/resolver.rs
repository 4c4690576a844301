//! Matcher Resolver
//!
//! Evaluates a set of matchers (implicit AND) into a sorted TSID list.
//!
//! | op | postings |
//! |---|---|
//! | `name = v` | `postings[name][v]` |
//! | `name != v` | `union[name] - postings[name][v]` |
//! | `name =~ p` | union of `postings[name][v]` for every `v` fully matching `p` |
//! | `name !~ p` | `union[name] - (name =~ p)` |
//!
//! Negative operators only select series that carry the label: a series
//! without `env` matches neither `env = "prod"` nor `env != "prod"`.
//!
//! After intersection, candidates are restricted to published series and
//! filtered by activity interval: a series is kept iff
//! `min_ts <= maxt && max_ts >= mint`.

use std::sync::Arc;

use super::postings::Postings;
use super::registry::{SeriesRecord, SeriesRegistry};
use super::tag_tree::TagTree;
use crate::error::{Error, Result};
use crate::matcher::{LabelMatcher, MatchOp};
use crate::types::{TimeRange, Tsid};

/// Resolves matcher sets against a registry and its tag tree
#[derive(Debug, Clone, Copy)]
pub struct MatcherResolver<'a> {
    registry: &'a SeriesRegistry,
    tags: &'a TagTree,
}

impl<'a> MatcherResolver<'a> {
    /// Create a resolver over `registry` and `tags`
    pub fn new(registry: &'a SeriesRegistry, tags: &'a TagTree) -> Self {
        Self { registry, tags }
    }

    /// Resolve `matchers` to TSIDs active within `range`, ascending
    pub fn resolve(&self, matchers: &[LabelMatcher], range: TimeRange) -> Result<Vec<Tsid>> {
        Ok(self
            .resolve_records(matchers, range)?
            .iter()
            .map(|record| record.tsid())
            .collect())
    }

    /// Resolve `matchers` to series records active within `range`, ascending by TSID
    pub fn resolve_records(
        &self,
        matchers: &[LabelMatcher],
        range: TimeRange,
    ) -> Result<Vec<Arc<SeriesRecord>>> {
        let candidates = self.select(matchers);

        let mut records = Vec::with_capacity(candidates.cardinality() as usize);
        for tsid in candidates.iter() {
            let record = self.registry.record(tsid).ok_or_else(|| {
                Error::Internal(format!("tsid {} is published but has no series record", tsid))
            })?;
            if record.interval().overlaps(&range) {
                records.push(record);
            }
        }

        tracing::trace!(
            matchers = matchers.len(),
            candidates = candidates.cardinality(),
            matched = records.len(),
            range = %range,
            "Resolved matcher set"
        );

        Ok(records)
    }

    /// Published series satisfying every matcher, ignoring time
    ///
    /// An empty matcher set selects every published series.
    pub fn select(&self, matchers: &[LabelMatcher]) -> Postings {
        if matchers.is_empty() {
            return self.registry.published();
        }

        let mut sets = Vec::with_capacity(matchers.len());
        for matcher in matchers {
            let postings = self.evaluate(matcher);
            if postings.is_empty() {
                return Postings::new();
            }
            sets.push(postings);
        }

        // Smallest first keeps intermediate results small
        sets.sort_by_key(Postings::cardinality);

        let mut sets = sets.into_iter();
        let mut result = match sets.next() {
            Some(first) => first,
            None => return Postings::new(),
        };
        for postings in sets {
            result.and_inplace(&postings);
            if result.is_empty() {
                return result;
            }
        }

        self.registry.retain_published(&mut result);
        result
    }

    /// Postings for a single matcher
    pub fn evaluate(&self, matcher: &LabelMatcher) -> Postings {
        let postings = match matcher.op() {
            MatchOp::Eql => self.eval_eql(matcher),
            MatchOp::Neq => self.eval_neq(matcher),
            MatchOp::EqlRegex => self.eval_eql_regex(matcher),
            MatchOp::NeqRegex => self.eval_neq_regex(matcher),
        };

        tracing::trace!(
            matcher = %matcher,
            cardinality = postings.cardinality(),
            "Evaluated matcher"
        );

        postings
    }

    fn eval_eql(&self, matcher: &LabelMatcher) -> Postings {
        self.tags.lookup_eql(matcher.name(), matcher.value())
    }

    fn eval_neq(&self, matcher: &LabelMatcher) -> Postings {
        self.tags.name_union_without(matcher.name(), matcher.value())
    }

    fn eval_eql_regex(&self, matcher: &LabelMatcher) -> Postings {
        self.tags
            .union_where(matcher.name(), |value| matcher.pattern_matches(value))
    }

    fn eval_neq_regex(&self, matcher: &LabelMatcher) -> Postings {
        self.tags
            .name_union_excluding(matcher.name(), |value| matcher.pattern_matches(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelSet;

    struct Fixture {
        registry: SeriesRegistry,
        tags: TagTree,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: SeriesRegistry::new(4, 0),
                tags: TagTree::new(4),
            }
        }

        fn register(&self, ts: i64, pairs: &[(&str, &str)]) -> Tsid {
            let labels = LabelSet::from_pairs(pairs.iter().copied()).unwrap();
            self.registry.register(ts, &labels, &self.tags).unwrap().0
        }

        fn resolve(&self, matchers: &[LabelMatcher]) -> Vec<Tsid> {
            MatcherResolver::new(&self.registry, &self.tags)
                .resolve(matchers, TimeRange::ALL)
                .unwrap()
        }
    }

    /// s1 {job=api, env=prod}, s2 {job=api, env=dev}, s3 {job=api}
    fn fixture() -> (Fixture, Tsid, Tsid, Tsid) {
        let f = Fixture::new();
        let s1 = f.register(100, &[("job", "api"), ("env", "prod")]);
        let s2 = f.register(100, &[("job", "api"), ("env", "dev")]);
        let s3 = f.register(100, &[("job", "api")]);
        (f, s1, s2, s3)
    }

    #[test]
    fn test_eql() {
        let (f, s1, s2, s3) = fixture();
        assert_eq!(f.resolve(&[LabelMatcher::eql("job", "api").unwrap()]), vec![s1, s2, s3]);
        assert_eq!(f.resolve(&[LabelMatcher::eql("env", "prod").unwrap()]), vec![s1]);
        assert!(f.resolve(&[LabelMatcher::eql("env", "qa").unwrap()]).is_empty());
    }

    #[test]
    fn test_neq_excludes_absent_label() {
        let (f, _s1, s2, _s3) = fixture();
        assert_eq!(f.resolve(&[LabelMatcher::neq("env", "prod").unwrap()]), vec![s2]);
        assert!(f.resolve(&[LabelMatcher::neq("rack", "r1").unwrap()]).is_empty());
    }

    #[test]
    fn test_regex() {
        let (f, s1, s2, _s3) = fixture();
        assert_eq!(f.resolve(&[LabelMatcher::eql_regex("env", "pro.").unwrap()]), vec![s1]);
        assert_eq!(f.resolve(&[LabelMatcher::neq_regex("env", "pro.").unwrap()]), vec![s2]);
        assert_eq!(
            f.resolve(&[LabelMatcher::eql_regex("env", ".*").unwrap()]),
            vec![s1, s2]
        );
        // Anchored: "pr" alone does not match "prod"
        assert!(f.resolve(&[LabelMatcher::eql_regex("env", "pr").unwrap()]).is_empty());
    }

    #[test]
    fn test_and_combination() {
        let (f, s1, _s2, _s3) = fixture();
        let matchers = [
            LabelMatcher::eql("job", "api").unwrap(),
            LabelMatcher::neq("env", "dev").unwrap(),
        ];
        assert_eq!(f.resolve(&matchers), vec![s1]);

        let matchers = [
            LabelMatcher::eql("job", "api").unwrap(),
            LabelMatcher::eql("env", "missing").unwrap(),
        ];
        assert!(f.resolve(&matchers).is_empty());
    }

    #[test]
    fn test_empty_matcher_set_selects_all() {
        let (f, s1, s2, s3) = fixture();
        assert_eq!(f.resolve(&[]), vec![s1, s2, s3]);
    }

    #[test]
    fn test_time_filter() {
        let f = Fixture::new();
        let early = f.register(100, &[("host", "a")]);
        let late = f.register(1000, &[("host", "b")]);
        let resolver = MatcherResolver::new(&f.registry, &f.tags);

        let range = TimeRange::new(200, 300).unwrap();
        assert!(resolver.resolve(&[], range).unwrap().is_empty());

        let range = TimeRange::new(50, 150).unwrap();
        assert_eq!(resolver.resolve(&[], range).unwrap(), vec![early]);

        let range = TimeRange::new(100, 1000).unwrap();
        assert_eq!(resolver.resolve(&[], range).unwrap(), vec![early, late]);
    }

    #[test]
    fn test_select_ignores_time() {
        let (f, s1, s2, s3) = fixture();
        let resolver = MatcherResolver::new(&f.registry, &f.tags);
        assert_eq!(resolver.select(&[]).to_tsids(), vec![s1, s2, s3]);
    }

    #[test]
    fn test_unpublished_postings_are_hidden() {
        let f = Fixture::new();
        let s1 = f.register(0, &[("job", "api")]);

        // Postings written ahead of publication must not surface
        f.tags.insert("job", "api", 99);

        assert_eq!(f.resolve(&[LabelMatcher::eql("job", "api").unwrap()]), vec![s1]);
    }
}
