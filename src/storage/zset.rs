//! Sorted Set Data Structure
//!
//! Members are unique byte strings, each with an `f64` score. The set keeps
//! two views of the same data:
//!
//! ```text
//! scores: HashMap<member, score>        O(1) lookup for ZADD/ZINCRBY/ZREM
//! order:  BTreeSet<(score, member)>     ordered traversal for ranges/ranks
//! ```
//!
//! Ties on score are broken by member bytes, lexicographically, so the order
//! is total and identical to what a Redis server returns.

use bytes::Bytes;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// An `f64` score with a total order. NaN never enters a set.
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl Score {
    /// Collapses `-0.0` into `0.0` so both sort as the same score.
    fn new(value: f64) -> Self {
        debug_assert!(!value.is_nan());
        Score(value + 0.0)
    }
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One end of a score interval, as written in `ZCOUNT`/`ZRANGEBYSCORE`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBound {
    pub value: f64,
    pub inclusive: bool,
}

impl ScoreBound {
    pub fn inclusive(value: f64) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }

    pub fn exclusive(value: f64) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }

    /// Parses `2.5`, `(2.5`, `-inf`, `+inf` or `inf`.
    pub fn parse(text: &str) -> Option<Self> {
        let (text, inclusive) = match text.strip_prefix('(') {
            Some(rest) => (rest, false),
            None => (text, true),
        };
        let value: f64 = text.parse().ok()?;
        if value.is_nan() {
            return None;
        }
        Some(Self { value, inclusive })
    }

    fn admits_from_below(&self, score: f64) -> bool {
        if self.inclusive {
            score >= self.value
        } else {
            score > self.value
        }
    }

    fn admits_from_above(&self, score: f64) -> bool {
        if self.inclusive {
            score <= self.value
        } else {
            score < self.value
        }
    }
}

/// Resulting-NaN error, worded like the Redis reply.
pub const NAN_SCORE: &str = "ERR resulting score is not a number (NaN)";

#[derive(Debug, Default, Clone)]
pub struct SortedSetData {
    scores: HashMap<Bytes, f64>,
    order: BTreeSet<(Score, Bytes)>,
}

impl SortedSetData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Inserts or re-scores `member`. Returns true if it was not present.
    pub fn insert(&mut self, member: Bytes, score: f64) -> bool {
        let score = Score::new(score);
        let is_new = match self.scores.insert(member.clone(), score.0) {
            Some(old) => {
                self.order.remove(&(Score::new(old), member.clone()));
                false
            }
            None => true,
        };
        self.order.insert((score, member));
        is_new
    }

    /// Adds `delta` to the member's score, starting from 0 if absent.
    pub fn increment(&mut self, member: Bytes, delta: f64) -> Result<f64, &'static str> {
        let current = self.scores.get(&member).copied().unwrap_or(0.0);
        let next = current + delta;
        if next.is_nan() {
            return Err(NAN_SCORE);
        }
        self.insert(member, next);
        Ok(next + 0.0)
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove_entry(member) {
            Some((member, score)) => {
                self.order.remove(&(Score::new(score), member));
                true
            }
            None => false,
        }
    }

    pub fn count(&self, min: ScoreBound, max: ScoreBound) -> usize {
        self.order
            .iter()
            .filter(|(score, _)| min.admits_from_below(score.0) && max.admits_from_above(score.0))
            .count()
    }

    /// 0-based position of `member`, counted from the lowest score, or from
    /// the highest when `reverse` is set.
    pub fn rank(&self, member: &[u8], reverse: bool) -> Option<usize> {
        let score = Score::new(*self.scores.get(member)?);
        let below = self.order.range(..(score, Bytes::copy_from_slice(member))).count();
        Some(if reverse {
            self.len() - 1 - below
        } else {
            below
        })
    }

    /// Members with ranks in `[start, stop]`. Negative indices count from
    /// the end, out-of-range indices are clamped.
    pub fn range_by_rank(&self, start: i64, stop: i64, reverse: bool) -> Vec<(Bytes, f64)> {
        let len = self.len() as i64;

        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

        if start > stop || start >= len {
            return Vec::new();
        }

        let take = (stop - start + 1) as usize;
        self.ordered(reverse)
            .skip(start as usize)
            .take(take)
            .collect()
    }

    /// Members with scores in `[min, max]` (per-bound inclusivity), in the
    /// requested direction, then paged by `offset`/`count`. A negative
    /// `count` returns everything after `offset`; a negative `offset`
    /// returns nothing.
    pub fn range_by_score(
        &self,
        min: ScoreBound,
        max: ScoreBound,
        reverse: bool,
        offset: i64,
        count: i64,
    ) -> Vec<(Bytes, f64)> {
        if offset < 0 {
            return Vec::new();
        }
        let take = if count < 0 {
            usize::MAX
        } else {
            usize::try_from(count).unwrap_or(usize::MAX)
        };

        self.ordered(reverse)
            .filter(|(_, score)| min.admits_from_below(*score) && max.admits_from_above(*score))
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(take)
            .collect()
    }

    fn ordered(&self, reverse: bool) -> Box<dyn Iterator<Item = (Bytes, f64)> + '_> {
        let pairs = |(score, member): &(Score, Bytes)| (member.clone(), score.0);
        if reverse {
            Box::new(self.order.iter().rev().map(pairs))
        } else {
            Box::new(self.order.iter().map(pairs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> SortedSetData {
        let mut set = SortedSetData::new();
        set.insert(Bytes::from("a"), 1.0);
        set.insert(Bytes::from("b"), 2.0);
        set.insert(Bytes::from("c"), 3.0);
        set
    }

    fn members(pairs: Vec<(Bytes, f64)>) -> Vec<String> {
        pairs
            .into_iter()
            .map(|(m, _)| String::from_utf8(m.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_insert_and_rescore() {
        let mut set = abc();
        assert!(!set.insert(Bytes::from("a"), 10.0));
        assert_eq!(set.len(), 3);
        assert_eq!(set.score(b"a"), Some(10.0));
        assert_eq!(set.rank(b"a", false), Some(2));
    }

    #[test]
    fn test_ties_break_by_member() {
        let mut set = SortedSetData::new();
        set.insert(Bytes::from("b"), 1.0);
        set.insert(Bytes::from("a"), 1.0);
        set.insert(Bytes::from("c"), 1.0);
        assert_eq!(members(set.range_by_rank(0, -1, false)), ["a", "b", "c"]);
        assert_eq!(members(set.range_by_rank(0, -1, true)), ["c", "b", "a"]);
    }

    #[test]
    fn test_negative_zero_equals_zero() {
        let mut set = SortedSetData::new();
        set.insert(Bytes::from("x"), -0.0);
        set.insert(Bytes::from("y"), 0.0);
        assert_eq!(set.count(ScoreBound::inclusive(0.0), ScoreBound::inclusive(0.0)), 2);
        assert!(set.remove(b"x"));
        assert!(set.remove(b"y"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_increment() {
        let mut set = abc();
        assert_eq!(set.increment(Bytes::from("a"), 5.0), Ok(6.0));
        assert_eq!(set.increment(Bytes::from("new"), 2.5), Ok(2.5));
        assert_eq!(set.rank(b"a", false), Some(3));

        set.insert(Bytes::from("inf"), f64::INFINITY);
        assert_eq!(
            set.increment(Bytes::from("inf"), f64::NEG_INFINITY),
            Err(NAN_SCORE)
        );
        assert_eq!(set.score(b"inf"), Some(f64::INFINITY));
    }

    #[test]
    fn test_rank() {
        let set = abc();
        assert_eq!(set.rank(b"a", false), Some(0));
        assert_eq!(set.rank(b"a", true), Some(2));
        assert_eq!(set.rank(b"c", true), Some(0));
        assert_eq!(set.rank(b"zz", false), None);
    }

    #[test]
    fn test_range_by_rank_indices() {
        let set = abc();
        assert_eq!(members(set.range_by_rank(0, -1, false)), ["a", "b", "c"]);
        assert_eq!(members(set.range_by_rank(-2, -1, false)), ["b", "c"]);
        assert_eq!(members(set.range_by_rank(1, 100, false)), ["b", "c"]);
        assert_eq!(members(set.range_by_rank(-100, 0, false)), ["a"]);
        assert!(set.range_by_rank(2, 1, false).is_empty());
        assert!(set.range_by_rank(5, 10, false).is_empty());
        assert!(SortedSetData::new().range_by_rank(0, -1, false).is_empty());
    }

    #[test]
    fn test_range_by_score_bounds() {
        let set = abc();
        let all = |reverse| {
            set.range_by_score(
                ScoreBound::inclusive(f64::NEG_INFINITY),
                ScoreBound::inclusive(f64::INFINITY),
                reverse,
                0,
                -1,
            )
        };
        assert_eq!(members(all(false)), ["a", "b", "c"]);
        assert_eq!(members(all(true)), ["c", "b", "a"]);

        let half_open = set.range_by_score(
            ScoreBound::inclusive(2.0),
            ScoreBound::exclusive(3.0),
            false,
            0,
            -1,
        );
        assert_eq!(members(half_open), ["b"]);
    }

    #[test]
    fn test_range_by_score_paging() {
        let set = abc();
        let min = ScoreBound::inclusive(f64::NEG_INFINITY);
        let max = ScoreBound::inclusive(f64::INFINITY);
        assert_eq!(members(set.range_by_score(min, max, false, 1, 1)), ["b"]);
        assert_eq!(members(set.range_by_score(min, max, true, 1, i64::MAX)), ["b", "a"]);
        assert!(set.range_by_score(min, max, false, -1, 2).is_empty());
        assert!(set.range_by_score(min, max, false, 0, 0).is_empty());
    }

    #[test]
    fn test_parse_bound() {
        assert_eq!(ScoreBound::parse("1.5"), Some(ScoreBound::inclusive(1.5)));
        assert_eq!(ScoreBound::parse("(3"), Some(ScoreBound::exclusive(3.0)));
        assert_eq!(
            ScoreBound::parse("-inf"),
            Some(ScoreBound::inclusive(f64::NEG_INFINITY))
        );
        assert_eq!(
            ScoreBound::parse("+inf"),
            Some(ScoreBound::inclusive(f64::INFINITY))
        );
        assert_eq!(ScoreBound::parse("nan"), None);
        assert_eq!(ScoreBound::parse("abc"), None);
    }
}
