//! Series identity, points, tiers, buckets, and label matchers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable 64-bit surrogate for a `(metric, canonical_labels)` identity.
///
/// Assigned monotonically at first-seen and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesId(pub u64);

impl SeriesId {
    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Label set, kept in canonical (sorted-by-name) order.
///
/// Two label sets with the same entries always canonicalize to the same
/// fingerprint regardless of insertion order, since `BTreeMap` iterates
/// sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Build a label set from an iterator of `(name, value)` pairs.
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        LabelSet(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Iterate `(name, value)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Value for a label name, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no labels.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical byte fingerprint used as part of the registry's identity
    /// key: `name=value` pairs in sorted order, joined with `\x1f`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                buf.push(0x1f);
            }
            buf.extend_from_slice(k.as_bytes());
            buf.push(b'=');
            buf.extend_from_slice(v.as_bytes());
        }
        buf
    }

    /// Inverse of [`Self::canonical_bytes`], used to reload label sets
    /// from the registry's durable log.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return LabelSet::default();
        }
        let text = String::from_utf8_lossy(bytes);
        let pairs = text.split('\u{1f}').filter_map(|part| part.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())));
        LabelSet(pairs.collect())
    }
}

/// A single `(series_id, timestamp, value)` sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Series this sample belongs to.
    pub series_id: SeriesId,
    /// Seconds since the Unix epoch.
    pub ts: i64,
    /// Sample value.
    pub value: f64,
}

/// Label matcher operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    /// `name = value`
    Eq,
    /// `name != value`
    Neq,
    /// `name =~ value` (anchored regex)
    Re,
    /// `name !~ value` (anchored regex, negated)
    NotRe,
}

/// A single label predicate: `name op value`.
#[derive(Debug, Clone)]
pub struct Matcher {
    /// Label name to test.
    pub name: String,
    /// Comparison operator.
    pub op: MatchOp,
    /// Value or regex pattern to compare against.
    pub value: String,
}

impl Matcher {
    /// Construct an equality matcher.
    pub fn eq(name: impl Into<String>, value: impl Into<String>) -> Self {
        Matcher { name: name.into(), op: MatchOp::Eq, value: value.into() }
    }

    /// Evaluate this matcher against a label set. Regex matchers are
    /// anchored full-match (`^pattern$`).
    pub fn matches(&self, labels: &LabelSet) -> bool {
        let actual = labels.get(&self.name).unwrap_or("");
        match self.op {
            MatchOp::Eq => actual == self.value,
            MatchOp::Neq => actual != self.value,
            MatchOp::Re => Self::anchored(&self.value).map(|re| re.is_match(actual)).unwrap_or(false),
            MatchOp::NotRe => {
                !Self::anchored(&self.value).map(|re| re.is_match(actual)).unwrap_or(false)
            }
        }
    }

    fn anchored(pattern: &str) -> Option<Regex> {
        Regex::new(&format!("^(?:{})$", pattern)).ok()
    }
}

/// An aggregate kind computable over a bucket of raw points.
///
/// Fixed order `avg, min, max, count, sum, last` is the bit order used by
/// the chunk codec's aggregate mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Aggregate {
    /// Arithmetic mean.
    Avg = 0,
    /// Minimum.
    Min = 1,
    /// Maximum.
    Max = 2,
    /// Sample count.
    Count = 3,
    /// Sum.
    Sum = 4,
    /// Latest contributing value.
    Last = 5,
}

impl Aggregate {
    /// All aggregates in fixed bit order.
    pub const ALL: [Aggregate; 6] = [
        Aggregate::Avg,
        Aggregate::Min,
        Aggregate::Max,
        Aggregate::Count,
        Aggregate::Sum,
        Aggregate::Last,
    ];

    /// Bitmask position used by the chunk codec header.
    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Parse from a lowercase name (`"avg"`, `"min"`, ...).
    pub fn parse(s: &str) -> Option<Aggregate> {
        Some(match s {
            "avg" => Aggregate::Avg,
            "min" => Aggregate::Min,
            "max" => Aggregate::Max,
            "count" => Aggregate::Count,
            "sum" => Aggregate::Sum,
            "last" => Aggregate::Last,
            _ => return None,
        })
    }

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Aggregate::Avg => "avg",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::Count => "count",
            Aggregate::Sum => "sum",
            Aggregate::Last => "last",
        }
    }
}

/// A named rollup level.
#[derive(Debug, Clone)]
pub struct Tier {
    /// Tier name (e.g. `"hourly"`).
    pub name: String,
    /// Bucket width in seconds.
    pub resolution_seconds: i64,
    /// Aggregates computed for every bucket, in a fixed non-empty subset of
    /// [`Aggregate::ALL`].
    pub aggregates: Vec<Aggregate>,
    /// Width of one tier chunk file entry in seconds; a multiple of
    /// `resolution_seconds`.
    pub chunk_seconds: i64,
    /// Retention horizon, or `None` for "forever".
    pub retention_seconds: Option<i64>,
}

impl Tier {
    /// Bitmask of this tier's aggregates, matching the chunk codec header.
    pub fn aggregate_mask(&self) -> u8 {
        self.aggregates.iter().fold(0u8, |acc, a| acc | a.bit())
    }
}

/// One computed aggregate set for a `(series_id, tier, bucket_start)` key.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BucketAggregates {
    /// Arithmetic mean, if requested.
    pub avg: Option<f64>,
    /// Minimum, if requested.
    pub min: Option<f64>,
    /// Maximum, if requested.
    pub max: Option<f64>,
    /// Sample count, if requested.
    pub count: Option<f64>,
    /// Sum, if requested.
    pub sum: Option<f64>,
    /// Latest contributing value, if requested.
    pub last: Option<f64>,
}

impl BucketAggregates {
    /// Fetch a field by aggregate kind.
    pub fn get(&self, agg: Aggregate) -> Option<f64> {
        match agg {
            Aggregate::Avg => self.avg,
            Aggregate::Min => self.min,
            Aggregate::Max => self.max,
            Aggregate::Count => self.count,
            Aggregate::Sum => self.sum,
            Aggregate::Last => self.last,
        }
    }

    /// Set a field by aggregate kind.
    pub fn set(&mut self, agg: Aggregate, value: f64) {
        match agg {
            Aggregate::Avg => self.avg = Some(value),
            Aggregate::Min => self.min = Some(value),
            Aggregate::Max => self.max = Some(value),
            Aggregate::Count => self.count = Some(value),
            Aggregate::Sum => self.sum = Some(value),
            Aggregate::Last => self.last = Some(value),
        }
    }

    /// Compute a bucket's aggregate set from raw `(ts, value)` samples,
    /// ordered ascending by timestamp. `last` is the sample with the
    /// greatest timestamp.
    pub fn from_raw(samples: &[(i64, f64)], wanted: &[Aggregate]) -> Self {
        let mut out = BucketAggregates::default();
        if samples.is_empty() {
            return out;
        }
        let sum: f64 = samples.iter().map(|(_, v)| v).sum();
        let count = samples.len() as f64;
        let min = samples.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min);
        let max = samples.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max);
        let last = samples.iter().max_by_key(|(ts, _)| *ts).map(|(_, v)| *v).unwrap_or(0.0);
        for agg in wanted {
            match agg {
                Aggregate::Avg => out.avg = Some(sum / count),
                Aggregate::Min => out.min = Some(min),
                Aggregate::Max => out.max = Some(max),
                Aggregate::Count => out.count = Some(count),
                Aggregate::Sum => out.sum = Some(sum),
                Aggregate::Last => out.last = Some(last),
            }
        }
        out
    }

    /// Re-aggregate a set of already-computed bucket aggregates that all
    /// cover the same destination bucket, using the combiner rules from
    /// the rollup engine: `sum`/`min`/`max` combine pointwise, `count`
    /// sums, `avg = sum/count`, `last` takes the input with the latest
    /// contribution. Since individual inputs don't carry their own
    /// timestamp here, callers that need a precise `last` should pass
    /// inputs in chronological order; the final input's `last` wins.
    pub fn combine(inputs: &[BucketAggregates], wanted: &[Aggregate]) -> Self {
        let mut out = BucketAggregates::default();
        if inputs.is_empty() {
            return out;
        }
        let sum: Option<f64> = inputs.iter().map(|b| b.sum).fold(Some(0.0), |acc, v| {
            match (acc, v) {
                (Some(a), Some(v)) => Some(a + v),
                _ => None,
            }
        });
        let count: Option<f64> = inputs.iter().map(|b| b.count).fold(Some(0.0), |acc, v| {
            match (acc, v) {
                (Some(a), Some(v)) => Some(a + v),
                _ => None,
            }
        });
        let min = inputs.iter().filter_map(|b| b.min).fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.min(v)))
        });
        let max = inputs.iter().filter_map(|b| b.max).fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.max(v)))
        });
        let last = inputs.iter().rev().find_map(|b| b.last);
        for agg in wanted {
            match agg {
                Aggregate::Sum => out.sum = sum,
                Aggregate::Count => out.count = count,
                Aggregate::Avg => out.avg = match (sum, count) {
                    (Some(s), Some(c)) if c != 0.0 => Some(s / c),
                    _ => None,
                },
                Aggregate::Min => out.min = min,
                Aggregate::Max => out.max = max,
                Aggregate::Last => out.last = last,
            }
        }
        out
    }
}

/// One decoded or to-be-encoded bucket record.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// Start of the bucket's time interval, aligned to the tier's
    /// resolution.
    pub bucket_start: i64,
    /// Computed aggregate values for this bucket.
    pub aggregates: BucketAggregates,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_set_canonical_bytes_round_trip() {
        let original = LabelSet::new([("host", "a"), ("env", "prod")]);
        let restored = LabelSet::from_canonical_bytes(&original.canonical_bytes());
        assert_eq!(original, restored);
    }

    #[test]
    fn label_set_canonicalizes_regardless_of_insertion_order() {
        let a = LabelSet::new([("host", "a"), ("env", "prod")]);
        let b = LabelSet::new([("env", "prod"), ("host", "a")]);
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn matcher_eq_and_neq() {
        let labels = LabelSet::new([("host", "a")]);
        assert!(Matcher::eq("host", "a").matches(&labels));
        assert!(!Matcher::eq("host", "b").matches(&labels));
        let neq = Matcher { name: "host".into(), op: MatchOp::Neq, value: "b".into() };
        assert!(neq.matches(&labels));
    }

    #[test]
    fn matcher_regex_is_anchored() {
        let labels = LabelSet::new([("host", "abc")]);
        let re = Matcher { name: "host".into(), op: MatchOp::Re, value: "ab".into() };
        assert!(!re.matches(&labels), "partial match must not satisfy an anchored regex");
        let re_full = Matcher { name: "host".into(), op: MatchOp::Re, value: "abc".into() };
        assert!(re_full.matches(&labels));
    }

    #[test]
    fn bucket_aggregates_from_raw() {
        let samples = vec![(1, 10.0), (2, 20.0), (3, 5.0)];
        let b = BucketAggregates::from_raw(&samples, &Aggregate::ALL);
        assert_eq!(b.sum, Some(35.0));
        assert_eq!(b.count, Some(3.0));
        assert_eq!(b.min, Some(5.0));
        assert_eq!(b.max, Some(20.0));
        assert_eq!(b.last, Some(5.0));
        assert!((b.avg.unwrap() - 35.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn bucket_aggregates_combine_matches_math() {
        let a = BucketAggregates { sum: Some(10.0), count: Some(2.0), min: Some(1.0), max: Some(9.0), last: Some(9.0), avg: None };
        let b = BucketAggregates { sum: Some(5.0), count: Some(1.0), min: Some(5.0), max: Some(5.0), last: Some(5.0), avg: None };
        let combined = BucketAggregates::combine(&[a, b], &Aggregate::ALL);
        assert_eq!(combined.sum, Some(15.0));
        assert_eq!(combined.count, Some(3.0));
        assert_eq!(combined.min, Some(1.0));
        assert_eq!(combined.max, Some(9.0));
        assert_eq!(combined.last, Some(5.0));
        assert!((combined.avg.unwrap() - 5.0).abs() < 1e-9);
    }
}
