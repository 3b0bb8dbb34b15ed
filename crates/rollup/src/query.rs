//! Query Planner: tier selection, raw/tier stitching, and re-aggregation
//! for `query_range` and `query_instant`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tsdb_core::error::Result;
use tsdb_core::time::align_floor;
use tsdb_core::types::{Aggregate, BucketAggregates, LabelSet, Matcher, SeriesId, Tier};
use tsdb_meta::{codec::chunk, SeriesRegistry};
use tsdb_shardstore::ShardStore;

/// One series' latest known point, for instant queries.
#[derive(Debug, Clone, PartialEq)]
pub struct InstantPoint {
    /// Matching series.
    pub series_id: SeriesId,
    /// Its label set.
    pub labels: LabelSet,
    /// Timestamp of the latest known sample.
    pub ts: i64,
    /// Its value.
    pub value: f64,
}

/// Everything the planner needs to reach a shard's data: the per-shard
/// stores plus a callback into the write path's live pending snapshot
/// for the currently open window.
pub struct QueryPlanner<'a> {
    /// Per-shard durable stores, indexed by shard index.
    pub shards: &'a [Arc<ShardStore>],
    /// Tier schema, ascending by resolution.
    pub schema: &'a [Tier],
    /// Raw segment window width, seconds.
    pub segment_duration: i64,
    /// Reads the open window's pending points for `(shard, series_id)`,
    /// if any, sorted ascending by timestamp.
    pub pending: &'a (dyn Fn(usize, SeriesId) -> Option<Vec<(i64, f64)>> + Sync),
}

impl<'a> QueryPlanner<'a> {
    /// Answer `query_range`: resolve matching series, pick a source
    /// tier, stitch in any data newer than that tier's watermark, and
    /// return `(bucket_start, value)` pairs for the requested aggregate,
    /// combined across every matching series.
    pub fn query_range(
        &self,
        registry: &SeriesRegistry,
        metric: &str,
        matchers: &[Matcher],
        from: i64,
        to: i64,
        step: i64,
        aggregator: Aggregate,
        shard_count: usize,
        now: i64,
    ) -> Result<Vec<(i64, f64)>> {
        let series_ids = registry.resolve(metric, matchers);
        if series_ids.is_empty() {
            return Ok(Vec::new());
        }

        let tier = select_tier(self.schema, step, from, now);
        let wanted: Vec<Aggregate> = tier.map(|t| t.aggregates.clone()).unwrap_or_else(|| Aggregate::ALL.to_vec());

        let mut per_series: Vec<BTreeMap<i64, BucketAggregates>> = Vec::with_capacity(series_ids.len());
        for series_id in &series_ids {
            let shard_index = tsdb_meta::shard_of(*series_id, shard_count);
            let store = &self.shards[shard_index];
            let buckets = self.read_series_buckets(store, shard_index, *series_id, tier, from, to, step, &wanted)?;
            per_series.push(buckets);
        }

        Ok(combine_across_series(&per_series, &wanted, aggregator))
    }

    /// Gather one series' bucket aggregates over `[from, to)`, sourcing
    /// from the selected tier's chunks and stitching raw data (sealed
    /// plus pending) for anything newer than the tier's coverage.
    fn read_series_buckets(
        &self,
        store: &ShardStore,
        shard_index: usize,
        series_id: SeriesId,
        tier: Option<&Tier>,
        from: i64,
        to: i64,
        step: i64,
        wanted: &[Aggregate],
    ) -> Result<BTreeMap<i64, BucketAggregates>> {
        let mut buckets: BTreeMap<i64, BucketAggregates> = BTreeMap::new();
        let mut covered_to = from;

        if let Some(tier) = tier {
            let entries = store.tier_index(&tier.name)?;
            for entry in entries.iter().filter(|e| e.series_id == series_id && e.chunk_end > from && e.chunk_start < to) {
                let Some(blob) = store.read_chunk(&tier.name, series_id, entry.chunk_start)? else { continue };
                for bucket in chunk::decode(&blob)? {
                    if bucket.bucket_start >= from && bucket.bucket_start < to {
                        buckets.insert(bucket.bucket_start, bucket.aggregates);
                    }
                }
                covered_to = covered_to.max(entry.chunk_end);
            }
            covered_to = covered_to.min(to);
        }

        if covered_to < to {
            let raw_points = self.read_raw_with_pending(store, shard_index, series_id, covered_to, to)?;
            let group_width = tier.map(|t| step.max(t.resolution_seconds)).unwrap_or(step).max(1);
            for (bucket_start, aggregates) in raw_to_buckets(&raw_points, group_width, wanted) {
                buckets.insert(bucket_start, aggregates);
            }
        }

        let resolution = tier.map(|t| t.resolution_seconds).unwrap_or(step);
        if resolution < step {
            Ok(regroup(buckets, step, wanted))
        } else {
            Ok(buckets)
        }
    }

    /// Raw points for `series_id` in `[from, to)`, merging sealed
    /// segments with the open window's pending snapshot (last-write-wins
    /// on a timestamp collision, since the pending copy is always at
    /// least as fresh).
    fn read_raw_with_pending(
        &self,
        store: &ShardStore,
        shard_index: usize,
        series_id: SeriesId,
        from: i64,
        to: i64,
    ) -> Result<Vec<(i64, f64)>> {
        let mut by_ts: BTreeMap<i64, f64> = store
            .read_raw(series_id, from, to)?
            .into_iter()
            .collect();
        if let Some(pending) = (self.pending)(shard_index, series_id) {
            for (ts, value) in pending {
                if ts >= from && ts < to {
                    by_ts.insert(ts, value);
                }
            }
        }
        Ok(by_ts.into_iter().collect())
    }

    /// Answer `query_instant`: the latest known point at or before `at`
    /// (or overall latest, if `at` is `None`) per matching series,
    /// preferring the open window's pending copy over sealed segments.
    pub fn query_instant(
        &self,
        registry: &SeriesRegistry,
        metric: &str,
        matchers: &[Matcher],
        shard_count: usize,
        at: Option<i64>,
    ) -> Result<Vec<InstantPoint>> {
        let mut out = Vec::new();
        for series_id in registry.resolve(metric, matchers) {
            let shard_index = tsdb_meta::shard_of(series_id, shard_count);
            let store = &self.shards[shard_index];

            let mut latest: Option<(i64, f64)> = (self.pending)(shard_index, series_id).and_then(|points| {
                points.into_iter().filter(|(ts, _)| at.map_or(true, |cutoff| *ts <= cutoff)).max_by_key(|(ts, _)| *ts)
            });

            if latest.is_none() {
                for window_start in store.sealed_windows().into_iter().rev() {
                    if at.map_or(false, |cutoff| window_start > cutoff) {
                        continue;
                    }
                    let points = store.read_raw(series_id, window_start, window_start + self.segment_duration)?;
                    if let Some(point) =
                        points.into_iter().filter(|(ts, _)| at.map_or(true, |cutoff| *ts <= cutoff)).max_by_key(|(ts, _)| *ts)
                    {
                        latest = Some(point);
                        break;
                    }
                }
            }

            if let (Some((ts, value)), Some(record)) = (latest, registry.get(series_id)) {
                out.push(InstantPoint { series_id, labels: record.labels, ts, value });
            }
        }
        Ok(out)
    }
}

/// Select the coarsest tier whose resolution is `<= step` and whose
/// retention would still cover `from` as of `now`; `None` means raw.
fn select_tier<'a>(schema: &'a [Tier], step: i64, from: i64, now: i64) -> Option<&'a Tier> {
    schema
        .iter()
        .filter(|t| t.resolution_seconds <= step)
        .filter(|t| t.retention_seconds.map_or(true, |r| now - r <= from))
        .max_by_key(|t| t.resolution_seconds)
}

/// Group raw `(ts, value)` samples into `width`-aligned buckets.
fn raw_to_buckets(points: &[(i64, f64)], width: i64, wanted: &[Aggregate]) -> Vec<(i64, BucketAggregates)> {
    let mut grouped: BTreeMap<i64, Vec<(i64, f64)>> = BTreeMap::new();
    for (ts, value) in points {
        grouped.entry(align_floor(*ts, width)).or_default().push((*ts, *value));
    }
    grouped
        .into_iter()
        .map(|(start, samples)| (start, BucketAggregates::from_raw(&samples, wanted)))
        .collect()
}

/// Re-aggregate already-bucketed data onto a coarser `step` grid.
fn regroup(buckets: BTreeMap<i64, BucketAggregates>, step: i64, wanted: &[Aggregate]) -> BTreeMap<i64, BucketAggregates> {
    let mut grouped: BTreeMap<i64, Vec<BucketAggregates>> = BTreeMap::new();
    for (start, aggregates) in buckets {
        grouped.entry(align_floor(start, step)).or_default().push(aggregates);
    }
    grouped
        .into_iter()
        .map(|(start, inputs)| (start, BucketAggregates::combine(&inputs, wanted)))
        .collect()
}

/// Combine per-series bucket maps into the single requested scalar per
/// bucket start, across every series that has data for that bucket.
fn combine_across_series(
    per_series: &[BTreeMap<i64, BucketAggregates>],
    wanted: &[Aggregate],
    aggregator: Aggregate,
) -> Vec<(i64, f64)> {
    let starts: BTreeSet<i64> = per_series.iter().flat_map(|m| m.keys().copied()).collect();
    let mut out = Vec::with_capacity(starts.len());
    for start in starts {
        let inputs: Vec<BucketAggregates> = per_series.iter().filter_map(|m| m.get(&start).copied()).collect();
        let combined = BucketAggregates::combine(&inputs, wanted);
        if let Some(value) = combined.get(aggregator) {
            out.push((start, value));
        }
    }
    out
}
