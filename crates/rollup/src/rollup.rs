//! One rollup pass for a single tier on a single shard: advance the
//! tier's watermark and merge newly-computed buckets into tier chunks.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use tsdb_core::error::Result;
use tsdb_core::time::{bucket_start, chunk_start};
use tsdb_core::types::{Bucket, BucketAggregates, Tier};
use tsdb_meta::codec::chunk;
use tsdb_shardstore::ShardStore;

/// Counters from one rollup pass, surfaced via `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RollupStats {
    /// Series touched this pass.
    pub series_rolled_up: usize,
    /// Distinct `(series, chunk)` pairs written.
    pub chunks_written: usize,
    /// New watermark after the pass (unchanged if nothing was done).
    pub watermark: i64,
}

/// Default margin subtracted from `now` before computing `safe_to`, so
/// points arriving slightly out of order are still captured by the pass
/// that would otherwise have rolled up their bucket.
pub const DEFAULT_SAFETY_MARGIN_SECONDS: i64 = 60;

/// Run one pass of tier `tier` (at `tier_index` in the schema) against
/// shard `store`, sourcing from raw segments directly.
///
/// Source data is always the raw segment files: every tier in this
/// implementation is computed straight from raw points rather than
/// chained off a coarser tier, which keeps one pass free of
/// cross-tier sequencing.
pub fn run_pass(store: &ShardStore, tier_index: usize, tier: &Tier, now: i64) -> Result<RollupStats> {
    run_pass_with_margin(store, tier_index, tier, now, DEFAULT_SAFETY_MARGIN_SECONDS)
}

/// [`run_pass`] with an explicit safety margin, mainly for tests.
pub fn run_pass_with_margin(
    store: &ShardStore,
    tier_index: usize,
    tier: &Tier,
    now: i64,
    safety_margin: i64,
) -> Result<RollupStats> {
    let watermarks = store.read_watermarks()?;
    let wm = watermarks.get(tier_index).copied().unwrap_or(0);
    let safe_to = tsdb_core::time::align_floor(now - safety_margin, tier.resolution_seconds);

    if safe_to <= wm {
        return Ok(RollupStats { watermark: wm, ..Default::default() });
    }

    let series_ids = store.series_ids_overlapping(wm, safe_to);
    let mut stats = RollupStats { watermark: wm, ..Default::default() };

    for series_id in series_ids {
        let points = store.read_raw(series_id, wm, safe_to)?;
        if points.is_empty() {
            continue;
        }

        let mut by_bucket: BTreeMap<i64, Vec<(i64, f64)>> = BTreeMap::new();
        for (ts, value) in points {
            by_bucket.entry(bucket_start(ts, tier.resolution_seconds)).or_default().push((ts, value));
        }

        let mut by_chunk: BTreeMap<i64, Vec<Bucket>> = BTreeMap::new();
        for (start, samples) in by_bucket {
            let aggregates = BucketAggregates::from_raw(&samples, &tier.aggregates);
            let chunk_key = chunk_start(start, tier.chunk_seconds);
            by_chunk.entry(chunk_key).or_default().push(Bucket { bucket_start: start, aggregates });
        }

        for (chunk_key, buckets) in by_chunk {
            let chunk_end = chunk_key + tier.chunk_seconds;
            let existing = store.read_chunk(&tier.name, series_id, chunk_key)?;
            let blob = match existing {
                Some(blob) => chunk::merge(&blob, &buckets, tier.resolution_seconds, &tier.aggregates)?,
                None => chunk::encode(&buckets, tier.resolution_seconds, &tier.aggregates),
            };
            store.write_chunk(&tier.name, series_id, chunk_key, chunk_end, &blob)?;
            stats.chunks_written += 1;
        }
        stats.series_rolled_up += 1;
    }

    store.write_watermarks(&{
        let mut wms = watermarks;
        if wms.len() <= tier_index {
            wms.resize(tier_index + 1, 0);
        }
        wms[tier_index] = safe_to;
        wms
    })?;
    stats.watermark = safe_to;

    debug!(tier = %tier.name, series = stats.series_rolled_up, chunks = stats.chunks_written, watermark = safe_to, "rollup pass complete");
    Ok(stats)
}

/// Run every tier's pass against every shard, one pass per `(shard,
/// tier)` pair. Pairs are independent — distinct shards never share a
/// file, and a shard's tiers live in separate chunk files — so they run
/// across a rayon thread pool rather than sequentially.
///
/// A pair whose pass errors is logged and contributes no stats, rather
/// than aborting the other pairs; a single corrupt chunk must not stall
/// rollup for the rest of the store.
pub fn run_all_passes(shards: &[Arc<ShardStore>], schema: &[Tier], now: i64) -> Vec<RollupStats> {
    let pairs: Vec<(usize, usize)> =
        (0..shards.len()).flat_map(|s| (0..schema.len()).map(move |t| (s, t))).collect();

    pairs
        .par_iter()
        .filter_map(|&(shard_index, tier_index)| {
            let store = &shards[shard_index];
            let tier = &schema[tier_index];
            match run_pass(store, tier_index, tier, now) {
                Ok(stats) => Some(stats),
                Err(e) => {
                    tracing::error!(shard = shard_index, tier = %tier.name, error = %e, "rollup pass failed");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tsdb_core::types::{Aggregate, SeriesId};
    use tsdb_shardstore::{format::SegmentRecord, DurabilityMode, WalConfig};

    fn hourly_tier() -> Tier {
        Tier {
            name: "hourly".into(),
            resolution_seconds: 3600,
            aggregates: vec![Aggregate::Avg, Aggregate::Sum, Aggregate::Count, Aggregate::Min, Aggregate::Max, Aggregate::Last],
            chunk_seconds: 24 * 3600,
            retention_seconds: Some(30 * 86_400),
        }
    }

    #[test]
    fn rolls_up_raw_segment_into_hourly_bucket() {
        let dir = tempdir().unwrap();
        let (store, _) = ShardStore::open(dir.path(), 0, &["hourly"], DurabilityMode::Strict, WalConfig::new()).unwrap();

        let points: Vec<(i64, f64)> = (0..3600).map(|i| (1_700_000_000 + i, (i % 100) as f64)).collect();
        let blob = tsdb_meta::codec::gorilla::encode(&points);
        store
            .seal_window(
                1_700_000_000,
                vec![SegmentRecord {
                    series_id: SeriesId(1),
                    start_time: 1_700_000_000,
                    end_time: 1_700_003_600,
                    point_count: 3600,
                    payload: blob,
                }],
            )
            .unwrap();

        let tier = hourly_tier();
        let stats = run_pass_with_margin(&store, 0, &tier, 1_700_003_700, 0).unwrap();
        assert_eq!(stats.series_rolled_up, 1);
        assert_eq!(stats.watermark, 1_700_003_600);

        let blob = store.read_chunk("hourly", SeriesId(1), 1_699_920_000).unwrap().unwrap();
        let buckets = chunk::decode(&blob).unwrap();
        assert_eq!(buckets.len(), 1);
        let avg = buckets[0].aggregates.avg.unwrap();
        assert!((avg - 49.5).abs() < 1e-9, "avg was {avg}");
    }

    #[test]
    fn second_pass_is_a_no_op_once_caught_up() {
        let dir = tempdir().unwrap();
        let (store, _) = ShardStore::open(dir.path(), 0, &["hourly"], DurabilityMode::Strict, WalConfig::new()).unwrap();
        let tier = hourly_tier();
        let first = run_pass_with_margin(&store, 0, &tier, 1_700_003_700, 0).unwrap();
        let second = run_pass_with_margin(&store, 0, &tier, 1_700_003_700, 0).unwrap();
        assert_eq!(first.watermark, second.watermark);
        assert_eq!(second.series_rolled_up, 0);
    }

    #[test]
    fn late_point_updates_already_rolled_up_bucket() {
        let dir = tempdir().unwrap();
        let (store, _) = ShardStore::open(dir.path(), 0, &["hourly"], DurabilityMode::Strict, WalConfig::new()).unwrap();
        let tier = hourly_tier();

        let blob = tsdb_meta::codec::gorilla::encode(&[(1_700_000_000, 10.0)]);
        store
            .seal_window(
                1_700_000_000,
                vec![SegmentRecord { series_id: SeriesId(1), start_time: 1_700_000_000, end_time: 1_700_003_600, point_count: 1, payload: blob }],
            )
            .unwrap();
        run_pass_with_margin(&store, 0, &tier, 1_700_003_700, 0).unwrap();

        // A late point (a different timestamp within the same already
        // rolled-up bucket) lands in a second segment; a later pass
        // (after resetting the watermark back, simulating the safety
        // margin catching it) must fold it into the same bucket.
        let late_blob = tsdb_meta::codec::gorilla::encode(&[(1_700_000_001, 999.0)]);
        store
            .seal_window(
                1_700_003_600,
                vec![SegmentRecord { series_id: SeriesId(1), start_time: 1_700_000_000, end_time: 1_700_003_600, point_count: 1, payload: late_blob }],
            )
            .unwrap();
        store.write_watermarks(&[1_700_000_000]).unwrap();
        run_pass_with_margin(&store, 0, &tier, 1_700_003_700, 0).unwrap();

        let blob = store.read_chunk("hourly", SeriesId(1), 1_699_920_000).unwrap().unwrap();
        let buckets = chunk::decode(&blob).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].aggregates.count, Some(2.0));
    }

    #[test]
    fn run_all_passes_covers_every_shard_and_tier() {
        let dir = tempdir().unwrap();
        let tier = hourly_tier();
        let mut shards = Vec::new();
        for shard_index in 0..2 {
            let (store, _) =
                ShardStore::open(dir.path(), shard_index, &["hourly"], DurabilityMode::Strict, WalConfig::new()).unwrap();
            let blob = tsdb_meta::codec::gorilla::encode(&[(1_700_000_000, 1.0)]);
            store
                .seal_window(
                    1_700_000_000,
                    vec![SegmentRecord { series_id: SeriesId(1), start_time: 1_700_000_000, end_time: 1_700_003_600, point_count: 1, payload: blob }],
                )
                .unwrap();
            shards.push(Arc::new(store));
        }

        let schema = vec![tier];
        let stats = run_all_passes(&shards, &schema, 1_700_003_700);
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.series_rolled_up == 1));
    }
}
