//! Periodic retention sweep for one shard: drop raw segments and tier
//! chunks fully older than their configured horizon.

use rayon::prelude::*;
use std::sync::Arc;
use tracing::info;
use tsdb_core::error::Result;
use tsdb_core::time::align_floor;
use tsdb_core::types::Tier;
use tsdb_shardstore::{RetentionStats, ShardStore};

/// Combined counters from a full sweep across raw plus every tier.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    /// Sealed raw segments removed.
    pub segments_deleted: usize,
    /// Tier chunk entries dropped (pending physical reclaim at the next
    /// compaction).
    pub chunk_entries_dropped: usize,
}

impl SweepStats {
    fn add(&mut self, other: RetentionStats) {
        self.segments_deleted += other.segments_deleted;
        self.chunk_entries_dropped += other.chunk_entries_dropped;
    }
}

/// Run one retention sweep against `store`: raw segments older than
/// `raw_retention_seconds`, then every tier in `schema` against its own
/// `retention_seconds` (tiers with `None` retention are left alone).
pub fn run_sweep(
    store: &ShardStore,
    segment_duration: i64,
    raw_retention_seconds: i64,
    schema: &[Tier],
    now: i64,
) -> Result<SweepStats> {
    let mut stats = SweepStats::default();

    let raw_cutoff = align_floor(now - raw_retention_seconds, segment_duration);
    stats.add(store.retain_raw(segment_duration, raw_cutoff)?);

    for tier in schema {
        let Some(retention_seconds) = tier.retention_seconds else { continue };
        let cutoff = align_floor(now - retention_seconds, tier.chunk_seconds);
        stats.add(store.retain_tier(&tier.name, cutoff)?);
    }

    if stats.segments_deleted > 0 || stats.chunk_entries_dropped > 0 {
        info!(
            segments = stats.segments_deleted,
            chunk_entries = stats.chunk_entries_dropped,
            "retention sweep reclaimed storage"
        );
    }
    Ok(stats)
}

/// Run [`run_sweep`] against every shard concurrently; shards never
/// share files, so there is no coordination needed between them. A
/// shard whose sweep errors is logged and contributes no stats.
pub fn run_sweep_all(
    shards: &[Arc<ShardStore>],
    segment_duration: i64,
    raw_retention_seconds: i64,
    schema: &[Tier],
    now: i64,
) -> Vec<SweepStats> {
    shards
        .par_iter()
        .enumerate()
        .filter_map(|(shard_index, store)| match run_sweep(store, segment_duration, raw_retention_seconds, schema, now) {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::error!(shard = shard_index, error = %e, "retention sweep failed");
                None
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
            aggregates: vec![Aggregate::Avg],
            chunk_seconds: 24 * 3600,
            retention_seconds: Some(2 * 24 * 3600),
        }
    }

    #[test]
    fn sweep_drops_fully_expired_raw_segment() {
        let dir = tempdir().unwrap();
        let (store, _) = ShardStore::open(dir.path(), 0, &["hourly"], DurabilityMode::Strict, WalConfig::new()).unwrap();
        let blob = tsdb_meta::codec::gorilla::encode(&[(0, 1.0)]);
        store
            .seal_window(0, vec![SegmentRecord { series_id: SeriesId(1), start_time: 0, end_time: 14_400, point_count: 1, payload: blob }])
            .unwrap();

        let schema = vec![hourly_tier()];
        let stats = run_sweep(&store, 14_400, 3600, &schema, 100_000).unwrap();
        assert_eq!(stats.segments_deleted, 1);
        assert!(store.sealed_windows().is_empty());
    }

    #[test]
    fn sweep_is_a_no_op_when_nothing_has_expired() {
        let dir = tempdir().unwrap();
        let (store, _) = ShardStore::open(dir.path(), 0, &["hourly"], DurabilityMode::Strict, WalConfig::new()).unwrap();
        let blob = tsdb_meta::codec::gorilla::encode(&[(0, 1.0)]);
        store
            .seal_window(0, vec![SegmentRecord { series_id: SeriesId(1), start_time: 0, end_time: 14_400, point_count: 1, payload: blob }])
            .unwrap();

        let schema = vec![hourly_tier()];
        let stats = run_sweep(&store, 14_400, 30 * 24 * 3600, &schema, 100_000).unwrap();
        assert_eq!(stats.segments_deleted, 0);
        assert_eq!(store.sealed_windows(), vec![0]);
    }

    #[test]
    fn sweep_all_covers_every_shard() {
        let dir = tempdir().unwrap();
        let mut shards = Vec::new();
        for shard_index in 0..2 {
            let (store, _) =
                ShardStore::open(dir.path(), shard_index, &["hourly"], DurabilityMode::Strict, WalConfig::new()).unwrap();
            let blob = tsdb_meta::codec::gorilla::encode(&[(0, 1.0)]);
            store
                .seal_window(0, vec![SegmentRecord { series_id: SeriesId(1), start_time: 0, end_time: 14_400, point_count: 1, payload: blob }])
                .unwrap();
            shards.push(Arc::new(store));
        }

        let schema = vec![hourly_tier()];
        let stats = run_sweep_all(&shards, 14_400, 3600, &schema, 100_000);
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.segments_deleted == 1));
    }
}
