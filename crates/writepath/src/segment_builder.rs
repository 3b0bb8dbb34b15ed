//! Turns a stream of points into sealed segments for one shard.
//!
//! Owned exclusively by that shard's worker thread; no internal locking
//! is needed because only one thread ever calls these methods.

use rustc_hash::FxHashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tsdb_core::error::Result;
use tsdb_core::time::window_start;
use tsdb_core::types::{Point, SeriesId};
use tsdb_meta::codec::gorilla;
use tsdb_shardstore::{format::WalRecord, DurabilityMode, ShardStore, WalConfig};

/// Configuration the builder needs beyond the shard store itself.
#[derive(Debug, Clone, Copy)]
pub struct BuilderConfig {
    /// Raw segment window width, seconds.
    pub window_duration: i64,
    /// WAL checkpoint cadence.
    pub pending_flush_interval: Duration,
    /// Durability mode applied to the open window's WAL.
    pub durability: DurabilityMode,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            window_duration: 14_400,
            pending_flush_interval: Duration::from_secs(60),
            durability: DurabilityMode::default(),
        }
    }
}

/// Turns a stream of `(series_id, ts, value)` into sealed `.seg` files,
/// checkpointing the currently-open window to the shard's WAL.
pub struct SegmentBuilder {
    config: BuilderConfig,
    current_window: i64,
    pending: FxHashMap<SeriesId, Vec<(i64, f64)>>,
    last_checkpoint: Instant,
}

impl SegmentBuilder {
    /// Start a fresh builder with no pending data, for window `current_window`.
    pub fn new(config: BuilderConfig, current_window: i64) -> Self {
        SegmentBuilder { config, current_window, pending: FxHashMap::default(), last_checkpoint: Instant::now() }
    }

    /// Rebuild a builder's pending map from recovered WAL records. A
    /// series may have checkpointed more than once; later records in
    /// scan order are supersets of earlier ones, so only the last record
    /// per series is kept.
    pub fn recover(config: BuilderConfig, current_window: i64, records: Vec<WalRecord>) -> Result<Self> {
        let mut latest: FxHashMap<SeriesId, &WalRecord> = FxHashMap::default();
        for record in &records {
            latest.insert(record.series_id, record);
        }
        let mut pending = FxHashMap::default();
        for (series_id, record) in latest {
            let points = gorilla::decode(&record.data)?;
            pending.insert(series_id, points);
        }
        info!(series = pending.len(), "recovered pending points from WAL");
        Ok(SegmentBuilder { config, current_window, pending, last_checkpoint: Instant::now() })
    }

    /// Append a batch of points, all belonging to this shard, closing and
    /// sealing the open window first if any point falls past it.
    pub fn ingest_batch(&mut self, store: &ShardStore, points: &[Point]) -> Result<()> {
        for point in points {
            if point.ts >= self.current_window + self.config.window_duration {
                self.close_window(store)?;
            }
            self.pending.entry(point.series_id).or_default().push((point.ts, point.value));
        }
        Ok(())
    }

    /// Emit a WAL checkpoint for every non-empty pending series, if the
    /// configured interval has elapsed. The pending map itself is left
    /// untouched — it remains the authoritative in-memory copy for reads
    /// against the open window.
    pub fn maybe_checkpoint(&mut self, store: &ShardStore) -> Result<bool> {
        if self.last_checkpoint.elapsed() < self.config.pending_flush_interval {
            return Ok(false);
        }
        self.checkpoint(store)?;
        Ok(true)
    }

    /// Force a WAL checkpoint regardless of the elapsed interval.
    pub fn checkpoint(&mut self, store: &ShardStore) -> Result<()> {
        for (series_id, points) in &self.pending {
            if points.is_empty() {
                continue;
            }
            let blob = gorilla::encode(points);
            let record = WalRecord {
                series_id: *series_id,
                start_time: self.current_window,
                end_time: self.current_window + self.config.window_duration,
                point_count: points.len() as u32,
                data: blob,
            };
            store.wal_append(&record)?;
        }
        self.last_checkpoint = Instant::now();
        debug!(window = self.current_window, series = self.pending.len(), "WAL checkpoint written");
        Ok(())
    }

    /// Snapshot every pending series into a segment blob, ask the shard
    /// store to seal the window, and advance to the next one.
    pub fn close_window(&mut self, store: &ShardStore) -> Result<()> {
        let mut records = Vec::with_capacity(self.pending.len());
        for (series_id, points) in &self.pending {
            if points.is_empty() {
                continue;
            }
            let mut sorted = points.clone();
            sorted.sort_by_key(|(ts, _)| *ts);
            let blob = gorilla::encode(&sorted);
            records.push(tsdb_shardstore::format::SegmentRecord {
                series_id: *series_id,
                start_time: self.current_window,
                end_time: self.current_window + self.config.window_duration,
                point_count: sorted.len() as u32,
                payload: blob,
            });
        }

        store.seal_window(self.current_window, records)?;
        store.reopen_wal(self.config.durability, WalConfig::new())?;

        self.current_window += self.config.window_duration;
        self.pending.clear();
        self.last_checkpoint = Instant::now();
        info!(window = self.current_window, "sealed window and opened next");
        Ok(())
    }

    /// The window currently open for writes.
    pub fn current_window(&self) -> i64 {
        self.current_window
    }

    /// Pending points for one series in the open window, if any, sorted
    /// ascending by timestamp. Used by instant queries.
    pub fn pending_points(&self, series_id: SeriesId) -> Option<Vec<(i64, f64)>> {
        self.pending.get(&series_id).map(|points| {
            let mut sorted = points.clone();
            sorted.sort_by_key(|(ts, _)| *ts);
            sorted
        })
    }

    /// A full copy of the pending map, for publishing a read snapshot to
    /// the query planner.
    pub fn pending_snapshot(&self) -> FxHashMap<SeriesId, Vec<(i64, f64)>> {
        self.pending.clone()
    }
}

/// The window start containing `ts`, per [`BuilderConfig::window_duration`].
pub fn window_for(ts: i64, config: &BuilderConfig) -> i64 {
    window_start(ts, config.window_duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn point(series: u64, ts: i64, value: f64) -> Point {
        Point { series_id: SeriesId(series), ts, value }
    }

    #[test]
    fn ingest_then_checkpoint_then_close_seals_segment() {
        let dir = tempdir().unwrap();
        let (store, _) = ShardStore::open(dir.path(), 0, &["hourly"], DurabilityMode::Strict, WalConfig::new()).unwrap();
        let config = BuilderConfig { window_duration: 100, pending_flush_interval: Duration::from_secs(0), durability: DurabilityMode::Strict };
        let mut builder = SegmentBuilder::new(config, 0);

        builder.ingest_batch(&store, &[point(1, 10, 1.0), point(1, 20, 2.0)]).unwrap();
        builder.checkpoint(&store).unwrap();

        builder.ingest_batch(&store, &[point(1, 150, 3.0)]).unwrap();
        assert_eq!(builder.current_window(), 100);
        assert_eq!(store.sealed_windows(), vec![0]);

        let points = store.read_raw(SeriesId(1), 0, 100).unwrap();
        assert_eq!(points, vec![(10, 1.0), (20, 2.0)]);
    }

    #[test]
    fn recover_keeps_only_latest_record_per_series() {
        let config = BuilderConfig::default();
        let early = gorilla::encode(&[(1, 1.0)]);
        let later = gorilla::encode(&[(1, 1.0), (2, 2.0)]);
        let records = vec![
            WalRecord { series_id: SeriesId(1), start_time: 0, end_time: 100, point_count: 1, data: early },
            WalRecord { series_id: SeriesId(1), start_time: 0, end_time: 100, point_count: 2, data: later },
        ];
        let builder = SegmentBuilder::recover(config, 0, records).unwrap();
        assert_eq!(builder.pending_points(SeriesId(1)).unwrap().len(), 2);
    }
}
