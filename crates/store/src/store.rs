//! The top-level [`Store`] facade: open, write, query, and inspect an
//! embedded time-series database rooted at one `data_dir`.

use crate::info::{self, StoreInfo};
use crate::scheduler::{self, SchedulerHandle};
use std::sync::Arc;
use std::time::Duration;
use tsdb_core::config::StoreConfig;
use tsdb_core::error::{Error, Result};
use tsdb_core::types::{Aggregate, LabelSet, Matcher, Point, SeriesId, Tier};
use tsdb_meta::{shard_of, FileRegistryStore, RegistryStore, SeriesRegistry};
use tsdb_rollup::{InstantPoint, QueryPlanner};
use tsdb_shardstore::{DurabilityMode, ShardStore};
use tsdb_writepath::shard_worker::{self, ShardWorkerHandle};
use tsdb_writepath::BuilderConfig;

/// How long a writer blocks waiting for buffer room before giving up
/// with [`Error::Backpressure`].
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of a [`Store::write_batch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every point was accepted.
    Ok,
    /// Some points failed; counts of each.
    PartialFailure {
        /// Points successfully enqueued.
        count_ok: usize,
        /// Points that failed (invalid input or backpressure).
        count_err: usize,
    },
}

/// One point to write, as taken by [`Store::write_batch`].
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Metric name.
    pub metric: String,
    /// Label set.
    pub labels: LabelSet,
    /// Sample value.
    pub value: f64,
    /// Unix seconds timestamp.
    pub ts: i64,
}

/// An open embedded time-series store: the write path, shard stores,
/// series registry, and rollup/retention scheduler for one `data_dir`.
///
/// Cheaply `Arc`-shareable across threads; every method takes `&self`.
pub struct Store {
    config: StoreConfig,
    registry: SeriesRegistry,
    shards: Vec<Arc<ShardStore>>,
    workers: Vec<ShardWorkerHandle>,
    schema: Vec<Tier>,
    scheduler: Option<SchedulerHandle>,
}

impl Store {
    /// Open (recovering as needed) a store rooted at `config.data_dir`,
    /// spawning one write-path worker thread per shard plus a background
    /// scheduler thread for rollup passes and retention sweeps.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        match tsdb_shardstore::read_shard_count(&config.data_dir)? {
            Some(existing) if existing != config.shards => {
                return Err(Error::ConfigError(format!(
                    "store at {} was created with {existing} shards, cannot reopen with {}",
                    config.data_dir.display(),
                    config.shards
                )));
            }
            Some(_) => {}
            None => tsdb_shardstore::write_shard_count(&config.data_dir, config.shards)?,
        }

        let tier_names: Vec<&str> = config.schema.iter().map(|t| t.name.as_str()).collect();
        let mut schema: Vec<Tier> = config.schema.iter().cloned().map(|t| t.into_tier()).collect();
        schema.sort_by_key(|t| t.resolution_seconds);

        let registry_path = tsdb_shardstore::metadata_path(&config.data_dir);
        let registry_store: Arc<dyn RegistryStore> = Arc::new(FileRegistryStore::open(registry_path)?);
        let registry = SeriesRegistry::open(registry_store)?;

        let builder_config = BuilderConfig {
            window_duration: config.segment_duration,
            pending_flush_interval: Duration::from_millis(config.pending_flush_interval_ms),
            durability: DurabilityMode::default(),
        };

        let mut workers = Vec::with_capacity(config.shards);
        let mut shards = Vec::with_capacity(config.shards);
        for shard_index in 0..config.shards {
            let (handle, store) = shard_worker::spawn(
                &config.data_dir,
                shard_index,
                &tier_names,
                builder_config,
                config.flush_threshold.max(1),
                Duration::from_millis(config.pending_flush_interval_ms),
            )?;
            workers.push(handle);
            shards.push(store);
        }

        let scheduler = scheduler::spawn(
            shards.clone(),
            schema.clone(),
            config.segment_duration,
            config.raw_retention_seconds,
            Duration::from_millis(config.rollup_interval_ms),
            Duration::from_millis(config.retention_interval_ms),
        );

        tracing::info!(shards = config.shards, data_dir = %config.data_dir.display(), "store opened");
        Ok(Store { config, registry, shards, workers, schema, scheduler: Some(scheduler) })
    }

    /// Write one sample, assigning a series on first sight.
    pub fn write(&self, metric: &str, labels: &LabelSet, value: f64, ts: i64, now: i64) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::InvalidInput(format!("non-finite value {value}")));
        }
        if metric.is_empty() {
            return Err(Error::InvalidInput("metric name must not be empty".into()));
        }
        if ts <= 0 {
            return Err(Error::InvalidInput(format!("non-positive timestamp {ts}")));
        }

        let series_id = self.registry.get_or_create(metric, labels, now)?;
        let shard_index = shard_of(series_id, self.shards.len());
        self.workers[shard_index].sender().push_with_timeout(Point { series_id, ts, value }, DEFAULT_WRITE_TIMEOUT)
    }

    /// Write many samples, continuing past per-point failures rather
    /// than aborting the whole batch.
    pub fn write_batch(&self, points: &[WriteRequest], now: i64) -> BatchOutcome {
        let mut count_ok = 0;
        let mut count_err = 0;
        for point in points {
            match self.write(&point.metric, &point.labels, point.value, point.ts, now) {
                Ok(()) => count_ok += 1,
                Err(e) => {
                    tracing::warn!(metric = %point.metric, error = %e, "write_batch point failed");
                    count_err += 1;
                }
            }
        }
        if count_err == 0 {
            BatchOutcome::Ok
        } else {
            BatchOutcome::PartialFailure { count_ok, count_err }
        }
    }

    /// Answer a range query: resolve matching series, pick the coarsest
    /// tier that covers the range at `step` resolution, stitch in raw
    /// data newer than that tier's watermark (sealed plus the open
    /// window's pending points), and return the combined `(bucket_start,
    /// value)` series for `aggregator`.
    pub fn query_range(
        &self,
        metric: &str,
        matchers: &[Matcher],
        from: i64,
        to: i64,
        step: i64,
        aggregator: Aggregate,
        now: i64,
    ) -> Result<Vec<(i64, f64)>> {
        let pending = |shard: usize, series: SeriesId| self.workers[shard].pending_points(series);
        let planner = QueryPlanner {
            shards: &self.shards,
            schema: &self.schema,
            segment_duration: self.config.segment_duration,
            pending: &pending,
        };
        planner.query_range(&self.registry, metric, matchers, from, to, step, aggregator, self.shards.len(), now)
    }

    /// Answer an instant query: the latest known point at or before `at`
    /// (overall latest if `at` is `None`) for every matching series.
    pub fn query_instant(&self, metric: &str, matchers: &[Matcher], at: Option<i64>) -> Result<Vec<InstantPoint>> {
        let pending = |shard: usize, series: SeriesId| self.workers[shard].pending_points(series);
        let planner = QueryPlanner {
            shards: &self.shards,
            schema: &self.schema,
            segment_duration: self.config.segment_duration,
            pending: &pending,
        };
        planner.query_instant(&self.registry, metric, matchers, self.shards.len(), at)
    }

    /// Distinct metric names across every registered series.
    pub fn list_metrics(&self) -> Vec<String> {
        self.registry.list_metrics()
    }

    /// Distinct values observed for label `name`, across every series.
    pub fn list_label_values(&self, name: &str) -> Vec<String> {
        self.registry.list_label_values(name)
    }

    /// Every label set registered under `metric`.
    pub fn list_series(&self, metric: &str) -> Vec<LabelSet> {
        self.registry.list_series(metric)
    }

    /// A point-in-time snapshot of store-wide counters.
    pub fn info(&self) -> Result<StoreInfo> {
        info::collect(&self.shards, self.registry.series_count())
    }

    /// Force an immediate rollup pass over every `(shard, tier)` pair,
    /// bypassing the scheduler's cadence. Mainly for tests and manual
    /// operational triggers.
    pub fn run_rollup_now(&self, now: i64) -> Vec<tsdb_rollup::RollupStats> {
        tsdb_rollup::run_all_passes(&self.shards, &self.schema, now)
    }

    /// Force an immediate retention sweep over every shard, bypassing the
    /// scheduler's cadence.
    pub fn run_retention_now(&self, now: i64) -> Vec<tsdb_rollup::SweepStats> {
        tsdb_rollup::run_sweep_all(&self.shards, self.config.segment_duration, self.config.raw_retention_seconds, &self.schema, now)
    }

    /// Shut down the scheduler and every shard worker, flushing pending
    /// state via a final WAL checkpoint. Also runs on `drop`, but callers
    /// that want to observe completion should call this explicitly.
    pub fn shutdown(mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown();
        }
        for worker in self.workers.drain(..) {
            worker.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tsdb_core::config::{AggregateSet, TierSpec};

    fn test_config(data_dir: &std::path::Path) -> StoreConfig {
        StoreConfig {
            data_dir: data_dir.to_path_buf(),
            shards: 2,
            segment_duration: 14_400,
            raw_retention_seconds: 2 * 86_400,
            flush_interval_ms: 1_000,
            flush_threshold: 1_000,
            pending_flush_interval_ms: 60_000,
            rollup_interval_ms: 60_000,
            retention_interval_ms: 3_600_000,
            compression: tsdb_core::config::Compression::Zstd,
            schema: vec![TierSpec {
                name: "hourly".into(),
                resolution_seconds: 3_600,
                aggregates: AggregateSet::all(),
                chunk_seconds: 24 * 3_600,
                retention_seconds: Some(30 * 86_400),
            }],
        }
    }

    #[test]
    fn write_then_instant_query_round_trips() {
        let dir = tempdir().unwrap();
        let store = Store::open(test_config(dir.path())).unwrap();
        let labels = LabelSet::new([("host", "a")]);
        store.write("cpu", &labels, 42.0, 1_700_000_000, 1_700_000_000).unwrap();

        let points = store.query_instant("cpu", &[Matcher::eq("host", "a")], None).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 42.0);
        assert_eq!(points[0].ts, 1_700_000_000);
        store.shutdown();
    }

    #[test]
    fn write_rejects_non_positive_timestamp() {
        let dir = tempdir().unwrap();
        let store = Store::open(test_config(dir.path())).unwrap();
        let labels = LabelSet::new([("host", "a")]);
        let err = store.write("cpu", &labels, 1.0, 0, 1_700_000_000).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        let err = store.write("cpu", &labels, 1.0, -1, 1_700_000_000).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        store.shutdown();
    }

    #[test]
    fn write_batch_reports_partial_failure_on_invalid_input() {
        let dir = tempdir().unwrap();
        let store = Store::open(test_config(dir.path())).unwrap();
        let labels = LabelSet::new([("host", "a")]);
        let requests = vec![
            WriteRequest { metric: "cpu".into(), labels: labels.clone(), value: 1.0, ts: 1_700_000_000 },
            WriteRequest { metric: "cpu".into(), labels, value: f64::NAN, ts: 1_700_000_001 },
        ];
        let outcome = store.write_batch(&requests, 1_700_000_000);
        assert_eq!(outcome, BatchOutcome::PartialFailure { count_ok: 1, count_err: 1 });
        store.shutdown();
    }

    #[test]
    fn info_reports_registered_series_count() {
        let dir = tempdir().unwrap();
        let store = Store::open(test_config(dir.path())).unwrap();
        store.write("cpu", &LabelSet::new([("host", "a")]), 1.0, 1_700_000_000, 1_700_000_000).unwrap();
        store.write("cpu", &LabelSet::new([("host", "b")]), 1.0, 1_700_000_000, 1_700_000_000).unwrap();

        let info = store.info().unwrap();
        assert_eq!(info.series_count, 2);
        assert_eq!(info.storage_bytes_by_shard.len(), 2);
        assert_eq!(info.tier_watermarks.len(), 2);
        store.shutdown();
    }

    #[test]
    fn reopening_an_existing_store_recovers_the_series_registry() {
        let dir = tempdir().unwrap();
        {
            let store = Store::open(test_config(dir.path())).unwrap();
            store.write("cpu", &LabelSet::new([("host", "a")]), 1.0, 1_700_000_000, 1_700_000_000).unwrap();
            store.shutdown();
        }

        let store = Store::open(test_config(dir.path())).unwrap();
        assert_eq!(store.list_metrics(), vec!["cpu".to_string()]);
        store.shutdown();
    }

    #[test]
    fn reopening_with_a_different_shard_count_is_rejected() {
        let dir = tempdir().unwrap();
        {
            let store = Store::open(test_config(dir.path())).unwrap();
            store.shutdown();
        }

        let mut mismatched = test_config(dir.path());
        mismatched.shards = test_config(dir.path()).shards + 1;
        let err = Store::open(mismatched).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
