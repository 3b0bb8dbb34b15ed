//! Background scheduler: periodic rollup passes and retention sweeps
//! across every shard, driven off the store's configured cadences.
//!
//! One thread services both tickers. A rollup or retention pass runs
//! synchronously within the tick handler, so a slow pass simply delays
//! the next tick rather than queueing a second one — matching the "skip,
//! don't queue" backpressure rule for rollup passes.

use crossbeam::channel::{self, Receiver};
use crossbeam::select;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tsdb_core::types::Tier;
use tsdb_shardstore::ShardStore;

/// Handle to the running scheduler thread.
pub struct SchedulerHandle {
    shutdown: channel::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal the scheduler to stop, joining its thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawn the scheduler thread against `shards`, ticking rollup passes
/// and retention sweeps at their configured cadences.
pub fn spawn(
    shards: Vec<Arc<ShardStore>>,
    schema: Vec<Tier>,
    segment_duration: i64,
    raw_retention_seconds: i64,
    rollup_interval: Duration,
    retention_interval: Duration,
) -> SchedulerHandle {
    let (shutdown_tx, shutdown_rx) = channel::bounded(1);
    let join = std::thread::Builder::new()
        .name("tsdb-scheduler".into())
        .spawn(move || {
            run(shards, schema, segment_duration, raw_retention_seconds, rollup_interval, retention_interval, shutdown_rx)
        })
        .expect("failed to spawn scheduler thread");
    SchedulerHandle { shutdown: shutdown_tx, join: Some(join) }
}

fn run(
    shards: Vec<Arc<ShardStore>>,
    schema: Vec<Tier>,
    segment_duration: i64,
    raw_retention_seconds: i64,
    rollup_interval: Duration,
    retention_interval: Duration,
    shutdown_rx: Receiver<()>,
) {
    let rollup_tick = channel::tick(rollup_interval);
    let retention_tick = channel::tick(retention_interval);
    loop {
        select! {
            recv(rollup_tick) -> _ => {
                let now = now_unix();
                let stats = tsdb_rollup::run_all_passes(&shards, &schema, now);
                tracing::debug!(passes = stats.len(), "rollup scheduler tick complete");
            }
            recv(retention_tick) -> _ => {
                let now = now_unix();
                let stats = tsdb_rollup::run_sweep_all(&shards, segment_duration, raw_retention_seconds, &schema, now);
                tracing::debug!(sweeps = stats.len(), "retention scheduler tick complete");
            }
            recv(shutdown_rx) -> _ => break,
        }
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
