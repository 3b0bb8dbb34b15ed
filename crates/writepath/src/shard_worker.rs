//! One OS thread per shard, draining its [`WriteBuffer`] into the
//! [`SegmentBuilder`] and ticking the periodic WAL checkpoint.
//!
//! Rollup and retention run as separate workers against the same
//! [`ShardStore`]; this worker only owns the write path, matching the
//! single-writer-per-file rule for `current.wal` and `.seg` files.

use crate::segment_builder::{BuilderConfig, SegmentBuilder};
use crate::write_buffer::{WriteBuffer, WriteBufferSender};
use crossbeam::channel::{self, Receiver};
use crossbeam::select;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, warn};
use tsdb_core::error::Result;
use tsdb_core::types::{Point, SeriesId};
use tsdb_shardstore::{DurabilityMode, ShardStore, WalConfig};

/// A read-only snapshot of the open window's pending points, refreshed by
/// the shard worker after every batch it ingests. Lets the query planner
/// read the currently-open window without crossing into the builder's
/// owning thread.
pub type PendingSnapshot = Arc<RwLock<FxHashMap<SeriesId, Vec<(i64, f64)>>>>;

/// Handle to a running shard worker: a writer-facing sender, a read-only
/// view of its pending points, and the thread's join handle plus a
/// shutdown signal.
pub struct ShardWorkerHandle {
    sender: WriteBufferSender,
    pending: PendingSnapshot,
    shutdown: channel::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl ShardWorkerHandle {
    /// Writer-facing handle to push points onto this shard.
    pub fn sender(&self) -> WriteBufferSender {
        self.sender.clone()
    }

    /// Pending points for `series_id` in the currently open window, if
    /// any, as of the worker's last ingest.
    pub fn pending_points(&self, series_id: SeriesId) -> Option<Vec<(i64, f64)>> {
        self.pending.read().get(&series_id).cloned()
    }

    /// Signal the worker to drain and stop, joining its thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ShardWorkerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Open (recovering as needed) a shard's durable state and spawn its
/// write-path worker thread.
pub fn spawn(
    data_dir: &std::path::Path,
    shard_index: usize,
    tier_names: &[&str],
    builder_config: BuilderConfig,
    buffer_capacity: usize,
    drain_interval: Duration,
) -> Result<(ShardWorkerHandle, Arc<ShardStore>)> {
    let (store, recovered) =
        ShardStore::open(data_dir, shard_index, tier_names, builder_config.durability, WalConfig::new())?;
    let store = Arc::new(store);

    let current_window = recovered
        .sealed_windows
        .last()
        .map(|w| w + builder_config.window_duration)
        .unwrap_or(0);
    let builder = if recovered.wal_records.is_empty() {
        SegmentBuilder::new(builder_config, current_window)
    } else {
        SegmentBuilder::recover(builder_config, current_window, recovered.wal_records)?
    };

    let buffer = WriteBuffer::new(buffer_capacity);
    let sender = buffer.sender();
    let receiver = buffer.receiver();
    let (shutdown_tx, shutdown_rx) = channel::bounded(1);
    let pending: PendingSnapshot = Arc::new(RwLock::new(builder.pending_snapshot()));

    let worker_store = Arc::clone(&store);
    let worker_pending = Arc::clone(&pending);
    let join = std::thread::Builder::new()
        .name(format!("tsdb-shard-{shard_index}-writer"))
        .spawn(move || run(worker_store, builder, receiver, shutdown_rx, drain_interval, worker_pending))
        .expect("failed to spawn shard writer thread");

    Ok((ShardWorkerHandle { sender, pending, shutdown: shutdown_tx, join: Some(join) }, store))
}

fn run(
    store: Arc<ShardStore>,
    mut builder: SegmentBuilder,
    points_rx: Receiver<Point>,
    shutdown_rx: Receiver<()>,
    drain_interval: Duration,
    pending: PendingSnapshot,
) {
    let tick = channel::tick(drain_interval);
    let mut batch = Vec::new();
    loop {
        select! {
            recv(points_rx) -> msg => {
                match msg {
                    Ok(point) => {
                        batch.push(point);
                        while let Ok(point) = points_rx.try_recv() {
                            batch.push(point);
                        }
                        if let Err(e) = builder.ingest_batch(&store, &batch) {
                            error!(error = %e, "failed to ingest batch");
                        }
                        batch.clear();
                        *pending.write() = builder.pending_snapshot();
                    }
                    Err(_) => break,
                }
            }
            recv(tick) -> _ => {
                if let Err(e) = builder.maybe_checkpoint(&store) {
                    warn!(error = %e, "WAL checkpoint failed");
                }
            }
            recv(shutdown_rx) -> _ => {
                while let Ok(point) = points_rx.try_recv() {
                    batch.push(point);
                }
                if !batch.is_empty() {
                    let _ = builder.ingest_batch(&store, &batch);
                }
                let _ = builder.checkpoint(&store);
                *pending.write() = builder.pending_snapshot();
                break;
            }
        }
    }
}
