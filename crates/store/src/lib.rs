//! Embedded time-series storage and rollup core.
//!
//! [`Store`] ties together the five subsystems that make up the engine:
//!
//! - the per-shard write path (`tsdb-writepath`): a bounded buffer feeding
//!   a Segment Builder that checkpoints to a WAL and seals raw windows,
//! - the on-disk shard store (`tsdb-shardstore`): segment files, WAL,
//!   tier chunk files, watermarks, compaction, and retention,
//! - the chunk and raw-point codecs (`tsdb-meta`), plus the series
//!   registry mapping `(metric, labels)` to a stable series id,
//! - the rollup engine and retention sweep (`tsdb-rollup`), driven here
//!   by a background scheduler thread,
//! - the query planner (`tsdb-rollup::query`), wired to each shard's
//!   live pending snapshot for the currently open window.
//!
//! `Store::open` recovers all of the above from `data_dir` and spawns one
//! writer thread per shard plus one scheduler thread; `Store` itself is a
//! thin, `Send + Sync` facade safe to share behind an `Arc`.

#![warn(missing_docs)]

pub mod info;
mod scheduler;
pub mod store;

pub use info::StoreInfo;
pub use store::{BatchOutcome, Store, WriteRequest, DEFAULT_WRITE_TIMEOUT};
pub use tsdb_rollup::{RollupStats, SweepStats};
