//! Rollup, retention, and query planning on top of a shard's durable
//! store.
//!
//! - [`rollup`]: one tier-on-one-shard rollup pass, advancing the
//!   tier's watermark and merging newly-computed buckets into chunks.
//! - [`retention_task`]: periodic raw and tier retention sweeps.
//! - [`query`]: tier selection, raw/tier stitching, and re-aggregation
//!   for range and instant queries.

#![warn(missing_docs)]

pub mod query;
pub mod retention_task;
pub mod rollup;

pub use query::{InstantPoint, QueryPlanner};
pub use retention_task::{run_sweep, run_sweep_all, SweepStats};
pub use rollup::{run_all_passes, run_pass, run_pass_with_margin, RollupStats, DEFAULT_SAFETY_MARGIN_SECONDS};
