//! # tsdb
//!
//! An embedded time-series database core: shard-partitioned storage,
//! tiered rollups, retention, and a range/instant query planner.
//!
//! ```no_run
//! use tsdb::{Store, StoreConfig, LabelSet, Matcher, Aggregate};
//!
//! fn main() -> tsdb::Result<()> {
//!     let config = StoreConfig::with_defaults("./data");
//!     let store = Store::open(config)?;
//!
//!     let labels = LabelSet::new([("host", "a")]);
//!     store.write("cpu", &labels, 42.0, 1_700_000_000, 1_700_000_000)?;
//!
//!     let series = store.query_range(
//!         "cpu",
//!         &[Matcher::eq("host", "a")],
//!         1_700_000_000,
//!         1_700_003_600,
//!         60,
//!         Aggregate::Avg,
//!         1_700_000_100,
//!     )?;
//!     println!("{series:?}");
//!     Ok(())
//! }
//! ```
//!
//! Internal crates (`tsdb-core`, `tsdb-meta`, `tsdb-shardstore`,
//! `tsdb-writepath`, `tsdb-rollup`) are not exposed directly; this crate
//! is the stable public surface.

pub use tsdb_core::config::{AggregateSet, StoreConfig, TierSpec};
pub use tsdb_core::error::{Error, Result};
pub use tsdb_core::types::{Aggregate, LabelSet, MatchOp, Matcher, Point, SeriesId, Tier};
pub use tsdb_rollup::InstantPoint;
pub use tsdb_store::{BatchOutcome, RollupStats, Store, StoreInfo, SweepStats, WriteRequest};
