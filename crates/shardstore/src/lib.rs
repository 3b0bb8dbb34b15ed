//! Shard-local durable storage.
//!
//! This crate handles everything that touches disk for a single shard:
//!
//! - on-disk byte formats for sealed segments, WAL records, tier chunk
//!   files, and watermarks
//! - the write-ahead log and its durability modes
//! - crash recovery (list sealed segments, replay the open window's WAL)
//! - tier chunk compaction
//! - raw and tier retention
//! - the [`ShardStore`] handle tying all of the above together

#![warn(missing_docs)]

pub mod compaction;
pub mod format;
pub mod paths;
pub mod recovery;
pub mod retention;
pub mod shard_store;
pub mod wal;

pub use compaction::DEFAULT_COMPACTION_THRESHOLD;
pub use format::{ChunkIndexEntry, IndexEntry, SegmentFile, SegmentRecord, WalRecord};
pub use paths::ShardPaths;
pub use recovery::RecoveredShard;
pub use retention::RetentionStats;
pub use shard_store::{metadata_path, read_shard_count, write_shard_count, ShardStore};
pub use wal::{DurabilityMode, WalConfig, WalWriter};
