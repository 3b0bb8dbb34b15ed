//! Crash recovery for one shard.
//!
//! On open: list `.seg` files and trust them (a sealed segment is never
//! modified and only becomes visible after rename + directory fsync).
//! If `current.wal` exists, scan it validating CRCs, truncate at the
//! first corrupt record, and hand the surviving records back to the
//! caller to repopulate the open window's in-memory pending map.

use crate::paths::ShardPaths;
use crate::wal::{self, WalScanResult};
use tracing::warn;
use tsdb_core::error::Result;

/// Result of recovering one shard at startup.
#[derive(Debug, Default)]
pub struct RecoveredShard {
    /// Sealed segment window starts found on disk, ascending.
    pub sealed_windows: Vec<i64>,
    /// WAL records surviving validation, to be replayed into the
    /// builder's pending map for the currently open window.
    pub wal_records: Vec<crate::format::WalRecord>,
    /// True if the WAL was truncated due to a corrupt tail record.
    pub wal_truncated: bool,
}

/// Recover one shard's durable state.
pub fn recover_shard(paths: &ShardPaths) -> Result<RecoveredShard> {
    let sealed_windows = paths.list_segments()?;

    let WalScanResult { records, truncated } = wal::scan(&paths.wal_path())?;
    if truncated {
        warn!(wal_path = %paths.wal_path().display(), "truncating WAL at first corrupt record during recovery");
    }

    Ok(RecoveredShard { sealed_windows, wal_records: records, wal_truncated: truncated })
}
