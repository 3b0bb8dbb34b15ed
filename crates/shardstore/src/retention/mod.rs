//! Periodic per-shard retention: delete sealed raw segments and tier
//! chunk entries fully below their tier's cutoff.
//!
//! Retention never blocks writers or readers; segment deletion is a
//! plain unlink (sealed files are never reopened for writing), and tier
//! chunk drops happen by omitting dead entries from the next compacted
//! index rather than mutating `chunks.dat` in place.

use crate::compaction::{self, DEFAULT_COMPACTION_THRESHOLD};
use crate::format::tier_chunk_file::{self, ChunkIndexEntry};
use crate::paths::ShardPaths;
use tracing::info;
use tsdb_core::error::Result;

/// Cutoff timestamp below which data may be deleted: `now - retention`.
pub fn cutoff(now: i64, retention_seconds: i64) -> i64 {
    now - retention_seconds
}

/// Counters accumulated by one retention pass, surfaced via `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetentionStats {
    /// Sealed segments deleted this pass.
    pub segments_deleted: usize,
    /// Tier chunk entries dropped this pass (pending physical reclaim at
    /// the next compaction).
    pub chunk_entries_dropped: usize,
}

/// Delete every sealed `<w>.seg` with `w + segment_duration <= cutoff`.
pub fn retain_raw(paths: &ShardPaths, segment_duration: i64, cutoff: i64) -> Result<RetentionStats> {
    let mut stats = RetentionStats::default();
    for window_start in paths.list_segments()? {
        if window_start + segment_duration <= cutoff {
            let path = paths.segment_path(window_start);
            std::fs::remove_file(&path)?;
            stats.segments_deleted += 1;
            info!(window_start, path = %path.display(), "retention deleted sealed segment");
        }
    }
    Ok(stats)
}

/// Drop tier chunk index entries with `chunk_end <= cutoff`. Partial
/// chunks straddling the cutoff are preserved (over-retention is
/// acceptable). When the resulting dead-byte ratio crosses
/// [`DEFAULT_COMPACTION_THRESHOLD`], immediately compacts; otherwise just
/// rewrites the (smaller) index, leaving blobs as dead space for a later
/// compaction pass.
pub fn retain_tier(paths: &ShardPaths, tier_name: &str, cutoff: i64) -> Result<RetentionStats> {
    let index_path = paths.index_path(tier_name);
    let chunks_path = paths.chunks_path(tier_name);
    let all = tier_chunk_file::read_index(&index_path)?;

    let (live, dropped): (Vec<ChunkIndexEntry>, Vec<ChunkIndexEntry>) =
        all.into_iter().partition(|e| e.chunk_end > cutoff);

    if dropped.is_empty() {
        return Ok(RetentionStats::default());
    }

    if compaction::needs_compaction(&chunks_path, &live, DEFAULT_COMPACTION_THRESHOLD)? {
        compaction::compact(&chunks_path, &index_path, &live)?;
    } else {
        tier_chunk_file::write_index(&index_path, &live)?;
    }

    Ok(RetentionStats { segments_deleted: 0, chunk_entries_dropped: dropped.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tsdb_core::types::SeriesId;

    #[test]
    fn retain_raw_deletes_only_fully_expired_windows() {
        let dir = tempdir().unwrap();
        let paths = ShardPaths::new(dir.path(), 0);
        paths.create_directories(&[]).unwrap();
        std::fs::write(paths.segment_path(0), b"").unwrap();
        std::fs::write(paths.segment_path(14_400), b"").unwrap();

        let stats = retain_raw(&paths, 14_400, cutoff(30_000, 20_000)).unwrap();
        assert_eq!(stats.segments_deleted, 1);
        assert_eq!(paths.list_segments().unwrap(), vec![14_400]);
    }

    #[test]
    fn retain_tier_drops_expired_entries_and_preserves_straddling_ones() {
        let dir = tempdir().unwrap();
        let paths = ShardPaths::new(dir.path(), 0);
        paths.create_directories(&["hourly"]).unwrap();

        let chunks_path = paths.chunks_path("hourly");
        let off = tier_chunk_file::append_blob(&chunks_path, b"blob").unwrap();
        let entries = vec![
            ChunkIndexEntry { series_id: SeriesId(1), chunk_start: 0, chunk_end: 86_400, offset: off, length: 4, flags: 0 },
            ChunkIndexEntry { series_id: SeriesId(1), chunk_start: 86_400, chunk_end: 172_800, offset: off, length: 4, flags: 0 },
        ];
        tier_chunk_file::write_index(&paths.index_path("hourly"), &entries).unwrap();

        // Cutoff falls inside the second chunk's range: only the first
        // (fully expired) entry should be dropped.
        let stats = retain_tier(&paths, "hourly", 100_000).unwrap();
        assert_eq!(stats.chunk_entries_dropped, 1);
        let remaining = tier_chunk_file::read_index(&paths.index_path("hourly")).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].chunk_start, 86_400);
    }
}
