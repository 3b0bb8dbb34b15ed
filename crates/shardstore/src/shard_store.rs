//! The shard store proper: durable storage of raw segments, tier chunks,
//! and watermarks for one shard, plus the seal-window procedure.

use crate::format::segment_file::{SegmentFile, SegmentRecord};
use crate::format::{tier_chunk_file, watermark_file};
use crate::paths::ShardPaths;
use crate::recovery::{self, RecoveredShard};
use crate::wal::{DurabilityMode, WalConfig, WalWriter};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tsdb_core::error::{Error, Result};
use tsdb_core::types::SeriesId;

/// A generation-tagged, mmapped segment file kept around for readers
/// that may still be using a prior generation's mapping after a rename.
struct SegmentSlot {
    file: Arc<SegmentFile>,
}

/// One shard's durable state: sealed segments, per-tier chunk files, and
/// watermarks.
pub struct ShardStore {
    paths: ShardPaths,
    tier_names: Vec<String>,
    segments: RwLock<HashMap<i64, SegmentSlot>>,
    wal: RwLock<WalWriter>,
}

impl ShardStore {
    /// Open (and recover) a shard's durable state, returning both the
    /// store handle and what was recovered for the builder to replay.
    pub fn open(
        data_dir: &std::path::Path,
        shard_index: usize,
        tier_names: &[&str],
        durability: DurabilityMode,
        wal_config: WalConfig,
    ) -> Result<(Self, RecoveredShard)> {
        let paths = ShardPaths::new(data_dir, shard_index);
        paths.create_directories(tier_names)?;

        let recovered = recovery::recover_shard(&paths)?;

        let mut segments = HashMap::new();
        for window_start in &recovered.sealed_windows {
            let file = SegmentFile::open(&paths.segment_path(*window_start))?;
            segments.insert(*window_start, SegmentSlot { file: Arc::new(file) });
        }

        let wal = WalWriter::open(paths.wal_path(), durability, wal_config)?;

        let store = ShardStore {
            paths,
            tier_names: tier_names.iter().map(|s| s.to_string()).collect(),
            segments: RwLock::new(segments),
            wal: RwLock::new(wal),
        };
        Ok((store, recovered))
    }

    /// Root path of this shard.
    pub fn root(&self) -> &std::path::Path {
        self.paths.root()
    }

    /// Append a checkpoint record to the open window's WAL.
    pub fn wal_append(&self, record: &crate::format::WalRecord) -> Result<()> {
        self.wal.write().append(record)
    }

    /// Seal the given window: write its records into a new `.seg` file
    /// via write-tmp, fsync, rename, fsync-parent-dir, then delete the
    /// WAL that checkpointed it.
    ///
    /// `records` must already belong to this window and will be sorted
    /// by `(series_id, start_time)` as required by the segment file
    /// format.
    pub fn seal_window(&self, window_start: i64, mut records: Vec<SegmentRecord>) -> Result<()> {
        records.sort_by(|a, b| (a.series_id, a.start_time).cmp(&(b.series_id, b.start_time)));

        let path = self.paths.segment_path(window_start);
        crate::format::segment_file::write_segment_file(&path, &records)?;

        let file = SegmentFile::open(&path)?;
        self.segments.write().insert(window_start, SegmentSlot { file: Arc::new(file) });

        // A fresh WAL writer replaces the sealed one; the old file is
        // unlinked now that its data is durable in the `.seg` file.
        let mut wal = self.wal.write();
        let old = std::mem::replace(&mut *wal, WalWriter::open(self.paths.wal_path(), DurabilityMode::None, WalConfig::new())?);
        old.delete()?;
        Ok(())
    }

    /// Reopen the WAL writer after sealing, with the durability settings
    /// the caller wants for the new open window.
    pub fn reopen_wal(&self, durability: DurabilityMode, config: WalConfig) -> Result<()> {
        let mut wal = self.wal.write();
        *wal = WalWriter::open(self.paths.wal_path(), durability, config)?;
        Ok(())
    }

    /// Sealed window starts currently known to this store, ascending.
    pub fn sealed_windows(&self) -> Vec<i64> {
        let mut windows: Vec<i64> = self.segments.read().keys().copied().collect();
        windows.sort_unstable();
        windows
    }

    /// Distinct series ids appearing in any sealed segment overlapping
    /// `[from, to)`. Used by the rollup engine to enumerate the series it
    /// must roll up for this shard without a separate per-shard index.
    pub fn series_ids_overlapping(&self, from: i64, to: i64) -> Vec<SeriesId> {
        let segments = self.segments.read();
        let mut ids: std::collections::BTreeSet<SeriesId> = std::collections::BTreeSet::new();
        for slot in segments.values() {
            for entry in slot.file.index() {
                if entry.start_time < to && entry.end_time > from {
                    ids.insert(entry.series_id);
                }
            }
        }
        ids.into_iter().collect()
    }

    /// Rough count of raw points held in sealed segments, for `info()`.
    /// Counts index entries rather than decompressing payloads.
    pub fn raw_point_count_estimate(&self) -> u64 {
        self.segments
            .read()
            .values()
            .flat_map(|slot| slot.file.index().iter())
            .map(|entry| entry.point_count as u64)
            .sum()
    }

    /// Decompressed raw points for `series_id` within `[from, to)`,
    /// gathered from every sealed segment overlapping the range.
    pub fn read_raw(&self, series_id: SeriesId, from: i64, to: i64) -> Result<Vec<(i64, f64)>> {
        let segments = self.segments.read();
        let mut out = Vec::new();
        for slot in segments.values() {
            for entry in slot.file.entries_overlapping(series_id, from, to) {
                let payload = slot.file.payload(&entry);
                let points = tsdb_meta::codec::gorilla::decode(payload)?;
                out.extend(points.into_iter().filter(|(ts, _)| *ts >= from && *ts < to));
            }
        }
        out.sort_by_key(|(ts, _)| *ts);
        Ok(out)
    }

    /// Read a tier chunk blob for `(series_id, chunk_start)`, if present.
    pub fn read_chunk(&self, tier_name: &str, series_id: SeriesId, chunk_start: i64) -> Result<Option<Vec<u8>>> {
        let index = tier_chunk_file::read_index(&self.paths.index_path(tier_name))?;
        let Some(entry) = index.iter().find(|e| e.series_id == series_id && e.chunk_start == chunk_start) else {
            return Ok(None);
        };
        let blob = tier_chunk_file::read_blob(&self.paths.chunks_path(tier_name), entry.offset, entry.length)?;
        Ok(Some(blob))
    }

    /// All chunk index entries for a tier, sorted by `(series_id,
    /// chunk_start)`.
    pub fn tier_index(&self, tier_name: &str) -> Result<Vec<tier_chunk_file::ChunkIndexEntry>> {
        tier_chunk_file::read_index(&self.paths.index_path(tier_name))
    }

    /// Write (insert or replace) a tier chunk blob for `(series_id,
    /// chunk_start)`.
    pub fn write_chunk(
        &self,
        tier_name: &str,
        series_id: SeriesId,
        chunk_start: i64,
        chunk_end: i64,
        blob: &[u8],
    ) -> Result<()> {
        let chunks_path = self.paths.chunks_path(tier_name);
        let index_path = self.paths.index_path(tier_name);
        let offset = tier_chunk_file::append_blob(&chunks_path, blob)?;

        let mut index = tier_chunk_file::read_index(&index_path)?;
        index.retain(|e| !(e.series_id == series_id && e.chunk_start == chunk_start));
        index.push(tier_chunk_file::ChunkIndexEntry {
            series_id,
            chunk_start,
            chunk_end,
            offset,
            length: blob.len() as u32,
            flags: 0,
        });
        index.sort_by_key(|e| (e.series_id, e.chunk_start));
        tier_chunk_file::write_index(&index_path, &index)
    }

    /// Read the per-tier watermarks, in schema order.
    pub fn read_watermarks(&self) -> Result<Vec<i64>> {
        watermark_file::read_watermarks(&self.paths.watermarks_path(), self.tier_names.len())
    }

    /// Rewrite the per-tier watermarks.
    pub fn write_watermarks(&self, watermarks: &[i64]) -> Result<()> {
        watermark_file::write_watermarks(&self.paths.watermarks_path(), watermarks)
    }

    /// Delegate to [`crate::retention::retain_raw`] for this shard.
    pub fn retain_raw(&self, segment_duration: i64, cutoff: i64) -> Result<crate::retention::RetentionStats> {
        let stats = crate::retention::retain_raw(&self.paths, segment_duration, cutoff)?;
        if stats.segments_deleted > 0 {
            let mut segments = self.segments.write();
            segments.retain(|window_start, _| *window_start + segment_duration > cutoff);
        }
        Ok(stats)
    }

    /// Delegate to [`crate::retention::retain_tier`] for this shard.
    pub fn retain_tier(&self, tier_name: &str, cutoff: i64) -> Result<crate::retention::RetentionStats> {
        crate::retention::retain_tier(&self.paths, tier_name, cutoff)
    }

    /// Total on-disk footprint of this shard's directory, summed across
    /// all files. Used by `info`'s `storage_bytes_by_shard`.
    pub fn storage_bytes(&self) -> Result<u64> {
        fn walk(dir: &std::path::Path) -> std::io::Result<u64> {
            let mut total = 0;
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let meta = entry.metadata()?;
                if meta.is_dir() {
                    total += walk(&entry.path())?;
                } else {
                    total += meta.len();
                }
            }
            Ok(total)
        }
        Ok(walk(self.paths.root())?)
    }
}

/// Root directory layout for the whole store's metadata, independent of
/// any one shard.
pub fn metadata_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("metadata.db")
}

/// Path to the small file recording the shard count a store was first
/// created with. The series-to-shard mapping depends on this count, so
/// it must never change across a reopen of an existing `data_dir`.
pub fn shard_count_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("shard_count")
}

/// Read the shard count persisted by a previous open, if any.
pub fn read_shard_count(data_dir: &std::path::Path) -> Result<Option<usize>> {
    let path = shard_count_path(data_dir);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(&path)?;
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::ConfigError(format!("malformed shard count file at {}", path.display())))?;
    Ok(Some(u64::from_le_bytes(bytes) as usize))
}

/// Persist the shard count for a store being created for the first time.
pub fn write_shard_count(data_dir: &std::path::Path, shards: usize) -> Result<()> {
    let path = shard_count_path(data_dir);
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, (shards as u64).to_le_bytes())?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}
