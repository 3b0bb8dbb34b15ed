//! Tier chunk compaction.
//!
//! Triggered when estimated dead bytes / file size crosses the retention
//! trigger (default 0.30), or explicitly by a retention pass. Reads live
//! entries via the current index, streams them into `chunks.dat.tmp`,
//! emits a new `index.bin.tmp`, fsyncs both, renames. The previous
//! `chunks.dat` remains readable by any reader that already has it
//! mmapped; this module only produces the replacement, it does not track
//! in-flight readers (that lives in the shard store's mmap generation
//! bookkeeping).

use crate::format::tier_chunk_file::{self, ChunkIndexEntry};
use std::path::Path;
use tracing::debug;
use tsdb_core::error::Result;

/// Default dead-byte-ratio trigger for compaction.
pub const DEFAULT_COMPACTION_THRESHOLD: f64 = 0.30;

/// True if `chunks_path`'s dead-byte ratio (given the live `entries`)
/// meets or exceeds `threshold`.
pub fn needs_compaction(chunks_path: &Path, entries: &[ChunkIndexEntry], threshold: f64) -> Result<bool> {
    Ok(tier_chunk_file::dead_byte_ratio(chunks_path, entries)? >= threshold)
}

/// Rewrite `chunks_path`/`index_path` keeping only `live_entries`,
/// repacking their blobs contiguously. Returns the new index with
/// updated offsets.
pub fn compact(
    chunks_path: &Path,
    index_path: &Path,
    live_entries: &[ChunkIndexEntry],
) -> Result<Vec<ChunkIndexEntry>> {
    let tmp_chunks = chunks_path.with_extension("dat.tmp");
    let tmp_index = index_path.with_extension("bin.tmp");
    let _ = std::fs::remove_file(&tmp_chunks);

    let mut new_entries = Vec::with_capacity(live_entries.len());
    for entry in live_entries {
        let blob = tier_chunk_file::read_blob(chunks_path, entry.offset, entry.length)?;
        let new_offset = tier_chunk_file::append_blob(&tmp_chunks, &blob)?;
        new_entries.push(ChunkIndexEntry { offset: new_offset, ..*entry });
    }
    tier_chunk_file::write_index(&tmp_index, &new_entries)?;

    // Index renames first: a crash between the two renames then leaves the
    // stale chunks.dat next to the freshly repacked index.bin, so any
    // mismatched entry reads either run out of the old file's bounds or
    // decode as a corrupt chunk rather than silently returning wrong bytes.
    std::fs::rename(&tmp_index, index_path)?;
    std::fs::rename(&tmp_chunks, chunks_path)?;
    debug!(path = %chunks_path.display(), entries = new_entries.len(), "compacted tier chunk file");

    Ok(new_entries)
}
