//! Tier chunk storage: an append-only blob file (`chunks.dat`) plus a
//! sorted side index (`index.bin`).
//!
//! `index.bin` is an array of
//! `(series_id:i64, chunk_start:i64, chunk_end:i64, offset:u64, length:u32, flags:u32)`
//! sorted by `(series_id, chunk_start)`. Writing a new or updated chunk
//! appends the blob to `chunks.dat`, then rewrites `index.bin` via
//! tmp-file + rename. The previous blob becomes dead space, tracked by
//! simply no longer being referenced from the new index.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tsdb_core::error::{Error, Result};
use tsdb_core::types::SeriesId;

const INDEX_ENTRY_SIZE: usize = 8 + 8 + 8 + 8 + 4 + 4;

/// One entry in a tier's chunk index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkIndexEntry {
    /// Series this chunk belongs to.
    pub series_id: SeriesId,
    /// Aligned start of the chunk's bucket range.
    pub chunk_start: i64,
    /// End of the chunk's bucket range (`chunk_start + chunk_seconds`).
    pub chunk_end: i64,
    /// Byte offset into `chunks.dat`.
    pub offset: u64,
    /// Blob length in bytes.
    pub length: u32,
    /// Reserved for future use (generation bit, tombstone, ...).
    pub flags: u32,
}

/// Read the full sorted index from `index_path`. An absent file means an
/// empty index.
pub fn read_index(index_path: &Path) -> Result<Vec<ChunkIndexEntry>> {
    let bytes = match std::fs::read(index_path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::Io(e)),
    };
    if bytes.len() % INDEX_ENTRY_SIZE != 0 {
        return Err(Error::CorruptChunk {
            path: Some(index_path.to_path_buf()),
            detail: "index length not a multiple of entry size".into(),
        });
    }
    let mut cursor = Cursor::new(&bytes[..]);
    let mut entries = Vec::with_capacity(bytes.len() / INDEX_ENTRY_SIZE);
    while (cursor.position() as usize) < bytes.len() {
        let series_id = SeriesId(cursor.read_i64::<LittleEndian>().unwrap() as u64);
        let chunk_start = cursor.read_i64::<LittleEndian>().unwrap();
        let chunk_end = cursor.read_i64::<LittleEndian>().unwrap();
        let offset = cursor.read_u64::<LittleEndian>().unwrap();
        let length = cursor.read_u32::<LittleEndian>().unwrap();
        let flags = cursor.read_u32::<LittleEndian>().unwrap();
        entries.push(ChunkIndexEntry { series_id, chunk_start, chunk_end, offset, length, flags });
    }
    Ok(entries)
}

/// Atomically replace `index_path` with `entries` (sorted by
/// `(series_id, chunk_start)` by the caller) via tmp-file + fsync +
/// rename + fsync-parent-dir.
pub fn write_index(index_path: &Path, entries: &[ChunkIndexEntry]) -> Result<()> {
    let tmp_path = index_path.with_extension("bin.tmp");
    let mut buf = Vec::with_capacity(entries.len() * INDEX_ENTRY_SIZE);
    for e in entries {
        buf.write_i64::<LittleEndian>(e.series_id.get() as i64).unwrap();
        buf.write_i64::<LittleEndian>(e.chunk_start).unwrap();
        buf.write_i64::<LittleEndian>(e.chunk_end).unwrap();
        buf.write_u64::<LittleEndian>(e.offset).unwrap();
        buf.write_u32::<LittleEndian>(e.length).unwrap();
        buf.write_u32::<LittleEndian>(e.flags).unwrap();
    }
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp_path, index_path)?;
    if let Some(parent) = index_path.parent() {
        if parent.exists() {
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}

/// Append `blob` to `chunks_path`, returning its byte offset. The file is
/// created if absent.
pub fn append_blob(chunks_path: &Path, blob: &[u8]) -> Result<u64> {
    let mut file = OpenOptions::new().create(true).append(true).open(chunks_path)?;
    let offset = file.metadata()?.len();
    file.write_all(blob)?;
    file.sync_all()?;
    Ok(offset)
}

/// Read a blob at `offset..offset+length` from `chunks_path`.
pub fn read_blob(chunks_path: &Path, offset: u64, length: u32) -> Result<Vec<u8>> {
    use std::io::Seek;
    let mut file = File::open(chunks_path)?;
    file.seek(std::io::SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; length as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Estimated dead-byte ratio: `1 - (live bytes referenced by `entries`) /
/// (total `chunks.dat` size)`. Used to trigger compaction once it
/// crosses [`crate::compaction::DEFAULT_COMPACTION_THRESHOLD`].
pub fn dead_byte_ratio(chunks_path: &Path, entries: &[ChunkIndexEntry]) -> Result<f64> {
    let total = match std::fs::metadata(chunks_path) {
        Ok(m) => m.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0.0),
        Err(e) => return Err(Error::Io(e)),
    };
    if total == 0 {
        return Ok(0.0);
    }
    let live: u64 = entries.iter().map(|e| e.length as u64).sum();
    Ok(1.0 - (live as f64 / total as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_blob_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunks.dat");
        let offset1 = append_blob(&path, b"hello").unwrap();
        let offset2 = append_blob(&path, b"world!").unwrap();
        assert_eq!(offset1, 0);
        assert_eq!(offset2, 5);
        assert_eq!(read_blob(&path, offset2, 6).unwrap(), b"world!");
    }

    #[test]
    fn index_round_trips_through_tmp_rename() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let entries = vec![
            ChunkIndexEntry { series_id: SeriesId(1), chunk_start: 0, chunk_end: 86400, offset: 0, length: 10, flags: 0 },
            ChunkIndexEntry { series_id: SeriesId(2), chunk_start: 0, chunk_end: 86400, offset: 10, length: 20, flags: 0 },
        ];
        write_index(&path, &entries).unwrap();
        assert_eq!(read_index(&path).unwrap(), entries);
        assert!(!path.with_extension("bin.tmp").exists());
    }

    #[test]
    fn missing_index_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.bin");
        assert_eq!(read_index(&path).unwrap(), Vec::new());
    }

    #[test]
    fn dead_byte_ratio_reflects_unreferenced_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunks.dat");
        append_blob(&path, &[0u8; 100]).unwrap();
        let live_entries = vec![ChunkIndexEntry {
            series_id: SeriesId(1), chunk_start: 0, chunk_end: 1, offset: 0, length: 30, flags: 0,
        }];
        let ratio = dead_byte_ratio(&path, &live_entries).unwrap();
        assert!((ratio - 0.70).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn index_round_trips_for_arbitrary_entries(
            entries in proptest::collection::vec(
                (1u64..1000, 0i64..1_000_000, 0u64..1_000_000, 0u32..10_000, 0u32..4),
                0..50,
            ),
        ) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("index.bin");
            let entries: Vec<ChunkIndexEntry> = entries
                .into_iter()
                .map(|(series_id, chunk_start, offset, length, flags)| ChunkIndexEntry {
                    series_id: SeriesId(series_id),
                    chunk_start,
                    chunk_end: chunk_start + 86_400,
                    offset,
                    length,
                    flags,
                })
                .collect();
            write_index(&path, &entries).unwrap();
            prop_assert_eq!(read_index(&path).unwrap(), entries);
            prop_assert!(!path.with_extension("bin.tmp").exists());
        }
    }
}
