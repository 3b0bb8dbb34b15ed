//! Sealed raw segment file (`.seg`) binary format.
//!
//! ```text
//! magic "TS"           : 2 B
//! version              : u8
//! segment_count        : u32
//! reserved             : 5 B
//! [ compressed segment payloads, concatenated ]
//! [ index entries, sorted by (series_id asc, start_time asc):
//!     series_id : i64
//!     start_time: i64
//!     end_time  : i64
//!     point_ct  : u32
//!     offset    : u64     (from file start)
//!     length    : u32
//!     padding   : 4 B           -> 40 B per entry ]
//! footer:
//!     index_offset : u64
//! ```
//!
//! Read path: mmap the file, read the footer to find the index, binary
//! search the index by `series_id` then `start_time`, decompress the
//! selected payloads.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tsdb_core::error::{Error, Result};
use tsdb_core::types::SeriesId;

const MAGIC: &[u8; 2] = b"TS";
const VERSION: u8 = 1;
const HEADER_SIZE: usize = 2 + 1 + 4 + 5;
const INDEX_ENTRY_SIZE: usize = 40;

/// One segment's worth of raw compressed data, ready to be written into a
/// `.seg` file.
#[derive(Debug, Clone)]
pub struct SegmentRecord {
    /// Series this payload belongs to.
    pub series_id: SeriesId,
    /// Inclusive start timestamp of the contained points.
    pub start_time: i64,
    /// Exclusive end timestamp (one past the last contained point).
    pub end_time: i64,
    /// Number of raw points in the payload.
    pub point_count: u32,
    /// Gorilla+block-compressed payload bytes.
    pub payload: Vec<u8>,
}

/// One decoded index entry from a `.seg` file's footer index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Series this payload belongs to.
    pub series_id: SeriesId,
    /// Inclusive start timestamp of the contained points.
    pub start_time: i64,
    /// Exclusive end timestamp.
    pub end_time: i64,
    /// Number of raw points.
    pub point_count: u32,
    /// Byte offset of the payload from file start.
    pub offset: u64,
    /// Payload length in bytes.
    pub length: u32,
}

/// Write `records` (already sorted by `(series_id, start_time)`) into a
/// new `.seg` file at `final_path`, via write-tmp, fsync, rename,
/// fsync-parent-dir.
pub fn write_segment_file(final_path: &Path, records: &[SegmentRecord]) -> Result<()> {
    let tmp_path = final_path.with_extension("seg.tmp");

    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION);
    buf.write_u32::<LittleEndian>(records.len() as u32).unwrap();
    buf.extend_from_slice(&[0u8; 5]);

    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        let offset = buf.len() as u64;
        buf.extend_from_slice(&record.payload);
        entries.push(IndexEntry {
            series_id: record.series_id,
            start_time: record.start_time,
            end_time: record.end_time,
            point_count: record.point_count,
            offset,
            length: record.payload.len() as u32,
        });
    }

    let index_offset = buf.len() as u64;
    for entry in &entries {
        buf.write_i64::<LittleEndian>(entry.series_id.get() as i64).unwrap();
        buf.write_i64::<LittleEndian>(entry.start_time).unwrap();
        buf.write_i64::<LittleEndian>(entry.end_time).unwrap();
        buf.write_u32::<LittleEndian>(entry.point_count).unwrap();
        buf.write_u64::<LittleEndian>(entry.offset).unwrap();
        buf.write_u32::<LittleEndian>(entry.length).unwrap();
        buf.extend_from_slice(&[0u8; 4]);
    }
    buf.write_u64::<LittleEndian>(index_offset).unwrap();

    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp_path, final_path)?;
    fsync_parent(final_path)?;
    Ok(())
}

fn fsync_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if parent.exists() {
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}

/// A read-only, mmapped `.seg` file with its index parsed.
pub struct SegmentFile {
    path: PathBuf,
    mmap: Mmap,
    index: Vec<IndexEntry>,
}

impl SegmentFile {
    /// Open and validate a sealed segment file, parsing its footer index.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < HEADER_SIZE + 8 {
            return Err(corrupt(path, "file shorter than header+footer"));
        }
        if &mmap[0..2] != MAGIC {
            return Err(corrupt(path, "bad magic"));
        }
        let version = mmap[2];
        if version != VERSION {
            return Err(corrupt(path, &format!("unsupported version {version}")));
        }
        let segment_count = (&mmap[3..7]).read_u32::<LittleEndian>().unwrap() as usize;

        let footer_start = mmap.len() - 8;
        let index_offset = (&mmap[footer_start..]).read_u64::<LittleEndian>().unwrap() as usize;
        let expected_index_len = segment_count * INDEX_ENTRY_SIZE;
        if index_offset + expected_index_len != footer_start {
            return Err(corrupt(path, "index length inconsistent with segment_count"));
        }

        let mut index = Vec::with_capacity(segment_count);
        let mut cursor = Cursor::new(&mmap[index_offset..footer_start]);
        for _ in 0..segment_count {
            let series_id = SeriesId(cursor.read_i64::<LittleEndian>().map_err(|e| corrupt(path, &e.to_string()))? as u64);
            let start_time = cursor.read_i64::<LittleEndian>().map_err(|e| corrupt(path, &e.to_string()))?;
            let end_time = cursor.read_i64::<LittleEndian>().map_err(|e| corrupt(path, &e.to_string()))?;
            let point_count = cursor.read_u32::<LittleEndian>().map_err(|e| corrupt(path, &e.to_string()))?;
            let offset = cursor.read_u64::<LittleEndian>().map_err(|e| corrupt(path, &e.to_string()))?;
            let length = cursor.read_u32::<LittleEndian>().map_err(|e| corrupt(path, &e.to_string()))?;
            let mut padding = [0u8; 4];
            cursor.read_exact(&mut padding).map_err(|e| corrupt(path, &e.to_string()))?;
            index.push(IndexEntry { series_id, start_time, end_time, point_count, offset, length });
        }

        Ok(SegmentFile { path: path.to_path_buf(), mmap, index })
    }

    /// Binary search the index by `series_id`, then within the matched
    /// run by `start_time`, returning all entries overlapping
    /// `[from, to)`.
    pub fn entries_overlapping(&self, series_id: SeriesId, from: i64, to: i64) -> Vec<IndexEntry> {
        let start = self.index.partition_point(|e| e.series_id < series_id);
        let end = self.index.partition_point(|e| e.series_id <= series_id);
        self.index[start..end]
            .iter()
            .filter(|e| e.start_time < to && e.end_time > from)
            .copied()
            .collect()
    }

    /// Raw payload bytes for one index entry.
    pub fn payload(&self, entry: &IndexEntry) -> &[u8] {
        &self.mmap[entry.offset as usize..(entry.offset + entry.length as u64) as usize]
    }

    /// All index entries, in file order (sorted by series_id, start_time).
    pub fn index(&self) -> &[IndexEntry] {
        &self.index
    }

    /// Path this segment file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn corrupt(path: &Path, detail: &str) -> Error {
    Error::CorruptSegment { path: Some(path.to_path_buf()), detail: detail.to_string() }
}

use std::io::Read as _;
