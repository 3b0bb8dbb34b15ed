//! Per-shard watermark file: a fixed-size array of `i64`, one per tier in
//! schema order. Small enough that aligned rewrite-in-place is safe —
//! no tmp-file dance is needed, but every write is followed by fsync.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tsdb_core::error::Result;

/// Load a shard's watermarks, one per tier in schema order. A missing
/// file (fresh shard) yields all-zero watermarks.
pub fn read_watermarks(path: &Path, tier_count: usize) -> Result<Vec<i64>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![0; tier_count]),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::with_capacity(tier_count);
    let mut cursor = std::io::Cursor::new(&bytes[..]);
    for _ in 0..tier_count {
        out.push(cursor.read_i64::<LittleEndian>().unwrap_or(0));
    }
    Ok(out)
}

/// Rewrite the watermark file in full and fsync it.
pub fn write_watermarks(path: &Path, watermarks: &[i64]) -> Result<()> {
    let mut buf = Vec::with_capacity(watermarks.len() * 8);
    for wm in watermarks {
        buf.write_i64::<LittleEndian>(*wm).unwrap();
    }
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_reads_as_zeros() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watermarks.bin");
        assert_eq!(read_watermarks(&path, 3).unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watermarks.bin");
        write_watermarks(&path, &[100, 200, 300]).unwrap();
        assert_eq!(read_watermarks(&path, 3).unwrap(), vec![100, 200, 300]);
    }
}
