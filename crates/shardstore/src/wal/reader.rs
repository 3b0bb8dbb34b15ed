//! WAL recovery scan: validate records, truncate at the first corrupt
//! one.

use crate::format::wal_record::WalRecord;
use std::io::Cursor;
use std::path::Path;
use tsdb_core::error::Result;

/// Outcome of scanning a `current.wal` file at startup.
#[derive(Debug, Default)]
pub struct WalScanResult {
    /// Records that validated successfully, in file order.
    pub records: Vec<WalRecord>,
    /// True if scanning stopped early because a record failed its CRC
    /// check (the WAL is truncated at that point and earlier records
    /// are replayed).
    pub truncated: bool,
}

/// Scan `path` for valid WAL records, stopping at the first CRC failure
/// or truncated record rather than surfacing an error — a partially
/// written tail is the expected shape of a WAL after a crash.
pub fn scan(path: &Path) -> Result<WalScanResult> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(WalScanResult::default()),
        Err(e) => return Err(e.into()),
    };

    let mut cursor = Cursor::new(&bytes[..]);
    let mut records = Vec::new();
    loop {
        match WalRecord::read_from(&mut cursor) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => return Ok(WalScanResult { records, truncated: false }),
            Err(_) => return Ok(WalScanResult { records, truncated: true }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tsdb_core::types::SeriesId;

    fn record(n: i64) -> WalRecord {
        WalRecord { series_id: SeriesId(1), start_time: n, end_time: n + 1, point_count: 1, data: vec![n as u8, 2, 3] }
    }

    #[test]
    fn scans_all_valid_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current.wal");
        let mut bytes = Vec::new();
        bytes.extend(record(1).to_bytes());
        bytes.extend(record(2).to_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let result = scan(&path).unwrap();
        assert_eq!(result.records.len(), 2);
        assert!(!result.truncated);
    }

    #[test]
    fn truncates_at_first_corrupt_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current.wal");
        let mut bytes = record(1).to_bytes();
        let mut corrupt_tail = record(2).to_bytes();
        let last = corrupt_tail.len() - 1;
        corrupt_tail[last] ^= 0xFF;
        bytes.extend(corrupt_tail);
        std::fs::write(&path, &bytes).unwrap();

        let result = scan(&path).unwrap();
        assert_eq!(result.records.len(), 1);
        assert!(result.truncated);
    }

    #[test]
    fn missing_file_is_empty_not_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("current.wal");
        let result = scan(&path).unwrap();
        assert!(result.records.is_empty());
        assert!(!result.truncated);
    }
}
