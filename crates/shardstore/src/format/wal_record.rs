//! WAL entry format: one record per segment handed off by the builder.
//!
//! `series_id:i64, start_time:i64, end_time:i64, point_count:u32,
//! data_length:u32, crc32:u32, data:bytes`

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use tsdb_core::error::{Error, Result};
use tsdb_core::types::SeriesId;

/// One WAL record: a not-yet-sealed segment payload checkpointed for
/// crash recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct WalRecord {
    /// Series this payload belongs to.
    pub series_id: SeriesId,
    /// Inclusive start timestamp of the contained points.
    pub start_time: i64,
    /// Exclusive end timestamp.
    pub end_time: i64,
    /// Number of raw points in the payload.
    pub point_count: u32,
    /// Gorilla+block-compressed payload bytes.
    pub data: Vec<u8>,
}

impl WalRecord {
    /// Serialize to its on-disk byte form, including the trailing CRC32
    /// computed over `data`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 8 + 8 + 4 + 4 + 4 + self.data.len());
        buf.write_i64::<LittleEndian>(self.series_id.get() as i64).unwrap();
        buf.write_i64::<LittleEndian>(self.start_time).unwrap();
        buf.write_i64::<LittleEndian>(self.end_time).unwrap();
        buf.write_u32::<LittleEndian>(self.point_count).unwrap();
        buf.write_u32::<LittleEndian>(self.data.len() as u32).unwrap();
        buf.write_u32::<LittleEndian>(crc32fast::hash(&self.data)).unwrap();
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Parse one record starting at the cursor's current position,
    /// advancing it past the record on success. Returns `Ok(None)` if
    /// fewer bytes remain than a minimal header, treated by the WAL
    /// reader as "end of valid data" rather than corruption.
    pub fn read_from(cursor: &mut Cursor<&[u8]>) -> Result<Option<Self>> {
        let remaining = cursor.get_ref().len() as u64 - cursor.position();
        if remaining < 8 + 8 + 8 + 4 + 4 + 4 {
            return Ok(None);
        }
        let start_pos = cursor.position();
        let series_id = SeriesId(cursor.read_i64::<LittleEndian>().unwrap() as u64);
        let start_time = cursor.read_i64::<LittleEndian>().unwrap();
        let end_time = cursor.read_i64::<LittleEndian>().unwrap();
        let point_count = cursor.read_u32::<LittleEndian>().unwrap();
        let data_length = cursor.read_u32::<LittleEndian>().unwrap() as u64;
        let crc = cursor.read_u32::<LittleEndian>().unwrap();

        if cursor.get_ref().len() as u64 - cursor.position() < data_length {
            cursor.set_position(start_pos);
            return Err(Error::CorruptWal {
                path: Default::default(),
                offset: start_pos,
                detail: "truncated payload".into(),
            });
        }
        let data_start = cursor.position() as usize;
        let data = cursor.get_ref()[data_start..data_start + data_length as usize].to_vec();
        cursor.set_position(cursor.position() + data_length);

        let computed = crc32fast::hash(&data);
        if computed != crc {
            cursor.set_position(start_pos);
            return Err(Error::CorruptWal {
                path: Default::default(),
                offset: start_pos,
                detail: format!("crc mismatch: stored {crc:#010x}, computed {computed:#010x}"),
            });
        }

        Ok(Some(WalRecord { series_id, start_time, end_time, point_count, data }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> WalRecord {
        WalRecord { series_id: SeriesId(7), start_time: 0, end_time: 60, point_count: 2, data: vec![1, 2, 3, 4] }
    }

    #[test]
    fn round_trips() {
        let r = record();
        let bytes = r.to_bytes();
        let mut cursor = Cursor::new(&bytes[..]);
        let parsed = WalRecord::read_from(&mut cursor).unwrap().unwrap();
        assert_eq!(parsed, r);
        assert_eq!(cursor.position(), bytes.len() as u64);
    }

    #[test]
    fn detects_crc_mismatch() {
        let r = record();
        let mut bytes = r.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut cursor = Cursor::new(&bytes[..]);
        let err = WalRecord::read_from(&mut cursor).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn short_remainder_is_end_of_log_not_corruption() {
        let bytes = vec![0u8; 5];
        let mut cursor = Cursor::new(&bytes[..]);
        assert!(WalRecord::read_from(&mut cursor).unwrap().is_none());
    }
}
