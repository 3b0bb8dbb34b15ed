//! Gorilla-style delta/XOR compression of raw `(timestamp, value)` pairs,
//! followed by a general block compressor.
//!
//! Used by the segment builder to produce segment payloads, and by the
//! shard store / query planner to decode them back for raw reads.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use tsdb_core::error::{Error, Result};

/// Encode ascending `(ts, value)` pairs: delta-of-delta timestamps packed
/// alongside XOR'd float bits, then block-compressed.
///
/// This is a straightforward (not bit-packed) variant: timestamps are
/// stored as their delta from the previous timestamp, and values as the
/// XOR with the previous value's bit pattern. Both compress well under
/// the subsequent zstd pass even without per-field bit-packing.
pub fn encode(points: &[(i64, f64)]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4 + points.len() * 16);
    payload.write_u32::<LittleEndian>(points.len() as u32).unwrap();
    let mut prev_ts = 0i64;
    let mut prev_bits = 0u64;
    for (ts, value) in points {
        let delta = ts - prev_ts;
        payload.write_i64::<LittleEndian>(delta).unwrap();
        let bits = value.to_bits();
        payload.write_u64::<LittleEndian>(bits ^ prev_bits).unwrap();
        prev_ts = *ts;
        prev_bits = bits;
    }
    zstd::encode_all(Cursor::new(payload), 0).expect("zstd encode is infallible for in-memory buffers")
}

/// Decode a blob produced by [`encode`] back into ascending `(ts, value)`
/// pairs.
pub fn decode(blob: &[u8]) -> Result<Vec<(i64, f64)>> {
    let payload = zstd::decode_all(blob).map_err(|e| Error::CorruptSegment {
        path: None,
        detail: format!("zstd decompress failed: {e}"),
    })?;
    let mut cursor = Cursor::new(&payload[..]);
    let count = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| corrupt(format!("truncated header: {e}")))? as usize;

    let mut points = Vec::with_capacity(count);
    let mut prev_ts = 0i64;
    let mut prev_bits = 0u64;
    for _ in 0..count {
        let delta = cursor.read_i64::<LittleEndian>().map_err(|e| corrupt(format!("truncated point: {e}")))?;
        let xored = cursor.read_u64::<LittleEndian>().map_err(|e| corrupt(format!("truncated point: {e}")))?;
        let ts = prev_ts + delta;
        let bits = xored ^ prev_bits;
        points.push((ts, f64::from_bits(bits)));
        prev_ts = ts;
        prev_bits = bits;
    }
    Ok(points)
}

fn corrupt(detail: String) -> Error {
    Error::CorruptSegment { path: None, detail }
}
