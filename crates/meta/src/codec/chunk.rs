//! Tier chunk encoding: packed-binary bucket payload plus a general block
//! compressor, with later-write-wins merge semantics.
//!
//! The encoded chunk records no `chunk_start` — that belongs to the index
//! key maintained by the shard store. The codec performs no aggregation:
//! callers must pre-compute correct aggregates before calling `merge`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};
use tsdb_core::error::{Error, Result};
use tsdb_core::types::{Aggregate, Bucket, BucketAggregates};

/// Encode a list of buckets (ascending `bucket_start`, all sharing the
/// given `resolution_seconds` and aggregate set) into a compressed blob.
pub fn encode(buckets: &[Bucket], resolution_seconds: i64, aggregates: &[Aggregate]) -> Vec<u8> {
    let mask = aggregates.iter().fold(0u8, |acc, a| acc | a.bit());
    let mut payload = Vec::with_capacity(7 + buckets.len() * (8 + aggregates.len() * 8));
    payload.write_u32::<LittleEndian>(resolution_seconds as u32).unwrap();
    payload.write_u8(mask).unwrap();
    payload.write_u16::<LittleEndian>(buckets.len() as u16).unwrap();
    for bucket in buckets {
        payload.write_i64::<LittleEndian>(bucket.bucket_start).unwrap();
        for agg in aggregates {
            let v = bucket.aggregates.get(*agg).unwrap_or(0.0);
            payload.write_f64::<LittleEndian>(v).unwrap();
        }
    }
    zstd::encode_all(Cursor::new(payload), 0).expect("zstd encode is infallible for in-memory buffers")
}

/// Decode a chunk blob produced by [`encode`] back into ascending-order
/// bucket records.
pub fn decode(blob: &[u8]) -> Result<Vec<Bucket>> {
    let payload = zstd::decode_all(blob).map_err(|e| Error::CorruptChunk {
        path: None,
        detail: format!("zstd decompress failed: {e}"),
    })?;
    let mut cursor = Cursor::new(&payload[..]);
    let resolution_seconds = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| corrupt(format!("truncated header: {e}")))? as i64;
    let _ = resolution_seconds;
    let mask = cursor.read_u8().map_err(|e| corrupt(format!("truncated header: {e}")))?;
    let bucket_count = cursor
        .read_u16::<LittleEndian>()
        .map_err(|e| corrupt(format!("truncated header: {e}")))? as usize;
    let aggregates: Vec<Aggregate> = Aggregate::ALL.into_iter().filter(|a| mask & a.bit() != 0).collect();

    let mut buckets = Vec::with_capacity(bucket_count);
    for _ in 0..bucket_count {
        let bucket_start = cursor
            .read_i64::<LittleEndian>()
            .map_err(|e| corrupt(format!("truncated bucket record: {e}")))?;
        let mut agg_values = BucketAggregates::default();
        for agg in &aggregates {
            let v = cursor
                .read_f64::<LittleEndian>()
                .map_err(|e| corrupt(format!("truncated aggregate value: {e}")))?;
            agg_values.set(*agg, v);
        }
        buckets.push(Bucket { bucket_start, aggregates: agg_values });
    }

    let mut trailing = [0u8; 1];
    if cursor.read(&mut trailing).unwrap_or(0) != 0 {
        return Err(corrupt("trailing bytes after declared bucket_count".into()));
    }

    Ok(buckets)
}

/// Decode `existing_blob`, combine with `new_buckets` keyed by
/// `bucket_start` (new overwrites existing on a collision), sort
/// ascending, and re-encode.
pub fn merge(
    existing_blob: &[u8],
    new_buckets: &[Bucket],
    resolution_seconds: i64,
    aggregates: &[Aggregate],
) -> Result<Vec<u8>> {
    let mut by_start: std::collections::BTreeMap<i64, Bucket> = decode(existing_blob)?
        .into_iter()
        .map(|b| (b.bucket_start, b))
        .collect();
    for bucket in new_buckets {
        by_start.insert(bucket.bucket_start, bucket.clone());
    }
    let merged: Vec<Bucket> = by_start.into_values().collect();
    Ok(encode(&merged, resolution_seconds, aggregates))
}

fn corrupt(detail: String) -> Error {
    Error::CorruptChunk { path: None, detail }
}
