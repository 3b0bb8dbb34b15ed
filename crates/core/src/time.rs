//! Time alignment helpers shared by the segment builder, rollup engine,
//! and query planner.

/// Floor `ts` to the nearest multiple of `width` at or below it.
///
/// Used for segment window alignment, bucket alignment, and chunk
/// alignment — all three are "floor to a fixed-width grid" operations.
pub fn align_floor(ts: i64, width: i64) -> i64 {
    debug_assert!(width > 0);
    ts.div_euclid(width) * width
}

/// The segment window containing `ts`, given `window_duration`.
pub fn window_start(ts: i64, window_duration: i64) -> i64 {
    align_floor(ts, window_duration)
}

/// The tier bucket containing `ts`, given the tier's `resolution`.
pub fn bucket_start(ts: i64, resolution: i64) -> i64 {
    align_floor(ts, resolution)
}

/// The tier chunk containing the bucket starting at `bucket_start`, given
/// the tier's `chunk_seconds`.
pub fn chunk_start(bucket_start: i64, chunk_seconds: i64) -> i64 {
    align_floor(bucket_start, chunk_seconds)
}
