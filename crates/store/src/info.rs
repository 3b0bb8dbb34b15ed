//! Store-wide diagnostic snapshot.

use tsdb_core::error::Result;
use tsdb_shardstore::ShardStore;

/// A point-in-time snapshot of store-wide counters, returned by
/// [`crate::Store::info`].
#[derive(Debug, Clone)]
pub struct StoreInfo {
    /// Total distinct series registered.
    pub series_count: usize,
    /// Rough count of raw points currently held in sealed segments,
    /// across every shard. An estimate: it counts segment index entries
    /// rather than decompressing payloads, and excludes points still in
    /// the open window.
    pub points_estimate: u64,
    /// On-disk footprint of each shard's directory, indexed by shard.
    pub storage_bytes_by_shard: Vec<u64>,
    /// Per-shard, per-tier watermark, indexed `[shard][tier]` in schema
    /// order.
    pub tier_watermarks: Vec<Vec<i64>>,
}

pub(crate) fn collect(shards: &[std::sync::Arc<ShardStore>], series_count: usize) -> Result<StoreInfo> {
    let mut points_estimate = 0u64;
    let mut storage_bytes_by_shard = Vec::with_capacity(shards.len());
    let mut tier_watermarks = Vec::with_capacity(shards.len());

    for store in shards {
        points_estimate += store.raw_point_count_estimate();
        storage_bytes_by_shard.push(store.storage_bytes()?);
        tier_watermarks.push(store.read_watermarks()?);
    }

    Ok(StoreInfo { series_count, points_estimate, storage_bytes_by_shard, tier_watermarks })
}
