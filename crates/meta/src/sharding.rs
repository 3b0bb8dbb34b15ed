//! Series-to-shard assignment.

use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use tsdb_core::types::SeriesId;

/// Stable shard assignment for a series: `stable_hash(series_id) mod S`.
///
/// The hash is independent of process-local randomization so the mapping
/// is reproducible across restarts.
pub fn shard_of(series_id: SeriesId, shard_count: usize) -> usize {
    debug_assert!(shard_count > 0);
    let mut hasher = FxHasher::default();
    series_id.get().hash(&mut hasher);
    (hasher.finish() % shard_count as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_stable() {
        let id = SeriesId(42);
        let a = shard_of(id, 8);
        let b = shard_of(id, 8);
        assert_eq!(a, b);
        assert!(a < 8);
    }

    #[test]
    fn assignment_spreads_across_shards() {
        let shard_count = 4;
        let mut seen = std::collections::HashSet::new();
        for i in 0..1000u64 {
            seen.insert(shard_of(SeriesId(i), shard_count));
        }
        assert_eq!(seen.len(), shard_count);
    }
}
