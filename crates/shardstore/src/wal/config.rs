//! WAL writer configuration.

/// Configuration for a shard's `current.wal` writer.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Bytes written since the last fsync that force a sync in
    /// `Batched` mode, regardless of `interval_ms`/`batch_size`.
    pub buffered_sync_bytes: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        WalConfig { buffered_sync_bytes: 4 * 1024 * 1024 }
    }
}

impl WalConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration tuned for fast test iteration (small thresholds).
    pub fn for_testing() -> Self {
        WalConfig { buffered_sync_bytes: 16 * 1024 }
    }
}
