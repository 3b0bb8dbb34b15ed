//! Durability mode configuration: controls WAL fsync cadence.

/// Durability mode for WAL checkpoint writes.
///
/// | Mode | fsync | Data loss window |
/// |------|-------|-------------------|
/// | `None` | never | all unsealed checkpoints |
/// | `Strict` | every checkpoint | zero |
/// | `Batched` | periodic | up to `interval_ms` or `batch_size` |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// No WAL persistence at all; the open window survives only in
    /// memory. Used by embedders that accept full loss on crash.
    None,
    /// fsync after every checkpoint write.
    Strict,
    /// fsync every `batch_size` writes or `interval_ms`, whichever comes
    /// first.
    Batched {
        /// Maximum time between fsyncs, in milliseconds.
        interval_ms: u64,
        /// Maximum writes between fsyncs.
        batch_size: usize,
    },
}

impl DurabilityMode {
    /// Whether this mode requires a WAL file to exist at all.
    pub fn requires_wal(&self) -> bool {
        !matches!(self, DurabilityMode::None)
    }
}

impl Default for DurabilityMode {
    fn default() -> Self {
        DurabilityMode::Batched { interval_ms: 60_000, batch_size: 10_000 }
    }
}
