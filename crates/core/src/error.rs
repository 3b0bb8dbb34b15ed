//! Error taxonomy for the time-series core.
//!
//! Every subsystem (chunk codec, shard store, write path, rollup engine,
//! query planner) returns [`Error`]. Variants map directly onto the error
//! taxonomy used throughout the store: each carries just enough context
//! for a caller to decide whether to retry, surface, or drop the result.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used across all tsdb crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the storage and rollup core.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed metric name, NaN value, non-positive timestamp, etc.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A bounded write queue was full and the caller's deadline expired.
    #[error("backpressure: {0}")]
    Backpressure(String),

    /// A tier chunk failed its magic/CRC/length check on read.
    #[error("corrupt chunk at {path:?}: {detail}")]
    CorruptChunk {
        /// Path of the chunk file, if known.
        path: Option<PathBuf>,
        /// What failed to validate.
        detail: String,
    },

    /// A raw segment failed its magic/CRC/length check on read.
    #[error("corrupt segment at {path:?}: {detail}")]
    CorruptSegment {
        /// Path of the segment file, if known.
        path: Option<PathBuf>,
        /// What failed to validate.
        detail: String,
    },

    /// A WAL record failed its CRC check during recovery.
    #[error("corrupt WAL record in {path:?} at offset {offset}: {detail}")]
    CorruptWal {
        /// Path of the WAL file.
        path: PathBuf,
        /// Byte offset of the first bad record.
        offset: u64,
        /// What failed to validate.
        detail: String,
    },

    /// Underlying file operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A query exceeded its deadline.
    #[error("query timed out")]
    Timeout,

    /// Metric or series not found. Callers that treat this as empty rather
    /// than an error should match on this variant explicitly.
    #[error("not found: {0}")]
    NotFound(String),

    /// Fatal misconfiguration detected at startup (incompatible shard count,
    /// schema regression, etc).
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// True for errors a caller may retry without changing its request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Backpressure(_) | Error::Timeout)
    }

    /// True for errors that indicate on-disk data corruption rather than a
    /// transient or caller-side problem.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CorruptChunk { .. } | Error::CorruptSegment { .. } | Error::CorruptWal { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backpressure_and_timeout_are_retryable() {
        assert!(Error::Backpressure("queue full".into()).is_retryable());
        assert!(Error::Timeout.is_retryable());
        assert!(!Error::InvalidInput("bad".into()).is_retryable());
    }

    #[test]
    fn corruption_variants_classified() {
        assert!(Error::CorruptChunk {
            path: None,
            detail: "bad magic".into()
        }
        .is_corruption());
        assert!(Error::CorruptSegment {
            path: None,
            detail: "bad magic".into()
        }
        .is_corruption());
        assert!(Error::CorruptWal {
            path: PathBuf::from("wal"),
            offset: 0,
            detail: "crc".into()
        }
        .is_corruption());
        assert!(!Error::NotFound("cpu".into()).is_corruption());
    }

    #[test]
    fn display_messages_carry_detail() {
        let err = Error::ConfigError("shards cannot change".into());
        assert!(err.to_string().contains("shards cannot change"));
    }
}
