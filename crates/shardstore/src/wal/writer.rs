//! Single-file WAL writer for a shard's open window.
//!
//! Unlike a rotating multi-segment log, a shard has at most one
//! `current.wal`: it is deleted in full once the window it checkpoints
//! is sealed into a `.seg` file.

use super::config::WalConfig;
use super::mode::DurabilityMode;
use crate::format::wal_record::WalRecord;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tsdb_core::error::Result;

/// Appends checkpoint records to a shard's `current.wal`, fsyncing
/// according to the configured [`DurabilityMode`].
pub struct WalWriter {
    path: PathBuf,
    file: Option<File>,
    durability: DurabilityMode,
    config: WalConfig,
    bytes_since_sync: u64,
    writes_since_sync: usize,
    last_sync: Instant,
}

impl WalWriter {
    /// Open (creating if absent) the WAL file at `path` for appending.
    pub fn open(path: PathBuf, durability: DurabilityMode, config: WalConfig) -> Result<Self> {
        let file = if durability.requires_wal() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Some(OpenOptions::new().create(true).append(true).open(&path)?)
        } else {
            None
        };
        Ok(WalWriter {
            path,
            file,
            durability,
            config,
            bytes_since_sync: 0,
            writes_since_sync: 0,
            last_sync: Instant::now(),
        })
    }

    /// Append one record, syncing per the configured durability mode.
    pub fn append(&mut self, record: &WalRecord) -> Result<()> {
        let Some(file) = self.file.as_mut() else { return Ok(()) };
        let bytes = record.to_bytes();
        file.write_all(&bytes)?;
        self.bytes_since_sync += bytes.len() as u64;
        self.writes_since_sync += 1;
        self.maybe_sync()?;
        Ok(())
    }

    fn maybe_sync(&mut self) -> Result<()> {
        let should_sync = match self.durability {
            DurabilityMode::None => false,
            DurabilityMode::Strict => true,
            DurabilityMode::Batched { interval_ms, batch_size } => {
                self.writes_since_sync >= batch_size
                    || self.last_sync.elapsed().as_millis() as u64 >= interval_ms
                    || self.bytes_since_sync >= self.config.buffered_sync_bytes
            }
        };
        if should_sync {
            self.flush()?;
        }
        Ok(())
    }

    /// Force an fsync regardless of durability mode, resetting the
    /// batching counters.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.sync_all()?;
        }
        self.bytes_since_sync = 0;
        self.writes_since_sync = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Delete the WAL file after its window has been sealed into a
    /// `.seg` file. Safe to call even if the WAL was never created.
    pub fn delete(self) -> Result<()> {
        drop(self.file);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the WAL file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
