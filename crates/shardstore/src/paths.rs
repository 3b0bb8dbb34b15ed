//! Per-shard directory layout.
//!
//! ```text
//! shard_<s>/
//!   raw/
//!     <window_start>.seg     (sealed, immutable)
//!     current.wal            (append log for the open window; at most one)
//!   tier_<name>/
//!     chunks.dat             (append-only blob file)
//!     index.bin              (sorted index)
//!   watermarks.bin           (fixed 8 bytes x number of tiers)
//! ```

use std::path::{Path, PathBuf};

/// Path accessors for one shard's on-disk state, rooted at
/// `<data_dir>/shard_<index>`.
#[derive(Debug, Clone)]
pub struct ShardPaths {
    root: PathBuf,
}

impl ShardPaths {
    /// Paths for shard `index` under `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>, index: usize) -> Self {
        ShardPaths { root: data_dir.as_ref().join(format!("shard_{index}")) }
    }

    /// Shard root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding sealed segments and the open WAL.
    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    /// Sealed segment file path for a given window start.
    pub fn segment_path(&self, window_start: i64) -> PathBuf {
        self.raw_dir().join(format!("{window_start}.seg"))
    }

    /// The open window's WAL file. There is at most one per shard.
    pub fn wal_path(&self) -> PathBuf {
        self.raw_dir().join("current.wal")
    }

    /// Directory for one tier's chunk file and index.
    pub fn tier_dir(&self, tier_name: &str) -> PathBuf {
        self.root.join(format!("tier_{tier_name}"))
    }

    /// Append-only chunk blob file for a tier.
    pub fn chunks_path(&self, tier_name: &str) -> PathBuf {
        self.tier_dir(tier_name).join("chunks.dat")
    }

    /// Sorted index file for a tier's chunks.
    pub fn index_path(&self, tier_name: &str) -> PathBuf {
        self.tier_dir(tier_name).join("index.bin")
    }

    /// Fixed-size watermark file, one `i64` per tier.
    pub fn watermarks_path(&self) -> PathBuf {
        self.root.join("watermarks.bin")
    }

    /// Create the shard's directory tree, including one tier directory
    /// per name in `tier_names`.
    pub fn create_directories(&self, tier_names: &[&str]) -> std::io::Result<()> {
        std::fs::create_dir_all(self.raw_dir())?;
        for name in tier_names {
            std::fs::create_dir_all(self.tier_dir(name))?;
        }
        Ok(())
    }

    /// List sealed segment window starts, ascending.
    pub fn list_segments(&self) -> std::io::Result<Vec<i64>> {
        let mut windows = Vec::new();
        let dir = self.raw_dir();
        if !dir.exists() {
            return Ok(windows);
        }
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(stem) = name.strip_suffix(".seg") {
                if let Ok(w) = stem.parse::<i64>() {
                    windows.push(w);
                }
            }
        }
        windows.sort_unstable();
        Ok(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn paths_are_rooted_under_shard_index() {
        let paths = ShardPaths::new("/data", 3);
        assert_eq!(paths.root(), Path::new("/data/shard_3"));
        assert_eq!(paths.segment_path(100), PathBuf::from("/data/shard_3/raw/100.seg"));
        assert_eq!(paths.wal_path(), PathBuf::from("/data/shard_3/raw/current.wal"));
        assert_eq!(paths.chunks_path("hourly"), PathBuf::from("/data/shard_3/tier_hourly/chunks.dat"));
    }

    #[test]
    fn list_segments_sorted_ascending() {
        let dir = tempdir().unwrap();
        let paths = ShardPaths::new(dir.path(), 0);
        paths.create_directories(&[]).unwrap();
        std::fs::write(paths.segment_path(7200), b"").unwrap();
        std::fs::write(paths.segment_path(0), b"").unwrap();
        std::fs::write(paths.segment_path(3600), b"").unwrap();
        assert_eq!(paths.list_segments().unwrap(), vec![0, 3600, 7200]);
    }
}
