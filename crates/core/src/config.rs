//! Store-wide configuration: shard count, window sizing, flush cadence,
//! and tier schema.

use crate::error::{Error, Result};
use crate::types::{Aggregate, Tier};
use std::path::PathBuf;

/// Block compressor used for segment payloads and tier chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// zstd at the default level.
    Zstd,
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Zstd
    }
}

/// A tier's schema-level definition, independent of runtime watermark
/// state. Mirrors [`crate::types::Tier`] but is the config-facing shape
/// used to build the running schema at store open.
#[derive(Debug, Clone)]
pub struct TierSpec {
    /// Tier name, e.g. `"hourly"`.
    pub name: String,
    /// Bucket width in seconds.
    pub resolution_seconds: i64,
    /// Aggregates to maintain for this tier.
    pub aggregates: AggregateSet,
    /// Tier chunk width in seconds; must be a positive multiple of
    /// `resolution_seconds`.
    pub chunk_seconds: i64,
    /// Retention horizon in seconds, or `None` for "forever".
    pub retention_seconds: Option<i64>,
}

impl TierSpec {
    fn validate(&self) -> Result<()> {
        if self.resolution_seconds <= 0 {
            return Err(Error::ConfigError(format!(
                "tier {:?}: resolution_seconds must be positive",
                self.name
            )));
        }
        if self.chunk_seconds <= 0 || self.chunk_seconds % self.resolution_seconds != 0 {
            return Err(Error::ConfigError(format!(
                "tier {:?}: chunk_seconds must be a positive multiple of resolution_seconds",
                self.name
            )));
        }
        if self.aggregates.0.is_empty() {
            return Err(Error::ConfigError(format!(
                "tier {:?}: aggregate set must be non-empty",
                self.name
            )));
        }
        Ok(())
    }

    /// Convert into the runtime [`Tier`] used by the codec and engine.
    pub fn into_tier(self) -> Tier {
        Tier {
            name: self.name,
            resolution_seconds: self.resolution_seconds,
            aggregates: self.aggregates.0,
            chunk_seconds: self.chunk_seconds,
            retention_seconds: self.retention_seconds,
        }
    }
}

/// An ordered, non-empty subset of [`Aggregate`] in fixed bit order.
#[derive(Debug, Clone, Default)]
pub struct AggregateSet(Vec<Aggregate>);

impl AggregateSet {
    /// Build from names such as `["avg", "min", "max"]`.
    pub fn from_names(names: &[&str]) -> Result<Self> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let agg = Aggregate::parse(name)
                .ok_or_else(|| Error::ConfigError(format!("unknown aggregate {:?}", name)))?;
            out.push(agg);
        }
        out.sort();
        out.dedup();
        Ok(AggregateSet(out))
    }

    /// All six aggregates.
    pub fn all() -> Self {
        AggregateSet(Aggregate::ALL.to_vec())
    }

    /// Borrow the underlying ordered list.
    pub fn as_slice(&self) -> &[Aggregate] {
        &self.0
    }
}

/// Top-level store configuration, per EXTERNAL INTERFACES.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for shards and metadata.
    pub data_dir: PathBuf,
    /// Number of write shards. Fixed for the life of a store.
    pub shards: usize,
    /// Raw segment window size in seconds.
    pub segment_duration: i64,
    /// How long sealed raw segments are kept before retention drops them.
    pub raw_retention_seconds: i64,
    /// Write Buffer → Builder drain cadence, in milliseconds.
    pub flush_interval_ms: u64,
    /// Write Buffer flush size trigger (point count).
    pub flush_threshold: usize,
    /// WAL checkpoint cadence in milliseconds.
    pub pending_flush_interval_ms: u64,
    /// Cadence, in milliseconds, between rollup passes over every
    /// `(shard, tier)` pair. Defaults to the hourly tier's
    /// `pending_flush_interval`; a single cadence is used for every tier
    /// since each pass is cheap once caught up.
    pub rollup_interval_ms: u64,
    /// Cadence, in milliseconds, between retention sweeps over every
    /// shard.
    pub retention_interval_ms: u64,
    /// Block compressor for segments and chunks.
    pub compression: Compression,
    /// Tier schema, coarsest-last is not required here; callers may list
    /// in any order, the engine sorts by resolution ascending.
    pub schema: Vec<TierSpec>,
}

impl StoreConfig {
    /// Default shard count: host CPU count, floor 1.
    pub fn default_shards() -> usize {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }

    /// A configuration with sensible production defaults and the
    /// standard hourly/daily/monthly schema.
    pub fn with_defaults(data_dir: impl Into<PathBuf>) -> Self {
        StoreConfig {
            data_dir: data_dir.into(),
            shards: Self::default_shards(),
            segment_duration: 14_400,
            raw_retention_seconds: 2 * 86_400,
            flush_interval_ms: 5_000,
            flush_threshold: 10_000,
            pending_flush_interval_ms: 60_000,
            rollup_interval_ms: 60_000,
            retention_interval_ms: 3_600_000,
            compression: Compression::Zstd,
            schema: vec![
                TierSpec {
                    name: "hourly".into(),
                    resolution_seconds: 3_600,
                    aggregates: AggregateSet::all(),
                    chunk_seconds: 24 * 3_600,
                    retention_seconds: Some(30 * 86_400),
                },
                TierSpec {
                    name: "daily".into(),
                    resolution_seconds: 86_400,
                    aggregates: AggregateSet::all(),
                    chunk_seconds: 30 * 86_400,
                    retention_seconds: Some(365 * 86_400),
                },
                TierSpec {
                    name: "monthly".into(),
                    resolution_seconds: 30 * 86_400,
                    aggregates: AggregateSet::all(),
                    chunk_seconds: 12 * 30 * 86_400,
                    retention_seconds: None,
                },
            ],
        }
    }

    /// Validate internal consistency: positive shard count and window,
    /// well-formed tier specs sorted by ascending resolution with no
    /// duplicate names.
    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 {
            return Err(Error::ConfigError("shards must be positive".into()));
        }
        if self.segment_duration <= 0 {
            return Err(Error::ConfigError("segment_duration must be positive".into()));
        }
        if self.raw_retention_seconds <= 0 {
            return Err(Error::ConfigError("raw_retention_seconds must be positive".into()));
        }
        let mut seen = std::collections::HashSet::new();
        let mut last_resolution = 0i64;
        for tier in &self.schema {
            tier.validate()?;
            if !seen.insert(tier.name.clone()) {
                return Err(Error::ConfigError(format!("duplicate tier name {:?}", tier.name)));
            }
            if tier.resolution_seconds < last_resolution {
                return Err(Error::ConfigError(
                    "schema must list tiers in ascending resolution order".into(),
                ));
            }
            last_resolution = tier.resolution_seconds;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = StoreConfig::with_defaults("/tmp/tsdb-test");
        cfg.validate().expect("default schema must validate");
    }

    #[test]
    fn rejects_non_multiple_chunk_seconds() {
        let tier = TierSpec {
            name: "bad".into(),
            resolution_seconds: 3600,
            aggregates: AggregateSet::all(),
            chunk_seconds: 5000,
            retention_seconds: None,
        };
        assert!(tier.validate().is_err());
    }

    #[test]
    fn rejects_descending_resolution_order() {
        let mut cfg = StoreConfig::with_defaults("/tmp/tsdb-test");
        cfg.schema.reverse();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn aggregate_set_rejects_unknown_name() {
        assert!(AggregateSet::from_names(&["avg", "bogus"]).is_err());
    }
}
