//! Series registry: the bijection `(metric, canonical_labels) ↔ series_id`.
//!
//! Held in a small central metadata store, separate from the shard
//! store. A copy-on-write-style in-memory index (a [`DashMap`] fingerprint
//! table plus per-series records) accelerates hot lookups; writes take a
//! short lock only for the `get_or_create` critical section.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tsdb_core::error::{Error, Result};
use tsdb_core::types::{LabelSet, MatchOp, Matcher, SeriesId};

/// A durable record for one series, as persisted in the metadata store.
#[derive(Debug, Clone)]
pub struct SeriesRecord {
    /// Stable surrogate id.
    pub series_id: SeriesId,
    /// Metric name.
    pub metric: String,
    /// Canonical label set.
    pub labels: LabelSet,
    /// Unix seconds at which this series was first seen.
    pub created_at: i64,
}

/// Durable persistence seam for the registry: append new records and
/// reload them at startup. A real deployment backs this with a small
/// key-value or SQL store; implementations here only need append and
/// full-scan.
pub trait RegistryStore: Send + Sync {
    /// Persist a newly assigned series record. Must be atomic with
    /// respect to crashes: a record that is not durably appended must
    /// not be visible after restart.
    fn append(&self, record: &SeriesRecord) -> Result<()>;

    /// Load every previously persisted record, in any order.
    fn load_all(&self) -> Result<Vec<SeriesRecord>>;
}

/// An in-memory-only [`RegistryStore`] used by tests and embedders that
/// don't need cross-restart durability.
#[derive(Default)]
pub struct InMemoryRegistryStore {
    records: Mutex<Vec<SeriesRecord>>,
}

impl RegistryStore for InMemoryRegistryStore {
    fn append(&self, record: &SeriesRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<SeriesRecord>> {
        Ok(self.records.lock().clone())
    }
}

/// Append-only file-backed [`RegistryStore`]: one record per series,
/// appended and fsynced as it is created, never rewritten.
///
/// Record layout: `series_id:u64, created_at:i64, metric_len:u16,
/// metric, labels_len:u32, canonical label bytes, crc32:u32` (CRC over
/// everything but itself). A truncated trailing record (a crash mid-
/// append) is dropped rather than treated as corruption, matching the
/// WAL's recovery policy for its own trailing-record case.
pub struct FileRegistryStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileRegistryStore {
    /// Open (creating if absent) the registry log at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(FileRegistryStore { path, file: Mutex::new(file) })
    }
}

impl RegistryStore for FileRegistryStore {
    fn append(&self, record: &SeriesRecord) -> Result<()> {
        let metric = record.metric.as_bytes();
        let labels = record.labels.canonical_bytes();
        let mut body = Vec::with_capacity(8 + 8 + 2 + metric.len() + 4 + labels.len());
        body.write_u64::<LittleEndian>(record.series_id.get()).unwrap();
        body.write_i64::<LittleEndian>(record.created_at).unwrap();
        body.write_u16::<LittleEndian>(metric.len() as u16).unwrap();
        body.extend_from_slice(metric);
        body.write_u32::<LittleEndian>(labels.len() as u32).unwrap();
        body.extend_from_slice(&labels);

        let mut buf = body.clone();
        buf.write_u32::<LittleEndian>(crc32fast::hash(&body)).unwrap();

        let mut file = self.file.lock();
        file.write_all(&buf)?;
        file.sync_all()?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<SeriesRecord>> {
        let mut bytes = Vec::new();
        if self.path.exists() {
            File::open(&self.path)?.read_to_end(&mut bytes)?;
        }

        let mut cursor = Cursor::new(&bytes[..]);
        let mut out = Vec::new();
        loop {
            let start = cursor.position();
            match read_record(&mut cursor) {
                Ok(Some(record)) => out.push(record),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), offset = start, error = %e, "registry log truncated at corrupt record");
                    cursor.set_position(start);
                    break;
                }
            }
        }
        Ok(out)
    }
}

fn read_record(cursor: &mut Cursor<&[u8]>) -> Result<Option<SeriesRecord>> {
    let remaining = cursor.get_ref().len() as u64 - cursor.position();
    if remaining < 8 + 8 + 2 {
        return Ok(None);
    }
    let series_id = cursor.read_u64::<LittleEndian>().unwrap();
    let created_at = cursor.read_i64::<LittleEndian>().unwrap();
    let metric_len = cursor.read_u16::<LittleEndian>().unwrap() as usize;

    if (cursor.get_ref().len() as u64 - cursor.position()) < metric_len as u64 + 4 {
        return Ok(None);
    }
    let metric_start = cursor.position() as usize;
    let metric = String::from_utf8_lossy(&cursor.get_ref()[metric_start..metric_start + metric_len]).into_owned();
    cursor.set_position(cursor.position() + metric_len as u64);

    let labels_len = cursor.read_u32::<LittleEndian>().unwrap() as usize;
    if (cursor.get_ref().len() as u64 - cursor.position()) < labels_len as u64 + 4 {
        return Ok(None);
    }
    let labels_start = cursor.position() as usize;
    let labels_bytes = &cursor.get_ref()[labels_start..labels_start + labels_len];
    let labels = LabelSet::from_canonical_bytes(labels_bytes);
    cursor.set_position(cursor.position() + labels_len as u64);

    let stored_crc = cursor.read_u32::<LittleEndian>().unwrap();
    let mut body = Vec::with_capacity(8 + 8 + 2 + metric_len + 4 + labels_len);
    body.write_u64::<LittleEndian>(series_id).unwrap();
    body.write_i64::<LittleEndian>(created_at).unwrap();
    body.write_u16::<LittleEndian>(metric_len as u16).unwrap();
    body.extend_from_slice(metric.as_bytes());
    body.write_u32::<LittleEndian>(labels_len as u32).unwrap();
    body.extend_from_slice(labels_bytes);
    if crc32fast::hash(&body) != stored_crc {
        return Err(Error::CorruptWal { path: PathBuf::new(), offset: 0, detail: "registry record CRC mismatch".into() });
    }

    Ok(Some(SeriesRecord { series_id: SeriesId(series_id), metric, labels, created_at }))
}

/// In-memory index plus durable-store-backed series registry.
pub struct SeriesRegistry {
    store: Arc<dyn RegistryStore>,
    next_id: AtomicU64,
    /// `(metric, canonical label fingerprint) -> series_id`
    by_fingerprint: DashMap<(String, Vec<u8>), SeriesId>,
    /// `series_id -> record`, for matcher evaluation and listing.
    by_id: DashMap<SeriesId, SeriesRecord>,
    create_lock: Mutex<()>,
}

impl SeriesRegistry {
    /// Open a registry backed by `store`, replaying all previously
    /// persisted records into the in-memory index.
    pub fn open(store: Arc<dyn RegistryStore>) -> Result<Self> {
        let registry = SeriesRegistry {
            store,
            next_id: AtomicU64::new(1),
            by_fingerprint: DashMap::new(),
            by_id: DashMap::new(),
            create_lock: Mutex::new(()),
        };
        for record in registry.store.load_all()? {
            let next = record.series_id.get() + 1;
            registry.next_id.fetch_max(next, Ordering::SeqCst);
            let key = (record.metric.clone(), record.labels.canonical_bytes());
            registry.by_fingerprint.insert(key, record.series_id);
            registry.by_id.insert(record.series_id, record);
        }
        Ok(registry)
    }

    /// Resolve `(metric, labels)` to a series id, assigning and persisting
    /// a new one on first sight.
    pub fn get_or_create(&self, metric: &str, labels: &LabelSet, now: i64) -> Result<SeriesId> {
        let key = (metric.to_string(), labels.canonical_bytes());
        if let Some(id) = self.by_fingerprint.get(&key) {
            return Ok(*id);
        }

        let _guard = self.create_lock.lock();
        // Re-check under the lock: another caller may have raced us.
        if let Some(id) = self.by_fingerprint.get(&key) {
            return Ok(*id);
        }

        let id = SeriesId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = SeriesRecord {
            series_id: id,
            metric: metric.to_string(),
            labels: labels.clone(),
            created_at: now,
        };
        self.store.append(&record)?;
        self.by_fingerprint.insert(key, id);
        self.by_id.insert(id, record);
        Ok(id)
    }

    /// All series whose metric matches exactly and for which every
    /// matcher is satisfied.
    pub fn resolve(&self, metric: &str, matchers: &[Matcher]) -> Vec<SeriesId> {
        self.by_id
            .iter()
            .filter(|entry| entry.value().metric == metric)
            .filter(|entry| matchers.iter().all(|m| m.matches(&entry.value().labels)))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Look up a series's record by id.
    pub fn get(&self, id: SeriesId) -> Option<SeriesRecord> {
        self.by_id.get(&id).map(|e| e.value().clone())
    }

    /// Distinct metric names, in no particular order.
    pub fn list_metrics(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        for entry in self.by_id.iter() {
            seen.insert(entry.value().metric.clone());
        }
        seen.into_iter().collect()
    }

    /// Distinct values observed for a given label name, across all series.
    pub fn list_label_values(&self, name: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        for entry in self.by_id.iter() {
            if let Some(v) = entry.value().labels.get(name) {
                seen.insert(v.to_string());
            }
        }
        seen.into_iter().collect()
    }

    /// All label sets registered under a metric.
    pub fn list_series(&self, metric: &str) -> Vec<LabelSet> {
        self.by_id
            .iter()
            .filter(|e| e.value().metric == metric)
            .map(|e| e.value().labels.clone())
            .collect()
    }

    /// Total number of registered series.
    pub fn series_count(&self) -> usize {
        self.by_id.len()
    }
}

/// Parse a matcher literal of the form `name=value`, `name!=value`,
/// `name=~value`, or `name!~value`. Used by embedders building matcher
/// lists from a query string; the wire/text parsing itself is out of
/// scope here.
pub fn parse_matcher(expr: &str) -> Result<Matcher> {
    let (name, op, value) = if let Some(rest) = expr.strip_prefix_find("!~") {
        rest
    } else if let Some(rest) = expr.strip_prefix_find("=~") {
        rest
    } else if let Some(rest) = expr.strip_prefix_find("!=") {
        rest
    } else if let Some(rest) = expr.strip_prefix_find("=") {
        rest
    } else {
        return Err(Error::InvalidInput(format!("malformed matcher {:?}", expr)));
    };
    let op = match op {
        "=" => MatchOp::Eq,
        "!=" => MatchOp::Neq,
        "=~" => MatchOp::Re,
        "!~" => MatchOp::NotRe,
        _ => unreachable!(),
    };
    Ok(Matcher { name: name.to_string(), op, value: value.to_string() })
}

trait StripPrefixFind {
    fn strip_prefix_find(&self, op: &'static str) -> Option<(&str, &'static str, &str)>;
}

impl StripPrefixFind for str {
    fn strip_prefix_find(&self, op: &'static str) -> Option<(&str, &'static str, &str)> {
        self.find(op).map(|idx| (&self[..idx], op, &self[idx + op.len()..]))
    }
}
