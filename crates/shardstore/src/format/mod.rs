//! On-disk byte formats: sealed segment files, WAL records, tier chunk
//! files, and the watermark file.

pub mod segment_file;
pub mod tier_chunk_file;
pub mod wal_record;
pub mod watermark_file;

pub use segment_file::{IndexEntry, SegmentFile, SegmentRecord};
pub use tier_chunk_file::ChunkIndexEntry;
pub use wal_record::WalRecord;
