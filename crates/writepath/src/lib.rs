//! Write path for one shard: a bounded ingestion queue feeding a Segment
//! Builder that checkpoints to the WAL and seals raw windows.

#![warn(missing_docs)]

pub mod segment_builder;
pub mod shard_worker;
pub mod write_buffer;

pub use segment_builder::{BuilderConfig, SegmentBuilder};
pub use shard_worker::ShardWorkerHandle;
pub use write_buffer::{WriteBuffer, WriteBufferSender};
