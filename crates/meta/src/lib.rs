//! Series identity and on-disk encoding shared by the storage core.
//!
//! - [`registry`]: the `(metric, labels) ↔ series_id` bijection.
//! - [`sharding`]: stable series→shard assignment.
//! - [`codec`]: tier chunk encode/decode/merge and Gorilla raw point
//!   compression.

#![warn(missing_docs)]

pub mod codec;
pub mod registry;
pub mod sharding;

pub use registry::{FileRegistryStore, InMemoryRegistryStore, RegistryStore, SeriesRecord, SeriesRegistry};
pub use sharding::shard_of;
