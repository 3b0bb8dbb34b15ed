//! Core types shared across the storage and rollup crates.
//!
//! This crate defines the foundational vocabulary of the store: series
//! identity and label sets, points, tiers and buckets, label matchers,
//! configuration, time-alignment helpers, and the unified error type.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::{AggregateSet, StoreConfig, TierSpec};
pub use error::{Error, Result};
pub use types::{
    Aggregate, Bucket, LabelSet, MatchOp, Matcher, Point, SeriesId, Tier,
};
