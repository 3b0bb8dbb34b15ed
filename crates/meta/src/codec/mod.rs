//! Binary codecs: tier chunk encode/decode/merge, and Gorilla raw point
//! compression.

pub mod chunk;
pub mod gorilla;
