//! IPTV source aggregation and ranking
//!
//! Takes channel listings collected from many playlists, normalizes and
//! merges them into canonical channels, probes every distinct stream URL and
//! emits a failover playlist with the best sources of each channel first.
//!
//! The entry point is [`engine::AggregationEngine`].

pub mod config;
pub mod engine;
pub mod errors;
pub mod input;
pub mod models;
pub mod output;
pub mod services;
pub mod streaming;
pub mod utils;
