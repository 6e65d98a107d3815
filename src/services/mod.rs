//! Service layer for the aggregation pipeline
//!
//! Each service owns one phase of a run:
//!
//! - **EntryFilter**: drops listings matching configured exclusion rules
//! - **ChannelNormalizer**: maps free-text names and categories to canonical keys
//! - **ChannelMerger**: groups normalized entries into canonical channels
//! - **StreamProber** / **ProbePool**: measure candidate URLs concurrently
//! - **SourceRanker**: scores and orders each channel's reachable sources
//! - **FailoverListBuilder**: caps source lists and groups channels by category
//!
//! Everything except probing is synchronous. The probe transport is a trait
//! so tests can substitute a scripted implementation.

pub mod entry_filter;
pub mod failover;
pub mod merger;
pub mod normalizer;
pub mod probe_pool;
pub mod probe_transport;
pub mod ranker;
pub mod stream_prober;

pub use entry_filter::{EntryFilter, ExclusionReason};
pub use failover::FailoverListBuilder;
pub use merger::ChannelMerger;
pub use normalizer::ChannelNormalizer;
pub use probe_pool::{ProbeBatch, ProbePool};
pub use probe_transport::{
    AttemptSample, AutoTransport, FfprobeTransport, HttpProbeTransport, ProbeTransport,
    build_transport,
};
pub use ranker::SourceRanker;
pub use stream_prober::StreamProber;
