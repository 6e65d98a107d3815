//! Data model shared by every stage of an aggregation run
//!
//! Raw entries flow in from an external collector, become canonical channels
//! during merge, pick up probe results and leave as ranked channels grouped
//! by category.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One channel listing as produced by the external collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSourceEntry {
    pub display_name: String,
    pub url: String,
    /// Free-text category from the source list; empty when the source had none
    #[serde(default)]
    pub raw_category: String,
    /// Identifier of the source list the entry came from
    #[serde(default)]
    pub origin_id: String,
}

impl RawSourceEntry {
    pub fn new(
        display_name: impl Into<String>,
        url: impl Into<String>,
        raw_category: impl Into<String>,
        origin_id: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            url: url.into(),
            raw_category: raw_category.into(),
            origin_id: origin_id.into(),
        }
    }
}

/// Canonical identity of a channel as computed by the normalizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedChannel {
    pub channel_key: String,
    pub display_name: String,
    pub category: String,
    /// The default category was used because the raw one was absent or unknown
    pub category_fallback: bool,
}

/// A raw entry after normalization, ready to be merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEntry {
    pub channel: NormalizedChannel,
    pub original_name: String,
    pub url: String,
    pub origin_id: String,
}

/// The merged record for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalChannel {
    pub channel_key: String,
    pub display_name: String,
    pub category: String,
    /// Every original display name observed for this channel
    pub aliases: BTreeSet<String>,
    /// Candidate URLs keyed by their dedup key (see `UrlUtils::dedup_key`)
    pub candidate_urls: BTreeMap<String, String>,
    /// Source lists that contributed to this channel
    pub origins: BTreeSet<String>,
    /// Index of the first entry that created this channel
    pub first_seen: usize,
}

impl CanonicalChannel {
    pub fn new(channel: &NormalizedChannel, first_seen: usize) -> Self {
        Self {
            channel_key: channel.channel_key.clone(),
            display_name: channel.display_name.clone(),
            category: channel.category.clone(),
            aliases: BTreeSet::new(),
            candidate_urls: BTreeMap::new(),
            origins: BTreeSet::new(),
            first_seen,
        }
    }

    /// Candidate URLs in dedup-key order
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.candidate_urls.values().map(String::as_str)
    }
}

/// Outcome of probing one distinct URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub url: String,
    pub reachable: bool,
    pub latency_ms: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    pub attempts: u32,
    pub successful_attempts: u32,
    pub probed_at: DateTime<Utc>,
    /// Last failure observed, if any attempt failed
    pub last_error: Option<String>,
}

impl ProbeResult {
    /// Result for a URL whose probe never completed (e.g. run deadline)
    pub fn unprobed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reachable: false,
            latency_ms: None,
            bitrate_kbps: None,
            attempts: 0,
            successful_attempts: 0,
            probed_at: Utc::now(),
            last_error: Some(reason.into()),
        }
    }

    /// Fraction of attempts that succeeded
    pub fn stability_ratio(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            f64::from(self.successful_attempts) / f64::from(self.attempts)
        }
    }
}

/// A reachable candidate URL with its score and 1-based rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSource {
    pub url: String,
    pub score: f64,
    pub rank: usize,
}

/// A channel with its failover-ordered sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChannel {
    pub channel_key: String,
    pub display_name: String,
    pub category: String,
    pub ordered_sources: Vec<ScoredSource>,
}

impl RankedChannel {
    pub fn primary(&self) -> Option<&ScoredSource> {
        self.ordered_sources.first()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_sources.is_empty()
    }
}

/// Channels sharing one category, in output order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub category: String,
    pub channels: Vec<RankedChannel>,
}

/// Output model handed to playlist writers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailoverPlaylist {
    pub groups: Vec<CategoryGroup>,
}

impl FailoverPlaylist {
    pub fn channel_count(&self) -> usize {
        self.groups.iter().map(|g| g.channels.len()).sum()
    }

    /// All channels in output order
    pub fn channels(&self) -> impl Iterator<Item = &RankedChannel> {
        self.groups.iter().flat_map(|g| g.channels.iter())
    }
}

/// Historical per-URL scores carried between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreSnapshot(BTreeMap<String, f64>);

impl ScoreSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prior score for a URL dedup key
    pub fn get(&self, url_key: &str) -> Option<f64> {
        self.0.get(url_key).copied()
    }

    pub fn insert(&mut self, url_key: impl Into<String>, score: f64) {
        self.0.insert(url_key.into(), score);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for ScoreSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Example of a skipped entry kept for the run summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MalformedSample {
    pub origin_id: String,
    pub display_name: String,
    pub kind: String,
    pub message: String,
}

/// Counters describing what happened during a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub entries_total: usize,
    pub entries_malformed: usize,
    pub entries_excluded: usize,
    pub category_fallbacks: usize,
    pub channels: usize,
    pub empty_channels: usize,
    pub empty_channel_keys: Vec<String>,
    pub distinct_urls: usize,
    pub urls_probed: usize,
    pub urls_reachable: usize,
    /// URLs whose probe had not completed when the deadline passed
    pub urls_unprobed: usize,
    pub deadline_exceeded: bool,
    pub elapsed_ms: u64,
    pub malformed_samples: Vec<MalformedSample>,
}

impl RunReport {
    /// True when some URLs were never probed because of the deadline
    pub fn is_partial(&self) -> bool {
        self.deadline_exceeded && self.urls_unprobed > 0
    }
}

/// Everything a run produces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub playlist: FailoverPlaylist,
    /// Ranked channels in first-seen order, before capping and grouping
    pub ranked_channels: Vec<RankedChannel>,
    pub updated_scores: ScoreSnapshot,
    pub report: RunReport,
}
