//! Deduplication of normalized entries into canonical channels
//!
//! The merger owns every [`CanonicalChannel`] while entries stream in and
//! hands them out by value from [`ChannelMerger::finish`]. Channels only
//! grow: URLs, aliases and origins are added, never removed.

use std::collections::HashMap;

use tracing::debug;

use crate::config::CategoryTieBreak;
use crate::models::{CanonicalChannel, NormalizedEntry};
use crate::utils::url::UrlUtils;

/// Category observations for one channel: category -> (count, first index)
type CategoryVotes = HashMap<String, (usize, usize)>;

#[derive(Debug)]
pub struct ChannelMerger {
    tie_break: CategoryTieBreak,
    channels: Vec<CanonicalChannel>,
    votes: Vec<CategoryVotes>,
    index: HashMap<String, usize>,
    entries_seen: usize,
}

impl ChannelMerger {
    pub fn new(tie_break: CategoryTieBreak) -> Self {
        Self {
            tie_break,
            channels: Vec::new(),
            votes: Vec::new(),
            index: HashMap::new(),
            entries_seen: 0,
        }
    }

    /// Fold one entry into its channel, creating the channel on first sighting
    pub fn merge(&mut self, entry: NormalizedEntry) {
        let position = self.entries_seen;
        self.entries_seen += 1;

        let NormalizedEntry {
            channel: normalized,
            original_name,
            url,
            origin_id,
        } = entry;

        let slot = match self.index.get(&normalized.channel_key) {
            Some(&slot) => slot,
            None => {
                let slot = self.channels.len();
                self.channels.push(CanonicalChannel::new(&normalized, position));
                self.votes.push(HashMap::new());
                self.index.insert(normalized.channel_key.clone(), slot);
                slot
            }
        };

        let channel = &mut self.channels[slot];

        let url_key = UrlUtils::dedup_key(&url);
        match channel.candidate_urls.get_mut(&url_key) {
            // Keep the smallest spelling so the result does not depend on input order
            Some(existing) if url < *existing => *existing = url,
            Some(_) => {}
            None => {
                channel.candidate_urls.insert(url_key, url);
            }
        }

        channel.aliases.insert(original_name);
        if !origin_id.is_empty() {
            channel.origins.insert(origin_id);
        }

        let vote = self.votes[slot]
            .entry(normalized.category.clone())
            .or_insert((0, position));
        vote.0 += 1;

        if normalized.category != channel.category {
            let winner = resolve_category(&self.votes[slot], self.tie_break);
            if winner != channel.category {
                debug!(
                    "Category conflict for {}: {} -> {} ({})",
                    channel.channel_key, channel.category, winner, self.tie_break
                );
                channel.category = winner;
            }
        }
    }

    /// Number of channels created so far
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channels in first-seen order
    pub fn finish(self) -> Vec<CanonicalChannel> {
        self.channels
    }
}

fn resolve_category(votes: &CategoryVotes, tie_break: CategoryTieBreak) -> String {
    let winner = match tie_break {
        CategoryTieBreak::FirstSeen => votes.iter().min_by_key(|(_, (_, first))| *first),
        CategoryTieBreak::MostFrequent => votes
            .iter()
            .min_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
                count_b.cmp(count_a).then(first_a.cmp(first_b))
            }),
    };
    winner.map(|(category, _)| category.clone()).unwrap_or_default()
}
