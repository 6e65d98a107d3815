//! Failover list construction
//!
//! Caps each channel's ordered sources at K, optionally drops channels that
//! ended up without sources, and groups channels by category in output order.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::config::OutputConfig;
use crate::models::{CategoryGroup, FailoverPlaylist, RankedChannel};
use crate::utils::text::natural_cmp;

#[derive(Debug, Clone)]
pub struct FailoverListBuilder {
    max_sources: usize,
    drop_empty: bool,
    category_order: Vec<String>,
    natural_sort: HashSet<String>,
}

impl FailoverListBuilder {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            max_sources: config.max_sources_per_channel.max(1),
            drop_empty: config.drop_empty_channels,
            category_order: config.category_order.clone(),
            natural_sort: config.natural_sort_categories.iter().cloned().collect(),
        }
    }

    /// Override the category order, e.g. with the normalizer's category list
    pub fn with_category_order(mut self, order: Vec<String>) -> Self {
        self.category_order = order;
        self
    }

    /// `channels` must be in first-seen order; that order is kept within
    /// each category unless the category is naturally sorted.
    pub fn build(&self, channels: Vec<RankedChannel>) -> FailoverPlaylist {
        let mut groups: Vec<CategoryGroup> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut dropped = 0usize;

        for mut channel in channels {
            channel.ordered_sources.truncate(self.max_sources);
            if self.drop_empty && channel.is_empty() {
                dropped += 1;
                continue;
            }

            let slot = *slots.entry(channel.category.clone()).or_insert_with(|| {
                groups.push(CategoryGroup {
                    category: channel.category.clone(),
                    channels: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].channels.push(channel);
        }

        for group in &mut groups {
            if self.natural_sort.contains(&group.category) {
                group
                    .channels
                    .sort_by(|a, b| natural_cmp(&a.display_name, &b.display_name));
            }
        }

        // Stable sort: listed categories by position, the rest keep first-seen order
        let position: HashMap<&str, usize> = self
            .category_order
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        groups.sort_by_key(|g| position.get(g.category.as_str()).copied().unwrap_or(usize::MAX));

        if dropped > 0 {
            debug!("Dropped {} channels without reachable sources", dropped);
        }

        FailoverPlaylist { groups }
    }
}
