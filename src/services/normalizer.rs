//! Channel name and category normalization
//!
//! Turns the free-text name and category of a listing into a canonical
//! display name, a canonical category and the channel key used for merging.
//! All alias tables and decoration patterns come from [`NormalizerConfig`]
//! and are compiled once in [`ChannelNormalizer::new`].
//!
//! Normalization is idempotent: feeding a canonical display name and
//! category back in yields the same key.

use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use crate::config::{KeyScope, NormalizerConfig};
use crate::errors::{AppError, AppResult, EntryError, EntryResult};
use crate::models::{NormalizedChannel, NormalizedEntry, RawSourceEntry};
use crate::utils::text::{collapse_whitespace, fold, to_half_width};
use crate::utils::url::UrlUtils;

/// Characters trimmed from the ends of a cleaned name
fn is_edge_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '-' | '_' | '|' | '·' | ':' | '/' | ',')
}

#[derive(Debug, Clone)]
pub struct ChannelNormalizer {
    strip_patterns: Vec<Regex>,
    /// fold(name) -> canonical display name
    alias_index: HashMap<String, String>,
    alias_patterns: Vec<(Regex, String)>,
    /// fold(category) -> canonical category
    category_index: HashMap<String, String>,
    restrict_categories: bool,
    default_category: String,
    allowed_schemes: Vec<String>,
    key_scope: KeyScope,
}

fn compile(pattern: &str, field: &str) -> AppResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| AppError::configuration(format!("invalid {field} pattern {pattern:?}: {e}")))
}

impl ChannelNormalizer {
    pub fn new(config: &NormalizerConfig) -> AppResult<Self> {
        let strip_patterns = config
            .strip_patterns
            .iter()
            .map(|p| compile(p, "strip"))
            .collect::<AppResult<Vec<_>>>()?;

        let alias_patterns = config
            .alias_patterns
            .iter()
            .map(|a| Ok((compile(&a.pattern, "alias")?, a.name.trim().to_string())))
            .collect::<AppResult<Vec<_>>>()?;

        let mut normalizer = Self {
            strip_patterns,
            alias_index: HashMap::new(),
            alias_patterns,
            category_index: HashMap::new(),
            restrict_categories: !config.categories.is_empty(),
            default_category: config.default_category.trim().to_string(),
            allowed_schemes: config
                .allowed_schemes
                .iter()
                .map(|s| s.trim().to_ascii_lowercase())
                .collect(),
            key_scope: config.key_scope,
        };

        for (variant, canonical) in &config.aliases {
            let canonical = canonical.trim().to_string();
            normalizer.index_alias(variant, &canonical);
        }
        // Canonical names resolve to themselves, also after cleanup, and win
        // over any variant that happens to fold the same way.
        let targets: Vec<String> = config
            .aliases
            .values()
            .map(|c| c.trim().to_string())
            .chain(normalizer.alias_patterns.iter().map(|(_, name)| name.clone()))
            .collect();
        for canonical in &targets {
            normalizer.index_alias(canonical, canonical);
        }

        for category in &config.categories {
            normalizer.index_category(category, category.trim());
        }
        let default_category = normalizer.default_category.clone();
        normalizer.index_category(&default_category, &default_category);
        for (variant, canonical) in &config.category_aliases {
            normalizer.index_category(canonical, canonical.trim());
            normalizer.index_category(variant, canonical.trim());
        }

        debug!(
            "Channel normalizer ready: {} aliases, {} alias patterns, {} category keys",
            normalizer.alias_index.len(),
            normalizer.alias_patterns.len(),
            normalizer.category_index.len()
        );
        Ok(normalizer)
    }

    fn index_alias(&mut self, name: &str, canonical: &str) {
        for key in [fold(name), fold(&self.clean_name(name))] {
            if !key.is_empty() {
                self.alias_index.insert(key, canonical.to_string());
            }
        }
    }

    fn index_category(&mut self, name: &str, canonical: &str) {
        let key = fold(name);
        if !key.is_empty() && !canonical.is_empty() {
            self.category_index.insert(key, canonical.to_string());
        }
    }

    /// Half-width conversion, decoration stripping and whitespace cleanup,
    /// repeated until the name stops changing. Stripping never adds visible
    /// characters, so the loop reaches a fixed point.
    pub fn clean_name(&self, raw: &str) -> String {
        let mut current = collapse_whitespace(&to_half_width(raw));
        loop {
            let mut next = current.clone();
            for re in &self.strip_patterns {
                next = re.replace_all(&next, " ").into_owned();
            }
            let next = collapse_whitespace(next.trim_matches(is_edge_separator));
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Canonical display name for a cleaned name
    fn resolve_name(&self, cleaned: &str) -> String {
        if let Some(canonical) = self.alias_index.get(&fold(cleaned)) {
            return canonical.clone();
        }
        let lowered = cleaned.to_lowercase();
        if let Some((_, name)) = self.alias_patterns.iter().find(|(re, _)| re.is_match(&lowered)) {
            return name.clone();
        }
        cleaned.to_string()
    }

    /// Canonical category and whether the default had to be used
    fn resolve_category(&self, raw_category: &str) -> (String, bool) {
        let cleaned = collapse_whitespace(&to_half_width(raw_category));
        if cleaned.is_empty() {
            return (self.default_category.clone(), true);
        }
        if let Some(canonical) = self.category_index.get(&fold(&cleaned)) {
            return (canonical.clone(), false);
        }
        if self.restrict_categories {
            (self.default_category.clone(), true)
        } else {
            (cleaned, false)
        }
    }

    fn channel_key(&self, display_name: &str, category: &str) -> String {
        match self.key_scope {
            KeyScope::NameAndCategory => format!("{}|{}", fold(display_name), category),
            KeyScope::Name => fold(display_name),
        }
    }

    /// Canonical identity of a name/category pair
    pub fn normalize_name(&self, name: &str, raw_category: &str) -> EntryResult<NormalizedChannel> {
        let cleaned = self.clean_name(name);
        if fold(&cleaned).is_empty() {
            return Err(EntryError::EmptyName {
                raw: name.to_string(),
            });
        }

        let display_name = self.resolve_name(&cleaned);
        let (category, category_fallback) = self.resolve_category(raw_category);
        let channel_key = self.channel_key(&display_name, &category);

        Ok(NormalizedChannel {
            channel_key,
            display_name,
            category,
            category_fallback,
        })
    }

    /// Validate and normalize one raw listing
    pub fn normalize(&self, entry: &RawSourceEntry) -> EntryResult<NormalizedEntry> {
        let channel = self.normalize_name(&entry.display_name, &entry.raw_category)?;

        let url = entry.url.trim();
        if url.is_empty() {
            return Err(EntryError::EmptyUrl {
                name: entry.display_name.clone(),
            });
        }
        let parsed = UrlUtils::parse_and_validate(url).map_err(|e| EntryError::InvalidUrl {
            url: UrlUtils::obfuscate_credentials(url),
            reason: e.to_string(),
        })?;
        let scheme = parsed.scheme().to_ascii_lowercase();
        if !self.allowed_schemes.contains(&scheme) {
            return Err(EntryError::UnsupportedScheme { scheme });
        }

        Ok(NormalizedEntry {
            channel,
            original_name: entry.display_name.clone(),
            url: url.to_string(),
            origin_id: entry.origin_id.clone(),
        })
    }
}
