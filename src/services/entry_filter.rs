//! Exclusion rules applied to raw entries before normalization
//!
//! Excluded entries are counted in the run report; they are not errors.

use std::fmt;

use regex::Regex;

use crate::config::FilterConfig;
use crate::errors::{AppError, AppResult};
use crate::models::RawSourceEntry;
use crate::utils::text::looks_garbled;

/// Why an entry was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    UrlPattern { pattern: String },
    NamePattern { pattern: String },
    GarbledCategory,
}

impl ExclusionReason {
    pub fn kind(&self) -> &'static str {
        match self {
            ExclusionReason::UrlPattern { .. } => "url_pattern",
            ExclusionReason::NamePattern { .. } => "name_pattern",
            ExclusionReason::GarbledCategory => "garbled_category",
        }
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::UrlPattern { pattern } => write!(f, "URL contains {pattern:?}"),
            ExclusionReason::NamePattern { pattern } => write!(f, "name matches /{pattern}/"),
            ExclusionReason::GarbledCategory => write!(f, "category is mis-decoded text"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntryFilter {
    url_patterns: Vec<String>,
    name_patterns: Vec<Regex>,
    reject_garbled_categories: bool,
}

impl EntryFilter {
    pub fn new(config: &FilterConfig) -> AppResult<Self> {
        let name_patterns = config
            .excluded_name_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    AppError::configuration(format!("invalid excluded_name_pattern {p:?}: {e}"))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            url_patterns: config
                .excluded_url_patterns
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
            name_patterns,
            reject_garbled_categories: config.reject_garbled_categories,
        })
    }

    /// Returns the first rule the entry trips, or `None` when it is kept
    pub fn check(&self, entry: &RawSourceEntry) -> Option<ExclusionReason> {
        if let Some(pattern) = self.url_patterns.iter().find(|p| entry.url.contains(p.as_str())) {
            return Some(ExclusionReason::UrlPattern {
                pattern: pattern.clone(),
            });
        }

        if let Some(re) = self
            .name_patterns
            .iter()
            .find(|re| re.is_match(&entry.display_name))
        {
            return Some(ExclusionReason::NamePattern {
                pattern: re.as_str().to_string(),
            });
        }

        if self.reject_garbled_categories && looks_garbled(&entry.raw_category) {
            return Some(ExclusionReason::GarbledCategory);
        }

        None
    }
}
