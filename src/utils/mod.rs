//! Utility functions shared across the aggregator
//!
//! - `url`: URL dedup keys, scheme/host extraction and credential obfuscation
//! - `text`: width/whitespace cleanup, name folding, natural ordering
//! - `backoff`: bounded exponential backoff with jitter for probe retries
//! - `status_code_matcher`: "2xx"-style HTTP status patterns

pub mod backoff;
pub mod status_code_matcher;
pub mod text;
pub mod url;

pub use backoff::{BackoffPolicy, generate_jitter_percent};
pub use status_code_matcher::is_status_acceptable;
pub use url::UrlUtils;
