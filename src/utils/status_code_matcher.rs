//! HTTP status code patterns
//!
//! Probe responses are accepted when their status matches one of the
//! configured patterns: wildcard classes like "2xx" or exact codes like "206".

/// Check if a status code matches any of the acceptable patterns
pub fn is_status_acceptable(status: u16, acceptable_codes: &[String]) -> bool {
    acceptable_codes
        .iter()
        .any(|pattern| matches_pattern(status, pattern.trim()))
}

fn matches_pattern(status: u16, pattern: &str) -> bool {
    if let Some(prefix) = pattern
        .strip_suffix("xx")
        .or_else(|| pattern.strip_suffix("XX"))
    {
        return prefix.len() == 1
            && prefix
                .parse::<u16>()
                .is_ok_and(|class| status / 100 == class);
    }
    pattern.parse::<u16>().is_ok_and(|code| code == status)
}
