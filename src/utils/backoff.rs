//! Bounded exponential backoff for probe retries
//!
//! Jitter is derived from the system clock instead of an RNG; it only needs
//! to spread retries of many concurrent probes, not be unpredictable.

use std::time::Duration;

use crate::config::ProberConfig;

/// Percentage of the computed delay added as jitter
const JITTER_PERCENT: u8 = 25;

/// Delay schedule between probe attempts
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after a success, and after the first failure in a row
    pub initial_delay: Duration,
    /// Upper bound before jitter is added
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&ProberConfig> for BackoffPolicy {
    fn from(config: &ProberConfig) -> Self {
        Self {
            initial_delay: config.initial_backoff,
            max_delay: config.max_backoff,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait before the next attempt given how many attempts in a
    /// row have failed. A success resets the schedule to `initial_delay`.
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(32) as i32;
        let exponential_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let delay_ms = exponential_ms.min(self.max_delay.as_millis() as f64) as u64;

        let final_ms = if self.jitter {
            delay_ms + generate_jitter_percent(delay_ms, JITTER_PERCENT)
        } else {
            delay_ms
        };

        Duration::from_millis(final_ms)
    }

    /// Worst-case delay including jitter
    pub fn max_delay_with_jitter(&self) -> Duration {
        if self.jitter {
            let max_ms = self.max_delay.as_millis() as u64;
            Duration::from_millis(max_ms + max_ms * u64::from(JITTER_PERCENT) / 100)
        } else {
            self.max_delay
        }
    }
}

/// Generate jitter between 0 and `max_jitter_ms` (inclusive) using the
/// system clock as the source of variation
pub fn generate_jitter_ms(max_jitter_ms: u64) -> u64 {
    if max_jitter_ms == 0 {
        return 0;
    }

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    (nanos % (u128::from(max_jitter_ms) + 1)) as u64
}

/// Generate jitter as a percentage of a base value
///
/// ```
/// use m3u_aggregator::utils::backoff::generate_jitter_percent;
///
/// let jitter = generate_jitter_percent(1000, 25);
/// assert!(jitter <= 250);
/// ```
pub fn generate_jitter_percent(base_value: u64, jitter_percent: u8) -> u64 {
    if jitter_percent == 0 || base_value == 0 {
        return 0;
    }

    let max_jitter = (base_value * u64::from(jitter_percent)) / 100;
    generate_jitter_ms(max_jitter)
}
