//! Stream Probing Service
//!
//! Measures one candidate URL: a fixed number of attempts through a
//! [`ProbeTransport`], each bounded by the attempt timeout, separated by
//! exponential backoff. Failures never escape as errors; they become
//! `reachable = false` in the returned [`ProbeResult`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::ProberConfig;
use crate::errors::ProbeError;
use crate::models::ProbeResult;
use crate::services::probe_transport::ProbeTransport;
use crate::utils::backoff::BackoffPolicy;
use crate::utils::url::UrlUtils;

/// A probe result plus whether cancellation cut it short
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub result: ProbeResult,
    pub cancelled: bool,
}

pub struct StreamProber {
    transport: Arc<dyn ProbeTransport>,
    max_attempts: u32,
    attempt_timeout: Duration,
    backoff: BackoffPolicy,
}

impl StreamProber {
    pub fn new(transport: Arc<dyn ProbeTransport>, config: &ProberConfig) -> Self {
        Self {
            transport,
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: config.attempt_timeout,
            backoff: BackoffPolicy::from(config),
        }
    }

    /// Probe `url`. Cancellation interrupts attempts and backoff sleeps; the
    /// result then covers the attempts finished so far.
    pub async fn probe(&self, url: &str, cancel: &CancellationToken) -> ProbeResult {
        self.probe_detailed(url, cancel).await.result
    }

    pub async fn probe_detailed(&self, url: &str, cancel: &CancellationToken) -> ProbeOutcome {
        let display_url = UrlUtils::obfuscate_credentials(url);
        let mut attempts = 0u32;
        let mut latencies = Vec::new();
        let mut bitrates = Vec::new();
        let mut consecutive_failures = 0u32;
        let mut last_error: Option<String> = None;
        let mut cancelled = false;

        for attempt in 1..=self.max_attempts {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProbeError::Cancelled),
                result = tokio::time::timeout(
                    self.attempt_timeout,
                    self.transport.attempt(url, self.attempt_timeout),
                ) => result.unwrap_or(Err(ProbeError::Timeout { after: self.attempt_timeout })),
            };

            match outcome {
                Err(ProbeError::Cancelled) => {
                    cancelled = true;
                    last_error = Some(ProbeError::Cancelled.to_string());
                    break;
                }
                Ok(sample) => {
                    attempts += 1;
                    consecutive_failures = 0;
                    latencies.push(sample.latency.as_secs_f64() * 1000.0);
                    if let Some(kbps) = sample.bitrate_kbps {
                        bitrates.push(kbps);
                    }
                    trace!(
                        "Probe attempt {}/{} for {} succeeded in {:?}",
                        attempt, self.max_attempts, display_url, sample.latency
                    );
                }
                Err(e) => {
                    attempts += 1;
                    consecutive_failures += 1;
                    debug!(
                        "Probe attempt {}/{} for {} failed: {}",
                        attempt, self.max_attempts, display_url, e
                    );
                    last_error = Some(e.to_string());
                }
            }

            if attempt < self.max_attempts {
                let delay = self.backoff.delay(consecutive_failures);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let successful_attempts = latencies.len() as u32;
        let result = ProbeResult {
            url: url.to_string(),
            reachable: successful_attempts > 0,
            latency_ms: mean(&latencies),
            bitrate_kbps: mean(&bitrates),
            attempts,
            successful_attempts,
            probed_at: Utc::now(),
            last_error,
        };

        debug!(
            "Probed {}: reachable={} attempts={} successes={} latency_ms={:?} bitrate_kbps={:?}",
            display_url,
            result.reachable,
            result.attempts,
            result.successful_attempts,
            result.latency_ms,
            result.bitrate_kbps
        );

        ProbeOutcome { result, cancelled }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
