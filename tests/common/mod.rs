#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use m3u_aggregator::config::Config;
use m3u_aggregator::errors::{ProbeAttemptResult, ProbeError};
use m3u_aggregator::models::RawSourceEntry;
use m3u_aggregator::services::{AttemptSample, ProbeTransport};
use m3u_aggregator::utils::url::UrlUtils;

/// How a scripted URL answers every attempt
#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    Answer { latency_ms: u64, bitrate_kbps: Option<f64> },
    Refuse,
    Hang,
}

/// Transport answering from a table keyed by URL dedup key; unknown URLs
/// are refused
#[derive(Default)]
pub struct ScriptedTransport {
    table: HashMap<String, Behaviour>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, url: &str, latency_ms: u64) -> Self {
        self.table.insert(
            UrlUtils::dedup_key(url),
            Behaviour::Answer {
                latency_ms,
                bitrate_kbps: None,
            },
        );
        self
    }

    pub fn hang(mut self, url: &str) -> Self {
        self.table.insert(UrlUtils::dedup_key(url), Behaviour::Hang);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProbeTransport for ScriptedTransport {
    async fn attempt(&self, url: &str, _timeout: Duration) -> ProbeAttemptResult<AttemptSample> {
        self.calls.lock().unwrap().push(url.to_string());
        let behaviour = self.table.get(&UrlUtils::dedup_key(url)).copied().unwrap_or(Behaviour::Refuse);
        match behaviour {
            Behaviour::Answer {
                latency_ms,
                bitrate_kbps,
            } => Ok(AttemptSample {
                latency: Duration::from_millis(latency_ms),
                bitrate_kbps,
            }),
            Behaviour::Refuse => Err(ProbeError::connection("connection refused")),
            Behaviour::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Defaults with deterministic backoff and a single attempt per URL
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.prober.max_attempts = 1;
    config.prober.jitter = false;
    config.normalizer.categories = vec!["央视".into(), "卫视".into(), "新闻".into()];
    config.normalizer.default_category = "其他".into();
    config
        .normalizer
        .aliases
        .insert("CCTV1".into(), "CCTV-1".into());
    config
}

pub fn entry(name: &str, url: &str, category: &str, origin: &str) -> RawSourceEntry {
    RawSourceEntry::new(name, url, category, origin)
}

pub fn shared(transport: ScriptedTransport) -> Arc<ScriptedTransport> {
    Arc::new(transport)
}
