//! Source scoring and ordering
//!
//! A reachable URL scores
//!
//! ```text
//! stability * w_stability + latency_score * w_latency + bitrate_score * w_bitrate
//! ```
//!
//! where `latency_score = ref / (ref + latency_ms)` and
//! `bitrate_score = kbps / (kbps + ref)`. Both lie in `[0, 1]`, so with
//! weights summing to 1 the score does too. Scores are blended with the
//! previous run's score for the same URL key when one exists. Unreachable
//! URLs never appear in a ranked source list.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::RankingConfig;
use crate::models::{CanonicalChannel, ProbeResult, RankedChannel, ScoreSnapshot, ScoredSource};

#[derive(Debug, Clone)]
pub struct SourceRanker {
    config: RankingConfig,
}

impl SourceRanker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Strictly decreasing in latency, 1.0 at zero latency
    pub fn latency_score(&self, latency_ms: f64) -> f64 {
        let reference = self.config.latency_reference_ms;
        reference / (reference + latency_ms.max(0.0))
    }

    pub fn bitrate_score(&self, bitrate_kbps: Option<f64>) -> f64 {
        match bitrate_kbps {
            Some(kbps) if kbps.is_finite() && kbps > 0.0 => {
                kbps / (kbps + self.config.bitrate_reference_kbps)
            }
            Some(_) => 0.0,
            None => self.config.unknown_bitrate_score,
        }
    }

    /// This run's score for a probe result; `None` when unreachable
    pub fn score(&self, result: &ProbeResult) -> Option<f64> {
        if !result.reachable {
            return None;
        }
        let latency = result.latency_ms.map_or(0.0, |ms| self.latency_score(ms));
        Some(
            result.stability_ratio() * self.config.weight_stability
                + latency * self.config.weight_latency
                + self.bitrate_score(result.bitrate_kbps) * self.config.weight_bitrate,
        )
    }

    /// Exponential smoothing against the previous run
    pub fn smooth(&self, current: f64, previous: Option<f64>) -> f64 {
        let alpha = self.config.smoothing_alpha;
        match previous {
            Some(previous) => alpha * current + (1.0 - alpha) * previous,
            None => current,
        }
    }

    /// Order a channel's reachable candidates by descending score, ties by URL
    pub fn rank(
        &self,
        channel: &CanonicalChannel,
        results: &HashMap<String, ProbeResult>,
        prior: Option<&ScoreSnapshot>,
    ) -> RankedChannel {
        let mut sources: Vec<ScoredSource> = channel
            .candidate_urls
            .iter()
            .filter_map(|(key, url)| {
                let current = self.score(results.get(key)?)?;
                let previous = prior.and_then(|p| p.get(key));
                Some(ScoredSource {
                    url: url.clone(),
                    score: self.smooth(current, previous),
                    rank: 0,
                })
            })
            .collect();

        sources.sort_by(compare_sources);
        for (i, source) in sources.iter_mut().enumerate() {
            source.rank = i + 1;
        }

        RankedChannel {
            channel_key: channel.channel_key.clone(),
            display_name: channel.display_name.clone(),
            category: channel.category.clone(),
            ordered_sources: sources,
        }
    }

    /// Snapshot for the next run. Reachable URLs keep their smoothed score,
    /// unreachable ones decay from their previous score until they fall
    /// below the floor. A URL that never got an attempt (run deadline)
    /// keeps its previous score; URLs absent from `results` are not carried over.
    pub fn update_snapshot(
        &self,
        results: &HashMap<String, ProbeResult>,
        prior: Option<&ScoreSnapshot>,
    ) -> ScoreSnapshot {
        results
            .iter()
            .filter_map(|(key, result)| {
                let previous = prior.and_then(|p| p.get(key));
                let score = match self.score(result) {
                    Some(current) => self.smooth(current, previous),
                    None if result.attempts == 0 => previous?,
                    None => {
                        let decayed = (1.0 - self.config.smoothing_alpha) * previous?;
                        if decayed < self.config.snapshot_floor {
                            return None;
                        }
                        decayed
                    }
                };
                Some((key.clone(), score))
            })
            .collect()
    }
}

fn compare_sources(a: &ScoredSource, b: &ScoredSource) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.url.cmp(&b.url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NormalizedChannel;
    use crate::utils::url::UrlUtils;
    use chrono::Utc;
    use proptest::prelude::*;

    fn ranker() -> SourceRanker {
        SourceRanker::new(RankingConfig::default())
    }

    fn reachable(url: &str, latency_ms: f64, attempts: u32, successes: u32) -> ProbeResult {
        ProbeResult {
            url: url.to_string(),
            reachable: successes > 0,
            latency_ms: (successes > 0).then_some(latency_ms),
            bitrate_kbps: None,
            attempts,
            successful_attempts: successes,
            probed_at: Utc::now(),
            last_error: None,
        }
    }

    fn failed(url: &str) -> ProbeResult {
        ProbeResult {
            last_error: Some("connection refused".into()),
            ..reachable(url, 0.0, 2, 0)
        }
    }

    fn channel(urls: &[&str]) -> CanonicalChannel {
        let mut channel = CanonicalChannel::new(
            &NormalizedChannel {
                channel_key: "cctv1|新闻".into(),
                display_name: "CCTV-1".into(),
                category: "新闻".into(),
                category_fallback: false,
            },
            0,
        );
        for url in urls {
            channel.candidate_urls.insert(UrlUtils::dedup_key(url), url.to_string());
        }
        channel
    }

    fn results(list: Vec<ProbeResult>) -> HashMap<String, ProbeResult> {
        list.into_iter().map(|r| (UrlUtils::dedup_key(&r.url), r)).collect()
    }

    #[test]
    fn test_unreachable_sources_are_excluded_and_fastest_first() {
        let ch = channel(&["http://a/1", "http://b/1", "http://c/1"]);
        let probes = results(vec![
            reachable("http://a/1", 50.0, 2, 2),
            failed("http://b/1"),
            reachable("http://c/1", 200.0, 2, 2),
        ]);

        let ranked = ranker().rank(&ch, &probes, None);
        let urls: Vec<_> = ranked.ordered_sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, ["http://a/1", "http://c/1"]);
        assert_eq!(ranked.ordered_sources[0].rank, 1);
        assert_eq!(ranked.ordered_sources[1].rank, 2);
        assert!(ranked.ordered_sources[0].score > ranked.ordered_sources[1].score);
    }

    #[test]
    fn test_channel_without_reachable_sources_is_empty() {
        let ch = channel(&["http://a/1"]);
        let probes = results(vec![ProbeResult::unprobed("http://a/1", "timeout")]);
        let ranked = ranker().rank(&ch, &probes, None);
        assert!(ranked.is_empty());
        assert_eq!(ranked.display_name, "CCTV-1");
    }

    #[test]
    fn test_equal_scores_order_by_url() {
        let ch = channel(&["http://z/1", "http://m/1"]);
        let probes = results(vec![
            reachable("http://z/1", 100.0, 2, 2),
            reachable("http://m/1", 100.0, 2, 2),
        ]);
        let ranked = ranker().rank(&ch, &probes, None);
        assert_eq!(ranked.primary().unwrap().url, "http://m/1");
    }

    #[test]
    fn test_stability_outweighs_small_latency_gain() {
        let r = ranker();
        let steady = r.score(&reachable("http://a/1", 120.0, 4, 4)).unwrap();
        let flaky = r.score(&reachable("http://b/1", 80.0, 4, 1)).unwrap();
        assert!(steady > flaky);
    }

    #[test]
    fn test_bitrate_scores() {
        let r = ranker();
        assert_eq!(r.bitrate_score(None), 0.5);
        assert_eq!(r.bitrate_score(Some(2000.0)), 0.5);
        assert!(r.bitrate_score(Some(8000.0)) > r.bitrate_score(Some(1000.0)));
        assert_eq!(r.bitrate_score(Some(f64::NAN)), 0.0);
    }

    #[test]
    fn test_smoothing_with_prior() {
        let r = ranker();
        let ch = channel(&["http://a/1"]);
        let probes = results(vec![reachable("http://a/1", 0.0, 1, 1)]);
        let current = r.score(&probes["http://a/1"]).unwrap();

        let mut prior = ScoreSnapshot::new();
        prior.insert("http://a/1", 0.2);
        let ranked = r.rank(&ch, &probes, Some(&prior));
        let expected = 0.6 * current + 0.4 * 0.2;
        assert!((ranked.ordered_sources[0].score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_update_decays_and_drops() {
        let r = ranker();
        let probes = results(vec![
            reachable("http://a/1", 100.0, 2, 2),
            failed("http://b/1"),
            failed("http://c/1"),
            failed("http://d/1"),
            ProbeResult::unprobed("http://e/1", "run deadline exceeded"),
        ]);
        let prior: ScoreSnapshot = [
            ("http://b/1".to_string(), 0.8),
            ("http://c/1".to_string(), 0.02),
            ("http://e/1".to_string(), 0.7),
            ("http://gone/1".to_string(), 0.9),
        ]
        .into_iter()
        .collect();

        let next = r.update_snapshot(&probes, Some(&prior));
        assert!(next.get("http://a/1").is_some());
        assert!((next.get("http://b/1").unwrap() - 0.32).abs() < 1e-12);
        assert_eq!(next.get("http://c/1"), None, "decayed below the floor");
        assert_eq!(next.get("http://d/1"), None, "no history to decay");
        assert_eq!(next.get("http://e/1"), Some(0.7), "never attempted keeps its score");
        assert_eq!(next.get("http://gone/1"), None, "not probed this run");
        assert_eq!(next.len(), 3);
    }

    proptest! {
        #[test]
        fn test_lower_latency_scores_higher(a in 0.0f64..60_000.0, b in 0.0f64..60_000.0) {
            prop_assume!((a - b).abs() > 1e-3);
            let r = ranker();
            let (fast, slow) = if a < b { (a, b) } else { (b, a) };
            let fast_score = r.score(&reachable("http://a/1", fast, 3, 3)).unwrap();
            let slow_score = r.score(&reachable("http://b/1", slow, 3, 3)).unwrap();
            prop_assert!(fast_score > slow_score);
        }

        #[test]
        fn test_ordered_sources_are_sorted_and_reachable(
            probes in prop::collection::vec((0.0f64..5_000.0, 0u32..=3), 1..10)
        ) {
            let urls: Vec<String> = (0..probes.len()).map(|i| format!("http://h{i}/live")).collect();
            let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
            let ch = channel(&url_refs);
            let results = results(
                probes
                    .iter()
                    .zip(&urls)
                    .map(|((latency, successes), url)| reachable(url, *latency, 3, *successes))
                    .collect(),
            );

            let ranked = ranker().rank(&ch, &results, None);
            for pair in ranked.ordered_sources.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
            for source in &ranked.ordered_sources {
                prop_assert!(results[&UrlUtils::dedup_key(&source.url)].reachable);
            }
            let reachable_count = results.values().filter(|r| r.reachable).count();
            prop_assert_eq!(ranked.ordered_sources.len(), reachable_count);
        }
    }
}
