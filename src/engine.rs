//! Aggregation run orchestration
//!
//! One run is `(entries, config, prior scores) -> RunOutcome`:
//!
//! ```text
//! raw entries -> filter -> normalize -> merge -> probe -> rank -> failover list
//! ```
//!
//! Everything but probing is synchronous. The engine holds no state between
//! runs; historical scores go in and come out explicitly.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::models::{
    CanonicalChannel, MalformedSample, RankedChannel, RawSourceEntry, RunOutcome, RunReport,
    ScoreSnapshot,
};
use crate::services::{
    ChannelMerger, ChannelNormalizer, EntryFilter, FailoverListBuilder, ProbePool, ProbeTransport,
    SourceRanker, StreamProber, build_transport,
};
use crate::utils::url::UrlUtils;

/// Malformed entries kept as examples in the run report
pub const MAX_MALFORMED_SAMPLES: usize = 20;

pub struct AggregationEngine {
    config: Config,
    filter: EntryFilter,
    normalizer: ChannelNormalizer,
    pool: ProbePool,
    ranker: SourceRanker,
    builder: FailoverListBuilder,
}

impl AggregationEngine {
    /// Validate `config` and build the engine with the configured transport
    pub fn new(config: Config) -> AppResult<Self> {
        config.validate()?;
        let transport = build_transport(&config.prober)?;
        Self::with_transport(config, transport)
    }

    /// Build the engine around a caller-supplied probe transport
    pub fn with_transport(config: Config, transport: Arc<dyn ProbeTransport>) -> AppResult<Self> {
        config.validate()?;

        let filter = EntryFilter::new(&config.filter)?;
        let normalizer = ChannelNormalizer::new(&config.normalizer)?;
        let prober = Arc::new(StreamProber::new(transport, &config.prober));
        let pool = ProbePool::new(prober, &config.pool);
        let ranker = SourceRanker::new(config.ranking.clone());
        let builder = FailoverListBuilder::new(&config.output).with_category_order(
            config
                .output
                .effective_category_order(&config.normalizer)
                .to_vec(),
        );

        Ok(Self {
            config,
            filter,
            normalizer,
            pool,
            ranker,
            builder,
        })
    }

    /// Filter, normalize and merge raw entries into canonical channels
    pub fn collect_channels<I>(&self, entries: I, report: &mut RunReport) -> Vec<CanonicalChannel>
    where
        I: IntoIterator<Item = RawSourceEntry>,
    {
        let mut merger = ChannelMerger::new(self.config.merge.category_tie_break);

        for entry in entries {
            report.entries_total += 1;

            if let Some(reason) = self.filter.check(&entry) {
                debug!(
                    "Excluded entry {:?} from {:?}: {}",
                    entry.display_name, entry.origin_id, reason
                );
                report.entries_excluded += 1;
                continue;
            }

            match self.normalizer.normalize(&entry) {
                Ok(normalized) => {
                    if normalized.channel.category_fallback {
                        report.category_fallbacks += 1;
                    }
                    merger.merge(normalized);
                }
                Err(e) => {
                    debug!("Skipping entry from {:?}: {}", entry.origin_id, e);
                    report.entries_malformed += 1;
                    if report.malformed_samples.len() < MAX_MALFORMED_SAMPLES {
                        report.malformed_samples.push(MalformedSample {
                            origin_id: entry.origin_id,
                            display_name: entry.display_name,
                            kind: e.kind().to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        let channels = merger.finish();
        info!(
            "Normalization completed: entries={} excluded={} malformed={} category_fallbacks={} channels={}",
            report.entries_total,
            report.entries_excluded,
            report.entries_malformed,
            report.category_fallbacks,
            channels.len()
        );
        channels
    }

    /// Execute one aggregation run.
    ///
    /// Returns [`AppError::DeadlineExhausted`] only when the run deadline
    /// passed before a single probe completed; the partial outcome travels
    /// inside the error.
    pub async fn run<I>(&self, entries: I, prior: Option<&ScoreSnapshot>) -> AppResult<RunOutcome>
    where
        I: IntoIterator<Item = RawSourceEntry>,
    {
        let started = Instant::now();
        let mut report = RunReport::default();

        let channels = self.collect_channels(entries, &mut report);
        report.channels = channels.len();

        // One probe per distinct URL across all channels
        let mut distinct: BTreeMap<String, String> = BTreeMap::new();
        for (key, url) in channels.iter().flat_map(|c| c.candidate_urls.iter()) {
            match distinct.get_mut(key) {
                Some(existing) if url.as_str() < existing.as_str() => *existing = url.clone(),
                Some(_) => {}
                None => {
                    distinct.insert(key.clone(), url.clone());
                }
            }
        }
        report.distinct_urls = distinct.len();

        let batch = self.pool.probe_all(distinct).await;
        report.urls_unprobed = batch.unprobed;
        report.urls_probed = report.distinct_urls - batch.unprobed;
        report.urls_reachable = batch.reachable();
        report.deadline_exceeded = batch.deadline_exceeded;

        let ranked_channels: Vec<RankedChannel> = channels
            .iter()
            .map(|channel| self.ranker.rank(channel, &batch.results, prior))
            .collect();
        for channel in ranked_channels.iter().filter(|c| c.is_empty()) {
            report.empty_channels += 1;
            report.empty_channel_keys.push(channel.channel_key.clone());
        }
        let updated_scores = self.ranker.update_snapshot(&batch.results, prior);

        let playlist = self.builder.build(ranked_channels.clone());
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        if report.empty_channels > 0 {
            debug!("Channels without reachable sources: {:?}", report.empty_channel_keys);
        }
        info!(
            "Aggregation run completed: duration={}ms channels={} empty={} urls={} reachable={} unprobed={} categories={}",
            report.elapsed_ms,
            report.channels,
            report.empty_channels,
            report.distinct_urls,
            report.urls_reachable,
            report.urls_unprobed,
            playlist.groups.len()
        );

        let deadline_exhausted =
            batch.deadline_exceeded && batch.completed == 0 && report.distinct_urls > 0;
        let outcome = RunOutcome {
            playlist,
            ranked_channels,
            updated_scores,
            report,
        };

        if deadline_exhausted {
            warn!(
                "Run deadline exhausted before any probe completed ({} URLs pending)",
                outcome.report.urls_unprobed
            );
            return Err(AppError::DeadlineExhausted {
                pending: outcome.report.urls_unprobed,
                partial: Box::new(outcome),
            });
        }

        Ok(outcome)
    }
}

/// Log-safe rendering of the primary source of each channel, for debugging
pub fn describe_primaries(outcome: &RunOutcome) -> Vec<String> {
    outcome
        .playlist
        .channels()
        .map(|c| match c.primary() {
            Some(source) => format!(
                "{} -> {}",
                c.display_name,
                UrlUtils::obfuscate_credentials(&source.url)
            ),
            None => format!("{} -> <none>", c.display_name),
        })
        .collect()
}
