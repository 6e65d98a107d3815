mod common;

use std::time::Duration;

use common::{ScriptedTransport, entry, shared, test_config};
use m3u_aggregator::config::Config;
use m3u_aggregator::engine::AggregationEngine;
use m3u_aggregator::errors::AppError;
use m3u_aggregator::models::{RankedChannel, ScoreSnapshot};
use m3u_aggregator::services::{ChannelMerger, ChannelNormalizer};
use m3u_aggregator::utils::url::UrlUtils;
use proptest::prelude::*;

fn engine(config: Config, transport: ScriptedTransport) -> AggregationEngine {
    AggregationEngine::with_transport(config, shared(transport)).unwrap()
}

fn urls(channel: &RankedChannel) -> Vec<&str> {
    channel.ordered_sources.iter().map(|s| s.url.as_str()).collect()
}

#[tokio::test]
async fn test_name_variants_merge_into_one_channel() {
    let transport = ScriptedTransport::new()
        .answer("http://a.example/cctv1.m3u8", 40)
        .answer("http://b.example/cctv1.m3u8", 90);
    let outcome = engine(test_config(), transport)
        .run(
            vec![
                entry("CCTV-1 高清", "http://a.example/cctv1.m3u8", "新闻", "list-a"),
                entry("CCTV1", "http://b.example/cctv1.m3u8", "新闻", "list-b"),
            ],
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.report.channels, 1);
    assert_eq!(outcome.playlist.groups.len(), 1);
    let channel = &outcome.playlist.groups[0].channels[0];
    assert_eq!(channel.display_name, "CCTV-1");
    assert_eq!(channel.category, "新闻");
    assert_eq!(
        urls(channel),
        ["http://a.example/cctv1.m3u8", "http://b.example/cctv1.m3u8"]
    );
}

#[tokio::test]
async fn test_category_spellings_merge_through_aliases() {
    let mut config = test_config();
    config.normalizer.categories = vec!["News".into()];
    config
        .normalizer
        .category_aliases
        .insert("新闻".into(), "News".into());
    let transport = ScriptedTransport::new()
        .answer("http://a.example/cctv1.m3u8", 40)
        .answer("http://b.example/cctv1.m3u8", 90);

    let outcome = engine(config, transport)
        .run(
            vec![
                entry("CCTV-1 高清", "http://a.example/cctv1.m3u8", "News", "list-a"),
                entry("CCTV1", "http://b.example/cctv1.m3u8", "新闻", "list-b"),
            ],
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.report.channels, 1);
    assert_eq!(outcome.report.category_fallbacks, 0);
    let channel = &outcome.ranked_channels[0];
    assert_eq!(channel.channel_key, "cctv1|News");
    assert_eq!(channel.category, "News");
    assert_eq!(
        urls(channel),
        ["http://a.example/cctv1.m3u8", "http://b.example/cctv1.m3u8"]
    );
}

#[tokio::test]
async fn test_unreachable_source_dropped_and_fastest_first() {
    let transport = ScriptedTransport::new()
        .answer("http://a.example/live", 50)
        .answer("http://c.example/live", 200);
    let outcome = engine(test_config(), transport)
        .run(
            vec![
                entry("湖南卫视", "http://c.example/live", "卫视", "l1"),
                entry("湖南卫视", "http://b.example/live", "卫视", "l2"),
                entry("湖南卫视", "http://a.example/live", "卫视", "l3"),
            ],
            None,
        )
        .await
        .unwrap();

    let channel = &outcome.ranked_channels[0];
    assert_eq!(urls(channel), ["http://a.example/live", "http://c.example/live"]);
    assert_eq!(outcome.report.urls_reachable, 2);
    assert_eq!(outcome.report.empty_channels, 0);
}

#[tokio::test]
async fn test_source_list_capped_at_k() {
    let mut transport = ScriptedTransport::new();
    let mut entries = Vec::new();
    for (i, latency) in [300u64, 10, 120, 60].iter().enumerate() {
        let url = format!("http://s{i}.example/cctv5.ts");
        transport = transport.answer(&url, *latency);
        entries.push(entry("CCTV-5", &url, "央视", "l"));
    }

    let outcome = engine(test_config(), transport).run(entries, None).await.unwrap();

    let capped = &outcome.playlist.groups[0].channels[0];
    assert_eq!(urls(capped), ["http://s1.example/cctv5.ts", "http://s3.example/cctv5.ts"]);
    // The flat ranking keeps every reachable source
    assert_eq!(outcome.ranked_channels[0].ordered_sources.len(), 4);
}

#[tokio::test]
async fn test_duplicate_urls_probed_once() {
    let transport = shared(ScriptedTransport::new().answer("http://a.example/Live/1.m3u8", 30));
    let engine = AggregationEngine::with_transport(test_config(), transport.clone()).unwrap();
    let outcome = engine
        .run(
            vec![
                entry("CCTV-1", "http://a.example/Live/1.m3u8", "央视", "l1"),
                entry("CCTV1", "HTTP://A.EXAMPLE/live/1.m3u8/", "央视", "l2"),
                entry("CCTV-2", "http://a.example/live/1.m3u8", "央视", "l3"),
            ],
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.report.distinct_urls, 1);
    assert_eq!(transport.calls().len(), 1);
    for channel in &outcome.ranked_channels {
        assert_eq!(channel.ordered_sources.len(), 1);
    }
}

#[tokio::test]
async fn test_empty_channel_kept_with_no_sources() {
    let outcome = engine(test_config(), ScriptedTransport::new())
        .run(vec![entry("CCTV-9", "http://dead.example/9", "央视", "l")], None)
        .await
        .unwrap();

    assert_eq!(outcome.playlist.channel_count(), 1);
    assert!(outcome.playlist.groups[0].channels[0].ordered_sources.is_empty());
    assert_eq!(outcome.report.empty_channel_keys, ["cctv9|央视"]);
}

#[tokio::test]
async fn test_category_order_follows_configured_categories() {
    let transport = ScriptedTransport::new()
        .answer("http://a/1", 10)
        .answer("http://a/2", 10)
        .answer("http://a/3", 10);
    let outcome = engine(test_config(), transport)
        .run(
            vec![
                entry("Movie", "http://a/3", "", "l"),
                entry("湖南卫视", "http://a/2", "卫视", "l"),
                entry("CCTV1", "http://a/1", "央视", "l"),
            ],
            None,
        )
        .await
        .unwrap();

    let categories: Vec<_> = outcome.playlist.groups.iter().map(|g| g.category.as_str()).collect();
    assert_eq!(categories, ["央视", "卫视", "其他"]);
    assert_eq!(outcome.report.category_fallbacks, 1);
}

#[tokio::test]
async fn test_prior_scores_smooth_the_ranking() {
    let transport = ScriptedTransport::new()
        .answer("http://a.example/x", 100)
        .answer("http://b.example/x", 120);
    let mut prior = ScoreSnapshot::new();
    prior.insert(UrlUtils::dedup_key("http://a.example/x"), 0.0);
    prior.insert(UrlUtils::dedup_key("http://b.example/x"), 1.0);

    let outcome = engine(test_config(), transport)
        .run(
            vec![
                entry("Arte", "http://a.example/x", "", "l"),
                entry("Arte", "http://b.example/x", "", "l"),
            ],
            Some(&prior),
        )
        .await
        .unwrap();

    assert_eq!(urls(&outcome.ranked_channels[0])[0], "http://b.example/x");
    assert_eq!(outcome.updated_scores.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_before_any_probe_completes() {
    let mut config = test_config();
    config.prober.attempt_timeout = Duration::from_secs(30);
    config.pool.run_deadline = Duration::from_secs(5);
    let transport = ScriptedTransport::new()
        .hang("http://a.example/1")
        .hang("http://b.example/2");

    let started = tokio::time::Instant::now();
    let err = engine(config, transport)
        .run(
            vec![
                entry("CCTV-1", "http://a.example/1", "央视", "l"),
                entry("CCTV-2", "http://b.example/2", "央视", "l"),
            ],
            None,
        )
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(30));

    match err {
        AppError::DeadlineExhausted { pending, partial } => {
            assert_eq!(pending, 2);
            assert!(partial.report.deadline_exceeded);
            assert!(partial.report.is_partial());
            assert_eq!(partial.playlist.channel_count(), 2);
            assert!(partial.playlist.channels().all(|c| c.ordered_sources.is_empty()));
        }
        other => panic!("expected DeadlineExhausted, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_deadline_after_some_probes_is_partial_success() {
    let mut config = test_config();
    config.prober.attempt_timeout = Duration::from_secs(30);
    config.pool.run_deadline = Duration::from_secs(5);
    let transport = ScriptedTransport::new()
        .answer("http://a.example/1", 20)
        .hang("http://b.example/2");

    let outcome = engine(config, transport)
        .run(
            vec![
                entry("CCTV-1", "http://a.example/1", "央视", "l"),
                entry("CCTV-1", "http://b.example/2", "央视", "l"),
            ],
            None,
        )
        .await
        .unwrap();

    assert!(outcome.report.deadline_exceeded);
    assert_eq!(outcome.report.urls_unprobed, 1);
    assert_eq!(urls(&outcome.ranked_channels[0]), ["http://a.example/1"]);
}

#[tokio::test(start_paused = true)]
async fn test_never_responding_url_times_out_within_deadline() {
    let mut config = test_config();
    config.prober.max_attempts = 2;
    config.prober.attempt_timeout = Duration::from_secs(2);
    config.pool.run_deadline = Duration::from_secs(60);
    let transport = ScriptedTransport::new().hang("http://a.example/1");

    let started = tokio::time::Instant::now();
    let outcome = engine(config, transport)
        .run(vec![entry("CCTV-1", "http://a.example/1", "央视", "l")], None)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(60));
    assert!(!outcome.report.deadline_exceeded);
    assert_eq!(outcome.report.urls_reachable, 0);
    assert_eq!(outcome.report.urls_probed, 1);
    assert!(outcome.ranked_channels[0].is_empty());
}

proptest! {
    #[test]
    fn test_merge_independent_of_entry_order(
        picks in prop::collection::vec((0usize..4, 0usize..4), 1..16),
        rotation in 0usize..16,
    ) {
        let names = ["CCTV-1 高清", "CCTV1", "ＣＣＴＶ－１", "cctv 1 HD"];
        let urls = [
            "http://a.example/1.m3u8",
            "HTTP://A.example/1.m3u8/",
            "http://b.example/1.m3u8",
            "rtmp://c.example/live/1",
        ];
        let config = test_config();
        let normalizer = ChannelNormalizer::new(&config.normalizer).unwrap();

        let entries: Vec<_> = picks
            .iter()
            .map(|(n, u)| normalizer.normalize(&entry(names[*n], urls[*u], "新闻", "l")).unwrap())
            .collect();
        let mut rotated = entries.clone();
        rotated.rotate_left(rotation % entries.len());
        rotated.reverse();

        let merge = |list: Vec<_>| {
            let mut merger = ChannelMerger::new(config.merge.category_tie_break);
            for e in list {
                merger.merge(e);
            }
            merger.finish()
        };
        let a = merge(entries);
        let b = merge(rotated);

        prop_assert_eq!(a.len(), 1);
        prop_assert_eq!(&a[0].candidate_urls, &b[0].candidate_urls);
        prop_assert_eq!(&a[0].aliases, &b[0].aliases);
        prop_assert_eq!(&a[0].channel_key, &b[0].channel_key);
    }
}
