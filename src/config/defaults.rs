/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
use std::time::Duration;

// Environment overrides
pub const ENV_PREFIX: &str = "M3U_AGGREGATOR_";
pub const DEFAULT_CONFIG_FILE: &str = "aggregator.toml";

// Normalizer defaults
pub const DEFAULT_CATEGORY: &str = "Other";
pub const DEFAULT_ALLOWED_SCHEMES: &[&str] = &["http", "https", "rtmp", "rtsp"];
/// Decorations stripped from channel names before alias lookup
pub const DEFAULT_STRIP_PATTERNS: &[&str] = &[
    r"(?i)\b(?:4K|UHD|FHD|HD|SD|HEVC|H265|H264)\b",
    r"(?i)\b(?:2160|1080|720|576|480)[PI]?\b",
    r"高清|超清|标清|蓝光|超高清|频道$",
    r"\[[^\]]*\]|【[^】]*】|\([^)]*\)|（[^）]*）",
];

// Filter defaults
pub const DEFAULT_REJECT_GARBLED_CATEGORIES: bool = true;

// Prober defaults
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(250);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(2);
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_BACKOFF_JITTER: bool = true;
pub const DEFAULT_BITRATE_SAMPLE_WINDOW: Duration = Duration::from_secs(1);
pub const DEFAULT_BITRATE_SAMPLE_BYTES: usize = 1024 * 1024;
pub const DEFAULT_FFPROBE_COMMAND: &str = "ffprobe";

// Pool defaults
pub const DEFAULT_WORKERS_PER_CORE: usize = 4;
pub const MAX_DEFAULT_WORKER_POOL_SIZE: usize = 64;
pub const DEFAULT_MAX_PER_HOST: usize = 4;
pub const DEFAULT_RUN_DEADLINE: Duration = Duration::from_secs(600);

// Ranking defaults
pub const DEFAULT_WEIGHT_STABILITY: f64 = 0.5;
pub const DEFAULT_WEIGHT_LATENCY: f64 = 0.35;
pub const DEFAULT_WEIGHT_BITRATE: f64 = 0.15;
pub const DEFAULT_LATENCY_REFERENCE_MS: f64 = 500.0;
pub const DEFAULT_BITRATE_REFERENCE_KBPS: f64 = 2000.0;
pub const DEFAULT_UNKNOWN_BITRATE_SCORE: f64 = 0.5;
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.6;
pub const DEFAULT_SNAPSHOT_FLOOR: f64 = 0.01;
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// Output defaults
pub const DEFAULT_MAX_SOURCES_PER_CHANNEL: usize = 2;
pub const DEFAULT_DROP_EMPTY_CHANNELS: bool = false;

/// Worker pool size: a small multiple of the available cores, capped so a
/// large machine does not hammer upstream hosts
pub fn default_worker_pool_size() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores * DEFAULT_WORKERS_PER_CORE).min(MAX_DEFAULT_WORKER_POOL_SIZE)
}

pub fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
