use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};

pub mod defaults;
pub mod duration_serde;

use defaults::*;

/// Complete engine configuration.
///
/// Every section is optional in the TOML file; missing values fall back to
/// the constants in [`defaults`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub normalizer: NormalizerConfig,
    pub filter: FilterConfig,
    pub merge: MergeConfig,
    pub prober: ProberConfig,
    pub pool: PoolConfig,
    pub ranking: RankingConfig,
    pub output: OutputConfig,
}

/// How the channel key is composed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KeyScope {
    /// `name|category`: the same name in two categories is two channels
    #[default]
    NameAndCategory,
    /// Name only: category conflicts are resolved by the merge tie-break
    Name,
}

/// Which category wins when merged entries disagree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CategoryTieBreak {
    /// Category of the entry that created the channel
    #[default]
    FirstSeen,
    /// Most frequently observed category, earliest seen on ties
    MostFrequent,
}

/// Probe transport selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProbeBackend {
    /// HTTP(S) through reqwest, everything else through ffprobe
    #[default]
    Auto,
    Http,
    Ffprobe,
}

/// A regex alias: any cleaned name matching `pattern` becomes `name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasPattern {
    pub pattern: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Known name variants mapped to a canonical display name
    pub aliases: BTreeMap<String, String>,
    /// Regex aliases, applied in order after exact aliases
    pub alias_patterns: Vec<AliasPattern>,
    /// Category variants mapped to a canonical category
    pub category_aliases: BTreeMap<String, String>,
    /// Recognized categories; empty accepts any non-empty category
    pub categories: Vec<String>,
    pub default_category: String,
    /// Decorations removed from names before alias lookup
    pub strip_patterns: Vec<String>,
    pub allowed_schemes: Vec<String>,
    pub key_scope: KeyScope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Entries whose URL contains any of these substrings are dropped
    pub excluded_url_patterns: Vec<String>,
    /// Entries whose display name matches any of these regexes are dropped
    pub excluded_name_patterns: Vec<String>,
    /// Drop entries whose category looks like mis-decoded UTF-8
    pub reject_garbled_categories: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub category_tie_break: CategoryTieBreak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProberConfig {
    pub backend: ProbeBackend,
    /// Attempts per URL; all are performed so stability can be measured
    pub max_attempts: u32,
    #[serde(with = "duration_serde")]
    pub attempt_timeout: Duration,
    #[serde(with = "duration_serde")]
    pub initial_backoff: Duration,
    #[serde(with = "duration_serde")]
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    pub user_agent: String,
    /// Status patterns such as "2xx" or "206"
    pub acceptable_status_codes: Vec<String>,
    /// How long to read a continuous stream when sampling bitrate
    #[serde(with = "duration_serde")]
    pub bitrate_sample_window: Duration,
    /// Upper bound on bytes read while sampling bitrate
    pub bitrate_sample_bytes: usize,
    pub ffprobe_command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub worker_pool_size: usize,
    /// Concurrent probes allowed against a single host
    pub max_per_host: usize,
    /// Probes still pending after this are cancelled and counted unreachable
    #[serde(with = "duration_serde")]
    pub run_deadline: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub weight_stability: f64,
    pub weight_latency: f64,
    pub weight_bitrate: f64,
    /// Latency at which the latency score is 0.5
    pub latency_reference_ms: f64,
    /// Bitrate at which the bitrate score is 0.5
    pub bitrate_reference_kbps: f64,
    /// Bitrate score used when no bitrate could be observed
    pub unknown_bitrate_score: f64,
    /// Weight of the current score when blending with the previous run
    pub smoothing_alpha: f64,
    /// Decayed snapshot entries below this are dropped
    pub snapshot_floor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// K: sources kept per channel
    pub max_sources_per_channel: usize,
    pub drop_empty_channels: bool,
    /// Category output order; falls back to `normalizer.categories`
    pub category_order: Vec<String>,
    /// Categories whose channels are sorted by name with numeric awareness
    pub natural_sort_categories: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            aliases: BTreeMap::new(),
            alias_patterns: Vec::new(),
            category_aliases: BTreeMap::new(),
            categories: Vec::new(),
            default_category: DEFAULT_CATEGORY.to_string(),
            strip_patterns: DEFAULT_STRIP_PATTERNS.iter().map(|s| s.to_string()).collect(),
            allowed_schemes: DEFAULT_ALLOWED_SCHEMES.iter().map(|s| s.to_string()).collect(),
            key_scope: KeyScope::default(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            excluded_url_patterns: Vec::new(),
            excluded_name_patterns: Vec::new(),
            reject_garbled_categories: DEFAULT_REJECT_GARBLED_CATEGORIES,
        }
    }
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            backend: ProbeBackend::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: DEFAULT_BACKOFF_JITTER,
            user_agent: default_user_agent(),
            acceptable_status_codes: vec!["2xx".to_string()],
            bitrate_sample_window: DEFAULT_BITRATE_SAMPLE_WINDOW,
            bitrate_sample_bytes: DEFAULT_BITRATE_SAMPLE_BYTES,
            ffprobe_command: DEFAULT_FFPROBE_COMMAND.to_string(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            max_per_host: DEFAULT_MAX_PER_HOST,
            run_deadline: DEFAULT_RUN_DEADLINE,
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            weight_stability: DEFAULT_WEIGHT_STABILITY,
            weight_latency: DEFAULT_WEIGHT_LATENCY,
            weight_bitrate: DEFAULT_WEIGHT_BITRATE,
            latency_reference_ms: DEFAULT_LATENCY_REFERENCE_MS,
            bitrate_reference_kbps: DEFAULT_BITRATE_REFERENCE_KBPS,
            unknown_bitrate_score: DEFAULT_UNKNOWN_BITRATE_SCORE,
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
            snapshot_floor: DEFAULT_SNAPSHOT_FLOOR,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_sources_per_channel: DEFAULT_MAX_SOURCES_PER_CHANNEL,
            drop_empty_channels: DEFAULT_DROP_EMPTY_CHANNELS,
            category_order: Vec::new(),
            natural_sort_categories: Vec::new(),
        }
    }
}

impl OutputConfig {
    /// Category order to use, given the normalizer's recognized categories
    pub fn effective_category_order<'a>(&'a self, normalizer: &'a NormalizerConfig) -> &'a [String] {
        if self.category_order.is_empty() {
            &normalizer.categories
        } else {
            &self.category_order
        }
    }
}

impl Config {
    /// Layer defaults, the TOML file (when present) and `M3U_AGGREGATOR_*`
    /// environment variables, then validate
    pub fn load_from_file(config_file: impl AsRef<Path>) -> AppResult<Self> {
        let path = config_file.as_ref();
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if path.exists() {
            info!("Loading configuration from {}", path.display());
            figment = figment.merge(Toml::file(path));
        } else {
            info!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
        }

        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| AppError::configuration(e.to_string()))?;

        config.validate()?;
        debug!("Effective configuration: {:?}", config);
        Ok(config)
    }

    /// Parse configuration from a TOML string layered over defaults
    pub fn from_toml_str(contents: &str) -> AppResult<Self> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string(contents))
            .extract()
            .map_err(|e| AppError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML, e.g. to seed a new configuration file
    pub fn to_toml_string(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| AppError::internal(e.to_string()))
    }

    /// Reject configurations that would make a run meaningless. Called
    /// before any probing starts.
    pub fn validate(&self) -> AppResult<()> {
        let n = &self.normalizer;
        if n.default_category.trim().is_empty() {
            return Err(AppError::configuration("normalizer.default_category must not be empty"));
        }
        if n.allowed_schemes.is_empty() {
            return Err(AppError::configuration("normalizer.allowed_schemes must not be empty"));
        }

        let p = &self.prober;
        if p.max_attempts == 0 {
            return Err(AppError::configuration("prober.max_attempts must be at least 1"));
        }
        if p.attempt_timeout.is_zero() {
            return Err(AppError::configuration("prober.attempt_timeout must be greater than zero"));
        }
        if !p.backoff_multiplier.is_finite() || p.backoff_multiplier < 1.0 {
            return Err(AppError::configuration("prober.backoff_multiplier must be >= 1.0"));
        }
        if p.max_backoff < p.initial_backoff {
            return Err(AppError::configuration(
                "prober.max_backoff must not be shorter than prober.initial_backoff",
            ));
        }
        if p.acceptable_status_codes.is_empty() {
            return Err(AppError::configuration("prober.acceptable_status_codes must not be empty"));
        }

        let pool = &self.pool;
        if pool.worker_pool_size == 0 {
            return Err(AppError::configuration("pool.worker_pool_size must be at least 1"));
        }
        if pool.max_per_host == 0 {
            return Err(AppError::configuration("pool.max_per_host must be at least 1"));
        }
        if pool.run_deadline.is_zero() {
            return Err(AppError::configuration("pool.run_deadline must be greater than zero"));
        }

        let r = &self.ranking;
        let weights = [r.weight_stability, r.weight_latency, r.weight_bitrate];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AppError::configuration(format!(
                "ranking weights must be finite and non-negative, got {weights:?}"
            )));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AppError::configuration(format!(
                "ranking weights must sum to 1.0, got {sum}"
            )));
        }
        if !(r.smoothing_alpha > 0.0 && r.smoothing_alpha <= 1.0) {
            return Err(AppError::configuration(format!(
                "ranking.smoothing_alpha must be in (0, 1], got {}",
                r.smoothing_alpha
            )));
        }
        let references = [r.latency_reference_ms, r.bitrate_reference_kbps];
        if references.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(AppError::configuration(format!(
                "ranking reference latency and bitrate must be positive, got {references:?}"
            )));
        }
        if !(0.0..1.0).contains(&r.snapshot_floor) {
            return Err(AppError::configuration(format!(
                "ranking.snapshot_floor must be within [0, 1), got {}",
                r.snapshot_floor
            )));
        }
        if !(0.0..=1.0).contains(&r.unknown_bitrate_score) {
            return Err(AppError::configuration(
                "ranking.unknown_bitrate_score must be within [0, 1]",
            ));
        }

        if self.output.max_sources_per_channel == 0 {
            return Err(AppError::configuration(
                "output.max_sources_per_channel must be at least 1",
            ));
        }

        Ok(())
    }
}
