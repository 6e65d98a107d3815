//! Probe transports
//!
//! A transport performs one probe attempt against one URL and reports the
//! time to first media byte and, when it can tell, the stream bitrate.
//! Retries, timeouts around the whole attempt and cancellation are handled
//! by [`StreamProber`](super::StreamProber).

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::{ProbeBackend, ProberConfig};
use crate::errors::{AppError, AppResult, ProbeAttemptResult, ProbeError};
use crate::streaming::media::{
    MAX_PLAYLIST_BYTES, classify_media, is_playlist_content_type, looks_like_playlist,
};
use crate::utils::status_code_matcher::is_status_acceptable;
use crate::utils::url::UrlUtils;

/// Bytes gathered before sniffing a non-playlist response (two TS packets)
const SNIFF_BYTES: usize = 376;
/// Throughput samples shorter than this are discarded as meaningless
const MIN_SAMPLE_ELAPSED: Duration = Duration::from_millis(100);
/// Headroom left inside the attempt timeout for returning the sample
const DEADLINE_MARGIN: Duration = Duration::from_millis(50);
const MAX_REDIRECTS: usize = 5;

/// What a successful attempt measured
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptSample {
    /// Time until the first media byte (HTTP) or until ffprobe finished
    pub latency: Duration,
    pub bitrate_kbps: Option<f64>,
}

#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Perform a single attempt. `timeout` is the per-attempt budget; the
    /// caller also enforces it from outside.
    async fn attempt(&self, url: &str, timeout: Duration) -> ProbeAttemptResult<AttemptSample>;

    fn name(&self) -> &'static str;
}

/// Build the transport selected by `prober.backend`
pub fn build_transport(config: &ProberConfig) -> AppResult<Arc<dyn ProbeTransport>> {
    let transport: Arc<dyn ProbeTransport> = match config.backend {
        ProbeBackend::Auto => Arc::new(AutoTransport::new(config)?),
        ProbeBackend::Http => Arc::new(HttpProbeTransport::new(config)?),
        ProbeBackend::Ffprobe => Arc::new(FfprobeTransport::new(config)),
    };
    debug!("Using {} probe transport", transport.name());
    Ok(transport)
}

fn describe_reqwest_error(error: &reqwest::Error, timeout: Duration) -> ProbeError {
    if error.is_timeout() {
        ProbeError::Timeout { after: timeout }
    } else {
        ProbeError::connection(UrlUtils::obfuscate_credentials(&error.to_string()))
    }
}

/// HTTP(S) probing through reqwest
pub struct HttpProbeTransport {
    client: Client,
    acceptable_status_codes: Vec<String>,
    sample_window: Duration,
    sample_bytes: usize,
}

impl HttpProbeTransport {
    pub fn new(config: &ProberConfig) -> AppResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.attempt_timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| AppError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            acceptable_status_codes: config.acceptable_status_codes.clone(),
            sample_window: config.bitrate_sample_window,
            sample_bytes: config.bitrate_sample_bytes,
        })
    }

    async fn next_chunk(
        response: &mut Response,
        timeout: Duration,
    ) -> ProbeAttemptResult<Option<Bytes>> {
        response
            .chunk()
            .await
            .map_err(|e| describe_reqwest_error(&e, timeout))
    }

    /// Average throughput of a continuous stream over the sample window,
    /// stopping early at `deadline`
    async fn sample_bitrate(&self, response: &mut Response, deadline: Instant) -> Option<f64> {
        let started = Instant::now();
        let deadline = deadline.min(started + self.sample_window);
        let mut received = 0usize;

        while received < self.sample_bytes {
            match tokio::time::timeout_at(deadline, response.chunk()).await {
                Ok(Ok(Some(chunk))) => received += chunk.len(),
                _ => break,
            }
        }

        let elapsed = started.elapsed();
        if received == 0 || elapsed < MIN_SAMPLE_ELAPSED {
            return None;
        }
        Some(received as f64 * 8.0 / 1000.0 / elapsed.as_secs_f64())
    }
}

#[async_trait]
impl ProbeTransport for HttpProbeTransport {
    async fn attempt(&self, url: &str, timeout: Duration) -> ProbeAttemptResult<AttemptSample> {
        if !UrlUtils::is_http(url) {
            return Err(ProbeError::UnsupportedScheme {
                scheme: UrlUtils::scheme(url).unwrap_or_default(),
            });
        }

        let started = Instant::now();
        // Everything, bitrate sampling included, finishes before the caller's timeout
        let deadline = started + timeout.saturating_sub(DEADLINE_MARGIN);
        let timed_out = || ProbeError::Timeout { after: timeout };

        let mut response = tokio::time::timeout_at(deadline, self.client.get(url).send())
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| describe_reqwest_error(&e, timeout))?;

        let status = response.status().as_u16();
        if !is_status_acceptable(status, &self.acceptable_status_codes) {
            return Err(ProbeError::HttpStatus { status });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let first = tokio::time::timeout_at(deadline, Self::next_chunk(&mut response, timeout))
            .await
            .map_err(|_| timed_out())??
            .ok_or_else(|| ProbeError::non_media("empty response body"))?;
        let latency = started.elapsed();
        let mut head = first.to_vec();

        let playlist = content_type.as_deref().is_some_and(is_playlist_content_type)
            || looks_like_playlist(&head);
        let wanted = if playlist { MAX_PLAYLIST_BYTES } else { SNIFF_BYTES };
        // Out of budget: classify whatever arrived
        while head.len() < wanted {
            match tokio::time::timeout_at(deadline, Self::next_chunk(&mut response, timeout)).await {
                Ok(chunk) => match chunk? {
                    Some(chunk) => head.extend_from_slice(&chunk),
                    None => break,
                },
                Err(_) => break,
            }
        }

        let kind = classify_media(content_type.as_deref(), &head).ok_or_else(|| {
            ProbeError::non_media(format!(
                "content-type {}, {} bytes",
                content_type.as_deref().unwrap_or("<none>"),
                head.len()
            ))
        })?;
        trace!("{} classified as {:?}", UrlUtils::obfuscate_credentials(url), kind);

        let bitrate_kbps = match kind.advertised_kbps() {
            Some(kbps) => Some(kbps),
            None if kind.is_continuous() => self.sample_bitrate(&mut response, deadline).await,
            None => None,
        };

        Ok(AttemptSample {
            latency,
            bitrate_kbps,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
    error: Option<FfprobeErrorInfo>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeErrorInfo {
    code: Option<i64>,
    string: Option<String>,
}

/// Probing through an `ffprobe` subprocess, for schemes reqwest cannot speak
pub struct FfprobeTransport {
    command: String,
}

impl FfprobeTransport {
    pub fn new(config: &ProberConfig) -> Self {
        Self {
            command: config.ffprobe_command.clone(),
        }
    }

    /// Interpret ffprobe JSON output. A stream counts as live media only when
    /// at least one video stream was found.
    fn parse_output(stdout: &str) -> ProbeAttemptResult<Option<f64>> {
        let output: FfprobeOutput = if stdout.trim().is_empty() {
            FfprobeOutput::default()
        } else {
            serde_json::from_str(stdout).map_err(|e| ProbeError::Ffprobe {
                message: format!("failed to parse ffprobe output: {e}"),
            })?
        };

        if let Some(error) = output.error {
            return Err(ProbeError::Ffprobe {
                message: format!(
                    "{} (code: {:?})",
                    error.string.as_deref().unwrap_or("unknown ffprobe error"),
                    error.code
                ),
            });
        }

        if !output
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("video"))
        {
            return Err(ProbeError::non_media("no video stream found"));
        }

        let parse_bps = |v: &Option<String>| v.as_deref().and_then(|s| s.parse::<u64>().ok());
        let format_bps = output.format.as_ref().and_then(|f| parse_bps(&f.bit_rate));
        let stream_bps: Vec<u64> = output.streams.iter().filter_map(|s| parse_bps(&s.bit_rate)).collect();

        let bps = format_bps.or_else(|| (!stream_bps.is_empty()).then(|| stream_bps.iter().sum()));
        Ok(bps.filter(|b| *b > 0).map(|b| b as f64 / 1000.0))
    }
}

#[async_trait]
impl ProbeTransport for FfprobeTransport {
    async fn attempt(&self, url: &str, timeout: Duration) -> ProbeAttemptResult<AttemptSample> {
        let started = Instant::now();

        let mut cmd = Command::new(&self.command);
        cmd.args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_error",
            "-show_entries",
            "stream=codec_type,bit_rate:format=bit_rate",
            "-analyzeduration",
            "2000000",
            "-probesize",
            "2000000",
            url,
        ]);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| ProbeError::Timeout { after: timeout })?
            .map_err(|e| ProbeError::Ffprobe {
                message: format!("failed to execute {}: {e}", self.command),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() && !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Ffprobe {
                message: UrlUtils::obfuscate_credentials(stderr.trim()),
            });
        }

        let bitrate_kbps = Self::parse_output(&stdout)?;
        Ok(AttemptSample {
            latency: started.elapsed(),
            bitrate_kbps,
        })
    }

    fn name(&self) -> &'static str {
        "ffprobe"
    }
}

/// HTTP(S) URLs through [`HttpProbeTransport`], everything else through
/// [`FfprobeTransport`]
pub struct AutoTransport {
    http: HttpProbeTransport,
    ffprobe: FfprobeTransport,
}

impl AutoTransport {
    pub fn new(config: &ProberConfig) -> AppResult<Self> {
        Ok(Self {
            http: HttpProbeTransport::new(config)?,
            ffprobe: FfprobeTransport::new(config),
        })
    }
}

#[async_trait]
impl ProbeTransport for AutoTransport {
    async fn attempt(&self, url: &str, timeout: Duration) -> ProbeAttemptResult<AttemptSample> {
        if UrlUtils::is_http(url) {
            self.http.attempt(url, timeout).await
        } else {
            self.ffprobe.attempt(url, timeout).await
        }
    }

    fn name(&self) -> &'static str {
        "auto"
    }
}
