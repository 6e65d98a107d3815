//! Bounded concurrent probing of every distinct candidate URL
//!
//! Each URL is one task in a [`JoinSet`]. A task needs a permit from its
//! host's semaphore and from the global worker semaphore before probing.
//! When the run deadline passes the shared cancellation token fires; tasks
//! wind down with whatever they measured, and anything still running after
//! a short grace period is aborted. URLs without a measurement are recorded
//! as unreachable.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::models::ProbeResult;
use crate::services::stream_prober::{ProbeOutcome, StreamProber};
use crate::utils::url::UrlUtils;

/// How long cancelled tasks get to report before they are aborted
const CANCEL_GRACE: Duration = Duration::from_secs(2);

pub const DEADLINE_EXCEEDED_REASON: &str = "run deadline exceeded";
const TASK_FAILED_REASON: &str = "probe task did not complete";

/// Results of one probing phase
#[derive(Debug, Clone, Default)]
pub struct ProbeBatch {
    /// One result per URL dedup key
    pub results: HashMap<String, ProbeResult>,
    /// Probes that ran to the end without being cancelled
    pub completed: usize,
    /// URLs that never got a single attempt
    pub unprobed: usize,
    pub deadline_exceeded: bool,
}

impl ProbeBatch {
    pub fn reachable(&self) -> usize {
        self.results.values().filter(|r| r.reachable).count()
    }
}

pub struct ProbePool {
    prober: Arc<StreamProber>,
    worker_pool_size: usize,
    max_per_host: usize,
    run_deadline: Duration,
}

type TaskOutput = (String, Option<ProbeOutcome>);

impl ProbePool {
    pub fn new(prober: Arc<StreamProber>, config: &PoolConfig) -> Self {
        Self {
            prober,
            worker_pool_size: config.worker_pool_size.max(1),
            max_per_host: config.max_per_host.max(1),
            run_deadline: config.run_deadline,
        }
    }

    /// Probe every `(url_key, url)` pair once. Duplicate keys are probed once.
    pub async fn probe_all<I>(&self, urls: I) -> ProbeBatch
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let started = Instant::now();
        let targets: BTreeMap<String, String> = urls.into_iter().collect();

        info!(
            "Probing {} distinct URLs: workers={} max_per_host={} deadline={:?}",
            targets.len(),
            self.worker_pool_size,
            self.max_per_host,
            self.run_deadline
        );

        let cancel = CancellationToken::new();
        let global = Arc::new(Semaphore::new(self.worker_pool_size));
        let mut host_limits: HashMap<String, Arc<Semaphore>> = HashMap::new();
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();

        for (key, url) in &targets {
            let host = UrlUtils::extract_host(url).unwrap_or_default();
            let host_limit = host_limits
                .entry(host)
                .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_host)))
                .clone();
            let global = global.clone();
            let prober = self.prober.clone();
            let cancel = cancel.clone();
            let key = key.clone();
            let url = url.clone();

            tasks.spawn(async move {
                let permits = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permits = async move {
                        let host_permit = host_limit.acquire_owned().await.ok()?;
                        let worker_permit = global.acquire_owned().await.ok()?;
                        Some((host_permit, worker_permit))
                    } => permits,
                };
                let outcome = match permits {
                    Some(_permits) => Some(prober.probe_detailed(&url, &cancel).await),
                    None => None,
                };
                (key, outcome)
            });
        }

        let mut batch = ProbeBatch::default();
        let deadline = tokio::time::sleep(self.run_deadline);
        let hard_stop = tokio::time::sleep(self.run_deadline + CANCEL_GRACE);
        tokio::pin!(deadline);
        tokio::pin!(hard_stop);
        let mut aborted = false;

        loop {
            let joined = tokio::select! {
                biased;
                joined = tasks.join_next() => joined,
                _ = &mut deadline, if !batch.deadline_exceeded => {
                    batch.deadline_exceeded = true;
                    warn!(
                        "Run deadline of {:?} exceeded with {} probes outstanding, cancelling",
                        self.run_deadline,
                        tasks.len()
                    );
                    cancel.cancel();
                    continue;
                }
                _ = &mut hard_stop, if batch.deadline_exceeded && !aborted => {
                    warn!("Aborting {} probe tasks that ignored cancellation", tasks.len());
                    tasks.abort_all();
                    aborted = true;
                    continue;
                }
            };

            match joined {
                None => break,
                Some(Ok((key, Some(outcome)))) => {
                    if !outcome.cancelled {
                        batch.completed += 1;
                    }
                    if outcome.result.attempts > 0 {
                        batch.results.insert(key, outcome.result);
                    }
                }
                Some(Ok((_, None))) => {}
                Some(Err(e)) if e.is_cancelled() => {}
                Some(Err(e)) => warn!("Probe task failed: {}", e),
            }
        }

        let reason = if batch.deadline_exceeded {
            DEADLINE_EXCEEDED_REASON
        } else {
            TASK_FAILED_REASON
        };
        for (key, url) in targets {
            if !batch.results.contains_key(&key) {
                debug!("No probe result for {}: {}", UrlUtils::obfuscate_credentials(&url), reason);
                batch.unprobed += 1;
                batch.results.insert(key, ProbeResult::unprobed(url, reason));
            }
        }

        info!(
            "Probe phase completed: duration={:?} urls={} completed={} reachable={} unprobed={} deadline_exceeded={}",
            started.elapsed(),
            batch.results.len(),
            batch.completed,
            batch.reachable(),
            batch.unprobed,
            batch.deadline_exceeded
        );

        batch
    }
}
