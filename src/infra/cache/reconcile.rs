//! Cache reconciliation loop.
//!
//! One background task for the process lifetime. Each cycle evicts entries
//! older than the retention window and opportunistically re-downloads fresh
//! entries whose backing file went missing, serially and rate-limited. A
//! single failing entry never aborts the cycle; only cooperative
//! cancellation stops the loop, and only between entries, never
//! mid-download.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::store::{CacheError, ContentCache, epoch_now};

const SOURCE: &str = "infra::cache::reconcile";

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Pause between cycles.
    pub interval: Duration,
    /// Entries older than this are evicted.
    pub retention: Duration,
    /// Pause between consecutive background downloads, respecting upstream
    /// rate limits.
    pub refetch_delay: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            retention: Duration::from_secs(20 * 24 * 60 * 60),
            refetch_delay: Duration::from_secs(1),
        }
    }
}

/// Outcome of one cycle, for logs and tests.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub reclaimed: usize,
    pub kept_for_retry: usize,
    pub refetched: usize,
    pub refetch_failures: usize,
}

pub struct Reconciler {
    cache: Arc<ContentCache>,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(cache: Arc<ContentCache>, config: ReconcileConfig) -> Self {
        Self { cache, config }
    }

    /// Spawn the loop onto the shared runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.tick().await; // skip the immediate first tick
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(target = SOURCE, "reconciler stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let started = tokio::time::Instant::now();
            match self.run_cycle(&cancel).await {
                Ok(report) => {
                    histogram!("rivista_reconcile_cycle_ms")
                        .record(started.elapsed().as_millis() as f64);
                    if report.reclaimed > 0 || report.refetched > 0 {
                        info!(
                            target = SOURCE,
                            reclaimed = report.reclaimed,
                            refetched = report.refetched,
                            refetch_failures = report.refetch_failures,
                            "reconcile cycle finished"
                        );
                    }
                }
                Err(err) => warn!(target = SOURCE, error = %err, "reconcile cycle failed"),
            }
        }
    }

    /// One reconciliation pass over the whole index.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, CacheError> {
        let entries = self.cache.index().snapshot().await?;
        let now = epoch_now();
        let cutoff = now - self.config.retention.as_secs() as i64;

        let (stale, fresh): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|entry| entry.last_access < cutoff);

        let mut report = CycleReport::default();
        let mut reclaimed_keys = Vec::new();

        for entry in stale {
            if cancel.is_cancelled() {
                break;
            }
            match self.cache.remove_file(&entry.key).await {
                Ok(()) => {
                    reclaimed_keys.push(entry.key);
                    report.reclaimed += 1;
                }
                Err(err) => {
                    // Entry stays in the index so the next cycle retries.
                    report.kept_for_retry += 1;
                    warn!(
                        target = SOURCE,
                        key = %entry.key,
                        error = %err,
                        "stale content removal failed, keeping entry"
                    );
                }
            }
        }
        if !reclaimed_keys.is_empty() {
            self.cache.index().prune(&reclaimed_keys, cutoff).await?;
            counter!("rivista_content_evicted_total").increment(reclaimed_keys.len() as u64);
        }

        for entry in fresh {
            if cancel.is_cancelled() {
                break;
            }
            let path = self.cache.content_path(&entry.key);
            match tokio::fs::try_exists(&path).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        target = SOURCE,
                        key = %entry.key,
                        error = %err,
                        "backing file probe failed"
                    );
                    continue;
                }
            }
            match self.cache.resolve(&entry.key).await {
                Ok(_) => report.refetched += 1,
                Err(err) => {
                    report.refetch_failures += 1;
                    warn!(
                        target = SOURCE,
                        key = %entry.key,
                        error = %err,
                        "background refetch failed"
                    );
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.refetch_delay) => {}
            }
        }

        Ok(report)
    }
}
