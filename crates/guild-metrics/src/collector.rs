//! Metrics collector: tracks hello-handler invocation metrics.
//!
//! Counters are atomics; latency samples sit in a mutex-protected buffer that
//! is swapped out whole at each snapshot. Many concurrent handlers can record
//! without losing updates, and a snapshot never blocks them for longer than
//! a `Vec` swap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use guild_core::{epoch_secs, period_start, until_next_boundary};
use guild_runtime::ConcurrencyReading;
use guild_state::{MetricSample, MetricsSnapshot, StateStore};

/// Reads peak concurrency and capacity from the warm pool.
pub type ConcurrencyProbe = Arc<dyn Fn() -> ConcurrencyReading + Send + Sync>;

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    Success,
    /// Unhandled failure inside the handler.
    Fault,
    /// Aborted by the invocation timeout. Not a latency sample.
    Timeout,
}

/// Raw metric streams accepted by [`MetricsCollector::emit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricName {
    Invocations,
    Errors,
    Timeouts,
    ColdStarts,
    /// Duration in milliseconds.
    Latency,
}

/// Counters for the period in progress.
#[derive(Default)]
struct PeriodWindow {
    invocations: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    cold_starts: AtomicU64,
    latencies: Mutex<Vec<MetricSample>>,
}

/// Collects invocation metrics and periodically snapshots them to the
/// state store.
pub struct MetricsCollector {
    window: PeriodWindow,
    state: StateStore,
    period: Duration,
    retention_periods: u64,
    concurrency: Option<ConcurrencyProbe>,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new(state: StateStore, period: Duration) -> Self {
        Self {
            window: PeriodWindow::default(),
            state,
            period,
            retention_periods: 1440,
            concurrency: None,
        }
    }

    /// Attach the warm pool's concurrency reading.
    pub fn with_concurrency_probe(mut self, probe: ConcurrencyProbe) -> Self {
        self.concurrency = Some(probe);
        self
    }

    pub fn with_retention(mut self, periods: u64) -> Self {
        self.retention_periods = periods;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Append one raw sample. Fire-and-forget.
    pub fn emit(&self, metric: MetricName, value: f64, timestamp: u64) {
        let w = &self.window;
        match metric {
            MetricName::Invocations => {
                w.invocations.fetch_add(value as u64, Ordering::Relaxed);
            }
            MetricName::Errors => {
                w.errors.fetch_add(value as u64, Ordering::Relaxed);
            }
            MetricName::Timeouts => {
                w.timeouts.fetch_add(value as u64, Ordering::Relaxed);
            }
            MetricName::ColdStarts => {
                w.cold_starts.fetch_add(value as u64, Ordering::Relaxed);
            }
            MetricName::Latency => {
                w.latencies
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(MetricSample { timestamp, value });
            }
        }
    }

    /// Record one finished invocation.
    pub fn record_invocation(&self, latency: Duration, outcome: InvocationOutcome, cold_start: bool) {
        let now = epoch_secs();
        self.emit(MetricName::Invocations, 1.0, now);
        if cold_start {
            self.emit(MetricName::ColdStarts, 1.0, now);
        }
        match outcome {
            InvocationOutcome::Success => {}
            InvocationOutcome::Fault => self.emit(MetricName::Errors, 1.0, now),
            InvocationOutcome::Timeout => {
                self.emit(MetricName::Timeouts, 1.0, now);
                return;
            }
        }
        self.emit(MetricName::Latency, latency.as_secs_f64() * 1000.0, now);
    }

    /// Close the current window as the period starting at `epoch`,
    /// persist it, and start a fresh window.
    pub fn snapshot(&self, epoch: u64) -> anyhow::Result<MetricsSnapshot> {
        let w = &self.window;
        let invocations = w.invocations.swap(0, Ordering::Relaxed);
        let errors = w.errors.swap(0, Ordering::Relaxed);
        let timeouts = w.timeouts.swap(0, Ordering::Relaxed);
        let cold_starts = w.cold_starts.swap(0, Ordering::Relaxed);
        let samples = std::mem::take(
            &mut *w
                .latencies
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        let mut millis: Vec<f64> = samples.iter().map(|s| s.value).collect();
        millis.sort_unstable_by(f64::total_cmp);

        let reading = self.concurrency.as_ref().map(|probe| probe());

        let snapshot = MetricsSnapshot {
            epoch,
            invocations,
            errors,
            timeouts,
            cold_starts,
            latency_p50_ms: percentile(&millis, 50.0),
            latency_p95_ms: percentile(&millis, 95.0),
            peak_concurrency: reading.map(|r| r.peak_in_flight).unwrap_or(0),
            provisioned_capacity: reading.map(|r| r.capacity).unwrap_or(0),
        };

        self.state.put_metrics(&snapshot)?;
        debug!(
            epoch,
            invocations,
            errors,
            timeouts,
            p95_ms = ?snapshot.latency_p95_ms,
            peak = snapshot.peak_concurrency,
            "metrics snapshot persisted"
        );
        Ok(snapshot)
    }

    fn prune(&self, epoch: u64) -> anyhow::Result<()> {
        let horizon = self.period.as_secs() * self.retention_periods;
        if let Some(cutoff) = epoch.checked_sub(horizon) {
            self.state.prune_metrics(cutoff)?;
        }
        Ok(())
    }

    /// Run the snapshot loop until shutdown signal.
    ///
    /// Ticks are aligned to period boundaries; each tick closes the period
    /// that just ended.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            period_secs = self.period.as_secs(),
            "metrics collector started"
        );
        let period_secs = self.period.as_secs().max(1);

        loop {
            let wait = until_next_boundary(epoch_secs(), self.period, Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let closed = period_start(epoch_secs(), self.period).saturating_sub(period_secs);
                    if let Err(e) = self.snapshot(closed) {
                        tracing::error!(error = %e, "metrics snapshot failed");
                        continue;
                    }
                    if let Err(e) = self.prune(closed) {
                        tracing::warn!(error = %e, "metrics prune failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("metrics collector shutting down");
                    // Final partial snapshot before exit.
                    if let Err(e) = self.snapshot(period_start(epoch_secs(), self.period)) {
                        tracing::error!(error = %e, "final metrics snapshot failed");
                    }
                    break;
                }
            }
        }
    }
}

/// Nearest-rank percentile of an ascending slice. `None` when empty.
pub fn percentile(sorted: &[f64], pct: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}
