//! Autoscaler: utilization-driven resizing of the warm pool.
//!
//! Reads the newest unseen `MetricsSnapshot` from the state store once per period,
//! feeds its peak concurrency to the `ConcurrencyPool`, and applies any
//! change through a callback to the warm pool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};

use guild_core::{ScalingConfig, epoch_secs, until_next_boundary};
use guild_state::{MetricsSnapshot, StateStore};

use crate::pool::{ConcurrencyPool, ScaleDecision};

/// Callback type for performing scaling actions.
///
/// The autoscaler calls this with the new capacity.
pub type ScaleCallback = Arc<dyn Fn(u32) -> BoxFuture + Send + Sync>;

pub type BoxFuture = std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>>;

/// Delay past a period boundary before evaluating it.
const EVALUATION_DELAY: Duration = Duration::from_secs(2);

/// Drives a `ConcurrencyPool` from persisted metrics snapshots.
pub struct Autoscaler {
    state: StateStore,
    pool: ConcurrencyPool,
    period: Duration,
    /// Epoch of the last snapshot acted upon.
    last_epoch: Option<u64>,
    scale_fn: Option<ScaleCallback>,
}

impl Autoscaler {
    /// Create an autoscaler, resuming from a persisted pool status if any.
    pub fn new(state: StateStore, config: &ScalingConfig, period: Duration) -> anyhow::Result<Self> {
        let pool = match state.get_pool_status()? {
            Some(status) => {
                let pool = ConcurrencyPool::restore(config, &status);
                info!(capacity = pool.current_capacity(), "restored concurrency pool");
                pool
            }
            None => ConcurrencyPool::from_config(config),
        };
        Ok(Self {
            state,
            pool,
            period,
            last_epoch: None,
            scale_fn: None,
        })
    }

    /// Set the callback used to perform scaling.
    pub fn with_scale_fn(mut self, f: ScaleCallback) -> Self {
        self.scale_fn = Some(f);
        self
    }

    pub fn pool(&self) -> &ConcurrencyPool {
        &self.pool
    }

    /// Newest snapshot not evaluated yet whose period closed no more than
    /// two periods before `now`. Older unseen snapshots are superseded.
    fn pending(&self, now: u64) -> anyhow::Result<Option<MetricsSnapshot>> {
        let period = self.period.as_secs().max(1);
        let horizon = now.saturating_sub(period * 3);
        let from = match self.last_epoch {
            Some(last) => horizon.max(last + 1),
            None => horizon,
        };
        let mut pending = self.state.list_metrics_from(from)?;
        if pending.len() > 1 {
            debug!(skipped = pending.len() - 1, "superseded metrics snapshots");
        }
        Ok(pending.pop())
    }

    /// Evaluate the newest unseen period and apply the resulting decision.
    ///
    /// The pool state is only committed after the scale callback succeeds,
    /// so a failed resize is retried on the next period.
    pub async fn evaluate_period(&mut self, now: u64) -> anyhow::Result<ScaleDecision> {
        let Some(snapshot) = self.pending(now)? else {
            debug!("no fresh metrics snapshot, skipping scaling evaluation");
            return Ok(ScaleDecision::NoChange);
        };
        let epoch = snapshot.epoch;

        let observed = self.pool.utilization_of(snapshot.peak_concurrency);
        let decision = self.pool.plan(observed, now);

        if let Some(target) = decision.target()
            && let Some(ref scale_fn) = self.scale_fn
        {
            scale_fn(target)
                .await
                .with_context(|| format!("resizing warm pool to {target}"))?;
        }

        self.pool.commit(decision, observed, now);
        self.last_epoch = Some(epoch);
        self.state.put_pool_status(&self.pool.status(now))?;

        match decision {
            ScaleDecision::ScaleOut { from, to } => {
                info!(from, to, observed, "scaled out provisioned concurrency");
            }
            ScaleDecision::ScaleIn { from, to } => {
                info!(from, to, observed, "scaled in provisioned concurrency");
            }
            ScaleDecision::NoChange => {
                debug!(observed, capacity = self.pool.current_capacity(), "no scaling change");
            }
        }
        Ok(decision)
    }

    /// Run the autoscaler loop, ticking just after each period boundary.
    pub async fn run(&mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(period_secs = self.period.as_secs(), "autoscaler started");

        loop {
            let wait = until_next_boundary(epoch_secs(), self.period, EVALUATION_DELAY);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.evaluate_period(epoch_secs()).await {
                        warn!(error = %e, "autoscaler evaluation failed, retrying next period");
                    }
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }
}
