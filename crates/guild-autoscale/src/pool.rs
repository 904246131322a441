//! Target-tracking state for the provisioned-concurrency pool.

use std::time::Duration;

use tracing::debug;

use guild_core::ScalingConfig;
use guild_state::PoolStatus;

/// A scaling decision for one evaluation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    ScaleOut { from: u32, to: u32 },
    ScaleIn { from: u32, to: u32 },
    NoChange,
}

impl ScaleDecision {
    /// The capacity to apply, if the decision changes anything.
    pub fn target(&self) -> Option<u32> {
        match self {
            ScaleDecision::ScaleOut { to, .. } | ScaleDecision::ScaleIn { to, .. } => Some(*to),
            ScaleDecision::NoChange => None,
        }
    }
}

/// Capacity plus cooldown bookkeeping. Owned by a single evaluator.
///
/// Invariant: `min_capacity <= current_capacity <= max_capacity`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyPool {
    current_capacity: u32,
    min_capacity: u32,
    max_capacity: u32,
    target_utilization_percent: f64,
    scale_out_cooldown: Duration,
    scale_in_cooldown: Duration,
    last_scale_out_at: Option<u64>,
    last_scale_in_at: Option<u64>,
    last_utilization_percent: Option<f64>,
}

impl ConcurrencyPool {
    /// Start at `min_capacity` with no scaling history.
    pub fn from_config(config: &ScalingConfig) -> Self {
        Self {
            current_capacity: config.min_capacity,
            min_capacity: config.min_capacity,
            max_capacity: config.max_capacity,
            target_utilization_percent: config.target_utilization_percent,
            scale_out_cooldown: config.scale_out_cooldown,
            scale_in_cooldown: config.scale_in_cooldown,
            last_scale_out_at: None,
            last_scale_in_at: None,
            last_utilization_percent: None,
        }
    }

    /// Resume from a persisted status. Bounds and target come from `config`;
    /// the stored capacity is clamped into the (possibly changed) bounds.
    pub fn restore(config: &ScalingConfig, status: &PoolStatus) -> Self {
        let mut pool = Self::from_config(config);
        pool.current_capacity = status
            .current_capacity
            .clamp(pool.min_capacity, pool.max_capacity);
        pool.last_scale_out_at = status.last_scale_out_at;
        pool.last_scale_in_at = status.last_scale_in_at;
        pool.last_utilization_percent = status.last_utilization_percent;
        pool
    }

    pub fn current_capacity(&self) -> u32 {
        self.current_capacity
    }

    pub fn last_scale_out_at(&self) -> Option<u64> {
        self.last_scale_out_at
    }

    pub fn last_scale_in_at(&self) -> Option<u64> {
        self.last_scale_in_at
    }

    /// Peak in-flight invocations as a percentage of current capacity.
    pub fn utilization_of(&self, peak_concurrency: u32) -> f64 {
        if self.current_capacity == 0 {
            return 0.0;
        }
        peak_concurrency as f64 * 100.0 / self.current_capacity as f64
    }

    /// Decide what to do for `observed` utilization at `now`, without
    /// changing any state.
    pub fn plan(&self, observed: f64, now: u64) -> ScaleDecision {
        let target = self.target_utilization_percent;
        let from = self.current_capacity;
        let desired = (from as f64 * observed / target).ceil();

        if observed > target && elapsed(self.last_scale_out_at, self.scale_out_cooldown, now) {
            let to = clamp_capacity(desired, self.min_capacity, self.max_capacity);
            if to > from {
                return ScaleDecision::ScaleOut { from, to };
            }
        } else if observed < target && elapsed(self.last_scale_in_at, self.scale_in_cooldown, now) {
            let to = clamp_capacity(desired, self.min_capacity, self.max_capacity);
            if to < from {
                return ScaleDecision::ScaleIn { from, to };
            }
        }

        ScaleDecision::NoChange
    }

    /// Apply a planned decision and start its direction's cooldown.
    pub fn commit(&mut self, decision: ScaleDecision, observed: f64, now: u64) {
        self.last_utilization_percent = Some(observed);
        match decision {
            ScaleDecision::ScaleOut { to, .. } => {
                self.current_capacity = to;
                self.last_scale_out_at = Some(now);
            }
            ScaleDecision::ScaleIn { to, .. } => {
                self.current_capacity = to;
                self.last_scale_in_at = Some(now);
            }
            ScaleDecision::NoChange => {}
        }
    }

    /// Plan and commit in one step.
    pub fn evaluate(&mut self, observed: f64, now: u64) -> ScaleDecision {
        let decision = self.plan(observed, now);
        self.commit(decision, observed, now);
        debug!(
            observed,
            target = self.target_utilization_percent,
            capacity = self.current_capacity,
            ?decision,
            "concurrency pool evaluated"
        );
        decision
    }

    /// Read model for the state store.
    pub fn status(&self, now: u64) -> PoolStatus {
        PoolStatus {
            current_capacity: self.current_capacity,
            min_capacity: self.min_capacity,
            max_capacity: self.max_capacity,
            target_utilization_percent: self.target_utilization_percent,
            last_utilization_percent: self.last_utilization_percent,
            last_scale_out_at: self.last_scale_out_at,
            last_scale_in_at: self.last_scale_in_at,
            updated_at: now,
        }
    }
}

fn elapsed(last: Option<u64>, cooldown: Duration, now: u64) -> bool {
    match last {
        None => true,
        Some(at) => now.saturating_sub(at) >= cooldown.as_secs(),
    }
}

fn clamp_capacity(desired: f64, min: u32, max: u32) -> u32 {
    if desired >= max as f64 {
        max
    } else if desired <= min as f64 {
        min
    } else {
        desired as u32
    }
}
