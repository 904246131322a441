//! Health monitor: background task that evaluates the service alarms.
//!
//! Once per period the monitor reads the unseen metrics snapshots, feeds the
//! error count and p95 latency to their trackers, persists both alarm
//! records, and notifies on fresh trips into `ALARM`.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use guild_core::{AlarmsConfig, epoch_secs, until_next_boundary};
use guild_state::{AlarmState, MetricsSnapshot, StateStore};

use crate::alarm::{AlarmTracker, Transition};
use crate::notify::{AlarmCallback, AlarmEvent};

pub const ERROR_ALARM: &str = "errors";
pub const LATENCY_ALARM: &str = "latency";

/// Delay past a period boundary before evaluating it.
const EVALUATION_DELAY: Duration = Duration::from_secs(2);

/// Owns the two service alarms.
pub struct HealthMonitor {
    state: StateStore,
    errors: AlarmTracker,
    latency: AlarmTracker,
    period: Duration,
    environment: String,
    notifiers: Vec<AlarmCallback>,
    /// Epoch of the last snapshot evaluated.
    last_epoch: Option<u64>,
}

impl HealthMonitor {
    /// Create a monitor, resuming alarm state from the store if present.
    pub fn new(
        state: StateStore,
        config: &AlarmsConfig,
        period: Duration,
        environment: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let stored = state.list_alarms()?;
        let tracker = |name: &str, alarm: &guild_core::AlarmConfig| {
            match stored.iter().find(|r| r.name == name) {
                Some(record) => AlarmTracker::restore(alarm, record),
                None => AlarmTracker::new(name, alarm),
            }
        };
        let monitor = Self {
            errors: tracker(ERROR_ALARM, &config.errors),
            latency: tracker(LATENCY_ALARM, &config.latency),
            state,
            period,
            environment: environment.into(),
            notifiers: Vec::new(),
            last_epoch: None,
        };
        monitor.persist(epoch_secs())?;
        Ok(monitor)
    }

    /// Add a notification channel.
    pub fn with_notifier(mut self, notifier: AlarmCallback) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn errors(&self) -> &AlarmTracker {
        &self.errors
    }

    pub fn latency(&self) -> &AlarmTracker {
        &self.latency
    }

    /// Evaluate one period. `None` means no new data for either alarm.
    ///
    /// A period without invocations is a gap for the error alarm, just as a
    /// period without latency samples is for the latency alarm.
    pub async fn evaluate(&mut self, snapshot: Option<&MetricsSnapshot>, now: u64) -> Vec<Transition> {
        let error_value = snapshot
            .filter(|s| s.invocations > 0)
            .map(|s| s.errors as f64);
        let latency_value = snapshot.and_then(|s| s.latency_p95_ms);

        let transitions: Vec<Transition> = [
            self.errors.record(error_value, now),
            self.latency.record(latency_value, now),
        ]
        .into_iter()
        .flatten()
        .collect();

        if let Err(e) = self.persist(now) {
            error!(error = %e, "failed to persist alarm state");
        }

        for t in transitions.iter().filter(|t| t.tripped()) {
            self.notify(t).await;
        }
        transitions
    }

    /// Evaluate every persisted snapshot not seen yet, oldest first.
    ///
    /// Snapshots for periods that closed more than two periods before `now`
    /// are ignored.
    pub async fn evaluate_period(&mut self, now: u64) -> anyhow::Result<Vec<Transition>> {
        let period = self.period.as_secs().max(1);
        let horizon = now.saturating_sub(period * 3);
        let from = match self.last_epoch {
            Some(last) => horizon.max(last + 1),
            None => horizon,
        };

        let pending = self.state.list_metrics_from(from)?;
        if pending.is_empty() {
            debug!("no fresh metrics snapshot, alarms held");
            return Ok(self.evaluate(None, now).await);
        }

        let mut transitions = Vec::new();
        for snapshot in &pending {
            self.last_epoch = Some(snapshot.epoch);
            transitions.extend(self.evaluate(Some(snapshot), now).await);
        }
        Ok(transitions)
    }

    async fn notify(&self, transition: &Transition) {
        let event = AlarmEvent {
            alarm: transition.alarm.clone(),
            state: AlarmState::Alarm,
            value: transition.value,
            threshold: transition.threshold,
            environment: self.environment.clone(),
        };
        for notifier in &self.notifiers {
            if let Err(e) = notifier(event.clone()).await {
                warn!(alarm = %event.alarm, error = %e, "alarm notification failed");
            }
        }
    }

    fn persist(&self, now: u64) -> Result<(), guild_state::StateError> {
        self.state.put_alarm(&self.errors.to_record(now))?;
        self.state.put_alarm(&self.latency.to_record(now))
    }

    /// Run the monitor loop until shutdown signal.
    ///
    /// Ticks land just after each period boundary, once the collector has
    /// closed the period.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(period_secs = self.period.as_secs(), "health monitor started");

        loop {
            let wait = until_next_boundary(epoch_secs(), self.period, EVALUATION_DELAY);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.evaluate_period(epoch_secs()).await {
                        warn!(error = %e, "alarm evaluation failed, retrying next period");
                    }
                }
                _ = shutdown.changed() => {
                    info!("health monitor shutting down");
                    break;
                }
            }
        }
    }
}
