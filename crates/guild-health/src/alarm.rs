//! Consecutive-breach alarm state machine.

use tracing::{debug, info, warn};

use guild_core::AlarmConfig;
use guild_state::{AlarmRecord, AlarmState};

/// A state change produced by [`AlarmTracker::record`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub alarm: String,
    pub from: AlarmState,
    pub to: AlarmState,
    /// The period value that caused the change.
    pub value: f64,
    pub threshold: f64,
}

impl Transition {
    /// Whether this is a fresh trip into `ALARM`.
    pub fn tripped(&self) -> bool {
        self.from == AlarmState::Ok && self.to == AlarmState::Alarm
    }
}

/// Tracks consecutive breaches for a single metric.
#[derive(Debug, Clone)]
pub struct AlarmTracker {
    name: String,
    state: AlarmState,
    threshold: f64,
    evaluation_periods: u32,
    consecutive_breaches: u32,
    last_value: Option<f64>,
    state_changed_at: Option<u64>,
}

impl AlarmTracker {
    /// Create a tracker in `OK` with no history.
    pub fn new(name: impl Into<String>, config: &AlarmConfig) -> Self {
        Self {
            name: name.into(),
            state: AlarmState::Ok,
            threshold: config.threshold,
            evaluation_periods: config.evaluation_periods,
            consecutive_breaches: 0,
            last_value: None,
            state_changed_at: None,
        }
    }

    /// Resume from a persisted record. Threshold and evaluation periods come
    /// from `config`, which may have changed since the record was written.
    pub fn restore(config: &AlarmConfig, record: &AlarmRecord) -> Self {
        Self {
            name: record.name.clone(),
            state: record.state,
            threshold: config.threshold,
            evaluation_periods: config.evaluation_periods,
            consecutive_breaches: record.consecutive_breaches,
            last_value: record.last_value,
            state_changed_at: record.state_changed_at,
        }
    }

    /// Record one period's value and return the transition, if any.
    ///
    /// `None` means the period had no data; the tracker is left untouched.
    pub fn record(&mut self, value: Option<f64>, now: u64) -> Option<Transition> {
        let Some(value) = value else {
            debug!(alarm = %self.name, "no data for period, alarm unchanged");
            return None;
        };
        self.last_value = Some(value);

        let from = self.state;
        if value > self.threshold {
            self.consecutive_breaches = self.consecutive_breaches.saturating_add(1);
            if self.state == AlarmState::Ok && self.consecutive_breaches >= self.evaluation_periods {
                self.state = AlarmState::Alarm;
                warn!(
                    alarm = %self.name,
                    value,
                    threshold = self.threshold,
                    breaches = self.consecutive_breaches,
                    "alarm tripped"
                );
            }
        } else {
            self.consecutive_breaches = 0;
            if self.state == AlarmState::Alarm {
                self.state = AlarmState::Ok;
                info!(alarm = %self.name, value, threshold = self.threshold, "alarm recovered");
            }
        }

        (self.state != from).then(|| {
            self.state_changed_at = Some(now);
            Transition {
                alarm: self.name.clone(),
                from,
                to: self.state,
                value,
                threshold: self.threshold,
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn consecutive_breaches(&self) -> u32 {
        self.consecutive_breaches
    }

    /// Read model for the state store.
    pub fn to_record(&self, now: u64) -> AlarmRecord {
        AlarmRecord {
            name: self.name.clone(),
            state: self.state,
            threshold: self.threshold,
            evaluation_periods: self.evaluation_periods,
            consecutive_breaches: self.consecutive_breaches,
            last_value: self.last_value,
            state_changed_at: self.state_changed_at,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_config() -> AlarmConfig {
        AlarmConfig {
            threshold: 5.0,
            evaluation_periods: 2,
        }
    }

    fn latency_config() -> AlarmConfig {
        AlarmConfig {
            threshold: 2000.0,
            evaluation_periods: 1,
        }
    }

    #[test]
    fn starts_ok() {
        let tracker = AlarmTracker::new("errors", &errors_config());
        assert_eq!(tracker.state(), AlarmState::Ok);
        assert_eq!(tracker.consecutive_breaches(), 0);
    }

    #[test]
    fn trips_after_consecutive_breaches_and_resets() {
        let mut tracker = AlarmTracker::new("errors", &errors_config());

        assert_eq!(tracker.record(Some(6.0), 60), None);
        assert_eq!(tracker.state(), AlarmState::Ok);

        let trip = tracker.record(Some(6.0), 120).unwrap();
        assert!(trip.tripped());
        assert_eq!(trip.value, 6.0);
        assert_eq!(tracker.state(), AlarmState::Alarm);

        let reset = tracker.record(Some(0.0), 180).unwrap();
        assert_eq!(reset.from, AlarmState::Alarm);
        assert_eq!(reset.to, AlarmState::Ok);
        assert!(!reset.tripped());
        assert_eq!(tracker.consecutive_breaches(), 0);
    }

    #[test]
    fn value_at_threshold_is_not_a_breach() {
        let mut tracker = AlarmTracker::new("errors", &errors_config());
        tracker.record(Some(6.0), 60);
        tracker.record(Some(5.0), 120);
        assert_eq!(tracker.consecutive_breaches(), 0);
        assert_eq!(tracker.record(Some(6.0), 180), None);
    }

    #[test]
    fn interrupted_breaches_do_not_trip() {
        let mut tracker = AlarmTracker::new("errors", &errors_config());
        for v in [6.0, 0.0, 6.0, 0.0, 6.0] {
            assert_eq!(tracker.record(Some(v), 0), None);
        }
        assert_eq!(tracker.state(), AlarmState::Ok);
    }

    #[test]
    fn single_period_latency_trip() {
        let mut tracker = AlarmTracker::new("latency", &latency_config());
        assert!(tracker.record(Some(2500.0), 60).unwrap().tripped());
    }

    #[test]
    fn staying_in_alarm_produces_no_transition() {
        let mut tracker = AlarmTracker::new("latency", &latency_config());
        tracker.record(Some(2500.0), 60);
        assert_eq!(tracker.record(Some(3000.0), 120), None);
        assert_eq!(tracker.record(Some(3000.0), 180), None);
        assert_eq!(tracker.consecutive_breaches(), 3);
    }

    #[test]
    fn missing_data_leaves_alarm_untouched() {
        let mut tracker = AlarmTracker::new("errors", &errors_config());
        tracker.record(Some(6.0), 60);
        assert_eq!(tracker.record(None, 120), None);
        assert_eq!(tracker.consecutive_breaches(), 1);

        // The gap neither resets nor counts; the next breach trips.
        assert!(tracker.record(Some(6.0), 180).unwrap().tripped());

        assert_eq!(tracker.record(None, 240), None);
        assert_eq!(tracker.state(), AlarmState::Alarm);
    }

    #[test]
    fn record_round_trips_through_restore() {
        let mut tracker = AlarmTracker::new("errors", &errors_config());
        tracker.record(Some(6.0), 60);
        tracker.record(Some(7.0), 120);

        let record = tracker.to_record(121);
        assert_eq!(record.state, AlarmState::Alarm);
        assert_eq!(record.last_value, Some(7.0));
        assert_eq!(record.state_changed_at, Some(120));
        assert_eq!(record.updated_at, 121);

        let restored = AlarmTracker::restore(&errors_config(), &record);
        assert_eq!(restored.state(), AlarmState::Alarm);
        assert_eq!(restored.consecutive_breaches(), 2);
    }
}
