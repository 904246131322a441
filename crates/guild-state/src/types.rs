//! Record types for the Guild state store.
//!
//! These types represent the persisted operational state of the service:
//! aggregated metrics per period, the provisioned-concurrency pool, and the
//! two health alarms. All types are serializable to/from JSON for storage
//! in redb tables.

use serde::{Deserialize, Serialize};

// ── Metrics ───────────────────────────────────────────────────────

/// One raw observation: a unix timestamp (seconds) and a value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub timestamp: u64,
    pub value: f64,
}

/// Aggregated metrics for one evaluation period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    /// Period start (unix timestamp, bucketed to the metrics period).
    pub epoch: u64,
    /// Completed plus faulted plus timed-out invocations.
    pub invocations: u64,
    /// Handler faults during the period.
    pub errors: u64,
    /// Invocations aborted by a timeout.
    pub timeouts: u64,
    /// Invocations that found no warm slot.
    pub cold_starts: u64,
    /// Latency P50 in milliseconds, `None` without latency samples.
    pub latency_p50_ms: Option<f64>,
    /// Latency P95 in milliseconds, `None` without latency samples.
    pub latency_p95_ms: Option<f64>,
    /// Highest number of in-flight invocations seen during the period.
    pub peak_concurrency: u32,
    /// Provisioned capacity when the period closed.
    pub provisioned_capacity: u32,
}

impl MetricsSnapshot {
    /// Build the key for the metrics table. Zero-padded so keys sort by time.
    pub fn table_key(&self) -> String {
        format!("{:020}", self.epoch)
    }

    /// Peak in-flight invocations as a percentage of provisioned capacity.
    pub fn utilization_percent(&self) -> f64 {
        if self.provisioned_capacity == 0 {
            return 0.0;
        }
        self.peak_concurrency as f64 * 100.0 / self.provisioned_capacity as f64
    }
}

// ── Pool ──────────────────────────────────────────────────────────

/// Read model of the concurrency controller's pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolStatus {
    pub current_capacity: u32,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub target_utilization_percent: f64,
    /// Utilization seen at the last evaluation.
    pub last_utilization_percent: Option<f64>,
    pub last_scale_out_at: Option<u64>,
    pub last_scale_in_at: Option<u64>,
    pub updated_at: u64,
}

// ── Alarms ────────────────────────────────────────────────────────

/// State of a single alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    Ok,
    Alarm,
}

impl std::fmt::Display for AlarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmState::Ok => f.write_str("OK"),
            AlarmState::Alarm => f.write_str("ALARM"),
        }
    }
}

/// Read model of one alarm's evaluator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlarmRecord {
    pub name: String,
    pub state: AlarmState,
    pub threshold: f64,
    pub evaluation_periods: u32,
    pub consecutive_breaches: u32,
    /// Value of the last period that had data.
    pub last_value: Option<f64>,
    /// Unix timestamp of the last state change.
    pub state_changed_at: Option<u64>,
    pub updated_at: u64,
}
