//! guild-health: error and latency alarms for the hello service.
//!
//! Evaluates two independent metric streams once per period and moves each
//! alarm between `OK` and `ALARM` on consecutive-breach counts. Operators
//! are notified once, on the transition into `ALARM`.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor
//!   ├── AlarmTracker "errors"   (period error count)
//!   ├── AlarmTracker "latency"  (period p95 latency, ms)
//!   ├── Latest MetricsSnapshot from StateStore
//!   ├── AlarmRecord persisted per evaluation
//!   └── AlarmCallback notifiers (log, webhook)
//! ```
//!
//! # Transition Rule
//!
//! A period breaches when its value is strictly above the threshold. After
//! `evaluation_periods` consecutive breaches the alarm trips; the first
//! period at or below the threshold resets it. A period with no data leaves
//! the alarm untouched.

pub mod alarm;
pub mod monitor;
pub mod notify;

pub use alarm::{AlarmTracker, Transition};
pub use monitor::{ERROR_ALARM, HealthMonitor, LATENCY_ALARM};
pub use notify::{AlarmCallback, AlarmEvent, BoxFuture, log_notifier, webhook_notifier};
