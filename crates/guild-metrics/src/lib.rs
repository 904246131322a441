//! guild-metrics: observability for the hello service.
//!
//! Tracks invocation outcomes and latencies, persists one aggregated
//! snapshot per period to the state store, and renders Prometheus text.
//!
//! # Architecture
//!
//! ```text
//! MetricsCollector
//!   ├── record_invocation() ← called once per /hello request
//!   ├── snapshot()  → MetricsSnapshot persisted to StateStore
//!   └── run()       → period-aligned snapshot loop
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for the /metrics endpoint
//! ```
//!
//! The autoscaler and health monitor never talk to the collector directly;
//! they read the persisted snapshots on their own schedule.

pub mod collector;
pub mod prometheus;

pub use collector::{ConcurrencyProbe, InvocationOutcome, MetricName, MetricsCollector, percentile};
pub use prometheus::render_prometheus;
