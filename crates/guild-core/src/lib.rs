//! guild-core: configuration and shared helpers for the Guild hello service.
//!
//! `ServiceConfig` mirrors `guild.toml`. Every section is optional in the
//! file; missing fields take the defaults the service was designed around
//! (70% target utilization, 300s/600s cooldowns, `>5` errors over two
//! periods, `>2000ms` p95 over one period).

pub mod config;
pub mod error;
pub mod time;

pub use config::{
    AlarmConfig, AlarmsConfig, GreetingConfig, InvocationConfig, MetricsConfig, NotifyConfig,
    ScalingConfig, ServiceConfig, ServiceInfo, MAX_INVOCATION_TIMEOUT,
};
pub use error::ConfigError;
pub use time::{epoch_secs, parse_duration, period_start, until_next_boundary};
