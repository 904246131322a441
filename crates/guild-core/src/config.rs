//! guild.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::time::duration_str;

/// Hard ceiling on how long a single invocation may run.
pub const MAX_INVOCATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub service: ServiceInfo,
    pub greeting: GreetingConfig,
    pub invocation: InvocationConfig,
    pub metrics: MetricsConfig,
    pub scaling: ScalingConfig,
    pub alarms: AlarmsConfig,
    pub notify: NotifyConfig,
}

/// Pass-through deployment metadata. Surfaced in logs and `/healthz`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceInfo {
    pub name: String,
    pub environment: String,
    pub version: String,
    pub log_level: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            name: "guild-hello".to_string(),
            environment: "test".to_string(),
            version: "1.0.0".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GreetingConfig {
    /// Parameter store key holding the greeting template.
    pub parameter: String,
    /// Template used whenever the parameter cannot be read.
    pub fallback_template: String,
    /// Name used when the request does not carry a usable one.
    pub default_name: String,
    /// Written to the store at startup if the parameter is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_template: Option<String>,
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            parameter: "/guild/hello-service/message".to_string(),
            fallback_template: "Hello, {name}!".to_string(),
            default_name: "world".to_string(),
            seed_template: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InvocationConfig {
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            timeout: MAX_INVOCATION_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Aggregation period shared by the collector, autoscaler and alarms.
    #[serde(with = "duration_str")]
    pub period: Duration,
    /// Snapshots older than this many periods are pruned.
    pub retention_periods: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            retention_periods: 1440,
        }
    }
}

/// Provisioned concurrency bounds and target-tracking parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingConfig {
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub target_utilization_percent: f64,
    #[serde(with = "duration_str")]
    pub scale_out_cooldown: Duration,
    #[serde(with = "duration_str")]
    pub scale_in_cooldown: Duration,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_capacity: 100,
            max_capacity: 1000,
            target_utilization_percent: 70.0,
            scale_out_cooldown: Duration::from_secs(300),
            scale_in_cooldown: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlarmsConfig {
    pub errors: AlarmConfig,
    pub latency: AlarmConfig,
}

impl Default for AlarmsConfig {
    fn default() -> Self {
        Self {
            errors: AlarmConfig {
                threshold: 5.0,
                evaluation_periods: 2,
            },
            // Milliseconds of p95 latency.
            latency: AlarmConfig {
                threshold: 2000.0,
                evaluation_periods: 1,
            },
        }
    }
}

/// A metric breaches when its period value is strictly above `threshold`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlarmConfig {
    pub threshold: f64,
    pub evaluation_periods: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotifyConfig {
    /// Alerting webhook. Alarms are only logged when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl ServiceConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scaling;
        if s.min_capacity == 0 {
            return Err(ConfigError::Invalid(
                "scaling.min_capacity must be at least 1".to_string(),
            ));
        }
        if s.min_capacity > s.max_capacity {
            return Err(ConfigError::Invalid(format!(
                "scaling.min_capacity ({}) exceeds max_capacity ({})",
                s.min_capacity, s.max_capacity
            )));
        }
        if !(s.target_utilization_percent > 0.0 && s.target_utilization_percent <= 100.0) {
            return Err(ConfigError::Invalid(format!(
                "scaling.target_utilization_percent must be in (0, 100], got {}",
                s.target_utilization_percent
            )));
        }
        for (name, alarm) in [("errors", &self.alarms.errors), ("latency", &self.alarms.latency)] {
            if alarm.evaluation_periods == 0 {
                return Err(ConfigError::Invalid(format!(
                    "alarms.{name}.evaluation_periods must be at least 1"
                )));
            }
        }
        if self.metrics.period.as_secs() == 0 {
            return Err(ConfigError::Invalid(
                "metrics.period must be at least one second".to_string(),
            ));
        }
        if self.invocation.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "invocation.timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured invocation timeout, capped at the platform ceiling.
    pub fn invocation_timeout(&self) -> Duration {
        self.invocation.timeout.min(MAX_INVOCATION_TIMEOUT)
    }
}
