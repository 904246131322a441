//! Duration strings and wall-clock helpers.
//!
//! Config files express durations as `"500ms"`, `"30s"`, `"10m"`, or a bare
//! number of seconds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::ConfigError;

/// Parse a duration string like `"30s"`, `"5m"`, or `"250ms"`.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::Invalid(format!("invalid duration: {s:?}"));

    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    } else {
        s.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}

/// Render a duration back into the shortest config string.
pub fn format_duration(d: Duration) -> String {
    if d.subsec_millis() != 0 || d.as_secs() == 0 && !d.is_zero() {
        format!("{}ms", d.as_millis())
    } else if d.as_secs() != 0 && d.as_secs() % 60 == 0 {
        format!("{}m", d.as_secs() / 60)
    } else {
        format!("{}s", d.as_secs())
    }
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Start of the period containing `epoch`.
pub fn period_start(epoch: u64, period: Duration) -> u64 {
    let secs = period.as_secs().max(1);
    epoch - epoch % secs
}

/// Time from `now` until `offset` past the next period boundary.
pub fn until_next_boundary(now: u64, period: Duration, offset: Duration) -> Duration {
    let next = period_start(now, period) + period.as_secs().max(1);
    Duration::from_secs(next - now) + offset
}

/// Serde adapter for `Duration` fields written as duration strings.
pub mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
