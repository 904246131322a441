//! redb table definitions for the Guild state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records),
//! except `PARAMETERS`, which stores raw UTF-8 strings.

use redb::TableDefinition;

/// Operator-managed parameters keyed by their path (e.g. `/guild/hello-service/message`).
pub const PARAMETERS: TableDefinition<&str, &str> = TableDefinition::new("parameters");

/// Metrics snapshots keyed by zero-padded period epoch.
pub const METRICS: TableDefinition<&str, &[u8]> = TableDefinition::new("metrics");

/// Single-row table holding the latest `PoolStatus`.
pub const POOL: TableDefinition<&str, &[u8]> = TableDefinition::new("pool");

/// Alarm records keyed by alarm name.
pub const ALARMS: TableDefinition<&str, &[u8]> = TableDefinition::new("alarms");
