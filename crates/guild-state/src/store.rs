//! StateStore: redb-backed state persistence for the Guild hello service.
//!
//! Provides typed operations over parameters, metrics snapshots, the pool
//! status record and alarm records. Record values are JSON-serialized into
//! redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::params::{ParameterError, ParameterStore};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const POOL_KEY: &str = "pool";

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PARAMETERS).map_err(map_err!(Table))?;
        txn.open_table(METRICS).map_err(map_err!(Table))?;
        txn.open_table(POOL).map_err(map_err!(Table))?;
        txn.open_table(ALARMS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert a JSON record into a byte-valued table.
    fn put_json<T: serde::Serialize>(
        &self,
        table_def: redb::TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
        record: &T,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Parameters ─────────────────────────────────────────────────

    /// Insert or overwrite a parameter value.
    pub fn put_parameter(&self, key: &str, value: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PARAMETERS).map_err(map_err!(Table))?;
            table.insert(key, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "parameter stored");
        Ok(())
    }

    /// Read a parameter value.
    pub fn get_parameter(&self, key: &str) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PARAMETERS).map_err(map_err!(Table))?;
        Ok(table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_string()))
    }

    /// Delete a parameter. Returns true if it existed.
    pub fn delete_parameter(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(PARAMETERS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "parameter deleted");
        Ok(existed)
    }

    // ── Metrics ────────────────────────────────────────────────────

    /// Insert (or replace) the snapshot for a period.
    pub fn put_metrics(&self, snapshot: &MetricsSnapshot) -> StateResult<()> {
        self.put_json(METRICS, &snapshot.table_key(), snapshot)
    }

    /// Most recent snapshots, newest first.
    pub fn list_recent_metrics(&self, limit: usize) -> StateResult<Vec<MetricsSnapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(METRICS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev() {
            if results.len() >= limit {
                break;
            }
            let (_, value) = entry.map_err(map_err!(Read))?;
            let snapshot: MetricsSnapshot =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(snapshot);
        }
        Ok(results)
    }

    /// Snapshots with `epoch >= from_epoch`, oldest first.
    pub fn list_metrics_from(&self, from_epoch: u64) -> StateResult<Vec<MetricsSnapshot>> {
        let start = format!("{from_epoch:020}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(METRICS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(start.as_str()..).map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let snapshot: MetricsSnapshot =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(snapshot);
        }
        Ok(results)
    }

    /// The newest snapshot, if any period has been recorded.
    pub fn latest_metrics(&self) -> StateResult<Option<MetricsSnapshot>> {
        Ok(self.list_recent_metrics(1)?.into_iter().next())
    }

    /// Drop snapshots older than `before_epoch`. Returns the number removed.
    pub fn prune_metrics(&self, before_epoch: u64) -> StateResult<usize> {
        let cutoff = format!("{before_epoch:020}");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut table = txn.open_table(METRICS).map_err(map_err!(Table))?;
            let stale: Vec<String> = table
                .range(..cutoff.as_str())
                .map_err(map_err!(Read))?
                .filter_map(|entry| entry.ok().map(|(k, _)| k.value().to_string()))
                .collect();
            for key in &stale {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            removed = stale.len();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(removed, before_epoch, "metrics pruned");
        Ok(removed)
    }

    // ── Pool ───────────────────────────────────────────────────────

    pub fn put_pool_status(&self, status: &PoolStatus) -> StateResult<()> {
        self.put_json(POOL, POOL_KEY, status)
    }

    pub fn get_pool_status(&self) -> StateResult<Option<PoolStatus>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POOL).map_err(map_err!(Table))?;
        match table.get(POOL_KEY).map_err(map_err!(Read))? {
            Some(guard) => {
                let status: PoolStatus =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    // ── Alarms ─────────────────────────────────────────────────────

    pub fn put_alarm(&self, record: &AlarmRecord) -> StateResult<()> {
        self.put_json(ALARMS, &record.name, record)
    }

    /// All alarm records, ordered by name.
    pub fn list_alarms(&self) -> StateResult<Vec<AlarmRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALARMS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: AlarmRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }
}

impl ParameterStore for StateStore {
    fn get(&self, key: &str) -> Result<String, ParameterError> {
        match self.get_parameter(key) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(ParameterError::NotFound(key.to_string())),
            Err(e) => Err(ParameterError::Backend(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE_KEY: &str = "/guild/hello-service/message";

    fn test_snapshot(epoch: u64, errors: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            epoch,
            invocations: 100,
            errors,
            timeouts: 0,
            cold_starts: 2,
            latency_p50_ms: Some(4.0),
            latency_p95_ms: Some(12.5),
            peak_concurrency: 40,
            provisioned_capacity: 100,
        }
    }

    fn test_alarm(name: &str, state: AlarmState) -> AlarmRecord {
        AlarmRecord {
            name: name.to_string(),
            state,
            threshold: 5.0,
            evaluation_periods: 2,
            consecutive_breaches: 0,
            last_value: None,
            state_changed_at: None,
            updated_at: 1000,
        }
    }

    // ── Parameters ─────────────────────────────────────────────────

    #[test]
    fn parameter_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_parameter(MESSAGE_KEY, "Hi there, {name}!").unwrap();

        assert_eq!(
            store.get_parameter(MESSAGE_KEY).unwrap().as_deref(),
            Some("Hi there, {name}!")
        );
        assert_eq!(ParameterStore::get(&store, MESSAGE_KEY).unwrap(), "Hi there, {name}!");
    }

    #[test]
    fn parameter_overwrite_and_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_parameter(MESSAGE_KEY, "one").unwrap();
        store.put_parameter(MESSAGE_KEY, "two").unwrap();
        assert_eq!(store.get_parameter(MESSAGE_KEY).unwrap().as_deref(), Some("two"));

        assert!(store.delete_parameter(MESSAGE_KEY).unwrap());
        assert!(!store.delete_parameter(MESSAGE_KEY).unwrap());
    }

    #[test]
    fn missing_parameter_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(
            ParameterStore::get(&store, MESSAGE_KEY),
            Err(ParameterError::NotFound(MESSAGE_KEY.to_string()))
        );
    }

    // ── Metrics ────────────────────────────────────────────────────

    #[test]
    fn metrics_listed_newest_first() {
        let store = StateStore::open_in_memory().unwrap();
        for epoch in [960u64, 1020, 1080] {
            store.put_metrics(&test_snapshot(epoch, 0)).unwrap();
        }

        let recent = store.list_recent_metrics(10).unwrap();
        let epochs: Vec<u64> = recent.iter().map(|s| s.epoch).collect();
        assert_eq!(epochs, vec![1080, 1020, 960]);

        let limited = store.list_recent_metrics(2).unwrap();
        assert_eq!(limited.len(), 2);

        assert_eq!(store.latest_metrics().unwrap().unwrap().epoch, 1080);
    }

    #[test]
    fn metrics_from_epoch_oldest_first() {
        let store = StateStore::open_in_memory().unwrap();
        for epoch in [1080u64, 960, 1020] {
            store.put_metrics(&test_snapshot(epoch, 0)).unwrap();
        }

        let epochs: Vec<u64> = store
            .list_metrics_from(1000)
            .unwrap()
            .iter()
            .map(|s| s.epoch)
            .collect();
        assert_eq!(epochs, vec![1020, 1080]);
        assert!(store.list_metrics_from(1081).unwrap().is_empty());
    }

    #[test]
    fn metrics_same_period_replaced() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_metrics(&test_snapshot(1020, 1)).unwrap();
        store.put_metrics(&test_snapshot(1020, 7)).unwrap();

        let recent = store.list_recent_metrics(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].errors, 7);
    }

    #[test]
    fn prune_drops_old_periods() {
        let store = StateStore::open_in_memory().unwrap();
        for epoch in [960u64, 1020, 1080] {
            store.put_metrics(&test_snapshot(epoch, 0)).unwrap();
        }

        assert_eq!(store.prune_metrics(1020).unwrap(), 1);
        let epochs: Vec<u64> = store
            .list_recent_metrics(10)
            .unwrap()
            .iter()
            .map(|s| s.epoch)
            .collect();
        assert_eq!(epochs, vec![1080, 1020]);
    }

    // ── Pool / alarms ──────────────────────────────────────────────

    #[test]
    fn pool_status_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_pool_status().unwrap().is_none());

        let status = PoolStatus {
            current_capacity: 129,
            min_capacity: 100,
            max_capacity: 1000,
            target_utilization_percent: 70.0,
            last_utilization_percent: Some(90.0),
            last_scale_out_at: Some(1000),
            last_scale_in_at: None,
            updated_at: 1000,
        };
        store.put_pool_status(&status).unwrap();
        assert_eq!(store.get_pool_status().unwrap(), Some(status));
    }

    #[test]
    fn alarms_keyed_by_name() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_alarm(&test_alarm("errorCount", AlarmState::Ok)).unwrap();
        store.put_alarm(&test_alarm("latencyP95", AlarmState::Ok)).unwrap();
        store.put_alarm(&test_alarm("errorCount", AlarmState::Alarm)).unwrap();

        let alarms = store.list_alarms().unwrap();
        assert_eq!(alarms.len(), 2);
        assert_eq!(alarms[0].name, "errorCount");
        assert_eq!(alarms[0].state, AlarmState::Alarm);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_parameter(MESSAGE_KEY, "Hello from Prod!").unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(
            store.get_parameter(MESSAGE_KEY).unwrap().as_deref(),
            Some("Hello from Prod!")
        );
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_recent_metrics(10).unwrap().is_empty());
        assert!(store.latest_metrics().unwrap().is_none());
        assert!(store.list_alarms().unwrap().is_empty());
        assert_eq!(store.prune_metrics(u64::MAX).unwrap(), 0);
        assert!(!store.delete_parameter("nope").unwrap());
    }
}
