//! Relational `state_log` sink.
//!
//! Rows are `(ts, type, name, value)`. To bound write volume a value is only
//! stored when it differs from the last stored value for the same
//! `(type, name)` by at least [`MIN_CHANGE`] degrees, after rounding to one
//! decimal place.

use crate::config::StateLogSettings;
use crate::core::aggregate::round_to;
use crate::core::NormalizedSample;
use crate::sink::{Sink, SinkError};
use std::time::Duration;

/// Metric type recorded for temperatures.
pub const STATE_LOG_TYPE: &str = "temp";

/// Smallest change, in degrees, worth a new row.
pub const MIN_CHANGE: f64 = 0.2;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS state_log (
    ts TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    type TEXT NOT NULL,
    name TEXT NOT NULL,
    value DOUBLE PRECISION NOT NULL
);
CREATE INDEX IF NOT EXISTS state_log_type_name_ts ON state_log (type, name, ts DESC);";

const LAST_VALUE: &str =
    "SELECT value FROM state_log WHERE type = $1 AND name = $2 ORDER BY ts DESC LIMIT 1";

const INSERT: &str = "INSERT INTO state_log (ts, type, name, value) VALUES (NOW(), $1, $2, $3)";

/// Whether `new` differs enough from `last` to be stored.
///
/// Both values are compared in whole tenths of a degree.
pub fn should_persist(last: Option<f64>, new: f64) -> bool {
    match last {
        None => true,
        Some(last) => {
            let delta_tenths = (new * 10.0).round() - (last * 10.0).round();
            delta_tenths.abs() >= (MIN_CHANGE * 10.0).round()
        }
    }
}

/// Storage behind the state log.
pub trait StateStore: Send {
    /// Most recently stored value for `(kind, name)`.
    fn last_value(&mut self, kind: &str, name: &str) -> Result<Option<f64>, SinkError>;

    /// Store every row of one cycle together.
    fn insert_batch(&mut self, kind: &str, rows: &[(String, f64)]) -> Result<(), SinkError>;
}

/// PostgreSQL-backed store, connecting lazily and reconnecting after errors.
pub struct PostgresStore {
    settings: StateLogSettings,
    client: Option<postgres::Client>,
    connect_timeout: Duration,
}

impl PostgresStore {
    pub fn new(settings: StateLogSettings) -> Self {
        Self {
            settings,
            client: None,
            connect_timeout: Duration::from_secs(5),
        }
    }

    fn connect(&self) -> Result<postgres::Client, SinkError> {
        let mut client = postgres::Config::new()
            .host(&self.settings.host)
            .dbname(&self.settings.dbname)
            .user(&self.settings.user)
            .password(&self.settings.password)
            .connect_timeout(self.connect_timeout)
            .connect(postgres::NoTls)
            .map_err(|e| SinkError::Connect(e.to_string()))?;

        client
            .batch_execute(SCHEMA)
            .map_err(|e| SinkError::Write(e.to_string()))?;
        tracing::info!("Connected to state_log at {}", self.settings.host);
        Ok(client)
    }

    fn with_client<T>(
        &mut self,
        f: impl FnOnce(&mut postgres::Client) -> Result<T, postgres::Error>,
    ) -> Result<T, SinkError> {
        if self.client.is_none() {
            let client = self.connect()?;
            self.client = Some(client);
        }
        let Some(client) = self.client.as_mut() else {
            return Err(SinkError::Connect("not connected".to_string()));
        };

        let result = f(client);
        if result.is_err() {
            // Drop the connection; the next cycle reconnects.
            self.client = None;
        }
        result.map_err(|e| SinkError::Write(e.to_string()))
    }
}

impl StateStore for PostgresStore {
    fn last_value(&mut self, kind: &str, name: &str) -> Result<Option<f64>, SinkError> {
        self.with_client(|client| {
            let row = client.query_opt(LAST_VALUE, &[&kind, &name])?;
            row.map(|r| r.try_get::<_, f64>(0)).transpose()
        })
    }

    fn insert_batch(&mut self, kind: &str, rows: &[(String, f64)]) -> Result<(), SinkError> {
        self.with_client(|client| {
            let mut tx = client.transaction()?;
            for (name, value) in rows {
                tx.execute(INSERT, &[&kind, name, value])?;
            }
            tx.commit()
        })
    }
}

/// Sink writing de-duplicated temperatures to a [`StateStore`].
pub struct StateLogSink<S: StateStore> {
    store: S,
}

impl<S: StateStore> StateLogSink<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: StateStore> Sink for StateLogSink<S> {
    fn name(&self) -> &str {
        "state_log"
    }

    fn write(&mut self, sample: &NormalizedSample) -> Result<(), SinkError> {
        let mut rows = Vec::new();
        for (location, value) in &sample.values {
            let value = round_to(*value, 1);
            let last = self.store.last_value(STATE_LOG_TYPE, location)?;
            if should_persist(last, value) {
                rows.push((location.clone(), value));
            } else {
                tracing::debug!(
                    "state_log: '{}' unchanged ({} vs {:?}), skipping",
                    location,
                    value,
                    last
                );
            }
        }

        if rows.is_empty() {
            return Ok(());
        }
        tracing::info!("Feeding {} value(s) to state_log", rows.len());
        self.store.insert_batch(STATE_LOG_TYPE, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStore {
        rows: HashMap<(String, String), Vec<f64>>,
        fail: bool,
    }

    impl StateStore for MemoryStore {
        fn last_value(&mut self, kind: &str, name: &str) -> Result<Option<f64>, SinkError> {
            if self.fail {
                return Err(SinkError::Connect("down".to_string()));
            }
            Ok(self
                .rows
                .get(&(kind.to_string(), name.to_string()))
                .and_then(|v| v.last().copied()))
        }

        fn insert_batch(&mut self, kind: &str, rows: &[(String, f64)]) -> Result<(), SinkError> {
            for (name, value) in rows {
                self.rows
                    .entry((kind.to_string(), name.clone()))
                    .or_default()
                    .push(*value);
            }
            Ok(())
        }
    }

    fn sample(location: &str, value: f64) -> NormalizedSample {
        let mut s = NormalizedSample::new(Utc::now());
        s.values.insert(location.to_string(), value);
        s
    }

    fn stored(sink: &StateLogSink<MemoryStore>, location: &str) -> Vec<f64> {
        sink.store()
            .rows
            .get(&(STATE_LOG_TYPE.to_string(), location.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn test_should_persist() {
        assert!(should_persist(None, 70.0));
        assert!(!should_persist(Some(70.0), 70.1));
        assert!(should_persist(Some(70.0), 70.2));
        assert!(should_persist(Some(70.0), 70.3));
        assert!(should_persist(Some(70.0), 69.8));
        assert!(!should_persist(Some(0.1), 0.2));
        assert!(should_persist(Some(0.1), 0.3));
    }

    #[test]
    fn test_small_changes_are_suppressed() {
        let mut sink = StateLogSink::new(MemoryStore::default());

        sink.write(&sample("office", 70.0)).unwrap();
        sink.write(&sample("office", 70.1)).unwrap();
        sink.write(&sample("office", 70.3)).unwrap();

        assert_eq!(stored(&sink, "office"), vec![70.0, 70.3]);
    }

    #[test]
    fn test_values_are_rounded_before_storage() {
        let mut sink = StateLogSink::new(MemoryStore::default());
        sink.write(&sample("garage", 61.037)).unwrap();
        assert_eq!(stored(&sink, "garage"), vec![61.0]);
    }

    #[test]
    fn test_locations_are_deduplicated_independently() {
        let mut sink = StateLogSink::new(MemoryStore::default());
        sink.write(&sample("attic", 90.0)).unwrap();
        sink.write(&sample("bedroom", 90.1)).unwrap();

        assert_eq!(stored(&sink, "attic"), vec![90.0]);
        assert_eq!(stored(&sink, "bedroom"), vec![90.1]);
    }

    #[test]
    fn test_store_failure_is_reported() {
        let mut sink = StateLogSink::new(MemoryStore {
            fail: true,
            ..Default::default()
        });
        assert!(sink.write(&sample("attic", 90.0)).is_err());
    }
}
