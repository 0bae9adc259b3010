//! Persistence and telemetry sinks.
//!
//! Each sink is an independent, best-effort destination for normalized
//! samples. A sink gets at most one write attempt per cycle and a failure
//! stays local to that sink: the dispatcher logs it and moves on.

pub mod cache;
pub mod graphite;
pub mod state_log;

use crate::config::Config;
use crate::core::NormalizedSample;
use std::fmt;

// Re-export commonly used types
pub use cache::RedisSink;
pub use graphite::GraphiteSink;
pub use state_log::{PostgresStore, StateLogSink, StateStore};

/// A best-effort write destination.
pub trait Sink: Send {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Deliver one cycle's values.
    fn write(&mut self, sample: &NormalizedSample) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write(&mut self, sample: &NormalizedSample) -> Result<(), SinkError> {
        (**self).write(sample)
    }
}

/// Sink failure.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkError {
    /// Could not reach the endpoint
    Connect(String),
    /// Endpoint reached but the write failed
    Write(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Connect(e) => write!(f, "connect failed: {e}"),
            SinkError::Write(e) => write!(f, "write failed: {e}"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Build every enabled sink whose section is complete.
///
/// Sinks with missing or invalid settings are skipped with a warning.
pub fn build_sinks(config: &Config) -> Vec<Box<dyn Sink>> {
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();

    if config.state_log.enable {
        match config.state_log.resolve() {
            Ok(settings) => sinks.push(Box::new(StateLogSink::new(PostgresStore::new(settings)))),
            Err(e) => tracing::warn!("state_log sink disabled: {}", e),
        }
    } else {
        tracing::debug!("state_log sink not enabled");
    }

    if config.graphite.enable {
        match config.graphite.resolve() {
            Ok(settings) => sinks.push(Box::new(GraphiteSink::new(settings))),
            Err(e) => tracing::warn!("graphite sink disabled: {}", e),
        }
    } else {
        tracing::debug!("graphite sink not enabled");
    }

    if config.redis.enable {
        match config.redis.resolve() {
            Ok(settings) => match RedisSink::new(settings) {
                Ok(sink) => sinks.push(Box::new(sink)),
                Err(e) => tracing::warn!("redis sink disabled: {}", e),
            },
            Err(e) => tracing::warn!("redis sink disabled: {}", e),
        }
    } else {
        tracing::debug!("redis sink not enabled");
    }

    sinks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_sinks_are_not_built() {
        let config = Config::default();
        assert!(build_sinks(&config).is_empty());
    }

    #[test]
    fn test_incomplete_sections_are_skipped() {
        let config = Config::from_json(
            r#"{
                "state_log": {"enable": true, "host": "db"},
                "graphite": {"enable": true, "host": "carbon", "port": 2003, "namespace": "env.temp"},
                "redis": {"enable": true, "host": "cache", "namespace": "temps"}
            }"#,
        )
        .unwrap();

        let sinks = build_sinks(&config);
        let names: Vec<&str> = sinks.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["graphite"]);
    }
}
