//! onewired - 1-Wire temperature sampling daemon.
//!
//! This library polls a bus of DS18B20 temperature sensors once a minute,
//! folds the readings into per-location values and hands each cycle to a set
//! of independent sinks, while keeping a short rolling history that can be
//! queried over HTTP.
//!
//! # Guarantees
//!
//! - **Ordered**: every poll cycle yields exactly one normalized sample, in order
//! - **Honest**: a location whose sensors disagree is omitted, never guessed
//! - **Isolated**: a failing sink never blocks history or the other sinks
//! - **Immortal**: stage threads are supervised and restarted with backoff
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          onewired                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │   Poller    │──▶│ Normalizer  │──▶│ Dispatcher  │        │
//! │  │ (w1 sysfs)  │   │ (locations) │   │  (fan-out)  │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │                                        │         │          │
//! │                                        ▼         ▼          │
//! │                             ┌─────────────┐ ┌───────────┐   │
//! │   HTTP /temp/... ◀──────────│   History   │ │   Sinks   │   │
//! │                             │ (60 min)    │ │ pg/graph/ │   │
//! │                             └─────────────┘ │   redis   │   │
//! │                                             └───────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use onewired::{core, source};
//!
//! let locations: core::LocationMap =
//!     [("office", vec!["28-000005e2fdc3".to_string()])].into_iter().collect();
//! let mut bus = source::W1SysfsSource::new("/sys/bus/w1/devices");
//!
//! use onewired::source::SensorSource;
//! let readings = bus.read_all().expect("bus unavailable");
//! let raw = core::RawSample::new(chrono::Utc::now(), readings);
//! let sample = core::normalize(&raw, &locations);
//! println!("{:?}", sample.values);
//! ```

pub mod config;
pub mod core;
pub mod logging;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, LogLevel};
pub use core::{
    normalize, Aggregator, HistoryRegistry, HistorySettings, LocationHistory, LocationMap,
    NormalizedSample, RawSample, SharedHistory,
};
pub use pipeline::{shutdown_channel, Pipeline, PipelineOptions, ShutdownHandle, ShutdownSignal};
pub use sink::{build_sinks, Sink, SinkError};
pub use source::{SensorSource, SourceError, W1SysfsSource};
pub use stats::{create_shared_stats, PipelineStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Banner served on `GET /` and printed at startup.
pub const BANNER: &str = "OneWireD";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_and_version() {
        assert_eq!(BANNER, "OneWireD");
        assert!(!VERSION.is_empty());
    }
}
