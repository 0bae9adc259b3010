//! Sensor sources for the onewired daemon.
//!
//! A source performs one full scan of the bus per call and reports every
//! sensor it could read. It fails closed: a scan that cannot reach the bus
//! returns an error, a sensor that cannot be read is left out of the map.

pub mod scripted;
pub mod types;
pub mod w1;

// Re-export commonly used types
pub use scripted::ScriptedSource;
pub use types::{celsius_to_fahrenheit, SensorSource, SourceError};
pub use w1::W1SysfsSource;
