//! Source trait and error types.

use crate::core::Readings;

/// Anything that can scan the bus for temperatures.
pub trait SensorSource: Send {
    /// Read every sensor on the bus, in °F keyed by sensor id.
    fn read_all(&mut self) -> Result<Readings, SourceError>;
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn read_all(&mut self) -> Result<Readings, SourceError> {
        (**self).read_all()
    }
}

/// Errors that can occur while scanning the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    /// The bus master or its device directory is not reachable
    BusUnavailable(String),
    /// Listing the bus failed part way
    Io(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::BusUnavailable(e) => write!(f, "Can't access bus: {e}"),
            SourceError::Io(e) => write!(f, "Error reading sensors: {e}"),
        }
    }
}

impl std::error::Error for SourceError {}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}
