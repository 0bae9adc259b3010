//! In-memory source that replays a fixed script of scan results.
//!
//! Used for simulations and tests where no bus is attached.

use crate::core::Readings;
use crate::source::types::{SensorSource, SourceError};
use std::collections::VecDeque;

/// Replays queued scan results in order.
///
/// Once the script runs out every further scan returns an empty map, or the
/// last result again when built with [`ScriptedSource::repeating`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    script: VecDeque<Result<Readings, SourceError>>,
    repeat_last: bool,
    last: Option<Result<Readings, SourceError>>,
    scans: u64,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep returning the final scripted result after the script is exhausted.
    pub fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Queue a successful scan.
    pub fn push_readings<I, K>(&mut self, readings: I)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let map: Readings = readings.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.script.push_back(Ok(map));
    }

    /// Queue a failed scan.
    pub fn push_error(&mut self, error: SourceError) {
        self.script.push_back(Err(error));
    }

    /// Number of scans performed so far.
    pub fn scans(&self) -> u64 {
        self.scans
    }
}

impl SensorSource for ScriptedSource {
    fn read_all(&mut self) -> Result<Readings, SourceError> {
        self.scans += 1;
        match self.script.pop_front() {
            Some(result) => {
                if self.repeat_last {
                    self.last = Some(result.clone());
                }
                result
            }
            None => self.last.clone().unwrap_or_else(|| Ok(Readings::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_replays_in_order() {
        let mut source = ScriptedSource::new();
        source.push_readings([("a", 70.0)]);
        source.push_error(SourceError::BusUnavailable("unplugged".into()));

        assert_eq!(source.read_all().unwrap().get("a"), Some(&70.0));
        assert!(source.read_all().is_err());
        assert!(source.read_all().unwrap().is_empty());
        assert_eq!(source.scans(), 3);
    }

    #[test]
    fn test_repeating_script() {
        let mut source = ScriptedSource::new().repeating();
        source.push_readings([("a", 70.0)]);

        source.read_all().unwrap();
        assert_eq!(source.read_all().unwrap().get("a"), Some(&70.0));
    }
}
