//! Sample types handed from stage to stage.
//!
//! A [`RawSample`] is what one bus scan produced; a [`NormalizedSample`] is the
//! same cycle expressed per location. Both are immutable once built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One scan of the bus: sensor id -> temperature in °F.
pub type Readings = BTreeMap<String, f64>;

/// Readings captured in a single poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Wall-clock time the scan completed
    pub timestamp: DateTime<Utc>,
    /// Sensor id -> °F
    pub readings: Readings,
}

impl RawSample {
    pub fn new(timestamp: DateTime<Utc>, readings: Readings) -> Self {
        Self {
            timestamp,
            readings,
        }
    }

    /// Reading for one sensor, ignoring values that are not finite.
    pub fn reading(&self, sensor_id: &str) -> Option<f64> {
        self.readings.get(sensor_id).copied().filter(|v| v.is_finite())
    }
}

/// Per-location values for one cycle.
///
/// A location is present only when it produced a trustworthy value this
/// cycle; absence is a deliberate omission, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSample {
    /// Timestamp carried over from the raw sample
    pub timestamp: DateTime<Utc>,
    /// Location -> °F
    pub values: BTreeMap<String, f64>,
}

impl NormalizedSample {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Static mapping from location alias to the sensors placed there.
///
/// Aliases are stored lower-cased so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationMap {
    locations: BTreeMap<String, Vec<String>>,
}

impl LocationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `alias` to `sensors`, replacing any previous entry.
    pub fn insert(&mut self, alias: impl AsRef<str>, sensors: Vec<String>) {
        self.locations
            .insert(alias.as_ref().trim().to_lowercase(), sensors);
    }

    /// Sensors assigned to a location.
    pub fn sensors(&self, alias: &str) -> Option<&[String]> {
        self.locations
            .get(&alias.trim().to_lowercase())
            .map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.locations
            .iter()
            .map(|(alias, sensors)| (alias.as_str(), sensors.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

impl<A: AsRef<str>> FromIterator<(A, Vec<String>)> for LocationMap {
    fn from_iter<I: IntoIterator<Item = (A, Vec<String>)>>(iter: I) -> Self {
        let mut map = LocationMap::new();
        for (alias, sensors) in iter {
            map.insert(alias, sensors);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_lookup_is_case_insensitive() {
        let map: LocationMap = [("LivingRoom", vec!["83000003A5A34328".to_string()])]
            .into_iter()
            .collect();
        assert!(map.sensors("livingroom").is_some());
        assert!(map.sensors("LIVINGROOM").is_some());
        assert!(map.sensors("kitchen").is_none());
    }

    #[test]
    fn test_non_finite_reading_is_missing() {
        let mut readings = Readings::new();
        readings.insert("a".to_string(), f64::NAN);
        readings.insert("b".to_string(), 0.0);
        let raw = RawSample::new(Utc::now(), readings);
        assert_eq!(raw.reading("a"), None);
        assert_eq!(raw.reading("b"), Some(0.0));
        assert_eq!(raw.reading("c"), None);
    }
}
