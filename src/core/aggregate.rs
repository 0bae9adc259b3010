//! Location aggregation with outlier rejection.
//!
//! Each configured location is resolved independently from one raw sample:
//!
//! - a single-sensor location takes its sensor's reading verbatim,
//! - a multi-sensor location needs every mapped sensor to report; it then
//!   takes their mean, rounded to 3 decimals, but only when every reading
//!   lies within [`OUTLIER_TOLERANCE`] of that mean.
//!
//! A location with any mapped sensor absent, or whose sensors disagree,
//! cannot produce a trustworthy value and is left out of the
//! normalized sample. Omission never affects other locations or the
//! sample's timestamp.

use crate::core::sample::{LocationMap, NormalizedSample, RawSample};
use statrs::statistics::Statistics;

/// Maximum distance, in degrees, between any contributor and the mean.
pub const OUTLIER_TOLERANCE: f64 = 1.0;

/// What one location resolved to for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutcome {
    /// Trustworthy value for this cycle
    Value(f64),
    /// At least one mapped sensor did not report
    Missing { absent: Vec<String> },
    /// Contributors disagreed beyond the tolerance
    Discarded { mean: f64, readings: Vec<f64> },
}

/// Resolve one location from the readings in `raw`.
pub fn resolve_location(raw: &RawSample, sensors: &[String]) -> AggregateOutcome {
    let mut readings = Vec::with_capacity(sensors.len());
    let mut absent = Vec::new();
    for id in sensors {
        match raw.reading(id) {
            Some(r) => readings.push(r),
            None => absent.push(id.clone()),
        }
    }

    if !absent.is_empty() || readings.is_empty() {
        return AggregateOutcome::Missing { absent };
    }

    match readings.as_slice() {
        [only] => AggregateOutcome::Value(*only),
        _ => {
            let mean = round_to(readings.iter().mean(), 3);
            if readings
                .iter()
                .any(|r| (mean - r).abs() > OUTLIER_TOLERANCE)
            {
                AggregateOutcome::Discarded { mean, readings }
            } else {
                AggregateOutcome::Value(mean)
            }
        }
    }
}

/// Normalize a raw sample against the location map.
///
/// Locations that are missing or discarded are simply absent from the result.
pub fn normalize(raw: &RawSample, locations: &LocationMap) -> NormalizedSample {
    normalize_counted(raw, locations).0
}

fn normalize_counted(raw: &RawSample, locations: &LocationMap) -> (NormalizedSample, u64) {
    let mut sample = NormalizedSample::new(raw.timestamp);
    let mut discarded = 0;

    for (alias, sensors) in locations.iter() {
        match resolve_location(raw, sensors) {
            AggregateOutcome::Value(v) => {
                sample.values.insert(alias.to_string(), v);
            }
            AggregateOutcome::Missing { absent } => {
                tracing::debug!("No reading for '{}' this cycle (absent {:?})", alias, absent);
            }
            AggregateOutcome::Discarded { mean, readings } => {
                discarded += 1;
                tracing::warn!(
                    "Sensors for '{}' must read within {} degree of each other; discarding (mean {}, temps {:?})",
                    alias,
                    OUTLIER_TOLERANCE,
                    mean,
                    readings
                );
            }
        }
    }

    (sample, discarded)
}

/// Stateless aggregator bound to a location map, logging what it drops.
#[derive(Debug, Clone)]
pub struct Aggregator {
    locations: LocationMap,
}

impl Aggregator {
    pub fn new(locations: LocationMap) -> Self {
        Self { locations }
    }

    pub fn locations(&self) -> &LocationMap {
        &self.locations
    }

    /// Normalize one raw sample, returning it with the number of discarded locations.
    pub fn process(&self, raw: &RawSample) -> (NormalizedSample, u64) {
        normalize_counted(raw, &self.locations)
    }
}

/// Round half away from zero to `places` decimals.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
