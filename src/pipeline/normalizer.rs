//! Normalize stage: raw samples in, per-location samples out, one for one.

use crate::core::{Aggregator, NormalizedSample, RawSample};
use crate::pipeline::supervisor::StageError;
use crate::stats::SharedStats;
use crossbeam_channel::{Receiver, Sender};

pub struct Normalizer {
    aggregator: Aggregator,
    rx: Receiver<RawSample>,
    tx: Sender<NormalizedSample>,
    stats: SharedStats,
}

impl Normalizer {
    pub fn new(
        aggregator: Aggregator,
        rx: Receiver<RawSample>,
        tx: Sender<NormalizedSample>,
        stats: SharedStats,
    ) -> Self {
        Self {
            aggregator,
            rx,
            tx,
            stats,
        }
    }

    /// Normalize one raw sample and forward it.
    pub fn process(&self, raw: &RawSample) -> Result<(), StageError> {
        let (sample, discarded) = self.aggregator.process(raw);
        self.stats.record_normalized(discarded);
        self.tx
            .send(sample)
            .map_err(|_| StageError::Disconnected)?;
        tracing::debug!("Normalizer added processed data to queue");
        Ok(())
    }

    /// Block on the raw channel until it closes.
    pub fn run(&mut self) -> Result<(), StageError> {
        for raw in self.rx.iter() {
            tracing::debug!("Normalizer got item from raw data queue");
            match self.process(&raw) {
                Ok(()) => {}
                Err(StageError::Disconnected) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LocationMap, Readings};
    use crate::stats::create_shared_stats;
    use chrono::{Duration, Utc};
    use crossbeam_channel::unbounded;

    #[test]
    fn test_one_normalized_sample_per_raw_sample_in_order() {
        let locations: LocationMap = [
            ("garage", vec!["g".to_string()]),
            ("stairs", vec!["s1".to_string(), "s2".to_string()]),
        ]
        .into_iter()
        .collect();

        let (raw_tx, raw_rx) = unbounded();
        let (norm_tx, norm_rx) = unbounded();
        let stats = create_shared_stats();
        let mut stage = Normalizer::new(Aggregator::new(locations), raw_rx, norm_tx, stats.clone());

        let base = Utc::now();
        for i in 0..10i64 {
            let mut readings = Readings::new();
            // Odd cycles disagree badly on the stairs; even cycles lack the garage.
            if i % 2 == 0 {
                readings.insert("s1".into(), 70.0);
                readings.insert("s2".into(), 70.4);
            } else {
                readings.insert("g".into(), 60.0 + i as f64);
                readings.insert("s1".into(), 60.0);
                readings.insert("s2".into(), 75.0);
            }
            raw_tx
                .send(RawSample::new(base + Duration::minutes(i), readings))
                .unwrap();
        }
        drop(raw_tx);

        assert_eq!(stage.run(), Ok(()));
        drop(stage);

        let out: Vec<NormalizedSample> = norm_rx.iter().collect();
        assert_eq!(out.len(), 10);
        for (i, sample) in out.iter().enumerate() {
            assert_eq!(sample.timestamp, base + Duration::minutes(i as i64));
            if i % 2 == 0 {
                assert_eq!(sample.values.get("stairs"), Some(&70.2));
                assert!(!sample.values.contains_key("garage"));
            } else {
                assert_eq!(sample.values.get("garage"), Some(&(60.0 + i as f64)));
                assert!(!sample.values.contains_key("stairs"));
            }
        }
        assert_eq!(stats.snapshot().samples_normalized, 10);
        assert_eq!(stats.snapshot().locations_discarded, 5);
    }
}
