//! Dispatch stage: commit each sample to history, then fan it out to sinks.
//!
//! History is always updated first. Sinks are then tried one after another,
//! each in its own failure domain: an error or panic in one sink is logged
//! and the next sink still gets its attempt. Delivery is best-effort per
//! sink, never atomic across sinks.

use crate::core::{NormalizedSample, SharedHistory};
use crate::pipeline::supervisor::StageError;
use crate::sink::Sink;
use crate::stats::SharedStats;
use crossbeam_channel::Receiver;
use std::panic::{self, AssertUnwindSafe};

/// Per-cycle delivery result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Values written to history
    pub committed: usize,
    /// Sinks that accepted the sample
    pub delivered: Vec<String>,
    /// Sinks that failed
    pub failed: Vec<String>,
}

pub struct Dispatcher {
    history: SharedHistory,
    sinks: Vec<Box<dyn Sink>>,
    stats: SharedStats,
}

impl Dispatcher {
    pub fn new(history: SharedHistory, sinks: Vec<Box<dyn Sink>>, stats: SharedStats) -> Self {
        Self {
            history,
            sinks,
            stats,
        }
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// Commit one sample and deliver it to every sink.
    pub fn dispatch(&mut self, sample: &NormalizedSample) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (location, value) in &sample.values {
            self.history.record(location, *value, sample.timestamp);
            tracing::info!("{}: {}", location, value);
            report.committed += 1;
        }
        self.stats.record_committed(report.committed as u64);

        for sink in self.sinks.iter_mut() {
            let name = sink.name().to_string();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| sink.write(sample)));
            match outcome {
                Ok(Ok(())) => {
                    self.stats.record_sink_write();
                    report.delivered.push(name);
                }
                Ok(Err(e)) => {
                    tracing::error!("could not log to {}: {}", name, e);
                    self.stats.record_sink_failure();
                    report.failed.push(name);
                }
                Err(_) => {
                    tracing::error!("could not log to {}: sink panicked", name);
                    self.stats.record_sink_failure();
                    report.failed.push(name);
                }
            }
        }

        report
    }

    /// Block on the normalized channel until it closes.
    pub fn run(&mut self, rx: &Receiver<NormalizedSample>) -> Result<(), StageError> {
        for sample in rx.iter() {
            let report = self.dispatch(&sample);
            tracing::debug!(
                "Dispatched {} value(s); delivered {:?}, failed {:?}",
                report.committed,
                report.delivered,
                report.failed
            );
        }
        Ok(())
    }
}
