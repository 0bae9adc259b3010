//! Lock-free counters shared by the pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current process.
#[derive(Debug)]
pub struct PipelineStats {
    /// Bus scans that produced at least one reading
    cycles_polled: AtomicU64,
    /// Bus scans that failed or came back empty
    empty_polls: AtomicU64,
    /// Normalized samples emitted by the aggregator
    samples_normalized: AtomicU64,
    /// Multi-sensor locations dropped for disagreement
    locations_discarded: AtomicU64,
    /// Location values committed to history
    values_committed: AtomicU64,
    /// Successful sink writes
    sink_writes: AtomicU64,
    /// Failed sink writes
    sink_failures: AtomicU64,
    /// Stage restarts performed by the supervisor
    stage_restarts: AtomicU64,
    /// Process start time
    started_at: DateTime<Utc>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            cycles_polled: AtomicU64::new(0),
            empty_polls: AtomicU64::new(0),
            samples_normalized: AtomicU64::new(0),
            locations_discarded: AtomicU64::new(0),
            values_committed: AtomicU64::new(0),
            sink_writes: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            stage_restarts: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_poll(&self) {
        self.cycles_polled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_poll(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_normalized(&self, discarded: u64) {
        self.samples_normalized.fetch_add(1, Ordering::Relaxed);
        self.locations_discarded
            .fetch_add(discarded, Ordering::Relaxed);
    }

    pub fn record_committed(&self, count: u64) {
        self.values_committed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_sink_write(&self) {
        self.sink_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart(&self) {
        self.stage_restarts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles_polled: self.cycles_polled.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            samples_normalized: self.samples_normalized.load(Ordering::Relaxed),
            locations_discarded: self.locations_discarded.load(Ordering::Relaxed),
            values_committed: self.values_committed.load(Ordering::Relaxed),
            sink_writes: self.sink_writes.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            stage_restarts: self.stage_restarts.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Pipeline Statistics:\n\
             - Cycles polled: {}\n\
             - Empty or failed polls: {}\n\
             - Samples normalized: {}\n\
             - Locations discarded: {}\n\
             - Values committed: {}\n\
             - Sink writes: {} ok, {} failed\n\
             - Stage restarts: {}\n\
             - Uptime: {} seconds",
            s.cycles_polled,
            s.empty_polls,
            s.samples_normalized,
            s.locations_discarded,
            s.values_committed,
            s.sink_writes,
            s.sink_failures,
            s.stage_restarts,
            s.uptime_secs
        )
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub cycles_polled: u64,
    pub empty_polls: u64,
    pub samples_normalized: u64,
    pub locations_discarded: u64,
    pub values_committed: u64,
    pub sink_writes: u64,
    pub sink_failures: u64,
    pub stage_restarts: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Thread-safe shared counters.
pub type SharedStats = Arc<PipelineStats>;

pub fn create_shared_stats() -> SharedStats {
    Arc::new(PipelineStats::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = PipelineStats::new();
        stats.record_poll();
        stats.record_poll();
        stats.record_empty_poll();
        stats.record_normalized(2);
        stats.record_sink_failure();

        let s = stats.snapshot();
        assert_eq!(s.cycles_polled, 2);
        assert_eq!(s.empty_polls, 1);
        assert_eq!(s.samples_normalized, 1);
        assert_eq!(s.locations_discarded, 2);
        assert_eq!(s.sink_failures, 1);
        assert_eq!(s.sink_writes, 0);
    }

    #[test]
    fn test_summary_format() {
        let summary = PipelineStats::new().summary();
        assert!(summary.contains("Cycles polled: 0"));
        assert!(summary.contains("Sink writes: 0 ok, 0 failed"));
    }
}
