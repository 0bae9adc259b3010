//! Poll stage: scan the bus once per cycle and publish raw samples.

use crate::core::RawSample;
use crate::pipeline::shutdown::ShutdownSignal;
use crate::pipeline::supervisor::StageError;
use crate::source::{SensorSource, SourceError};
use crate::stats::SharedStats;
use chrono::{DateTime, Timelike, Utc};
use crossbeam_channel::Sender;
use std::time::Duration;

/// How the poller spaces its cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Sleep until the next wall-clock minute boundary
    MinuteBoundary,
    /// Fixed sleep between cycles
    Every(Duration),
}

impl Cadence {
    pub fn next_sleep(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Cadence::MinuteBoundary => duration_until_next_minute(now),
            Cadence::Every(d) => *d,
        }
    }
}

/// Time left until the next minute boundary, from the wall clock.
///
/// Recomputed every cycle so processing time and clock drift do not accumulate.
pub fn duration_until_next_minute(now: DateTime<Utc>) -> Duration {
    // Leap-second nanos can exceed 1e9; clamp into the current second.
    let nanos = now.nanosecond().min(999_999_999) as u64;
    let elapsed = Duration::from_secs(now.second() as u64) + Duration::from_nanos(nanos);
    Duration::from_secs(60).saturating_sub(elapsed)
}

/// Consecutive `BusUnavailable` scans after which the stage fails and backs off.
pub const MAX_BUS_FAILURES: u32 = 3;

/// What one poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A raw sample with this many readings was published
    Published(usize),
    /// The scan failed or found nothing; the cycle is skipped
    Skipped,
}

pub struct Poller<S: SensorSource> {
    source: S,
    tx: Sender<RawSample>,
    stats: SharedStats,
    cadence: Cadence,
    startup_delay: Duration,
    started: bool,
    bus_failures: u32,
}

impl<S: SensorSource> Poller<S> {
    pub fn new(source: S, tx: Sender<RawSample>, stats: SharedStats) -> Self {
        Self {
            source,
            tx,
            stats,
            cadence: Cadence::MinuteBoundary,
            startup_delay: Duration::from_secs(5),
            started: false,
            bus_failures: 0,
        }
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Scan once and publish the result if it holds any readings.
    ///
    /// Source failures are logged and skipped. A bus that stays unavailable for
    /// [`MAX_BUS_FAILURES`] scans in a row fails the stage, as does a closed channel.
    pub fn poll(&mut self) -> Result<PollOutcome, StageError> {
        let scan = self.source.read_all();
        if matches!(scan, Err(SourceError::BusUnavailable(_))) {
            self.bus_failures += 1;
        } else {
            self.bus_failures = 0;
        }

        let readings = match scan {
            Ok(r) if !r.is_empty() => r,
            Ok(_) => {
                tracing::warn!("No temps read");
                self.stats.record_empty_poll();
                return Ok(PollOutcome::Skipped);
            }
            Err(e) if self.bus_failures >= MAX_BUS_FAILURES => {
                self.stats.record_empty_poll();
                self.bus_failures = 0;
                return Err(StageError::Failed(format!(
                    "{e} ({MAX_BUS_FAILURES} scans in a row)"
                )));
            }
            Err(e) => {
                tracing::warn!("{}", e);
                self.stats.record_empty_poll();
                return Ok(PollOutcome::Skipped);
            }
        };

        let count = readings.len();
        tracing::debug!("Adding {} reading(s) to raw data queue", count);
        self.tx
            .send(RawSample::new(Utc::now(), readings))
            .map_err(|_| StageError::Disconnected)?;
        self.stats.record_poll();
        Ok(PollOutcome::Published(count))
    }

    /// Poll forever on the configured cadence, until shutdown.
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> Result<(), StageError> {
        if !self.started {
            self.started = true;
            if shutdown.wait(self.startup_delay) {
                return Ok(());
            }
        }

        loop {
            match self.poll() {
                Ok(_) => {}
                Err(StageError::Disconnected) => return Ok(()),
                Err(e) => return Err(e),
            }

            if shutdown.wait(self.cadence.next_sleep(Utc::now())) {
                return Ok(());
            }
        }
    }
}
