//! Supervised restart of pipeline stages.
//!
//! A stage's work loop either returns `Ok(())` when it has nothing more to do
//! (shutdown requested, upstream closed) or fails. A failure is an `Err` or a
//! panic; both move the stage to [`StageState::Crashed`]. The supervisor logs
//! the crash, waits out an exponential backoff and re-enters the loop, so a
//! dependency that is permanently gone costs one attempt per backoff period
//! rather than a busy loop.

use crate::pipeline::shutdown::ShutdownSignal;
use crate::stats::SharedStats;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Lifecycle of a supervised stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Running,
    Crashed,
}

/// Failure raised out of a stage's work loop.
#[derive(Debug, Clone, PartialEq)]
pub enum StageError {
    /// The stage hit a condition it could not handle in-loop
    Failed(String),
    /// The downstream channel is gone
    Disconnected,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Failed(e) => write!(f, "{e}"),
            StageError::Disconnected => write!(f, "downstream channel disconnected"),
        }
    }
}

impl std::error::Error for StageError {}

/// Backoff applied between restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Delay before the first restart
    pub initial_backoff: Duration,
    /// Upper bound on the delay
    pub max_backoff: Duration,
    /// A run at least this long resets the delay to `initial_backoff`
    pub reset_after: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            reset_after: Duration::from_secs(300),
        }
    }
}

impl RestartPolicy {
    /// Delay to use after a crash, given the previous delay and how long the run lasted.
    pub fn next_backoff(&self, previous: Option<Duration>, ran_for: Duration) -> Duration {
        match previous {
            Some(prev) if ran_for < self.reset_after => (prev * 2).min(self.max_backoff),
            _ => self.initial_backoff,
        }
    }
}

/// Run `work` until it returns `Ok(())` or shutdown is requested, restarting it after failures.
pub fn supervise<F>(
    name: &str,
    policy: &RestartPolicy,
    shutdown: &ShutdownSignal,
    stats: &SharedStats,
    mut work: F,
) where
    F: FnMut() -> Result<(), StageError>,
{
    let mut backoff: Option<Duration> = None;

    loop {
        tracing::info!("{} {:?}", name, StageState::Running);
        let started = Instant::now();

        let failure = match panic::catch_unwind(AssertUnwindSafe(&mut work)) {
            Ok(Ok(())) => {
                tracing::info!("{} stopped", name);
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("panic: {}", panic_message(payload.as_ref())),
        };

        stats.record_restart();
        let delay = policy.next_backoff(backoff, started.elapsed());
        backoff = Some(delay);
        tracing::error!(
            "{} {:?}: {}; restarting in {:?}",
            name,
            StageState::Crashed,
            failure,
            delay
        );

        if shutdown.wait(delay) {
            tracing::info!("{} stopped during backoff", name);
            return;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
