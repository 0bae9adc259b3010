//! The three-stage sampling pipeline.
//!
//! ```text
//! ┌──────────┐  raw   ┌────────────┐  normalized  ┌────────────┐
//! │  Poller  │──────▶│ Normalizer │────────────▶│ Dispatcher │──▶ history + sinks
//! └──────────┘        └────────────┘              └────────────┘
//! ```
//!
//! Each stage runs on its own named thread under a [`supervisor`]. The two
//! hand-off channels are unbounded FIFOs, so submission order is preserved
//! end to end and a slow sink never blocks the poller. Shutdown starts at
//! the poller; dropping its sender lets the later stages drain and stop.

pub mod dispatcher;
pub mod normalizer;
pub mod poller;
pub mod shutdown;
pub mod supervisor;

use crate::core::{Aggregator, LocationMap, NormalizedSample, RawSample, SharedHistory};
use crate::sink::Sink;
use crate::source::SensorSource;
use crate::stats::SharedStats;
use crossbeam_channel::unbounded;
use std::thread::{self, JoinHandle};
use std::time::Duration;

// Re-export commonly used types
pub use dispatcher::{DispatchReport, Dispatcher};
pub use normalizer::Normalizer;
pub use poller::{duration_until_next_minute, Cadence, PollOutcome, Poller};
pub use shutdown::{shutdown_channel, ShutdownHandle, ShutdownSignal};
pub use supervisor::{supervise, RestartPolicy, StageError, StageState};

/// Timing knobs for a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub cadence: Cadence,
    pub startup_delay: Duration,
    pub restart: RestartPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            cadence: Cadence::MinuteBoundary,
            startup_delay: Duration::from_secs(5),
            restart: RestartPolicy::default(),
        }
    }
}

/// Handles to the running stage threads.
pub struct Pipeline {
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Wire the channels and start the three stage threads.
    pub fn spawn<S>(
        source: S,
        locations: LocationMap,
        history: SharedHistory,
        sinks: Vec<Box<dyn Sink>>,
        stats: SharedStats,
        shutdown: ShutdownSignal,
        options: PipelineOptions,
    ) -> std::io::Result<Self>
    where
        S: SensorSource + 'static,
    {
        let (raw_tx, raw_rx) = unbounded::<RawSample>();
        let (norm_tx, norm_rx) = unbounded::<NormalizedSample>();

        let mut handles = Vec::with_capacity(3);

        let mut poller = Poller::new(source, raw_tx, stats.clone())
            .with_cadence(options.cadence)
            .with_startup_delay(options.startup_delay);
        {
            let stats = stats.clone();
            let shutdown = shutdown.clone();
            handles.push(thread::Builder::new().name("ow-reader".into()).spawn(
                move || {
                    supervise("OW Reader", &options.restart, &shutdown, &stats, || {
                        poller.run(&shutdown)
                    });
                    // Dropping the poller closes the raw channel.
                    drop(poller);
                },
            )?);
        }

        let mut normalizer =
            Normalizer::new(Aggregator::new(locations), raw_rx, norm_tx, stats.clone());
        {
            let stats = stats.clone();
            let shutdown = shutdown.clone();
            handles.push(thread::Builder::new().name("ow-normalizer".into()).spawn(
                move || {
                    supervise("OW Normalizer", &options.restart, &shutdown, &stats, || {
                        normalizer.run()
                    });
                },
            )?);
        }

        let mut dispatcher = Dispatcher::new(history, sinks, stats.clone());
        tracing::info!("Enabled sinks: {:?}", dispatcher.sink_names());
        handles.push(thread::Builder::new().name("ow-datalogger".into()).spawn(
            move || {
                supervise("OW DataLogger", &options.restart, &shutdown, &stats, || {
                    dispatcher.run(&norm_rx)
                });
            },
        )?);

        Ok(Self { handles })
    }

    /// Wait for every stage to stop.
    pub fn join(self) {
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or("stage").to_string();
            if handle.join().is_err() {
                tracing::error!("{} thread panicked outside its supervisor", name);
            }
        }
    }
}
