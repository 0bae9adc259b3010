//! Run the full pipeline against a simulated bus.
//!
//! Three locations drift slowly; the stairs pair disagrees every fifth
//! cycle so the outlier rule can be seen dropping it. Samples are printed by
//! a console sink once per second until the script ends or Ctrl+C.
//!
//! ```sh
//! cargo run --example simulated_bus
//! ```

use onewired::core::{HistoryRegistry, HistorySettings, LocationMap, NormalizedSample};
use onewired::pipeline::{shutdown_channel, Cadence, Pipeline, PipelineOptions};
use onewired::sink::{Sink, SinkError};
use onewired::source::ScriptedSource;
use onewired::{create_shared_stats, logging, LogLevel};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const CYCLES: usize = 20;

struct Console;

impl Sink for Console {
    fn name(&self) -> &str {
        "console"
    }

    fn write(&mut self, sample: &NormalizedSample) -> Result<(), SinkError> {
        let line: Vec<String> = sample
            .values
            .iter()
            .map(|(loc, v)| format!("{loc}={v:.2}"))
            .collect();
        println!("{} {}", sample.timestamp.format("%H:%M:%S"), line.join(" "));
        Ok(())
    }
}

fn script() -> ScriptedSource {
    let mut source = ScriptedSource::new();
    for i in 0..CYCLES {
        let t = i as f64 / 4.0;
        let office = 70.0 + t.sin();
        let garage = 55.0 + (t / 2.0).cos() * 3.0;
        let stairs_b = if i % 5 == 4 { 74.0 } else { 68.3 };
        source.push_readings([
            ("28-00000a1b2c3d", office),
            ("28-00000a1b2c3e", garage),
            ("28-00000a1b2c3f", 68.0),
            ("28-00000a1b2c40", stairs_b),
        ]);
    }
    source
}

fn main() {
    logging::init(LogLevel::Info);

    let locations: LocationMap = [
        ("office", vec!["28-00000a1b2c3d".to_string()]),
        ("garage", vec!["28-00000a1b2c3e".to_string()]),
        (
            "stairs",
            vec!["28-00000a1b2c3f".to_string(), "28-00000a1b2c40".to_string()],
        ),
    ]
    .into_iter()
    .collect();

    let history = Arc::new(HistoryRegistry::new(HistorySettings::default()));
    let stats = create_shared_stats();
    let (handle, signal) = shutdown_channel();

    let handle = Arc::new(Mutex::new(Some(handle)));
    {
        let handle = handle.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            if let Some(h) = handle.lock().unwrap_or_else(PoisonError::into_inner).take() {
                h.trigger();
            }
        }) {
            eprintln!("Warning: could not install Ctrl+C handler: {e}");
        }
    }

    let options = PipelineOptions {
        cadence: Cadence::Every(Duration::from_secs(1)),
        startup_delay: Duration::ZERO,
        ..PipelineOptions::default()
    };

    let pipeline = match Pipeline::spawn(
        script(),
        locations,
        history.clone(),
        vec![Box::new(Console)],
        stats.clone(),
        signal,
        options,
    ) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error starting pipeline: {e}");
            std::process::exit(1);
        }
    };

    // Stop once the script has been consumed.
    while stats.snapshot().samples_normalized < CYCLES as u64 {
        std::thread::sleep(Duration::from_millis(200));
        if handle.lock().unwrap_or_else(PoisonError::into_inner).is_none() {
            break;
        }
    }
    if let Some(h) = handle.lock().unwrap_or_else(PoisonError::into_inner).take() {
        h.trigger();
    }
    pipeline.join();

    for location in history.locations() {
        if let Some(h) = history.get(&location) {
            match h.average() {
                Ok(avg) => println!("{location}: average {avg}"),
                Err(e) => println!("{location}: {e}"),
            }
        }
    }
    println!("{}", stats.summary());
}
