//! onewired CLI
//!
//! 1-Wire temperature sampling daemon.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use onewired::{
    build_sinks,
    config::Config,
    core::{Aggregator, HistoryRegistry, HistorySettings, RawSample, SharedHistory},
    create_shared_stats, logging,
    pipeline::{shutdown_channel, Pipeline, PipelineOptions, ShutdownSignal},
    source::{SensorSource, W1SysfsSource},
    SharedStats, BANNER, VERSION,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "onewired")]
#[command(version = VERSION)]
#[command(about = "1-Wire temperature sampling daemon", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config dir)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start sampling until interrupted
    Run,

    /// Load the configuration and report which sinks would run
    CheckConfig,

    /// Print the effective configuration
    ShowConfig,

    /// Scan the bus once and print every sensor
    ReadSensors,

    /// Poll and normalize once, printing the sample as JSON
    Sample,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => cmd_run(cli.config),
        Commands::CheckConfig => cmd_check_config(cli.config),
        Commands::ShowConfig => cmd_show_config(cli.config),
        Commands::ReadSensors => cmd_read_sensors(cli.config),
        Commands::Sample => cmd_sample(cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(&path)
            .with_context(|| format!("could not load {}", path.display())),
        None => Config::load()
            .with_context(|| format!("could not load {}", Config::config_path().display())),
    }
}

fn cmd_run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    logging::init_with(config.onewire.log_level, &config.graylog);

    tracing::info!("{} v{} starting", BANNER, VERSION);

    let locations = config.location_map();
    if locations.is_empty() {
        tracing::warn!("No locations configured; readings will not be attributed");
    }
    for (alias, sensors) in locations.iter() {
        tracing::debug!("Location {} <- {:?}", alias, sensors);
    }

    let history: SharedHistory = Arc::new(HistoryRegistry::new(HistorySettings::from(
        &config.history,
    )));
    let stats = create_shared_stats();
    let sinks = build_sinks(&config);
    let (handle, signal) = shutdown_channel();

    let websvc = if config.webservice.enable {
        match config.webservice.port() {
            Ok(port) => match spawn_webservice(
                config.webservice.host.clone(),
                port,
                history.clone(),
                stats.clone(),
                signal.clone(),
            ) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!("Cannot start webservice: {:#}", e);
                    None
                }
            },
            Err(e) => {
                tracing::error!("Cannot start webservice: {}", e);
                None
            }
        }
    } else {
        None
    };

    let handle = Mutex::new(Some(handle));
    ctrlc::set_handler(move || {
        if let Some(handle) = handle.lock().unwrap_or_else(PoisonError::into_inner).take() {
            tracing::info!("Shutdown requested");
            handle.trigger();
        }
    })
    .context("could not install Ctrl+C handler")?;

    let source = W1SysfsSource::new(config.onewire.bus_path.clone());
    let pipeline = Pipeline::spawn(
        source,
        locations,
        history,
        sinks,
        stats.clone(),
        signal,
        PipelineOptions::default(),
    )
    .context("could not start pipeline threads")?;

    pipeline.join();
    if let Some(websvc) = websvc {
        if websvc.join().is_err() {
            tracing::error!("Webservice thread panicked");
        }
    }

    tracing::info!("{}", stats.summary());
    Ok(())
}

/// Host the query service on its own thread and runtime until shutdown.
#[cfg(feature = "server")]
fn spawn_webservice(
    host: String,
    port: u16,
    history: SharedHistory,
    stats: SharedStats,
    shutdown: ShutdownSignal,
) -> anyhow::Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("ow-websvc".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Cannot start webservice runtime: {}", e);
                    return;
                }
            };

            runtime.block_on(async move {
                let config = onewired::server::ServerConfig::new(host, port);
                let (_addr, stop) = match onewired::server::run(config, history, stats).await {
                    Ok(server) => server,
                    Err(e) => {
                        tracing::error!("Cannot start webservice: {:#}", e);
                        return;
                    }
                };

                let _ = tokio::task::spawn_blocking(move || {
                    while !shutdown.wait(Duration::from_secs(60)) {}
                })
                .await;

                let _ = stop.send(());
                // Let in-flight requests finish before the runtime goes away.
                tokio::time::sleep(Duration::from_millis(200)).await;
            });
        })?;
    Ok(handle)
}

#[cfg(not(feature = "server"))]
fn spawn_webservice(
    _host: String,
    _port: u16,
    _history: SharedHistory,
    _stats: SharedStats,
    _shutdown: ShutdownSignal,
) -> anyhow::Result<JoinHandle<()>> {
    anyhow::bail!("built without the server feature")
}

fn cmd_check_config(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    println!("Configuration OK");
    println!("  Bus path: {}", config.onewire.bus_path.display());
    println!("  Log level: {}", config.onewire.log_level.as_filter());
    println!("  Locations: {}", config.locations.len());

    let status = |enabled: bool, resolved: Result<(), String>| match (enabled, resolved) {
        (false, _) => "disabled".to_string(),
        (true, Ok(())) => "enabled".to_string(),
        (true, Err(e)) => format!("skipped ({e})"),
    };

    println!(
        "  State log: {}",
        status(
            config.state_log.enable,
            config.state_log.resolve().map(|_| ()).map_err(|e| e.to_string())
        )
    );
    println!(
        "  Graphite: {}",
        status(
            config.graphite.enable,
            config.graphite.resolve().map(|_| ()).map_err(|e| e.to_string())
        )
    );
    println!(
        "  Redis: {}",
        status(
            config.redis.enable,
            config.redis.resolve().map(|_| ()).map_err(|e| e.to_string())
        )
    );
    println!(
        "  Webservice: {}",
        status(
            config.webservice.enable,
            config.webservice.port().map(|_| ()).map_err(|e| e.to_string())
        )
    );
    println!(
        "  Graylog: {}",
        status(
            config.graylog.enable,
            config.graylog.resolve().map(|_| ()).map_err(|e| e.to_string())
        )
    );
    Ok(())
}

fn cmd_show_config(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_read_sensors(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    logging::init(config.onewire.log_level);

    let mut source = W1SysfsSource::new(config.onewire.bus_path.clone());
    let readings = source.read_all()?;
    let locations = config.location_map();

    if readings.is_empty() {
        println!("No sensors found on {}", config.onewire.bus_path.display());
        return Ok(());
    }

    for (sensor_id, temp) in &readings {
        let owners: Vec<&str> = locations
            .iter()
            .filter(|(_, sensors)| sensors.iter().any(|s| s == sensor_id))
            .map(|(alias, _)| alias)
            .collect();
        if owners.is_empty() {
            println!("{sensor_id}: {temp:.3}°F (unmapped)");
        } else {
            println!("{sensor_id}: {temp:.3}°F ({})", owners.join(", "));
        }
    }
    Ok(())
}

fn cmd_sample(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    logging::init(config.onewire.log_level);

    let mut source = W1SysfsSource::new(config.onewire.bus_path.clone());
    let raw = RawSample::new(Utc::now(), source.read_all()?);
    let (sample, discarded) = Aggregator::new(config.location_map()).process(&raw);

    if discarded > 0 {
        eprintln!("{discarded} location(s) discarded for sensor disagreement");
    }
    println!("{}", serde_json::to_string_pretty(&sample)?);
    Ok(())
}
