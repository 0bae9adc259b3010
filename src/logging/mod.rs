//! Console logging setup, with optional GELF shipping.
//!
//! The configured level is the default directive; `RUST_LOG`, when set,
//! overrides it. Thread names are printed so each line shows its stage.
//! When a `graylog` section is enabled the same events are also sent to
//! Graylog; a section that cannot be used only produces a warning.

pub mod gelf;

use crate::config::{GraylogSection, LogLevel};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use gelf::GelfLayer;

/// Build the filter for a configured level, letting `RUST_LOG` win.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
        }
        _ => EnvFilter::new(level.as_filter()),
    }
}

/// Build the GELF layer for an enabled section.
pub fn gelf_layer(section: &GraylogSection) -> Result<Option<GelfLayer>, String> {
    if !section.enable {
        return Ok(None);
    }
    let settings = section.resolve().map_err(|e| e.to_string())?;
    GelfLayer::connect(&settings.host, settings.port)
        .map(Some)
        .map_err(|e| format!("{}:{}: {e}", settings.host, settings.port))
}

/// Install the console-only global subscriber.
pub fn init(level: LogLevel) {
    init_with(level, &GraylogSection::default());
}

/// Install the global subscriber, adding GELF output when configured.
/// Safe to call more than once; later calls are ignored.
pub fn init_with(level: LogLevel, graylog: &GraylogSection) {
    let (gelf, gelf_error) = match gelf_layer(graylog) {
        Ok(layer) => (layer, None),
        Err(e) => (None, Some(e)),
    };
    let shipping = gelf.is_some();

    let result = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_names(true)
                .with_writer(std::io::stderr),
        )
        .with(gelf)
        .try_init();

    if result.is_ok() {
        tracing::debug!("Logging initialised at {}", level.as_filter());
        if shipping {
            tracing::info!("Shipping logs to Graylog");
        }
        if let Some(e) = gelf_error {
            tracing::warn!("Graylog logging disabled: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_follows_configured_level() {
        if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
            return;
        }
        assert_eq!(env_filter(LogLevel::Warning).to_string(), "warn");
        assert_eq!(env_filter(LogLevel::Critical).to_string(), "error");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(LogLevel::Info);
        init(LogLevel::Debug);
        tracing::info!("still logging");
    }

    #[test]
    fn test_gelf_layer_only_when_usable() {
        assert!(gelf_layer(&GraylogSection::default()).unwrap().is_none());

        let no_host = GraylogSection {
            enable: true,
            ..Default::default()
        };
        assert!(gelf_layer(&no_host).is_err());

        let local = GraylogSection {
            enable: true,
            host: Some("127.0.0.1".into()),
            port: None,
        };
        assert!(gelf_layer(&local).unwrap().is_some());
    }
}
