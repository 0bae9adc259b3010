//! Configuration for the onewired daemon.
//!
//! The file is JSON, loaded once at startup and validated into typed
//! sections. Every section is optional; a missing section resolves to its
//! documented default. Sink sections are only checked for their required
//! keys when they are enabled, and a failed check disables that sink alone.

use crate::core::LocationMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration for the daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bus access and logging
    pub onewire: OneWireSection,

    /// Location alias -> sensor ids
    pub locations: BTreeMap<String, SensorIds>,

    /// Rolling history bounds
    pub history: HistorySection,

    /// Relational state log sink
    pub state_log: StateLogSection,

    /// Graphite line-protocol sink
    pub graphite: GraphiteSection,

    /// Redis key-value sink
    pub redis: RedisSection,

    /// Read-only HTTP query service
    pub webservice: WebServiceSection,

    /// Optional GELF log shipping
    pub graylog: GraylogSection,
}

impl Config {
    /// Load and validate configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the path to the default configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("onewired")
            .join("config.json")
    }

    /// Checks that apply to the whole daemon regardless of enabled sinks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (alias, ids) in &self.locations {
            if alias.trim().is_empty() {
                return Err(ConfigError::Invalid("location alias must not be empty".into()));
            }
            if ids.to_vec().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "location '{alias}' has no sensors"
                )));
            }
        }

        let h = &self.history;
        if h.max_age_minutes == 0 || h.recent_cutoff_minutes == 0 || h.average_window_minutes == 0
        {
            return Err(ConfigError::Invalid(
                "history windows must be at least one minute".into(),
            ));
        }
        Ok(())
    }

    /// Build the runtime location map.
    pub fn location_map(&self) -> LocationMap {
        self.locations
            .iter()
            .map(|(alias, ids)| (alias.clone(), ids.to_vec()))
            .collect()
    }
}

/// Bus access and logging section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OneWireSection {
    /// Directory holding one entry per bus device
    pub bus_path: PathBuf,
    /// Console log level
    #[serde(alias = "basicloglevel")]
    pub log_level: LogLevel,
}

impl Default for OneWireSection {
    fn default() -> Self {
        Self {
            bus_path: PathBuf::from("/sys/bus/w1/devices"),
            log_level: LogLevel::Info,
        }
    }
}

/// Sensors mapped to one location: a list, a single id, or a comma-separated string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorIds {
    One(String),
    Many(Vec<String>),
}

impl SensorIds {
    pub fn to_vec(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            SensorIds::One(s) => s.split(',').collect(),
            SensorIds::Many(v) => v.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Rolling history bounds, in minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    #[serde(deserialize_with = "coerce::number")]
    pub max_age_minutes: u32,
    #[serde(deserialize_with = "coerce::number")]
    pub recent_cutoff_minutes: u32,
    #[serde(deserialize_with = "coerce::number")]
    pub average_window_minutes: u32,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            max_age_minutes: 60,
            recent_cutoff_minutes: 5,
            average_window_minutes: 5,
        }
    }
}

/// `state_log` table in PostgreSQL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateLogSection {
    #[serde(deserialize_with = "coerce::boolean")]
    pub enable: bool,
    pub host: Option<String>,
    pub dbname: Option<String>,
    pub user: Option<String>,
    #[serde(alias = "passwd", skip_serializing)]
    pub password: Option<String>,
}

/// Validated state log connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StateLogSettings {
    pub host: String,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl StateLogSection {
    pub fn resolve(&self) -> Result<StateLogSettings, ConfigError> {
        Ok(StateLogSettings {
            host: required("state_log", "host", &self.host)?,
            dbname: required("state_log", "dbname", &self.dbname)?,
            user: required("state_log", "user", &self.user)?,
            password: self.password.clone().unwrap_or_default(),
        })
    }
}

/// Graphite plaintext endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphiteSection {
    #[serde(deserialize_with = "coerce::boolean")]
    pub enable: bool,
    pub host: Option<String>,
    #[serde(deserialize_with = "coerce::optional_number")]
    pub port: Option<u16>,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphiteSettings {
    pub host: String,
    pub port: u16,
    pub namespace: String,
}

impl GraphiteSection {
    pub fn resolve(&self) -> Result<GraphiteSettings, ConfigError> {
        Ok(GraphiteSettings {
            host: required("graphite", "host", &self.host)?,
            port: self.port.ok_or(ConfigError::MissingKey {
                section: "graphite",
                key: "port",
            })?,
            namespace: required("graphite", "namespace", &self.namespace)?,
        })
    }
}

/// Redis cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSection {
    #[serde(deserialize_with = "coerce::boolean")]
    pub enable: bool,
    pub host: Option<String>,
    #[serde(deserialize_with = "coerce::optional_number")]
    pub port: Option<u16>,
    #[serde(deserialize_with = "coerce::optional_number")]
    pub db: Option<i64>,
    pub namespace: Option<String>,
    #[serde(deserialize_with = "coerce::optional_number")]
    pub ttl: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub namespace: String,
    pub ttl_secs: u64,
}

impl RedisSettings {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

impl RedisSection {
    pub fn resolve(&self) -> Result<RedisSettings, ConfigError> {
        let ttl_secs = self.ttl.ok_or(ConfigError::MissingKey {
            section: "redis",
            key: "ttl",
        })?;
        if ttl_secs == 0 {
            return Err(ConfigError::Invalid("redis ttl must be positive".into()));
        }
        Ok(RedisSettings {
            host: required("redis", "host", &self.host)?,
            port: self.port.unwrap_or(6379),
            db: self.db.unwrap_or(0),
            namespace: required("redis", "namespace", &self.namespace)?,
            ttl_secs,
        })
    }
}

/// HTTP query service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebServiceSection {
    #[serde(deserialize_with = "coerce::boolean")]
    pub enable: bool,
    pub host: String,
    #[serde(deserialize_with = "coerce::optional_number")]
    pub port: Option<u16>,
}

impl Default for WebServiceSection {
    fn default() -> Self {
        Self {
            enable: false,
            host: "0.0.0.0".to_string(),
            port: None,
        }
    }
}

impl WebServiceSection {
    pub fn port(&self) -> Result<u16, ConfigError> {
        self.port.ok_or(ConfigError::MissingKey {
            section: "webservice",
            key: "port",
        })
    }
}

/// Graylog GELF endpoint for log shipping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraylogSection {
    #[serde(deserialize_with = "coerce::boolean")]
    pub enable: bool,
    pub host: Option<String>,
    #[serde(deserialize_with = "coerce::optional_number")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraylogSettings {
    pub host: String,
    pub port: u16,
}

/// Default GELF UDP port.
pub const GELF_PORT: u16 = 12201;

impl GraylogSection {
    pub fn resolve(&self) -> Result<GraylogSettings, ConfigError> {
        Ok(GraylogSettings {
            host: required("graylog", "host", &self.host)?,
            port: self.port.unwrap_or(GELF_PORT),
        })
    }
}

fn required(
    section: &'static str,
    key: &'static str,
    value: &Option<String>,
) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::MissingKey { section, key }),
    }
}

/// Console log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Critical,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "crit" | "critical" | "error" => Ok(LogLevel::Critical),
            other => Err(ConfigError::Invalid(format!(
                "could not determine log level '{other}'"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    MissingKey {
        section: &'static str,
        key: &'static str,
    },
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::MissingKey { section, key } => {
                write!(f, "Missing key '{key}' in section '{section}'")
            }
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde helpers accepting either native JSON values or their string forms.
mod coerce {
    use serde::{Deserialize, Deserializer};
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose<T> {
        Native(T),
        Text(String),
    }

    pub fn boolean<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Loose::<bool>::deserialize(deserializer)? {
            Loose::Native(b) => Ok(b),
            Loose::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                other => Err(serde::de::Error::custom(format!(
                    "expected boolean, got '{other}'"
                ))),
            },
        }
    }

    pub fn number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + FromStr,
    {
        match Loose::<T>::deserialize(deserializer)? {
            Loose::Native(n) => Ok(n),
            Loose::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("expected number, got '{s}'"))),
        }
    }

    pub fn optional_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + FromStr,
    {
        match Option::<Loose<T>>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Loose::Native(n)) => Ok(Some(n)),
            Some(Loose::Text(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("expected number, got '{s}'"))),
        }
    }
}
