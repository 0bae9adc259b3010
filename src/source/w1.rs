//! Linux kernel `w1` bus source.
//!
//! The `w1_therm` driver exposes one directory per slave under
//! `/sys/bus/w1/devices`, named `<family>-<serial>`. DS18B20 thermometers use
//! family `28`. Newer kernels publish a `temperature` file in millidegrees
//! Celsius; older ones only provide `w1_slave`:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```

use crate::core::Readings;
use crate::source::types::{celsius_to_fahrenheit, SensorSource, SourceError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// DS18B20 family code.
pub const DS18B20_FAMILY: &str = "28";

/// Value a DS18B20 reports before its first conversion completes.
pub const POWER_ON_RESET_CELSIUS: f64 = 85.0;

/// Why a single sensor could not be read.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReadError {
    Io(String),
    CrcFailed,
    PowerOnReset,
    Malformed(String),
}

impl fmt::Display for SensorReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorReadError::Io(e) => write!(f, "io error: {e}"),
            SensorReadError::CrcFailed => write!(f, "crc check failed"),
            SensorReadError::PowerOnReset => write!(f, "bad temp received (power-on reset value)"),
            SensorReadError::Malformed(e) => write!(f, "malformed reading: {e}"),
        }
    }
}

impl std::error::Error for SensorReadError {}

/// Reads DS18B20 sensors from the `w1` sysfs tree.
#[derive(Debug, Clone)]
pub struct W1SysfsSource {
    bus_path: PathBuf,
}

impl W1SysfsSource {
    pub fn new(bus_path: impl Into<PathBuf>) -> Self {
        Self {
            bus_path: bus_path.into(),
        }
    }

    pub fn bus_path(&self) -> &Path {
        &self.bus_path
    }

    /// Sensor directories currently visible on the bus.
    pub fn sensor_ids(&self) -> Result<Vec<String>, SourceError> {
        let entries = fs::read_dir(&self.bus_path).map_err(|e| {
            SourceError::BusUnavailable(format!("{}: {e}", self.bus_path.display()))
        })?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SourceError::Io(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name
                .split_once('-')
                .is_some_and(|(family, _)| family == DS18B20_FAMILY)
            {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Read one sensor in degrees Celsius.
    pub fn read_celsius(&self, sensor_id: &str) -> Result<f64, SensorReadError> {
        let dir = self.bus_path.join(sensor_id);

        let celsius = match fs::read_to_string(dir.join("temperature")) {
            Ok(content) => parse_millidegrees(content.trim())?,
            Err(_) => {
                let content = fs::read_to_string(dir.join("w1_slave"))
                    .map_err(|e| SensorReadError::Io(e.to_string()))?;
                parse_w1_slave(&content)?
            }
        };

        if celsius == POWER_ON_RESET_CELSIUS {
            return Err(SensorReadError::PowerOnReset);
        }
        Ok(celsius)
    }
}

impl SensorSource for W1SysfsSource {
    fn read_all(&mut self) -> Result<Readings, SourceError> {
        tracing::debug!("Reading 1-Wire bus at {}", self.bus_path.display());
        let ids = self.sensor_ids()?;

        let mut readings = Readings::new();
        for id in ids {
            match self.read_celsius(&id) {
                Ok(c) => {
                    readings.insert(id, celsius_to_fahrenheit(c));
                }
                Err(e) => tracing::warn!("Error reading sensor {}: {}", id, e),
            }
        }

        tracing::debug!("Done reading 1-Wire bus: {:?}", readings);
        Ok(readings)
    }
}

fn parse_millidegrees(raw: &str) -> Result<f64, SensorReadError> {
    raw.parse::<i64>()
        .map(|milli| milli as f64 / 1000.0)
        .map_err(|_| SensorReadError::Malformed(raw.to_string()))
}

/// Parse the two-line `w1_slave` format.
pub fn parse_w1_slave(content: &str) -> Result<f64, SensorReadError> {
    let mut lines = content.lines();
    let crc_line = lines
        .next()
        .ok_or_else(|| SensorReadError::Malformed("empty".to_string()))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(SensorReadError::CrcFailed);
    }

    let data_line = lines
        .next()
        .ok_or_else(|| SensorReadError::Malformed("missing data line".to_string()))?;
    let (_, milli) = data_line
        .rsplit_once("t=")
        .ok_or_else(|| SensorReadError::Malformed(data_line.to_string()))?;
    parse_millidegrees(milli.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn add_sensor(bus: &Path, id: &str, file: &str, content: &str) {
        let dir = bus.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), content).unwrap();
    }

    #[test]
    fn test_parse_w1_slave() {
        let content = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";
        assert_eq!(parse_w1_slave(content), Ok(23.125));

        let bad_crc = "72 01 4b 46 7f ff 0e 10 57 : crc=57 NO\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";
        assert_eq!(parse_w1_slave(bad_crc), Err(SensorReadError::CrcFailed));

        let negative = "ff ff : crc=aa YES\nff ff t=-1250\n";
        assert_eq!(parse_w1_slave(negative), Ok(-1.25));
    }

    #[test]
    fn test_missing_bus_fails_closed() {
        let mut source = W1SysfsSource::new("/nonexistent/w1/devices");
        assert!(matches!(
            source.read_all(),
            Err(SourceError::BusUnavailable(_))
        ));
    }

    #[test]
    fn test_reads_only_thermometers() {
        let bus = TempDir::new().unwrap();
        add_sensor(bus.path(), "28-000003a5a5ae", "temperature", "20000\n");
        add_sensor(
            bus.path(),
            "28-000003c71849",
            "w1_slave",
            "50 01 4b 46 7f ff 0c 10 1c : crc=1c YES\n50 01 4b 46 7f ff 0c 10 1c t=21000\n",
        );
        add_sensor(bus.path(), "w1_bus_master1", "temperature", "1\n");
        add_sensor(bus.path(), "3a-000000123456", "state", "\n");

        let mut source = W1SysfsSource::new(bus.path());
        let readings = source.read_all().unwrap();

        assert_eq!(readings.len(), 2);
        assert_eq!(readings.get("28-000003a5a5ae"), Some(&68.0));
        assert!((readings["28-000003c71849"] - 69.8).abs() < 1e-9);
    }

    #[test]
    fn test_bad_sensors_are_omitted() {
        let bus = TempDir::new().unwrap();
        add_sensor(bus.path(), "28-00000000aaaa", "temperature", "85000\n");
        add_sensor(bus.path(), "28-00000000bbbb", "temperature", "garbage\n");
        add_sensor(bus.path(), "28-00000000cccc", "temperature", "22500\n");

        let mut source = W1SysfsSource::new(bus.path());
        let readings = source.read_all().unwrap();

        assert_eq!(readings.len(), 1);
        assert_eq!(readings.get("28-00000000cccc"), Some(&72.5));
        assert_eq!(
            source.read_celsius("28-00000000aaaa"),
            Err(SensorReadError::PowerOnReset)
        );
    }
}
