//! Configuration loading for Disha.
//!
//! Every section is optional in the TOML file; missing keys take their
//! defaults.
//!
//! ```toml
//! [session]
//! default_timeout_ms = 5000
//! controller_level = "high_level"
//!
//! [map_storage]
//! path = "maps"
//!
//! [telemetry]
//! odometry_queue_capacity = 32
//! localization_queue_capacity = 16
//!
//! [simulation]
//! update_rate_hz = 20.0
//! linear_speed = 0.5
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::SimulationConfig;
use crate::error::{Error, Result};
use crate::state::ControllerLevel;

/// Main configuration structure
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DishaConfig {
    pub session: SessionConfig,
    pub map_storage: MapStorageConfig,
    pub telemetry: TelemetryConfig,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
}

/// Session behavior
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for calls that don't take an explicit one (default: 5000)
    pub default_timeout_ms: u64,

    /// Controller level at startup (default: high_level)
    pub controller_level: ControllerLevel,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5000,
            controller_level: ControllerLevel::HighLevel,
        }
    }
}

impl SessionConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Where maps are persisted
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapStorageConfig {
    /// Map storage root (default: "maps")
    pub path: PathBuf,
}

impl Default for MapStorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("maps"),
        }
    }
}

/// Telemetry queue sizing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Odometry samples buffered per subscription (default: 32)
    pub odometry_queue_capacity: usize,

    /// Localization samples buffered per subscription (default: 16)
    pub localization_queue_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            odometry_queue_capacity: 32,
            localization_queue_capacity: 16,
        }
    }
}

/// Log filter used by the binary when `RUST_LOG` is unset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl DishaConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: DishaConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration as TOML
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.session.default_timeout_ms == 0 {
            return Err(Error::Config("session.default_timeout_ms must be positive".into()));
        }
        if self.telemetry.odometry_queue_capacity == 0
            || self.telemetry.localization_queue_capacity == 0
        {
            return Err(Error::Config("telemetry queue capacities must be positive".into()));
        }
        if !(self.simulation.update_rate_hz > 0.0) {
            return Err(Error::Config("simulation.update_rate_hz must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DishaConfig::default();
        assert_eq!(config.session.default_timeout_ms, 5000);
        assert_eq!(config.session.controller_level, ControllerLevel::HighLevel);
        assert_eq!(config.telemetry.odometry_queue_capacity, 32);
        assert_eq!(config.telemetry.localization_queue_capacity, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file() {
        let config: DishaConfig = toml::from_str(
            r#"
            [session]
            controller_level = "low_level"

            [map_storage]
            path = "/var/lib/disha/maps"
            "#,
        )
        .unwrap();
        assert_eq!(config.session.controller_level, ControllerLevel::LowLevel);
        assert_eq!(config.session.default_timeout_ms, 5000);
        assert_eq!(config.map_storage.path, PathBuf::from("/var/lib/disha/maps"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disha.toml");
        let mut config = DishaConfig::default();
        config.session.default_timeout_ms = 250;
        config.simulation.linear_speed = 1.25;
        config.to_file(&path).unwrap();

        assert_eq!(DishaConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_values() {
        let err = toml::from_str::<DishaConfig>("[session]\ndefault_timeout_ms = 0\n")
            .map_err(Error::from)
            .and_then(|c| c.validate().map(|_| c))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = DishaConfig::from_file(Path::new("/nonexistent/disha.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
