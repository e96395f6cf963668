//! Configuration module
//!
//! Loaded from a TOML file (default `~/.config/ocpp-sim/config.toml`).
//! Every field has a default, so a missing file or a partial file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::LoadProfile;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default config file location
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocpp-sim")
        .join("config.toml")
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub central_system: CentralSystemConfig,
    pub simulation: SimulationConfig,
    pub identity: IdentityConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Remote Central System endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralSystemConfig {
    /// Base WebSocket URL; the charger id is appended as the last path segment.
    pub url: String,
    pub subprotocol: String,
}

impl Default for CentralSystemConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:9000/ocpp".to_string(),
            subprotocol: "ocpp1.6".to_string(),
        }
    }
}

/// Timers and the simulated electrical load
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub heartbeat_interval_ms: u64,
    pub meter_sample_interval_ms: u64,
    pub finishing_delay_ms: u64,
    /// Pending-call timeout; 0 disables it.
    pub call_timeout_ms: u64,
    pub voltage: f64,
    pub current: f64,
    /// Id-tag used when a start request does not carry one.
    pub default_id_tag: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 10_000,
            meter_sample_interval_ms: 20_000,
            finishing_delay_ms: 5_000,
            call_timeout_ms: 30_000,
            voltage: 230.0,
            current: 16.0,
            default_id_tag: "SIMULATOR".to_string(),
        }
    }
}

impl SimulationConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn meter_sample_interval(&self) -> Duration {
        Duration::from_millis(self.meter_sample_interval_ms)
    }

    pub fn finishing_delay(&self) -> Duration {
        Duration::from_millis(self.finishing_delay_ms)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }

    pub fn load(&self) -> LoadProfile {
        LoadProfile::new(self.voltage, self.current)
    }
}

/// BootNotification identity fields
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub vendor: String,
    pub model: String,
    pub firmware_version: String,
    /// chargeBoxSerialNumber = serial_prefix + charger id
    pub serial_prefix: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            vendor: "Rudra".to_string(),
            model: "Virtual Charger".to_string(),
            firmware_version: "1.0".to_string(),
            serial_prefix: "simulator-".to_string(),
        }
    }
}

/// HTTP control API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            shutdown_timeout: 10,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if self.central_system.url.trim().is_empty() {
            return Err(ConfigError::Invalid("central_system.url is empty".into()));
        }
        if sim.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "simulation.heartbeat_interval_ms must be > 0".into(),
            ));
        }
        if sim.meter_sample_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "simulation.meter_sample_interval_ms must be > 0".into(),
            ));
        }
        if !(sim.voltage >= 0.0 && sim.current >= 0.0) {
            return Err(ConfigError::Invalid(
                "simulation.voltage and simulation.current must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.simulation.heartbeat_interval_ms, 10_000);
        assert_eq!(cfg.simulation.meter_sample_interval_ms, 20_000);
        assert_eq!(cfg.simulation.finishing_delay_ms, 5_000);
        assert_eq!(cfg.central_system.subprotocol, "ocpp1.6");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [central_system]
            url = "ws://cs.example.com/ocpp"

            [simulation]
            heartbeat_interval_ms = 2500
            current = 32.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.central_system.url, "ws://cs.example.com/ocpp");
        assert_eq!(cfg.simulation.heartbeat_interval(), Duration::from_millis(2500));
        assert_eq!(cfg.simulation.current, 32.0);
        assert_eq!(cfg.simulation.voltage, 230.0);
        assert_eq!(cfg.server.port, 3000);
    }

    #[test]
    fn zero_call_timeout_disables_it() {
        let mut sim = SimulationConfig::default();
        assert_eq!(sim.call_timeout(), Some(Duration::from_secs(30)));
        sim.call_timeout_ms = 0;
        assert_eq!(sim.call_timeout(), None);
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let mut cfg = AppConfig::default();
        cfg.simulation.meter_sample_interval_ms = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = AppConfig::load(Path::new("/nonexistent/ocpp-sim/config.toml")).unwrap();
        assert_eq!(cfg.server.port, 3000);
    }
}
