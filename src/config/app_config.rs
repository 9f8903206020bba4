use super::DeviceConfig;
use crate::driver;
use crate::fusion::FusionConfig;
use std::path::Path;
use strum_macros::Display;
use tokio::time::Duration;

/// Environment variable holding the path of the configuration file.
pub const CONFIG_ENV_VAR: &str = "INSTRUMENT_HUB_CONFIG";
/// Number of device slots the flight computer offers.
pub const MAX_DEVICES: usize = 6;

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[strum(to_string = "cannot read {path}: {reason}")]
    Io { path: String, reason: String },
    #[strum(to_string = "invalid configuration: {reason}")]
    Parse { reason: String },
    #[strum(to_string = "{count} devices configured, at most {max} are supported")]
    TooManyDevices { count: usize, max: usize },
    #[strum(to_string = "device {index}: unknown driver {name}")]
    UnknownDriver { index: usize, name: String },
    #[strum(to_string = "tick interval must be positive")]
    InvalidTickInterval,
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self { Self::Parse { reason: value.to_string() } }
}

/// Complete configuration of the instrument hub.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub devices: Vec<DeviceConfig>,
    /// Minimum delay between two automatic reopen attempts of one slot.
    pub reopen_delay_secs: u64,
    /// Period of the slot ticker.
    pub tick_interval_ms: u64,
    pub fusion: FusionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { devices: Vec::new(), reopen_delay_secs: 30, tick_interval_ms: 500, fusion: FusionConfig::default() }
    }
}

impl AppConfig {
    pub fn reopen_delay(&self) -> Duration { Duration::from_secs(self.reopen_delay_secs) }
    pub fn tick_interval(&self) -> Duration { Duration::from_millis(self.tick_interval_ms) }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.display().to_string(), reason: e.to_string() })?;
        Self::from_json_str(&json)
    }

    /// Loads the file named by [`CONFIG_ENV_VAR`], or the defaults if it is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::load(Path::new(&path)),
            Err(_) => {
                crate::warn!("{CONFIG_ENV_VAR} not set, starting without devices");
                Ok(Self::default())
            }
        }
    }

    pub fn to_json(&self) -> Result<String, ConfigError> { Ok(serde_json::to_string_pretty(self)?) }

    /// Checks slot count, tick interval and driver names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.len() > MAX_DEVICES {
            return Err(ConfigError::TooManyDevices { count: self.devices.len(), max: MAX_DEVICES });
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTickInterval);
        }
        for (index, device) in self.devices.iter().enumerate().filter(|(_, d)| d.uses_driver()) {
            for name in std::iter::once(device.driver_name.as_str()).chain(device.driver2()) {
                if driver::find(name).is_none() {
                    return Err(ConfigError::UnknownDriver { index, name: name.to_string() });
                }
            }
        }
        Ok(())
    }
}
