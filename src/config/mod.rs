//! Configuration of the device slots and the main loop, loaded from a JSON file.

mod app_config;
mod device_config;


pub use app_config::{AppConfig, CONFIG_ENV_VAR, ConfigError, MAX_DEVICES};
pub use device_config::{DeviceConfig, PortType};
