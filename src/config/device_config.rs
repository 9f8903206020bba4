use crate::fusion::{PressureUse, VoltageCalibration};
use crate::sensor::SensorSource;
use strum_macros::{Display, EnumString};

/// Transport used by a device slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, serde::Serialize, serde::Deserialize,
)]
pub enum PortType {
    #[default]
    Disabled,
    Serial,
    /// Bluetooth serial profile, not available on this platform.
    Rfcomm,
    TcpClient,
    TcpListener,
    /// Sensors built into the host.
    Internal,
    /// Sensors on an external I2C style bus.
    SensorBus,
    /// In-process loopback link, see [`SimPortHub`](crate::port::SimPortHub).
    Simulated,
}

/// Description of one device slot.
///
/// Two configs compare equal exactly when an open device does not have to be
/// reopened to apply the new one.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub port_type: PortType,
    /// Serial device path, or the link name of a simulated port.
    pub path: String,
    pub bluetooth_mac: String,
    pub baud_rate: u32,
    pub tcp_host: String,
    pub tcp_port: u16,
    pub driver_name: String,
    /// Optional pass-through driver that sees every line after the main one.
    pub driver2_name: String,
    pub enabled: bool,
    /// Accept settings (MacCready, QNH, ...) reported by the device.
    pub sync_from_device: bool,
    /// Send settings changes to the device.
    pub sync_to_device: bool,
    pub ignore_checksum: bool,
    /// Reopen the device when it stops sending data.
    pub reopen_on_timeout: bool,
    pub pressure_use: PressureUse,
    /// Offset subtracted from pitot readings in hPa.
    pub pitot_offset: f64,
    pub voltage_offset: f64,
    pub voltage_factor: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port_type: PortType::Disabled,
            path: String::new(),
            bluetooth_mac: String::new(),
            baud_rate: 4800,
            tcp_host: String::new(),
            tcp_port: 4353,
            driver_name: String::from("generic"),
            driver2_name: String::new(),
            enabled: true,
            sync_from_device: true,
            sync_to_device: true,
            ignore_checksum: false,
            reopen_on_timeout: true,
            pressure_use: PressureUse::Static,
            pitot_offset: 0.0,
            voltage_offset: 0.0,
            voltage_factor: 1.0,
        }
    }
}

impl DeviceConfig {
    /// A serial device with the given driver.
    pub fn serial(path: &str, baud_rate: u32, driver_name: &str) -> Self {
        Self {
            port_type: PortType::Serial,
            path: path.to_string(),
            baud_rate,
            driver_name: driver_name.to_string(),
            ..Self::default()
        }
    }

    /// A simulated link with the given driver.
    pub fn simulated(link: &str, driver_name: &str) -> Self {
        Self {
            port_type: PortType::Simulated,
            path: link.to_string(),
            driver_name: driver_name.to_string(),
            ..Self::default()
        }
    }

    pub fn tcp_client(host: &str, port: u16, driver_name: &str) -> Self {
        Self {
            port_type: PortType::TcpClient,
            tcp_host: host.to_string(),
            tcp_port: port,
            driver_name: driver_name.to_string(),
            ..Self::default()
        }
    }

    pub fn tcp_listener(port: u16, driver_name: &str) -> Self {
        Self { port_type: PortType::TcpListener, tcp_port: port, driver_name: driver_name.to_string(), ..Self::default() }
    }

    pub fn with_port_type(port_type: PortType) -> Self { Self { port_type, ..Self::default() } }

    pub fn is_configured(&self) -> bool { self.port_type != PortType::Disabled }

    /// Configured, enabled and supported on this platform.
    pub fn is_available(&self) -> bool {
        self.enabled && self.is_configured() && self.port_type != PortType::Rfcomm
    }

    /// `true` if the device talks through a byte stream port.
    pub fn uses_port(&self) -> bool {
        matches!(
            self.port_type,
            PortType::Serial | PortType::Rfcomm | PortType::TcpClient | PortType::TcpListener | PortType::Simulated
        )
    }

    pub fn uses_driver(&self) -> bool { self.uses_port() }

    /// `true` if the sensors deliver [`SensorEvent`](crate::sensor::SensorEvent)s instead of bytes.
    pub fn sensor_source(&self) -> Option<SensorSource> {
        match self.port_type {
            PortType::Internal => Some(SensorSource::Internal),
            PortType::SensorBus => Some(SensorSource::SensorBus),
            _ => None,
        }
    }

    /// `true` if this transport can be reopened to recover from a silent device. A
    /// listener would drop a client that is merely quiet.
    pub fn should_reopen_on_timeout(&self) -> bool {
        self.reopen_on_timeout
            && matches!(self.port_type, PortType::Serial | PortType::Rfcomm | PortType::TcpClient)
    }

    pub fn is_driver(&self, name: &str) -> bool { self.uses_driver() && self.driver_name == name }

    pub fn driver2(&self) -> Option<&str> {
        (!self.driver2_name.is_empty()).then_some(self.driver2_name.as_str())
    }

    pub fn voltage_calibration(&self) -> VoltageCalibration {
        VoltageCalibration { offset: self.voltage_offset, factor: self.voltage_factor }
    }

    /// Short human readable description of the transport.
    pub fn port_name(&self) -> String {
        match self.port_type {
            PortType::Disabled => String::from("disabled"),
            PortType::Serial => format!("{} ({} baud)", self.path, self.baud_rate),
            PortType::Rfcomm => format!("Bluetooth {}", self.bluetooth_mac),
            PortType::TcpClient => format!("{}:{}", self.tcp_host, self.tcp_port),
            PortType::TcpListener => format!("TCP port {}", self.tcp_port),
            PortType::Internal => String::from("built-in sensors"),
            PortType::SensorBus => String::from("sensor bus"),
            PortType::Simulated => format!("simulated {}", self.path),
        }
    }
}
