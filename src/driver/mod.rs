//! Instrument drivers and the name-keyed registry they are looked up in.

mod declaration;
mod generic;
mod pvar;
mod registry;


pub use declaration::{Declaration, RecordedFlightInfo, Waypoint};
pub use generic::{GenericDriver, NmeaOutDriver};
pub use pvar::PvarDriver;
pub use registry::{DriverCapabilities, DriverContext, DriverFactory, DriverRegister, DriverRegistry, find};

use crate::job::OperationEnvironment;
use crate::nmea::{DerivedInfo, NmeaInfo, RadioFrequency};
use crate::port::PortError;
use std::path::Path;
use strum_macros::Display;

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[strum(to_string = "driver does not support {operation}")]
    Unsupported { operation: String },
    #[strum(to_string = "port error: {reason}")]
    Port { reason: String },
    #[strum(to_string = "device rejected the request: {reason}")]
    Rejected { reason: String },
    #[strum(to_string = "unexpected response: {reason}")]
    Protocol { reason: String },
    #[strum(to_string = "device did not respond")]
    Timeout,
    #[strum(to_string = "cancelled")]
    Cancelled,
    #[strum(to_string = "I/O error: {reason}")]
    Io { reason: String },
}

impl std::error::Error for DriverError {}

impl From<PortError> for DriverError {
    fn from(value: PortError) -> Self {
        match value {
            PortError::Timeout => Self::Timeout,
            other => Self::Port { reason: other.to_string() },
        }
    }
}

impl From<std::io::Error> for DriverError {
    fn from(value: std::io::Error) -> Self { Self::Io { reason: value.to_string() } }
}

impl DriverError {
    pub fn unsupported(operation: &str) -> Self { Self::Unsupported { operation: operation.to_string() } }
}

/// One protocol implementation talking to one device.
///
/// All methods have a default that does nothing and reports success, so a driver
/// only implements what its device understands. The `put_*` methods return `false`
/// if the device refused the value.
pub trait Driver: Send {
    /// Handles one line. Returns `true` if the line was understood.
    fn parse_nmea(&mut self, _line: &str, _info: &mut NmeaInfo) -> bool { false }

    /// Handles raw bytes. Only called for drivers with the `binary` capability.
    fn data_received(&mut self, _data: &[u8], _info: &mut NmeaInfo) -> bool { false }

    /// Handshake after the port was opened.
    fn open(&mut self, _env: &dyn OperationEnvironment) -> Result<(), DriverError> { Ok(()) }

    /// Switches the device back to sending NMEA after a special mode.
    fn enable_nmea(&mut self, _env: &dyn OperationEnvironment) -> bool { true }

    /// The device stopped sending data.
    fn link_timeout(&mut self) {}

    /// Called every other ticker period while the device is alive.
    fn on_sys_ticker(&mut self) {}

    fn on_sensor_update(&mut self, _basic: &NmeaInfo) {}

    fn on_calculated_update(&mut self, _basic: &NmeaInfo, _calculated: &DerivedInfo) {}

    fn put_mac_cready(&mut self, _value: f64, _env: &dyn OperationEnvironment) -> bool { true }
    fn put_bugs(&mut self, _value: f64, _env: &dyn OperationEnvironment) -> bool { true }
    fn put_ballast(&mut self, _fraction: f64, _overload: f64, _env: &dyn OperationEnvironment) -> bool { true }
    fn put_volume(&mut self, _volume: u32, _env: &dyn OperationEnvironment) -> bool { true }
    fn put_qnh(&mut self, _hpa: f64, _env: &dyn OperationEnvironment) -> bool { true }
    fn put_pilot_event(&mut self, _env: &dyn OperationEnvironment) -> bool { true }

    fn put_active_frequency(
        &mut self,
        _frequency: RadioFrequency,
        _name: &str,
        _env: &dyn OperationEnvironment,
    ) -> bool {
        true
    }

    fn put_standby_frequency(
        &mut self,
        _frequency: RadioFrequency,
        _name: &str,
        _env: &dyn OperationEnvironment,
    ) -> bool {
        true
    }

    fn declare(&mut self, _declaration: &Declaration, _env: &dyn OperationEnvironment) -> Result<(), DriverError> {
        Err(DriverError::unsupported("declaration"))
    }

    fn read_flight_list(&mut self, _env: &dyn OperationEnvironment) -> Result<Vec<RecordedFlightInfo>, DriverError> {
        Err(DriverError::unsupported("flight list"))
    }

    fn download_flight(
        &mut self,
        _flight: &RecordedFlightInfo,
        _path: &Path,
        _env: &dyn OperationEnvironment,
    ) -> Result<(), DriverError> {
        Err(DriverError::unsupported("flight download"))
    }
}
