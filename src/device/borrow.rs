use crate::driver::{Declaration, Driver, DriverError, RecordedFlightInfo};
use crate::job::OperationEnvironment;
use crate::port::{DumpPort, Port};
use std::path::Path;
use std::sync::Arc;
use strum_macros::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum BorrowError {
    #[strum(to_string = "device is not ready")]
    NotReady,
    #[strum(to_string = "device has no driver")]
    NoDriver,
    #[strum(to_string = "device is busy")]
    Occupied,
}

impl std::error::Error for BorrowError {}

/// Exclusive access to the driver of a slot.
///
/// The driver is moved out of the slot for the lifetime of the token, so nothing
/// else can talk to the device meanwhile. The receive path of the port is stopped;
/// the driver reads responses synchronously. The token must be handed back with
/// [`DeviceSlot::give_back`](super::DeviceSlot::give_back) on the main loop, the
/// operations themselves may run on any thread.
#[must_use = "a borrowed slot stays occupied until the token is given back"]
pub struct BorrowToken {
    pub(crate) index: usize,
    pub(crate) generation: u64,
    pub(crate) driver: Box<dyn Driver>,
    pub(crate) port: Arc<DumpPort>,
}

impl BorrowToken {
    pub fn index(&self) -> usize { self.index }

    pub fn port(&self) -> Arc<dyn Port> { Arc::clone(&self.port) as Arc<dyn Port> }

    pub fn declare(&mut self, declaration: &Declaration, env: &dyn OperationEnvironment) -> Result<(), DriverError> {
        crate::dev!("Device {}: declaring task with {} turnpoints", self.index, declaration.len());
        self.driver.declare(declaration, env)
    }

    pub fn read_flight_list(&mut self, env: &dyn OperationEnvironment) -> Result<Vec<RecordedFlightInfo>, DriverError> {
        self.driver.read_flight_list(env)
    }

    pub fn download_flight(
        &mut self,
        flight: &RecordedFlightInfo,
        path: &Path,
        env: &dyn OperationEnvironment,
    ) -> Result<(), DriverError> {
        crate::dev!("Device {}: downloading flight {} to {}", self.index, flight.id, path.display());
        self.driver.download_flight(flight, path, env)
    }

    /// Lets the driver send its periodic keep-alive while borrowed.
    pub fn keep_alive(&mut self) { self.driver.on_sys_ticker(); }
}
