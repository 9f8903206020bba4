//! Byte stream transports.
//!
//! A [`Port`] is opened from a [`DeviceConfig`] on a worker thread by [`open_port`].
//! Received bytes are pushed into the slot through [`PortHandlers`]; while the receive
//! path is stopped (a borrower talks to the device directly) they are buffered and
//! handed out by [`Port::read`] instead.

mod dump_port;
mod rx_gate;
mod serial_port;
mod sim_port;
mod tcp_port;

#[cfg(test)]
mod tests;

pub use dump_port::DumpPort;
pub use serial_port::SerialPort;
pub use sim_port::{SimLink, SimPort, SimPortHub};
pub use tcp_port::{TcpClientPort, TcpListenerPort};

pub(crate) use rx_gate::{AtomicPortState, RxGate};

use crate::config::{DeviceConfig, PortType};
use std::sync::Arc;
use strum_macros::Display;
use tokio::runtime::Handle;
use tokio::time::Duration;

/// Connection state of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PortState {
    /// Bytes can flow.
    Ready,
    /// The transport broke and will not recover by itself.
    Failed,
    /// Waiting for the other side (e.g. a listener without client).
    Limbo,
}

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum PortError {
    #[strum(to_string = "{port_type} ports are not supported on this platform")]
    Unsupported { port_type: PortType },
    #[strum(to_string = "failed to open {name}: {reason}")]
    Open { name: String, reason: String },
    #[strum(to_string = "I/O error: {reason}")]
    Io { reason: String },
    #[strum(to_string = "port is not connected")]
    NotConnected,
    #[strum(to_string = "port is closed")]
    Closed,
    #[strum(to_string = "timed out")]
    Timeout,
}

impl std::error::Error for PortError {}

impl From<std::io::Error> for PortError {
    fn from(value: std::io::Error) -> Self {
        if value.kind() == std::io::ErrorKind::TimedOut {
            Self::Timeout
        } else {
            Self::Io { reason: value.to_string() }
        }
    }
}

/// Receives the bytes a port read.
pub trait DataHandler: Send + Sync {
    fn data_received(&self, data: &[u8]);
}

/// Receives state changes of a port. Implementations must not block.
pub trait PortListener: Send + Sync {
    fn port_state_changed(&self);
    fn port_error(&self, message: &str);
}

/// The callbacks a port reports to, bound to one open attempt of one slot.
#[derive(Clone)]
pub struct PortHandlers {
    pub data: Arc<dyn DataHandler>,
    pub listener: Arc<dyn PortListener>,
}

impl std::fmt::Debug for PortHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("PortHandlers") }
}

/// A bidirectional byte transport.
///
/// `write` never blocks the caller for longer than a short OS write. `drain` and
/// `read` block and must only be called from worker threads.
pub trait Port: Send + Sync {
    fn state(&self) -> PortState;

    /// Queues `data` for sending and returns the number of bytes accepted.
    fn write(&self, data: &[u8]) -> Result<usize, PortError>;

    /// Waits until all queued bytes were handed to the OS.
    fn drain(&self) -> Result<(), PortError>;

    /// Stops delivering received bytes to the data handler, they are buffered for
    /// [`Port::read`] instead. Returns `false` if already stopped.
    fn stop_rx(&self) -> bool;

    /// Resumes delivery to the data handler and drops buffered bytes. Returns `false`
    /// if already running.
    fn start_rx(&self) -> bool;

    /// Reads bytes buffered while the receive path is stopped.
    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, PortError>;

    /// Shuts the transport down. Further writes fail.
    fn close(&self);

    /// Writes all of `data` or fails.
    fn full_write(&self, data: &[u8]) -> Result<(), PortError> {
        let mut rest = data;
        while !rest.is_empty() {
            let n = self.write(rest)?;
            if n == 0 {
                return Err(PortError::Timeout);
            }
            rest = &rest[n..];
        }
        Ok(())
    }
}

/// Opens the transport described by `config`.
///
/// Must be called from a worker thread: connecting blocks on `handle`.
///
/// # Arguments
/// * `config` - the slot configuration, must use a port
/// * `handle` - runtime the socket tasks are spawned on
/// * `sims` - registry of simulated links
/// * `handlers` - callbacks for received data and state changes
pub fn open_port(
    config: &DeviceConfig,
    handle: &Handle,
    sims: &SimPortHub,
    handlers: PortHandlers,
) -> Result<Arc<dyn Port>, PortError> {
    match config.port_type {
        PortType::Serial => Ok(Arc::new(SerialPort::open(&config.path, config.baud_rate, handlers)?)),
        PortType::TcpClient => {
            Ok(Arc::new(TcpClientPort::connect(&config.tcp_host, config.tcp_port, handle, handlers)?))
        }
        PortType::TcpListener => Ok(Arc::new(TcpListenerPort::bind(config.tcp_port, handle, handlers)?)),
        PortType::Simulated => Ok(Arc::new(sims.link(&config.path).open(handlers)?)),
        port_type @ (PortType::Rfcomm | PortType::Disabled | PortType::Internal | PortType::SensorBus) => {
            Err(PortError::Unsupported { port_type })
        }
    }
}
