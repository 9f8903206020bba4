use super::{Port, PortError, PortState};
use crate::logger::format_traffic;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DumpMode {
    Off,
    Until(Instant),
    Always,
}

/// Wrapper that logs the traffic of a port while dumping is enabled.
///
/// Outgoing bytes are logged here, incoming ones by the slot's data handler through
/// [`DumpPort::dump_incoming`].
pub struct DumpPort {
    inner: Arc<dyn Port>,
    name: String,
    mode: Mutex<DumpMode>,
}

impl DumpPort {
    pub fn new(inner: Arc<dyn Port>, name: &str) -> Self {
        Self { inner, name: name.to_string(), mode: Mutex::new(DumpMode::Off) }
    }

    pub fn inner(&self) -> &Arc<dyn Port> { &self.inner }

    pub fn enable(&self) { *self.mode.lock().unwrap() = DumpMode::Always; }

    pub fn disable(&self) { *self.mode.lock().unwrap() = DumpMode::Off; }

    /// Logs traffic for `duration`, unless dumping is already enabled for longer.
    pub fn enable_temporarily(&self, duration: Duration) {
        let mut mode = self.mode.lock().unwrap();
        let until = Instant::now() + duration;
        *mode = match *mode {
            DumpMode::Always => DumpMode::Always,
            DumpMode::Until(old) if old > until => DumpMode::Until(old),
            _ => DumpMode::Until(until),
        };
    }

    pub fn is_enabled(&self) -> bool {
        let mut mode = self.mode.lock().unwrap();
        match *mode {
            DumpMode::Off => false,
            DumpMode::Always => true,
            DumpMode::Until(until) if Instant::now() < until => true,
            DumpMode::Until(_) => {
                *mode = DumpMode::Off;
                false
            }
        }
    }

    pub fn dump_incoming(&self, data: &[u8]) {
        if self.is_enabled() {
            crate::log!("{}< {}", self.name, format_traffic(data));
        }
    }
}

impl Port for DumpPort {
    fn state(&self) -> PortState { self.inner.state() }

    fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        let result = self.inner.write(data);
        if self.is_enabled() {
            match &result {
                Ok(n) => crate::log!("{}> {}", self.name, format_traffic(&data[..*n])),
                Err(e) => crate::log!("{}> write failed: {e}", self.name),
            }
        }
        result
    }

    fn drain(&self) -> Result<(), PortError> { self.inner.drain() }
    fn stop_rx(&self) -> bool { self.inner.stop_rx() }
    fn start_rx(&self) -> bool { self.inner.start_rx() }
    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
        let n = self.inner.read(buf, timeout)?;
        self.dump_incoming(&buf[..n]);
        Ok(n)
    }
    fn close(&self) { self.inner.close(); }
}
