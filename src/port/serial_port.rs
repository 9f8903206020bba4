use super::{AtomicPortState, Port, PortError, PortHandlers, PortState, RxGate};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

/// Poll interval of the reader thread, bounds how long a stop request waits.
const READ_TIMEOUT: Duration = Duration::from_millis(100);
const READ_BUFFER: usize = 1024;

struct SerialShared {
    state: AtomicPortState,
    gate: RxGate,
    stop: AtomicBool,
}

/// Serial line served by a dedicated reader thread.
pub struct SerialPort {
    path: String,
    writer: Mutex<Box<dyn serialport::SerialPort>>,
    shared: Arc<SerialShared>,
}

impl SerialPort {
    pub fn open(path: &str, baud_rate: u32, handlers: PortHandlers) -> Result<Self, PortError> {
        let open_error = |e: serialport::Error| PortError::Open { name: path.to_string(), reason: e.to_string() };
        let writer = serialport::new(path, baud_rate).timeout(READ_TIMEOUT).open().map_err(open_error)?;
        let mut reader = writer.try_clone().map_err(open_error)?;

        let shared = Arc::new(SerialShared {
            state: AtomicPortState::new(PortState::Ready),
            gate: RxGate::new(),
            stop: AtomicBool::new(false),
        });
        let thread_shared = Arc::clone(&shared);
        let thread_path = path.to_string();
        std::thread::Builder::new()
            .name(format!("serial {path}"))
            .spawn(move || {
                let mut buffer = [0u8; READ_BUFFER];
                while !thread_shared.stop.load(Ordering::Acquire) {
                    match reader.read(&mut buffer) {
                        Ok(0) => {}
                        Ok(n) => thread_shared.gate.receive(&buffer[..n], &handlers),
                        Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
                        Err(e) => {
                            if !thread_shared.stop.load(Ordering::Acquire) {
                                crate::warn!("Serial port {thread_path} failed: {e}");
                                thread_shared.state.set(PortState::Failed);
                                handlers.listener.port_error(&e.to_string());
                                handlers.listener.port_state_changed();
                            }
                            break;
                        }
                    }
                }
            })
            .map_err(|e| PortError::Open { name: path.to_string(), reason: e.to_string() })?;

        crate::dev!("Opened serial port {path} at {baud_rate} baud");
        Ok(Self { path: path.to_string(), writer: Mutex::new(writer), shared })
    }

    pub fn path(&self) -> &str { &self.path }
}

impl Port for SerialPort {
    fn state(&self) -> PortState { self.shared.state.get() }

    fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        if self.shared.state.get() != PortState::Ready {
            return Err(PortError::Closed);
        }
        Ok(self.writer.lock().unwrap().write(data)?)
    }

    fn drain(&self) -> Result<(), PortError> { Ok(self.writer.lock().unwrap().flush()?) }

    fn stop_rx(&self) -> bool { self.shared.gate.stop() }

    fn start_rx(&self) -> bool { self.shared.gate.start() }

    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
        self.shared.gate.read(buf, timeout)
    }

    fn close(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.state.set(PortState::Failed);
    }
}

impl Drop for SerialPort {
    // the reader thread notices the flag within one read timeout, it is not joined
    fn drop(&mut self) { self.shared.stop.store(true, Ordering::Release); }
}
