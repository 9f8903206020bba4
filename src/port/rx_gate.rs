use super::{PortError, PortHandlers, PortState};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex};
use tokio::time::Duration;

/// [`PortState`] shared between a port and its I/O task.
#[derive(Debug)]
pub(crate) struct AtomicPortState(AtomicU8);

impl AtomicPortState {
    pub(crate) fn new(state: PortState) -> Self { Self(AtomicU8::new(Self::encode(state))) }

    fn encode(state: PortState) -> u8 {
        match state {
            PortState::Ready => 0,
            PortState::Failed => 1,
            PortState::Limbo => 2,
        }
    }

    pub(crate) fn get(&self) -> PortState {
        match self.0.load(Ordering::Acquire) {
            0 => PortState::Ready,
            1 => PortState::Failed,
            _ => PortState::Limbo,
        }
    }

    /// Stores `state` and returns `true` if it changed.
    pub(crate) fn set(&self, state: PortState) -> bool {
        self.0.swap(Self::encode(state), Ordering::AcqRel) != Self::encode(state)
    }
}

/// Routes received bytes either to the data handler or into a buffer for
/// synchronous reads.
#[derive(Debug)]
pub(crate) struct RxGate {
    running: AtomicBool,
    pending: Mutex<VecDeque<u8>>,
    available: Condvar,
}

impl RxGate {
    /// Bytes kept while the receive path is stopped, older ones are dropped.
    const MAX_PENDING: usize = 64 * 1024;

    pub(crate) fn new() -> Self {
        Self { running: AtomicBool::new(true), pending: Mutex::new(VecDeque::new()), available: Condvar::new() }
    }

    pub(crate) fn receive(&self, data: &[u8], handlers: &PortHandlers) {
        if self.running.load(Ordering::Acquire) {
            handlers.data.data_received(data);
            return;
        }
        let mut pending = self.pending.lock().unwrap();
        pending.extend(data);
        let overflow = pending.len().saturating_sub(Self::MAX_PENDING);
        pending.drain(..overflow);
        self.available.notify_all();
    }

    pub(crate) fn stop(&self) -> bool { self.running.swap(false, Ordering::AcqRel) }

    pub(crate) fn start(&self) -> bool {
        let was_running = self.running.swap(true, Ordering::AcqRel);
        self.pending.lock().unwrap().clear();
        !was_running
    }

    pub(crate) fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
        let pending = self.pending.lock().unwrap();
        let (mut pending, result) =
            self.available.wait_timeout_while(pending, timeout, |p| p.is_empty()).unwrap();
        if result.timed_out() && pending.is_empty() {
            return Err(PortError::Timeout);
        }
        let n = buf.len().min(pending.len());
        for (dst, src) in buf.iter_mut().zip(pending.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}
