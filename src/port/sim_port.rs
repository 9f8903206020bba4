use super::{AtomicPortState, Port, PortError, PortHandlers, PortState, RxGate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

/// Registry of named in-process links.
///
/// A slot configured with `PortType::Simulated` and path `name` opens the link
/// `name`. The other end (tests, replay tools) injects received bytes and inspects
/// what the slot wrote.
#[derive(Debug, Clone, Default)]
pub struct SimPortHub {
    links: Arc<Mutex<HashMap<String, Arc<SimLink>>>>,
}

impl SimPortHub {
    pub fn new() -> Self { Self::default() }

    /// Returns the link `name`, creating it on first use.
    pub fn link(&self, name: &str) -> Arc<SimLink> {
        let mut links = self.links.lock().unwrap();
        Arc::clone(links.entry(name.to_string()).or_insert_with(|| Arc::new(SimLink::new(name))))
    }
}

#[derive(Debug)]
struct Attachment {
    id: u64,
    gate: Arc<RxGate>,
    state: Arc<AtomicPortState>,
    handlers: PortHandlers,
}

#[derive(Debug, Default)]
struct LinkState {
    attached: Option<Attachment>,
    written: Vec<u8>,
    open_count: usize,
    fail_open: bool,
    limbo: bool,
}

/// The far end of a simulated port.
#[derive(Debug)]
pub struct SimLink {
    name: String,
    next_id: AtomicU64,
    state: Mutex<LinkState>,
}

impl SimLink {
    fn new(name: &str) -> Self {
        Self { name: name.to_string(), next_id: AtomicU64::new(1), state: Mutex::new(LinkState::default()) }
    }

    pub fn name(&self) -> &str { &self.name }

    /// Makes every following open attempt fail.
    pub fn set_fail_open(&self, fail: bool) { self.state.lock().unwrap().fail_open = fail; }

    /// Keeps newly opened ports in [`PortState::Limbo`] until cleared.
    pub fn set_limbo(&self, limbo: bool) {
        let attached = {
            let mut state = self.state.lock().unwrap();
            state.limbo = limbo;
            state.attached.as_ref().map(|a| (Arc::clone(&a.state), a.handlers.clone()))
        };
        if let Some((port_state, handlers)) = attached {
            let new_state = if limbo { PortState::Limbo } else { PortState::Ready };
            if port_state.get() != PortState::Failed && port_state.set(new_state) {
                handlers.listener.port_state_changed();
            }
        }
    }

    /// Number of open attempts so far, failed ones included.
    pub fn open_count(&self) -> usize { self.state.lock().unwrap().open_count }

    pub fn is_attached(&self) -> bool { self.state.lock().unwrap().attached.is_some() }

    /// Delivers `data` to the attached port as if the device had sent it. Returns
    /// `false` if no port is attached.
    pub fn inject(&self, data: &[u8]) -> bool {
        let target = {
            let state = self.state.lock().unwrap();
            state.attached.as_ref().map(|a| (Arc::clone(&a.gate), a.handlers.clone()))
        };
        match target {
            Some((gate, handlers)) => {
                gate.receive(data, &handlers);
                true
            }
            None => false,
        }
    }

    /// Breaks the attached port as if the cable was pulled.
    pub fn fail(&self) {
        let attached = {
            let state = self.state.lock().unwrap();
            state.attached.as_ref().map(|a| (Arc::clone(&a.state), a.handlers.clone()))
        };
        if let Some((port_state, handlers)) = attached {
            if port_state.set(PortState::Failed) {
                handlers.listener.port_error("simulated link failure");
                handlers.listener.port_state_changed();
            }
        }
    }

    /// Everything the slot wrote so far.
    pub fn written(&self) -> Vec<u8> { self.state.lock().unwrap().written.clone() }

    pub fn written_string(&self) -> String { String::from_utf8_lossy(&self.written()).into_owned() }

    pub fn clear_written(&self) { self.state.lock().unwrap().written.clear(); }

    /// Attaches a new port to this link.
    pub fn open(self: &Arc<Self>, handlers: PortHandlers) -> Result<SimPort, PortError> {
        let mut state = self.state.lock().unwrap();
        state.open_count += 1;
        if state.fail_open {
            return Err(PortError::Open { name: self.name.clone(), reason: String::from("link refused") });
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let initial = if state.limbo { PortState::Limbo } else { PortState::Ready };
        let gate = Arc::new(RxGate::new());
        let port_state = Arc::new(AtomicPortState::new(initial));
        state.attached =
            Some(Attachment { id, gate: Arc::clone(&gate), state: Arc::clone(&port_state), handlers });
        Ok(SimPort { id, link: Arc::clone(self), gate, state: port_state })
    }

    fn detach(&self, id: u64) {
        let mut state = self.state.lock().unwrap();
        if state.attached.as_ref().is_some_and(|a| a.id == id) {
            state.attached = None;
        }
    }
}

/// Slot side of a [`SimLink`].
#[derive(Debug)]
pub struct SimPort {
    id: u64,
    link: Arc<SimLink>,
    gate: Arc<RxGate>,
    state: Arc<AtomicPortState>,
}

impl Port for SimPort {
    fn state(&self) -> PortState { self.state.get() }

    fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        match self.state.get() {
            PortState::Ready => {
                self.link.state.lock().unwrap().written.extend_from_slice(data);
                Ok(data.len())
            }
            PortState::Limbo => Err(PortError::NotConnected),
            PortState::Failed => Err(PortError::Closed),
        }
    }

    fn drain(&self) -> Result<(), PortError> { Ok(()) }

    fn stop_rx(&self) -> bool { self.gate.stop() }

    fn start_rx(&self) -> bool { self.gate.start() }

    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, PortError> { self.gate.read(buf, timeout) }

    fn close(&self) {
        self.state.set(PortState::Failed);
        self.link.detach(self.id);
    }
}

impl Drop for SimPort {
    fn drop(&mut self) { self.link.detach(self.id); }
}
