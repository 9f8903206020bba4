use super::{DeviceBlackboard, MainEvent, NmeaDispatcher, SlotContext};
use crate::config::DeviceConfig;
use crate::driver::{Driver, DriverRegister};
use crate::fusion::SensorFusion;
use crate::nmea::{ExternalSettings, LineSplitter, NmeaInfo, NmeaParser};
use crate::port::{DataHandler, DumpPort, Port, PortListener};
use crate::sensor::SensorEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A device that finished opening, ready to be installed into its slot.
pub(crate) struct Installed {
    pub port: Arc<DumpPort>,
    pub register: DriverRegister,
    pub driver: Box<dyn Driver>,
    pub second_driver: Option<Box<dyn Driver>>,
}

/// Resources torn down by a close, released after the slot mutex.
struct Released {
    port: Option<Arc<DumpPort>>,
    sensor: Option<CancellationToken>,
    _drivers: (Option<Box<dyn Driver>>, Option<Box<dyn Driver>>),
}

/// The part of a slot guarded by its mutex.
#[derive(Default)]
pub(crate) struct Guarded {
    /// Bumped by every open attempt and every close. Callbacks and jobs carrying an
    /// older value are ignored.
    pub generation: u64,
    /// Configuration the installed device was opened with.
    pub open_config: Option<DeviceConfig>,
    pub register: Option<DriverRegister>,
    pub driver: Option<Box<dyn Driver>>,
    pub second_driver: Option<Box<dyn Driver>>,
    pub port: Option<Arc<DumpPort>>,
    pub sensor: Option<CancellationToken>,
    pub fusion: Option<SensorFusion>,
    pub parser: NmeaParser,
    pub splitter: LineSplitter,
    pub settings_sent: ExternalSettings,
    pub settings_received: ExternalSettings,
    pub error_message: Option<String>,
    pub failures: u32,
    /// The last open attempt or the transport failed.
    pub failed: bool,
}

impl Guarded {
    pub fn is_open(&self) -> bool { self.port.is_some() || self.sensor.is_some() }

    pub fn is_nmea_out(&self) -> bool {
        self.register.is_some_and(|r| r.capabilities.nmea_out) && self.port.is_some() && self.driver.is_some()
    }

    fn sync_from_device(&self) -> bool { self.open_config.as_ref().is_some_and(|c| c.sync_from_device) }

    /// Applies echo suppression to settings a device just reported.
    ///
    /// # Returns
    /// `true` if a genuine change survived and was merged into `target`
    fn merge_settings(&mut self, mut incoming: ExternalSettings, target: &mut ExternalSettings) -> bool {
        if !self.sync_from_device() || incoming.is_empty() {
            return false;
        }
        let previous = self.settings_received;
        self.settings_received.complement(&incoming);
        incoming.eliminate_redundant(&self.settings_sent, &previous);
        if incoming.is_empty() {
            return false;
        }
        target.complement(&incoming);
        true
    }
}

/// State of one slot shared between the main loop, its open job and its I/O tasks.
pub(crate) struct SlotShared {
    index: usize,
    guarded: Mutex<Guarded>,
    /// Set by the sensor task, consumed by the ticker.
    sensor_failed: AtomicBool,
    context: SlotContext,
    blackboard: Arc<DeviceBlackboard>,
    monitor: RwLock<Option<Arc<dyn DataHandler>>>,
    dispatcher: RwLock<Option<Arc<NmeaDispatcher>>>,
}

impl SlotShared {
    pub fn new(index: usize, context: SlotContext) -> Arc<Self> {
        Arc::new(Self {
            index,
            guarded: Mutex::new(Guarded::default()),
            sensor_failed: AtomicBool::new(false),
            blackboard: context.blackboard(),
            context,
            monitor: RwLock::new(None),
            dispatcher: RwLock::new(None),
        })
    }

    pub fn index(&self) -> usize { self.index }
    pub fn context(&self) -> &SlotContext { &self.context }
    pub fn lock(&self) -> MutexGuard<'_, Guarded> { self.guarded.lock().unwrap() }

    pub fn set_monitor(&self, monitor: Option<Arc<dyn DataHandler>>) { *self.monitor.write().unwrap() = monitor; }

    pub fn set_dispatcher(&self, dispatcher: Option<Arc<NmeaDispatcher>>) {
        *self.dispatcher.write().unwrap() = dispatcher;
    }

    pub fn sensor_failed(&self) -> bool { self.sensor_failed.load(Ordering::Acquire) }

    /// Consumes the sensor failure flag.
    pub fn take_sensor_failure(&self) -> bool { self.sensor_failed.swap(false, Ordering::AcqRel) }

    /// Starts a new open attempt and returns its generation.
    pub fn begin_open(&self) -> u64 {
        let mut g = self.lock();
        g.generation += 1;
        g.generation
    }

    /// Installs an opened device if `generation` is still current.
    pub fn install(&self, generation: u64, config: &DeviceConfig, installed: Installed) -> Result<(), Installed> {
        let mut g = self.lock();
        if g.generation != generation {
            return Err(installed);
        }
        g.parser.set_ignore_checksum(config.ignore_checksum);
        g.splitter.reset();
        g.settings_sent.clear();
        g.settings_received.clear();
        g.open_config = Some(config.clone());
        g.register = Some(installed.register);
        g.driver = Some(installed.driver);
        g.second_driver = installed.second_driver;
        g.port = Some(installed.port);
        g.failed = false;
        Ok(())
    }

    /// Installs a sensor subscription if `generation` is still current.
    pub fn install_sensor(
        &self,
        generation: u64,
        config: &DeviceConfig,
        token: CancellationToken,
        fusion: SensorFusion,
    ) -> bool {
        let mut g = self.lock();
        if g.generation != generation {
            return false;
        }
        self.sensor_failed.store(false, Ordering::Release);
        g.open_config = Some(config.clone());
        g.sensor = Some(token);
        g.fusion = Some(fusion);
        g.failed = false;
        true
    }

    /// Records a failed open attempt if `generation` is still current.
    pub fn record_failure(&self, generation: u64, message: String) -> bool {
        let mut g = self.lock();
        if g.generation != generation {
            return false;
        }
        crate::warn!("Device {}: {message}", self.index);
        g.error_message = Some(message);
        g.failures += 1;
        g.failed = true;
        true
    }

    /// Closes the device and invalidates all pending jobs and callbacks.
    ///
    /// # Arguments
    /// * `failed` - whether the close is the consequence of a failure, which makes
    ///   the slot eligible for an automatic reopen
    pub fn teardown(&self, failed: bool) {
        let released = {
            let mut g = self.lock();
            g.generation += 1;
            g.open_config = None;
            g.register = None;
            g.fusion = None;
            g.failed = failed;
            Released {
                port: g.port.take(),
                sensor: g.sensor.take(),
                _drivers: (g.driver.take(), g.second_driver.take()),
            }
        };
        self.sensor_failed.store(false, Ordering::Release);
        if let Some(port) = released.port {
            port.close();
        }
        if let Some(token) = released.sensor {
            token.cancel();
        }
        self.blackboard.reset_state(self.index);
    }

    /// Entry point of all bytes read from the port of `generation`.
    pub fn data_received(&self, generation: u64, data: &[u8]) {
        if self.lock().generation != generation {
            return;
        }
        let monitor = self.monitor.read().unwrap().clone();
        if let Some(monitor) = monitor {
            monitor.data_received(data);
        }

        let now = Instant::now();
        let mut lines = Vec::new();
        let settings_changed = {
            let mut g = self.lock();
            if g.generation != generation {
                return;
            }
            let Some(port) = g.port.clone() else { return };
            port.dump_incoming(data);

            if g.register.is_some_and(|r| r.capabilities.binary) {
                self.process_binary(&mut g, data, now)
            } else {
                g.splitter.feed(data, |line| lines.push(line.to_string()));
                let mut changed = false;
                for line in &lines {
                    changed |= self.process_line(&mut g, line, now);
                }
                changed
            }
        };

        if settings_changed {
            self.context.send(MainEvent::SettingsReceived { slot: self.index });
        }
        let dispatcher = self.dispatcher.read().unwrap().clone();
        if let Some(dispatcher) = dispatcher {
            for line in &lines {
                dispatcher.forward(self.index, line);
            }
        }
    }

    /// Runs one line through driver, second driver and the generic parser.
    ///
    /// # Returns
    /// `true` if the line carried settings changed on the instrument
    fn process_line(&self, g: &mut Guarded, line: &str, now: Instant) -> bool {
        let mut basic = self.blackboard.real_state(self.index);
        let kept_settings = std::mem::take(&mut basic.settings);
        basic.update_clock(now);

        let understood = g.driver.as_mut().is_some_and(|d| d.parse_nmea(line, &mut basic))
            || g.second_driver.as_mut().is_some_and(|d| d.parse_nmea(line, &mut basic))
            || match g.parser.parse_line(line, &mut basic, now) {
                Ok(()) => true,
                Err(e) => {
                    crate::event!("Device {}: {e}: {line}", self.index);
                    false
                }
            };
        if !understood {
            return false;
        }
        self.commit(g, basic, kept_settings, now)
    }

    fn process_binary(&self, g: &mut Guarded, data: &[u8], now: Instant) -> bool {
        let mut basic = self.blackboard.real_state(self.index);
        let kept_settings = std::mem::take(&mut basic.settings);
        basic.update_clock(now);
        if !g.driver.as_mut().is_some_and(|d| d.data_received(data, &mut basic)) {
            return false;
        }
        self.commit(g, basic, kept_settings, now)
    }

    fn commit(&self, g: &mut Guarded, mut basic: NmeaInfo, kept_settings: ExternalSettings, now: Instant) -> bool {
        basic.alive.update(now);
        let incoming = std::mem::replace(&mut basic.settings, kept_settings);
        let changed = g.merge_settings(incoming, &mut basic.settings);
        self.blackboard.set_real_state(self.index, basic);
        changed
    }

    /// Writes `line` verbatim if this slot is an NMEA output.
    pub fn forward_line(&self, line: &str) -> bool {
        let port = {
            let g = self.lock();
            if !g.is_nmea_out() {
                return false;
            }
            g.port.clone()
        };
        let Some(port) = port else { return false };
        let framed = format!("{line}\r\n");
        match port.full_write(framed.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                crate::event!("Device {}: forwarding failed: {e}", self.index);
                false
            }
        }
    }

    pub fn sensor_event(&self, generation: u64, event: &SensorEvent) {
        let now = Instant::now();
        match event {
            SensorEvent::Error(message) => {
                let mut g = self.lock();
                if g.generation == generation {
                    crate::warn!("Device {}: sensor failed: {message}", self.index);
                    g.error_message = Some(message.clone());
                    self.sensor_failed.store(true, Ordering::Release);
                }
            }
            SensorEvent::StateChanged => {
                if self.lock().generation == generation {
                    self.context.send(MainEvent::SensorStateChanged { slot: self.index });
                }
            }
            SensorEvent::Connected(state) => {
                let g = self.lock();
                if g.generation != generation {
                    return;
                }
                let mut bb = self.blackboard.lock();
                if let Some(info) = bb.real.get_mut(self.index) {
                    if *state == 0 {
                        info.location = None;
                        info.location_available.clear();
                    } else {
                        info.alive.update(now);
                    }
                }
                drop(bb);
                self.blackboard.notify();
            }
            event => {
                let mut g = self.lock();
                if g.generation != generation {
                    return;
                }
                let Some(fusion) = g.fusion.as_mut() else { return };
                let mut bb = self.blackboard.lock();
                let changed = bb.real.get_mut(self.index).is_some_and(|info| fusion.apply(event, info, now));
                drop(bb);
                if changed {
                    self.blackboard.notify();
                }
            }
        }
    }
}

/// Port callbacks bound to one open attempt of one slot.
pub(crate) struct SlotPortHandler {
    shared: Weak<SlotShared>,
    generation: u64,
}

impl SlotPortHandler {
    pub fn new(shared: &Arc<SlotShared>, generation: u64) -> Self {
        Self { shared: Arc::downgrade(shared), generation }
    }

    fn current(&self) -> Option<Arc<SlotShared>> {
        self.shared.upgrade().filter(|shared| shared.lock().generation == self.generation)
    }
}

impl DataHandler for SlotPortHandler {
    fn data_received(&self, data: &[u8]) {
        if let Some(shared) = self.shared.upgrade() {
            shared.data_received(self.generation, data);
        }
    }
}

impl PortListener for SlotPortHandler {
    fn port_state_changed(&self) {
        if let Some(shared) = self.current() {
            shared.context.send(MainEvent::PortStateChanged { slot: shared.index });
        }
    }

    fn port_error(&self, message: &str) {
        if let Some(shared) = self.current() {
            {
                let mut g = shared.lock();
                if g.generation != self.generation {
                    return;
                }
                g.error_message = Some(message.to_string());
                g.failed = true;
            }
            shared.context.send(MainEvent::PortError { slot: shared.index, message: message.to_string() });
        }
    }
}
