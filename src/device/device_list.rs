use super::{BorrowError, BorrowToken, DeviceSlot, MainEvent, NmeaDispatcher, SlotContext};
use crate::config::{AppConfig, DeviceConfig};
use crate::job::{LogOperationEnvironment, OperationEnvironment};
use crate::nmea::{DerivedInfo, NmeaInfo, RadioFrequency};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// All device slots of the system, driven by one main-loop task.
pub struct DeviceList {
    slots: Vec<DeviceSlot>,
    context: SlotContext,
    dispatcher: Arc<NmeaDispatcher>,
    tick_interval: Duration,
}

impl DeviceList {
    /// Creates one slot per configured device and links them through the NMEA-out
    /// dispatcher. Nothing is opened yet.
    pub fn new(config: &AppConfig, context: SlotContext) -> Self {
        let slots: Vec<DeviceSlot> = config
            .devices
            .iter()
            .enumerate()
            .map(|(index, device)| {
                let mut slot = DeviceSlot::new(index, context.clone());
                slot.set_config(device.clone());
                slot
            })
            .collect();
        let shared: Vec<_> = slots.iter().map(|slot| Arc::clone(slot.shared())).collect();
        let dispatcher = Arc::new(NmeaDispatcher::new(&shared));
        for slot in &slots {
            slot.set_dispatcher(Some(Arc::clone(&dispatcher)));
        }
        Self { slots, context, dispatcher, tick_interval: config.tick_interval() }
    }

    pub fn len(&self) -> usize { self.slots.len() }
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }
    pub fn slots(&self) -> &[DeviceSlot] { &self.slots }
    pub fn slot(&self, index: usize) -> Option<&DeviceSlot> { self.slots.get(index) }
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut DeviceSlot> { self.slots.get_mut(index) }
    pub fn context(&self) -> &SlotContext { &self.context }
    pub fn dispatcher(&self) -> &Arc<NmeaDispatcher> { &self.dispatcher }

    pub fn open_all(&mut self, env: &dyn OperationEnvironment) {
        for slot in &mut self.slots {
            slot.open(env);
        }
    }

    pub fn close_all(&mut self) {
        for slot in &mut self.slots {
            slot.close();
        }
    }

    pub fn reopen_all(&mut self, env: &dyn OperationEnvironment) {
        for slot in &mut self.slots {
            slot.reopen(env);
        }
    }

    pub fn auto_reopen_all(&mut self, env: &dyn OperationEnvironment) {
        for slot in &mut self.slots {
            slot.auto_reopen(env);
        }
    }

    /// Replaces the configuration of slot `index` and opens it again if it changed.
    ///
    /// # Returns
    /// `false` if there is no such slot
    pub fn set_config(&mut self, index: usize, config: DeviceConfig, env: &dyn OperationEnvironment) -> bool {
        let Some(slot) = self.slots.get_mut(index) else { return false };
        if !config.is_available() {
            slot.clear_config();
            slot.set_config(config);
            return true;
        }
        slot.set_config(config);
        slot.open(env);
        true
    }

    /// One period of housekeeping: expires stale data, runs the slot tickers and
    /// reopens failed devices.
    pub fn tick(&mut self, env: &dyn OperationEnvironment) {
        self.context.blackboard().expire(Instant::now());
        for slot in &mut self.slots {
            slot.on_sys_ticker(env);
            slot.auto_reopen(env);
        }
    }

    pub fn put_mac_cready(&mut self, value: f64, env: &dyn OperationEnvironment) {
        for slot in &mut self.slots {
            slot.put_mac_cready(value, env);
        }
    }

    pub fn put_bugs(&mut self, value: f64, env: &dyn OperationEnvironment) {
        for slot in &mut self.slots {
            slot.put_bugs(value, env);
        }
    }

    pub fn put_ballast(&mut self, fraction: f64, overload: f64, env: &dyn OperationEnvironment) {
        for slot in &mut self.slots {
            slot.put_ballast(fraction, overload, env);
        }
    }

    pub fn put_volume(&mut self, volume: u32, env: &dyn OperationEnvironment) {
        for slot in &mut self.slots {
            slot.put_volume(volume, env);
        }
    }

    pub fn put_qnh(&mut self, hpa: f64, env: &dyn OperationEnvironment) {
        for slot in &mut self.slots {
            slot.put_qnh(hpa, env);
        }
    }

    pub fn put_active_frequency(&mut self, frequency: RadioFrequency, name: &str, env: &dyn OperationEnvironment) {
        for slot in &mut self.slots {
            slot.put_active_frequency(frequency, name, env);
        }
    }

    pub fn put_standby_frequency(&mut self, frequency: RadioFrequency, name: &str, env: &dyn OperationEnvironment) {
        for slot in &mut self.slots {
            slot.put_standby_frequency(frequency, name, env);
        }
    }

    pub fn put_pilot_event(&mut self, env: &dyn OperationEnvironment) {
        for slot in &mut self.slots {
            slot.put_pilot_event(env);
        }
    }

    pub fn notify_sensor_update(&mut self, basic: &NmeaInfo) {
        for slot in &mut self.slots {
            slot.on_sensor_update(basic);
        }
    }

    /// Stores the derived values on the blackboard and hands them to every driver.
    pub fn notify_calculated_update(&mut self, basic: &NmeaInfo, calculated: &DerivedInfo) {
        self.context.blackboard().set_calculated(*calculated);
        for slot in &mut self.slots {
            slot.on_calculated_update(basic, calculated);
        }
    }

    pub fn borrow(&mut self, index: usize) -> Result<BorrowToken, BorrowError> {
        self.slots.get_mut(index).ok_or(BorrowError::NotReady)?.try_borrow()
    }

    /// Hands a token back to the slot it was taken from.
    pub fn give_back(&mut self, token: BorrowToken, env: &dyn OperationEnvironment) -> bool {
        match self.slots.get_mut(token.index()) {
            Some(slot) => slot.give_back(token, env),
            None => false,
        }
    }

    /// Applies one event from a worker or an I/O task.
    pub fn handle_event(&mut self, event: MainEvent) {
        let Some(slot) = self.slots.get_mut(event.slot()) else {
            crate::warn!("Event for unknown device {}", event.slot());
            return;
        };
        match event {
            MainEvent::JobFinished { job_id, .. } => slot.on_job_finished(job_id),
            MainEvent::PortStateChanged { slot: index } => {
                crate::event!("Device {index}: port state changed to {}", slot.state());
            }
            MainEvent::PortError { slot: index, message } => {
                crate::warn!("Device {index}: {message}");
            }
            MainEvent::SettingsReceived { slot: index } => {
                crate::log!("Device {index}: settings changed on the instrument");
            }
            MainEvent::SensorStateChanged { slot: index } => {
                crate::event!("Device {index}: sensor state changed");
            }
        }
    }

    /// Applies all events already queued, without waiting.
    ///
    /// # Returns
    /// The number of events handled
    pub fn handle_pending(&mut self, events: &mut mpsc::UnboundedReceiver<MainEvent>) -> usize {
        let mut handled = 0;
        while let Ok(event) = events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// The main loop: applies events and ticks until `shutdown` is cancelled, then
    /// closes every device.
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<MainEvent>, shutdown: CancellationToken) {
        let env = LogOperationEnvironment::new("devices");
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        crate::info!("Managing {} devices", self.slots.len());
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => self.tick(&env),
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }
        crate::info!("Closing all devices");
        self.close_all();
    }
}
