use super::{DeviceBlackboard, MainEvent};
use crate::config::AppConfig;
use crate::driver::DriverRegistry;
use crate::fusion::FusionConfig;
use crate::port::SimPortHub;
use crate::sensor::SensorHub;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Everything a slot needs besides its own state, shared by all slots.
#[derive(Clone)]
pub struct SlotContext {
    handle: Handle,
    events: mpsc::UnboundedSender<MainEvent>,
    blackboard: Arc<DeviceBlackboard>,
    sensors: SensorHub,
    sim_ports: SimPortHub,
    registry: Arc<DriverRegistry>,
    fusion: FusionConfig,
    reopen_delay: Duration,
}

impl SlotContext {
    /// Creates the context for `config` and the receiver of the main loop's events.
    pub fn new(handle: Handle, config: &AppConfig) -> (Self, mpsc::UnboundedReceiver<MainEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                handle,
                events,
                blackboard: Arc::new(DeviceBlackboard::new(config.devices.len())),
                sensors: SensorHub::new(),
                sim_ports: SimPortHub::new(),
                registry: Arc::new(DriverRegistry::builtin()),
                fusion: config.fusion,
                reopen_delay: config.reopen_delay(),
            },
            rx,
        )
    }

    #[must_use]
    pub fn with_registry(mut self, registry: DriverRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    #[must_use]
    pub fn with_sensor_hub(mut self, sensors: SensorHub) -> Self {
        self.sensors = sensors;
        self
    }

    #[must_use]
    pub fn with_sim_ports(mut self, sim_ports: SimPortHub) -> Self {
        self.sim_ports = sim_ports;
        self
    }

    #[must_use]
    pub fn with_reopen_delay(mut self, reopen_delay: Duration) -> Self {
        self.reopen_delay = reopen_delay;
        self
    }

    pub fn handle(&self) -> &Handle { &self.handle }
    pub fn events(&self) -> mpsc::UnboundedSender<MainEvent> { self.events.clone() }
    pub fn blackboard(&self) -> Arc<DeviceBlackboard> { Arc::clone(&self.blackboard) }
    pub fn sensors(&self) -> &SensorHub { &self.sensors }
    pub fn sim_ports(&self) -> &SimPortHub { &self.sim_ports }
    pub fn registry(&self) -> Arc<DriverRegistry> { Arc::clone(&self.registry) }
    pub fn fusion(&self) -> FusionConfig { self.fusion }
    pub fn reopen_delay(&self) -> Duration { self.reopen_delay }

    /// Sends an event to the main loop. Fails silently once the loop is gone.
    pub(crate) fn send(&self, event: MainEvent) { let _ = self.events.send(event); }
}
