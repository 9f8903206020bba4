use super::borrow::{BorrowError, BorrowToken};
use super::open_job::do_open;
use super::shared::SlotShared;
use super::slot_state::StateInputs;
use super::{MainEvent, NmeaDispatcher, SlotContext, SlotState};
use crate::config::DeviceConfig;
use crate::driver::Driver;
use crate::job::{AsyncJobRunner, JobId, OperationEnvironment};
use crate::nmea::{DerivedInfo, ExternalSettings, NmeaInfo, RadioFrequency};
use crate::port::{DataHandler, Port, PortState};
use crate::util::PeriodClock;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// One configured device: its configuration, its open job and the handle to the
/// state shared with background work.
///
/// Owned by the main loop. All methods take `&mut self` or `&self` on the owner's
/// task; only the [`SlotShared`] part is touched by other threads.
pub struct DeviceSlot {
    index: usize,
    config: DeviceConfig,
    shared: Arc<SlotShared>,
    job: AsyncJobRunner,
    /// configuration of the job in flight
    job_config: Option<DeviceConfig>,
    reopen_clock: PeriodClock,
    borrowed: bool,
    /// toggled every tick, the driver ticker runs at half the rate
    ticker: bool,
    was_alive: bool,
}

impl DeviceSlot {
    pub fn new(index: usize, context: SlotContext) -> Self {
        Self {
            index,
            config: DeviceConfig::default(),
            shared: SlotShared::new(index, context),
            job: AsyncJobRunner::new(),
            job_config: None,
            reopen_clock: PeriodClock::new(),
            borrowed: false,
            ticker: false,
            was_alive: false,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<SlotShared> { &self.shared }

    pub fn index(&self) -> usize { self.index }
    pub fn config(&self) -> &DeviceConfig { &self.config }

    /// Replaces the configuration. An open device keeps running until the next
    /// `open` notices the change.
    pub fn set_config(&mut self, config: DeviceConfig) {
        if config != self.config {
            self.shared.lock().failures = 0;
            self.config = config;
        }
    }

    /// Closes the device and disables the slot.
    pub fn clear_config(&mut self) {
        self.close();
        self.config = DeviceConfig::default();
    }

    pub fn state(&self) -> SlotState {
        let g = self.shared.lock();
        SlotState::derive(StateInputs {
            available: self.config.is_available(),
            job_running: self.job.is_busy(),
            port_failed: g.port.as_ref().map(|p| p.state() == PortState::Failed),
            sensor_open: g.sensor.is_some(),
            sensor_failed: self.shared.sensor_failed(),
            failed: g.failed,
        })
    }

    pub fn error_message(&self) -> Option<String> { self.shared.lock().error_message.clone() }
    pub fn failure_count(&self) -> u32 { self.shared.lock().failures }
    pub fn reset_failure_counter(&mut self) { self.shared.lock().failures = 0; }

    pub fn is_open(&self) -> bool { self.shared.lock().is_open() }
    pub fn is_borrowed(&self) -> bool { self.borrowed }
    pub fn is_occupied(&self) -> bool { self.borrowed || self.job.is_busy() }

    /// Id of the open job in flight.
    pub fn job_id(&self) -> Option<JobId> { self.job.current_id() }

    fn capability(&self, f: impl Fn(&crate::driver::DriverCapabilities) -> bool) -> bool {
        self.shared.context().registry().find(&self.config.driver_name).is_some_and(|r| f(&r.capabilities))
    }

    pub fn is_driver(&self, name: &str) -> bool { self.config.is_driver(name) }
    pub fn can_declare(&self) -> bool { self.config.uses_driver() && self.capability(|c| c.declare) }
    pub fn is_logger(&self) -> bool { self.config.uses_driver() && self.capability(|c| c.logger) }
    pub fn is_manageable(&self) -> bool { self.config.uses_driver() && self.capability(|c| c.manage) }

    /// `true` if the open device repeats the lines of the other devices.
    pub fn is_nmea_out(&self) -> bool { self.shared.lock().is_nmea_out() }

    pub fn display_name(&self) -> String {
        match self.shared.context().registry().find(&self.config.driver_name) {
            Some(register) if self.config.uses_driver() => register.display_name.to_string(),
            _ => self.config.port_name(),
        }
    }

    /// Snapshot of what the device reported.
    pub fn data(&self) -> NmeaInfo { self.shared.context().blackboard().real_state(self.index) }

    pub fn settings_sent(&self) -> ExternalSettings { self.shared.lock().settings_sent }
    pub fn settings_received(&self) -> ExternalSettings { self.shared.lock().settings_received }

    fn link_timeout(&self) -> Duration {
        self.shared.lock().register.map_or(NmeaInfo::ALIVE_TIMEOUT, |r| r.link_timeout)
    }

    /// `true` if the device delivered understood data within its link timeout.
    pub fn is_alive(&self) -> bool { self.data().is_alive(Instant::now(), self.link_timeout()) }

    /// The port could not be opened or broke, and no port is installed.
    ///
    /// Also requires the recorded failure flag, so a port that was closed on
    /// purpose does not count as failed and stays closed.
    pub fn has_port_failed(&self) -> bool {
        if !self.config.is_available() || !self.config.uses_port() {
            return false;
        }
        let g = self.shared.lock();
        g.port.is_none() && g.failed
    }

    pub fn should_reopen_on_timeout(&self) -> bool {
        self.config.should_reopen_on_timeout() && self.capability(|c| c.reopen_on_timeout)
    }

    /// A failed slot, or an open one that went silent on a transport that can be
    /// reconnected. A slot closed on purpose is never reopened.
    pub fn should_reopen(&self) -> bool {
        let (open, failed) = {
            let g = self.shared.lock();
            (g.is_open(), g.failed)
        };
        if !open {
            return self.config.is_available() && failed;
        }
        !self.is_alive() && self.should_reopen_on_timeout()
    }

    /// Opens the device unless it is already open (or opening) with the current
    /// configuration.
    pub fn open(&mut self, env: &dyn OperationEnvironment) {
        if !self.config.is_available() || self.borrowed {
            return;
        }
        if self.job.is_busy() {
            if self.job_config.as_ref() == Some(&self.config) {
                return;
            }
            self.cancel_job();
        } else {
            let open_config = self.shared.lock().open_config.clone();
            match open_config {
                Some(open) if open == self.config => return,
                Some(_) => self.shared.teardown(false),
                None => {}
            }
        }
        {
            let mut g = self.shared.lock();
            g.error_message = None;
            g.failures = 0;
        }
        env.set_text(&format!("Opening device {}", self.index));
        self.start_open_job();
    }

    fn start_open_job(&mut self) {
        self.reopen_clock.update();
        self.ticker = false;
        self.was_alive = false;
        let generation = self.shared.begin_open();
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let events = self.shared.context().events();
        let slot = self.index;
        crate::dev!("Device {slot}: opening {}", config.port_name());
        let handle = self.shared.context().handle().clone();
        self.job.start(
            &handle,
            &format!("open device {slot}"),
            move |env| do_open(&shared, &config, generation, env),
            move |job_id, _installed| {
                let _ = events.send(MainEvent::JobFinished { slot, job_id });
            },
        );
        self.job_config = Some(self.config.clone());
    }

    fn cancel_job(&mut self) {
        self.job.cancel();
        self.job_config = None;
    }

    /// Completion of an open job, called by the main loop.
    pub fn on_job_finished(&mut self, job_id: JobId) {
        if !self.job.finish(job_id) {
            crate::event!("Device {}: ignoring stale job {job_id}", self.index);
            return;
        }
        self.job_config = None;
        if self.is_open() {
            self.reopen_clock.update();
        }
    }

    /// Cancels a pending open and closes the device.
    pub fn close(&mut self) {
        self.cancel_job();
        self.borrowed = false;
        self.shared.teardown(false);
    }

    /// Closes after a transport or sensor failure, leaving the slot eligible for an
    /// automatic reopen.
    fn close_failed(&mut self) {
        self.cancel_job();
        self.shared.teardown(true);
    }

    pub fn reopen(&mut self, env: &dyn OperationEnvironment) {
        self.close();
        self.open(env);
    }

    /// Reopens a failed or silent device once the reopen delay has passed.
    pub fn auto_reopen(&mut self, env: &dyn OperationEnvironment) {
        if !self.config.is_available() || self.is_occupied() || !self.should_reopen() {
            return;
        }
        if !self.reopen_clock.check_update(self.shared.context().reopen_delay()) {
            return;
        }
        crate::dev!("Device {}: reconnecting", self.index);
        env.set_text(&format!("Reconnecting device {}", self.index));
        if self.is_open() {
            self.shared.teardown(true);
        }
        self.start_open_job();
    }

    /// Periodic housekeeping, called by the main loop every tick.
    pub fn on_sys_ticker(&mut self, env: &dyn OperationEnvironment) {
        if self.shared.take_sensor_failure() {
            crate::warn!("Device {}: closing after sensor failure", self.index);
            self.close_failed();
            return;
        }
        let port_failed = self.shared.lock().port.as_ref().is_some_and(|p| p.state() == PortState::Failed);
        if port_failed && !self.is_occupied() {
            crate::warn!("Device {}: port failed", self.index);
            self.close_failed();
            return;
        }
        // the borrower keeps the device alive through its token
        if self.borrowed || self.shared.lock().driver.is_none() {
            return;
        }

        let now_alive = self.is_alive();
        if !now_alive && self.was_alive && !self.job.is_busy() {
            crate::dev!("Device {}: link timeout", self.index);
            if let Some(driver) = self.shared.lock().driver.as_mut() {
                driver.link_timeout();
            }
            self.enable_nmea(env);
        }
        self.was_alive = now_alive;

        if now_alive {
            self.ticker = !self.ticker;
            if self.ticker {
                if let Some(driver) = self.shared.lock().driver.as_mut() {
                    driver.on_sys_ticker();
                }
            }
        }
    }

    /// Switches the driver back to NMEA mode and restarts the receive path.
    pub fn enable_nmea(&mut self, env: &dyn OperationEnvironment) -> bool {
        let mut g = self.shared.lock();
        let success = g.driver.as_mut().is_some_and(|d| d.enable_nmea(env));
        if let Some(port) = &g.port {
            port.start_rx();
        }
        success
    }

    /// Writes `line` plus CR LF if the device is an NMEA output.
    pub fn write_nmea(&self, line: &str, _env: &dyn OperationEnvironment) -> bool {
        !self.borrowed && self.shared.forward_line(line)
    }

    /// Forwards a line as if another device had received it.
    pub fn forward_line(&self, line: &str) -> bool { self.write_nmea(line, &crate::job::NullOperationEnvironment) }

    pub fn set_monitor(&self, monitor: Option<Arc<dyn DataHandler>>) { self.shared.set_monitor(monitor); }

    pub fn set_dispatcher(&self, dispatcher: Option<Arc<NmeaDispatcher>>) { self.shared.set_dispatcher(dispatcher); }

    pub fn can_borrow(&self) -> bool { self.try_can_borrow().is_ok() }

    fn try_can_borrow(&self) -> Result<(), BorrowError> {
        if self.is_occupied() {
            return Err(BorrowError::Occupied);
        }
        if self.state() != SlotState::Ready {
            return Err(BorrowError::NotReady);
        }
        if self.shared.lock().driver.is_none() {
            return Err(BorrowError::NoDriver);
        }
        Ok(())
    }

    /// Takes exclusive possession of the driver.
    pub fn try_borrow(&mut self) -> Result<BorrowToken, BorrowError> {
        self.try_can_borrow()?;
        let mut g = self.shared.lock();
        let port = g.port.clone().ok_or(BorrowError::NotReady)?;
        let driver = g.driver.take().ok_or(BorrowError::NoDriver)?;
        let generation = g.generation;
        drop(g);
        port.stop_rx();
        self.borrowed = true;
        crate::dev!("Device {}: borrowed", self.index);
        Ok(BorrowToken { index: self.index, generation, driver, port })
    }

    pub fn borrow(&mut self) -> Option<BorrowToken> { self.try_borrow().ok() }

    /// Returns a borrowed driver. The driver is reinstalled only if the device was
    /// not closed meanwhile; the borrowed flag is cleared in any case.
    ///
    /// # Returns
    /// `true` if the driver was reinstalled
    pub fn give_back(&mut self, token: BorrowToken, env: &dyn OperationEnvironment) -> bool {
        if token.index != self.index {
            crate::error!("Device {}: token of device {} handed back", self.index, token.index);
            return false;
        }
        self.borrowed = false;
        let BorrowToken { generation, driver, port, .. } = token;
        let reinstalled = {
            let mut g = self.shared.lock();
            if g.generation == generation && g.driver.is_none() {
                g.driver = Some(driver);
                true
            } else {
                false
            }
        };
        if reinstalled {
            self.enable_nmea(env);
        } else {
            port.start_rx();
        }
        crate::dev!("Device {}: returned", self.index);
        reinstalled
    }

    /// Forwards a setting to the driver and records it as sent.
    ///
    /// # Arguments
    /// * `already_sent` - `true` if the value equals the last one sent
    /// * `send` - hands the value to the driver
    /// * `record` - stores the value in the sent snapshot
    fn put_setting(
        &mut self,
        env: &dyn OperationEnvironment,
        already_sent: impl FnOnce(&ExternalSettings) -> bool,
        send: impl FnOnce(&mut dyn Driver, &dyn OperationEnvironment) -> bool,
        record: impl FnOnce(&mut ExternalSettings),
    ) -> bool {
        if self.is_occupied() {
            return false;
        }
        let mut guard = self.shared.lock();
        let g = &mut *guard;
        let Some(driver) = g.driver.as_mut() else { return false };
        if !self.config.sync_to_device || already_sent(&g.settings_sent) {
            return true;
        }
        if !send(&mut **driver, env) {
            return false;
        }
        record(&mut g.settings_sent);
        true
    }

    pub fn put_mac_cready(&mut self, value: f64, env: &dyn OperationEnvironment) -> bool {
        self.put_setting(
            env,
            |s| s.compare_mac_cready(value),
            |d, env| d.put_mac_cready(value, env),
            |s| s.mac_cready = Some(value),
        )
    }

    pub fn put_bugs(&mut self, value: f64, env: &dyn OperationEnvironment) -> bool {
        self.put_setting(env, |s| s.compare_bugs(value), |d, env| d.put_bugs(value, env), |s| s.bugs = Some(value))
    }

    pub fn put_ballast(&mut self, fraction: f64, overload: f64, env: &dyn OperationEnvironment) -> bool {
        self.put_setting(
            env,
            |s| s.compare_ballast(fraction, overload),
            |d, env| d.put_ballast(fraction, overload, env),
            |s| {
                s.ballast_fraction = Some(fraction);
                s.ballast_overload = Some(overload);
            },
        )
    }

    pub fn put_volume(&mut self, volume: u32, env: &dyn OperationEnvironment) -> bool {
        self.put_setting(
            env,
            |s| s.compare_volume(volume),
            |d, env| d.put_volume(volume, env),
            |s| s.volume = Some(volume),
        )
    }

    pub fn put_qnh(&mut self, hpa: f64, env: &dyn OperationEnvironment) -> bool {
        self.put_setting(env, |s| s.compare_qnh(hpa), |d, env| d.put_qnh(hpa, env), |s| s.qnh = Some(hpa))
    }

    pub fn put_active_frequency(&mut self, frequency: RadioFrequency, name: &str, env: &dyn OperationEnvironment) -> bool {
        self.put_setting(
            env,
            |s| s.active_frequency == Some(frequency),
            |d, env| d.put_active_frequency(frequency, name, env),
            |s| s.active_frequency = Some(frequency),
        )
    }

    pub fn put_standby_frequency(
        &mut self,
        frequency: RadioFrequency,
        name: &str,
        env: &dyn OperationEnvironment,
    ) -> bool {
        self.put_setting(
            env,
            |s| s.standby_frequency == Some(frequency),
            |d, env| d.put_standby_frequency(frequency, name, env),
            |s| s.standby_frequency = Some(frequency),
        )
    }

    /// Pilot events are not settings: they are sent every time.
    pub fn put_pilot_event(&mut self, env: &dyn OperationEnvironment) -> bool {
        self.put_setting(env, |_| false, |d, env| d.put_pilot_event(env), |_| {})
    }

    pub fn on_sensor_update(&mut self, basic: &NmeaInfo) {
        if self.is_occupied() {
            return;
        }
        if let Some(driver) = self.shared.lock().driver.as_mut() {
            driver.on_sensor_update(basic);
        }
    }

    pub fn on_calculated_update(&mut self, basic: &NmeaInfo, calculated: &DerivedInfo) {
        if self.is_occupied() {
            return;
        }
        if let Some(driver) = self.shared.lock().driver.as_mut() {
            driver.on_calculated_update(basic, calculated);
        }
    }

    pub fn is_dump_enabled(&self) -> bool { self.shared.lock().port.as_ref().is_some_and(|p| p.is_enabled()) }

    pub fn disable_dump(&self) {
        if let Some(port) = &self.shared.lock().port {
            port.disable();
        }
    }

    pub fn enable_dump_temporarily(&self, duration: Duration) {
        if let Some(port) = &self.shared.lock().port {
            port.enable_temporarily(duration);
        }
    }
}

impl Drop for DeviceSlot {
    fn drop(&mut self) { self.close(); }
}
