use super::slot_state::StateInputs;
use super::*;
use crate::config::{AppConfig, DeviceConfig, PortType};
use crate::driver::{Declaration, Driver, DriverCapabilities, DriverRegister, DriverRegistry, Waypoint};
use crate::job::{NullOperationEnvironment, OperationEnvironment};
use crate::nmea::{DerivedInfo, GeoPoint, NmeaInfo, append_checksum};
use crate::port::{SimLink, SimPortHub};
use crate::sensor::{SensorEvent, SensorHub};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;

const RMC: &str = "GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W";
const REOPEN_DELAY: Duration = Duration::from_millis(300);

fn line(body: &str) -> String { format!("{}\r\n", append_checksum(body)) }

struct Harness {
    list: DeviceList,
    events: UnboundedReceiver<MainEvent>,
    sims: SimPortHub,
    sensors: SensorHub,
}

impl Harness {
    fn new(devices: Vec<DeviceConfig>) -> Self { Self::with_registry(devices, DriverRegistry::builtin()) }

    fn with_registry(devices: Vec<DeviceConfig>, registry: DriverRegistry) -> Self {
        let config = AppConfig { devices, ..AppConfig::default() };
        let sims = SimPortHub::new();
        let sensors = SensorHub::new();
        let (context, events) = SlotContext::new(Handle::current(), &config);
        let context = context
            .with_registry(registry)
            .with_sim_ports(sims.clone())
            .with_sensor_hub(sensors.clone())
            .with_reopen_delay(REOPEN_DELAY);
        Self { list: DeviceList::new(&config, context), events, sims, sensors }
    }

    fn link(&self, name: &str) -> Arc<SimLink> { self.sims.link(name) }
    fn slot(&self, index: usize) -> &DeviceSlot { &self.list.slots()[index] }
    fn slot_mut(&mut self, index: usize) -> &mut DeviceSlot { self.list.slot_mut(index).unwrap() }

    /// Applies queued events until `done` holds.
    async fn until(&mut self, what: &str, done: impl Fn(&DeviceList) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            self.list.handle_pending(&mut self.events);
            if done(&self.list) {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            sleep(Duration::from_millis(10)).await;
        }
    }

    async fn ready(&mut self, index: usize) {
        self.until("ready", |list| list.slots()[index].state() == SlotState::Ready).await;
    }

    async fn idle(&mut self, index: usize) {
        self.until("open job", |list| !list.slots()[index].is_occupied()).await;
    }
}

fn declaration() -> Declaration {
    Declaration {
        pilot_name: String::from("Jane Doe"),
        aircraft_type: String::from("LS8"),
        aircraft_registration: String::from("D-1234"),
        competition_id: String::from("XY"),
        turnpoints: vec![
            Waypoint { name: String::from("Start"), location: GeoPoint::new(48.1, 11.5), elevation: 500.0 },
            Waypoint { name: String::from("Finish"), location: GeoPoint::new(48.3, 11.7), elevation: 480.0 },
        ],
    }
}

#[test]
fn test_state_is_derived_from_inputs() {
    let base = StateInputs {
        available: true,
        job_running: false,
        port_failed: None,
        sensor_open: false,
        sensor_failed: false,
        failed: false,
    };
    assert_eq!(SlotState::derive(base), SlotState::NotOpen);
    assert_eq!(SlotState::derive(StateInputs { available: false, job_running: true, ..base }), SlotState::Disabled);
    assert_eq!(SlotState::derive(StateInputs { job_running: true, failed: true, ..base }), SlotState::Opening);
    assert_eq!(SlotState::derive(StateInputs { port_failed: Some(false), ..base }), SlotState::Ready);
    assert_eq!(SlotState::derive(StateInputs { port_failed: Some(true), ..base }), SlotState::Failed);
    assert_eq!(SlotState::derive(StateInputs { sensor_open: true, ..base }), SlotState::Ready);
    assert_eq!(SlotState::derive(StateInputs { sensor_open: true, sensor_failed: true, ..base }), SlotState::Failed);
    assert_eq!(SlotState::derive(StateInputs { failed: true, ..base }), SlotState::Failed);
    // the same inputs always give the same state
    assert_eq!(SlotState::derive(base), SlotState::derive(base));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_open_delivers_data_to_blackboard() {
    let mut h = Harness::new(vec![DeviceConfig::simulated("gps", "generic")]);
    let env = NullOperationEnvironment;
    assert_eq!(h.slot(0).state(), SlotState::NotOpen);
    h.list.open_all(&env);
    assert_eq!(h.slot(0).state(), SlotState::Opening);
    h.ready(0).await;
    assert!(h.slot(0).is_open());
    assert_eq!(h.slot(0).display_name(), "Generic NMEA");
    assert!(!h.slot(0).is_alive());

    let link = h.link("gps");
    assert!(link.inject(line(RMC).as_bytes()));
    let data = h.slot(0).data();
    let location = data.location.unwrap();
    assert!((location.latitude - 48.1173).abs() < 1e-4);
    assert!(h.slot(0).is_alive());
    assert_eq!(h.list.context().blackboard().real_state(0).location, Some(location));

    // broken lines are dropped without touching the record
    assert!(link.inject(b"$GPRMC,garbage*00\r\n"));
    assert_eq!(h.slot(0).data().location, Some(location));

    h.list.close_all();
    assert_eq!(h.slot(0).state(), SlotState::NotOpen);
    assert!(h.slot(0).data().location.is_none());
    assert!(!link.is_attached());
    assert!(!h.slot(0).should_reopen());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_non_ascii_line_keeps_slot_ready() {
    let mut h = Harness::new(vec![DeviceConfig::simulated("noisy", "generic")]);
    let env = NullOperationEnvironment;
    h.list.open_all(&env);
    h.ready(0).await;

    let link = h.link("noisy");
    assert!(link.inject(line("GéRMC,1").as_bytes()));
    assert!(link.inject(b"$G\xff\xfeRMC,1*00\r\n"));
    assert_eq!(h.slot(0).state(), SlotState::Ready);
    assert!(h.slot(0).data().location.is_none());

    assert!(link.inject(line(RMC).as_bytes()));
    assert!(h.slot(0).data().location.is_some());
    assert!(h.slot(0).is_alive());
    h.list.close_all();
    assert_eq!(h.slot(0).state(), SlotState::NotOpen);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calculated_update_reaches_blackboard_and_driver() {
    let mut h = Harness::new(vec![DeviceConfig::simulated("display", "pvar")]);
    let env = NullOperationEnvironment;
    let link = h.link("display");
    h.list.open_all(&env);
    h.ready(0).await;
    link.clear_written();

    let calculated = DerivedInfo { glide_ratio: Some(38.0), mac_cready: 1.5, ..DerivedInfo::default() };
    h.list.notify_calculated_update(&NmeaInfo::default(), &calculated);
    assert_eq!(h.list.context().blackboard().calculated(), calculated);
    assert_eq!(link.written_string(), line("PVAR,CALC,1.5,38"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_open_is_idempotent() {
    let mut h = Harness::new(vec![DeviceConfig::simulated("limbo", "generic")]);
    let env = NullOperationEnvironment;
    let link = h.link("limbo");
    link.set_limbo(true);

    h.slot_mut(0).open(&env);
    let job = h.slot(0).job_id();
    h.until("port attempt", |_| link.open_count() == 1).await;
    h.slot_mut(0).open(&env);
    h.slot_mut(0).open(&env);
    assert_eq!(h.slot(0).job_id(), job);
    assert_eq!(h.slot(0).state(), SlotState::Opening);

    link.set_limbo(false);
    h.ready(0).await;
    h.slot_mut(0).open(&env);
    assert_eq!(h.slot(0).state(), SlotState::Ready);
    assert!(h.slot(0).job_id().is_none());
    assert_eq!(link.open_count(), 1);

    // a changed configuration replaces the open device
    let mut config = h.slot(0).config().clone();
    config.ignore_checksum = true;
    h.slot_mut(0).set_config(config);
    h.slot_mut(0).open(&env);
    assert_eq!(h.slot(0).state(), SlotState::Opening);
    h.ready(0).await;
    assert_eq!(link.open_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_during_open_does_not_resurrect() {
    let mut h = Harness::new(vec![DeviceConfig::simulated("slow", "generic")]);
    let env = NullOperationEnvironment;
    let link = h.link("slow");
    link.set_limbo(true);

    h.slot_mut(0).open(&env);
    h.until("port attempt", |_| link.open_count() == 1).await;
    h.slot_mut(0).close();
    assert_eq!(h.slot(0).state(), SlotState::NotOpen);
    link.set_limbo(false);

    sleep(Duration::from_millis(500)).await;
    h.list.handle_pending(&mut h.events);
    assert_eq!(h.slot(0).state(), SlotState::NotOpen);
    assert!(!h.slot(0).is_open());
    assert!(!link.is_attached());
    assert_eq!(h.slot(0).failure_count(), 0);
    assert!(h.slot(0).error_message().is_none());

    h.slot_mut(0).open(&env);
    h.ready(0).await;
    assert_eq!(link.open_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_open_backs_off_and_counts() {
    let mut h = Harness::new(vec![DeviceConfig::simulated("refusing", "generic")]);
    let env = NullOperationEnvironment;
    let link = h.link("refusing");
    link.set_fail_open(true);

    h.slot_mut(0).open(&env);
    h.idle(0).await;
    assert_eq!(h.slot(0).state(), SlotState::Failed);
    assert_eq!(h.slot(0).failure_count(), 1);
    assert!(h.slot(0).error_message().unwrap().contains("link refused"));
    assert!(h.slot(0).has_port_failed());
    assert!(h.slot(0).should_reopen());

    // the reopen clock was started by the open
    h.slot_mut(0).auto_reopen(&env);
    assert!(!h.slot(0).is_occupied());
    assert_eq!(link.open_count(), 1);

    sleep(REOPEN_DELAY + Duration::from_millis(50)).await;
    h.slot_mut(0).auto_reopen(&env);
    assert!(h.slot(0).is_occupied());
    h.idle(0).await;
    assert_eq!(h.slot(0).failure_count(), 2);
    assert_eq!(link.open_count(), 2);

    link.set_fail_open(false);
    h.slot_mut(0).open(&env);
    assert_eq!(h.slot(0).failure_count(), 0);
    assert!(h.slot(0).error_message().is_none());
    h.ready(0).await;
    assert!(!h.slot(0).has_port_failed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_serial_port_keeps_failing() {
    let mut h = Harness::new(vec![DeviceConfig::serial("/dev/does-not-exist", 4800, "generic")]);
    let env = NullOperationEnvironment;
    h.list.open_all(&env);
    for attempt in 1..=3 {
        h.idle(0).await;
        assert_eq!(h.slot(0).state(), SlotState::Failed);
        assert_eq!(h.slot(0).failure_count(), attempt);
        assert!(h.slot(0).error_message().is_some_and(|e| e.contains("/dev/does-not-exist")));
        sleep(REOPEN_DELAY + Duration::from_millis(50)).await;
        h.list.tick(&env);
    }
    h.list.close_all();
    assert_eq!(h.slot(0).state(), SlotState::NotOpen);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_borrow_rules_and_declaration() {
    let mut h = Harness::new(vec![DeviceConfig::simulated("logger", "pvar")]);
    let env = NullOperationEnvironment;
    let link = h.link("logger");

    h.list.open_all(&env);
    assert_eq!(h.list.borrow(0).err(), Some(BorrowError::Occupied));
    h.ready(0).await;
    assert!(link.written_string().contains("PVAR,HELLO"));
    assert!(h.slot(0).can_declare() && h.slot(0).is_logger());
    assert!(h.slot(0).can_borrow());

    let token = h.list.borrow(0).unwrap();
    assert!(h.slot(0).is_borrowed() && h.slot(0).is_occupied());
    assert_eq!(h.list.borrow(0).err(), Some(BorrowError::Occupied));
    assert!(!h.slot_mut(0).put_mac_cready(2.0, &env));

    // with the receive path stopped the answer waits for the driver
    link.inject(line("PVAR,DECL,OK").as_bytes());
    assert!(h.slot(0).data().settings.is_empty());
    let (token, result) = tokio::task::spawn_blocking(move || {
        let mut token = token;
        let result = token.declare(&declaration(), &NullOperationEnvironment);
        (token, result)
    })
    .await
    .unwrap();
    result.unwrap();
    assert!(link.written_string().contains(&line("PVAR,DECL,END")));

    assert!(h.list.give_back(token, &env));
    assert!(!h.slot(0).is_borrowed());
    assert!(link.written_string().ends_with(&line("PVAR,NMEA")));
    assert!(h.slot(0).can_borrow());

    // a token outliving its device is not reinstalled
    let token = h.list.borrow(0).unwrap();
    h.slot_mut(0).close();
    assert!(!h.list.give_back(token, &env));
    assert!(!h.slot(0).is_borrowed());
    assert_eq!(h.list.borrow(0).err(), Some(BorrowError::NotReady));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_settings_echo_is_suppressed() {
    let mut h = Harness::new(vec![DeviceConfig::simulated("vario", "pvar")]);
    let env = NullOperationEnvironment;
    let link = h.link("vario");
    h.list.open_all(&env);
    h.ready(0).await;
    link.clear_written();

    assert!(h.slot_mut(0).put_mac_cready(1.5, &env));
    assert_eq!(link.written_string(), line("PVAR,SET,MC,1.5"));
    assert_eq!(h.slot(0).settings_sent().mac_cready, Some(1.5));
    link.clear_written();
    assert!(h.slot_mut(0).put_mac_cready(1.5, &env));
    assert!(link.written().is_empty());
    assert!(!h.slot_mut(0).put_volume(11, &env));
    assert_eq!(h.slot(0).settings_sent().volume, None);

    link.inject(line("PVAR,S,1.5,,,,").as_bytes());
    assert!(h.events.try_recv().is_err());
    assert_eq!(h.slot(0).data().settings.mac_cready, None);
    assert_eq!(h.slot(0).settings_received().mac_cready, Some(1.5));

    link.inject(line("PVAR,S,2.0,,,,").as_bytes());
    assert_eq!(h.events.try_recv().ok(), Some(MainEvent::SettingsReceived { slot: 0 }));
    assert_eq!(h.slot(0).data().settings.mac_cready, Some(2.0));

    // repeating the instrument's own value is not a change either
    link.inject(line("PVAR,S,2.0,,,,").as_bytes());
    assert!(h.events.try_recv().is_err());
    assert_eq!(h.slot(0).data().settings.mac_cready, Some(2.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_settings_are_not_synced_when_disabled() {
    let mut config = DeviceConfig::simulated("quiet", "pvar");
    config.sync_to_device = false;
    config.sync_from_device = false;
    let mut h = Harness::new(vec![config]);
    let env = NullOperationEnvironment;
    let link = h.link("quiet");
    assert!(!h.slot_mut(0).put_qnh(1013.0, &env));
    h.list.open_all(&env);
    h.ready(0).await;
    link.clear_written();

    assert!(h.slot_mut(0).put_qnh(1020.0, &env));
    assert!(link.written().is_empty());
    link.inject(line("PVAR,S,3.0,,,,").as_bytes());
    assert!(h.events.try_recv().is_err());
    assert_eq!(h.slot(0).data().settings.mac_cready, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lines_are_repeated_to_nmea_outputs() {
    let mut h = Harness::new(vec![
        DeviceConfig::simulated("gps", "generic"),
        DeviceConfig::simulated("display", "nmea-out"),
        DeviceConfig::simulated("other", "generic"),
    ]);
    let env = NullOperationEnvironment;
    h.list.open_all(&env);
    for index in 0..3 {
        h.ready(index).await;
    }
    assert!(h.slot(1).is_nmea_out());
    assert!(!h.slot(0).is_nmea_out());

    let (gps, display, other) = (h.link("gps"), h.link("display"), h.link("other"));
    gps.inject(line(RMC).as_bytes());
    assert_eq!(display.written_string(), line(RMC));
    assert!(other.written().is_empty());
    assert!(gps.written().is_empty());

    assert!(h.slot(1).write_nmea("$PFLAU,0", &env));
    assert!(!h.slot(0).write_nmea("$PFLAU,0", &env));
    assert!(display.written_string().ends_with("$PFLAU,0\r\n"));

    h.slot_mut(1).close();
    gps.inject(line(RMC).as_bytes());
    assert_eq!(h.list.dispatcher().forward(0, "$PFLAU,0"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_link_failure_closes_and_reopens() {
    let mut h = Harness::new(vec![DeviceConfig::simulated("cable", "generic")]);
    let env = NullOperationEnvironment;
    let link = h.link("cable");
    h.list.open_all(&env);
    h.ready(0).await;

    link.fail();
    assert_eq!(h.slot(0).state(), SlotState::Failed);
    assert_eq!(
        h.events.try_recv().ok(),
        Some(MainEvent::PortError { slot: 0, message: String::from("simulated link failure") })
    );

    h.slot_mut(0).on_sys_ticker(&env);
    assert!(!h.slot(0).is_open());
    assert_eq!(h.slot(0).state(), SlotState::Failed);
    assert!(h.slot(0).has_port_failed());
    assert_eq!(h.slot(0).error_message().as_deref(), Some("simulated link failure"));

    sleep(REOPEN_DELAY + Duration::from_millis(50)).await;
    h.list.tick(&env);
    assert!(h.slot(0).is_occupied());
    h.ready(0).await;
    assert_eq!(link.open_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sensor_slot_fuses_and_fails() {
    let mut h = Harness::new(vec![DeviceConfig::with_port_type(PortType::Internal)]);
    let env = NullOperationEnvironment;
    h.list.open_all(&env);
    h.ready(0).await;
    assert_eq!(h.sensors.subscriber_count(), 1);

    h.sensors.publish(SensorEvent::BarometricPressure { pressure_hpa: 1013.25, sensor_noise_variance: 0.05 });
    h.until("pressure", |list| list.slots()[0].data().static_pressure.is_some()).await;
    assert!(h.slot(0).data().pressure_altitude.unwrap().abs() < 1.0);

    // bus events do not reach the built-in sensors
    h.sensors.publish(SensorEvent::Vario(2.5));
    h.sensors.publish(SensorEvent::HeartRate(90));
    h.until("heart rate", |list| list.slots()[0].data().heart_rate == Some(90)).await;
    assert_eq!(h.slot(0).data().total_energy_vario, None);

    h.sensors.publish(SensorEvent::Error(String::from("barometer gone")));
    h.until("sensor failure", |list| list.slots()[0].state() == SlotState::Failed).await;
    h.slot_mut(0).on_sys_ticker(&env);
    assert!(!h.slot(0).is_open());
    assert_eq!(h.slot(0).state(), SlotState::Failed);
    assert_eq!(h.slot(0).error_message().as_deref(), Some("barometer gone"));
    assert!(h.slot(0).should_reopen());
}

struct RawDriver;

impl Driver for RawDriver {
    fn data_received(&mut self, data: &[u8], info: &mut NmeaInfo) -> bool {
        match data.first() {
            Some(&bpm) => {
                info.heart_rate = Some(u32::from(bpm));
                true
            }
            None => false,
        }
    }
}

struct CrashingDriver;

impl Driver for CrashingDriver {
    fn open(&mut self, _env: &dyn OperationEnvironment) -> Result<(), crate::driver::DriverError> {
        panic!("handshake exploded")
    }
}

static TICKS: AtomicUsize = AtomicUsize::new(0);
static TIMEOUTS: AtomicUsize = AtomicUsize::new(0);

struct TickingDriver;

impl Driver for TickingDriver {
    fn link_timeout(&mut self) { TIMEOUTS.fetch_add(1, Ordering::SeqCst); }
    fn on_sys_ticker(&mut self) { TICKS.fetch_add(1, Ordering::SeqCst); }
}

fn test_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::builtin();
    registry.register(DriverRegister {
        name: "raw",
        display_name: "Raw bytes",
        capabilities: DriverCapabilities { binary: true, ..DriverCapabilities::default() },
        link_timeout: NmeaInfo::ALIVE_TIMEOUT,
        factory: |_| Box::new(RawDriver),
    });
    registry.register(DriverRegister {
        name: "crashing",
        display_name: "Crashing",
        capabilities: DriverCapabilities::default(),
        link_timeout: NmeaInfo::ALIVE_TIMEOUT,
        factory: |_| Box::new(CrashingDriver),
    });
    registry.register(DriverRegister {
        name: "ticking",
        display_name: "Ticking",
        capabilities: DriverCapabilities::default(),
        link_timeout: Duration::from_millis(100),
        factory: |_| Box::new(TickingDriver),
    });
    registry
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_driver_sees_raw_bytes() {
    let mut h = Harness::with_registry(vec![DeviceConfig::simulated("raw", "raw")], test_registry());
    let env = NullOperationEnvironment;
    h.list.open_all(&env);
    h.ready(0).await;
    h.link("raw").inject(&[72, 0, 13]);
    assert_eq!(h.slot(0).data().heart_rate, Some(72));
    assert!(h.slot(0).is_alive());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_driver_panic_becomes_failure() {
    let mut h = Harness::with_registry(vec![DeviceConfig::simulated("boom", "crashing")], test_registry());
    let env = NullOperationEnvironment;
    h.list.open_all(&env);
    h.idle(0).await;
    assert_eq!(h.slot(0).state(), SlotState::Failed);
    assert_eq!(h.slot(0).failure_count(), 1);
    assert!(h.slot(0).error_message().unwrap().contains("crashed"));
    assert!(!h.link("boom").is_attached());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ticker_is_halved_and_detects_link_timeout() {
    let mut h = Harness::with_registry(vec![DeviceConfig::simulated("tick", "ticking")], test_registry());
    let env = NullOperationEnvironment;
    h.list.open_all(&env);
    h.ready(0).await;

    // silent devices are not ticked
    h.slot_mut(0).on_sys_ticker(&env);
    assert_eq!(TICKS.load(Ordering::SeqCst), 0);

    h.link("tick").inject(line(RMC).as_bytes());
    for _ in 0..4 {
        h.slot_mut(0).on_sys_ticker(&env);
    }
    assert_eq!(TICKS.load(Ordering::SeqCst), 2);
    assert_eq!(TIMEOUTS.load(Ordering::SeqCst), 0);

    sleep(Duration::from_millis(150)).await;
    assert!(!h.slot(0).is_alive());
    h.slot_mut(0).on_sys_ticker(&env);
    h.slot_mut(0).on_sys_ticker(&env);
    assert_eq!(TIMEOUTS.load(Ordering::SeqCst), 1);
    assert_eq!(TICKS.load(Ordering::SeqCst), 2);
    // simulated links are not reopened on silence
    assert!(!h.slot(0).should_reopen());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clear_config_disables_slot() {
    let mut h = Harness::new(vec![DeviceConfig::simulated("gone", "generic")]);
    let env = NullOperationEnvironment;
    h.list.open_all(&env);
    h.ready(0).await;
    h.slot_mut(0).clear_config();
    assert_eq!(h.slot(0).state(), SlotState::Disabled);
    assert!(!h.link("gone").is_attached());
    h.slot_mut(0).open(&env);
    assert!(!h.slot(0).is_occupied());

    assert!(h.list.set_config(0, DeviceConfig::simulated("back", "generic"), &env));
    h.ready(0).await;
    assert!(h.link("back").is_attached());
    assert!(!h.list.set_config(7, DeviceConfig::default(), &env));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_until_shutdown() {
    let h = Harness::new(vec![DeviceConfig::simulated("loop", "generic")]);
    let env = NullOperationEnvironment;
    let link = h.link("loop");
    let Harness { mut list, events, .. } = h;
    list.open_all(&env);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    let watched = Arc::clone(&link);
    tokio::spawn(async move {
        while !watched.is_attached() {
            sleep(Duration::from_millis(10)).await;
        }
        sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });
    tokio::time::timeout(Duration::from_secs(5), list.run(events, shutdown)).await.unwrap();
    assert_eq!(list.slots()[0].state(), SlotState::NotOpen);
    assert!(!link.is_attached());
    assert_eq!(link.open_count(), 1);
}
