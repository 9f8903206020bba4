use super::{Driver, GenericDriver, NmeaOutDriver, PvarDriver};
use crate::config::DeviceConfig;
use crate::nmea::NmeaInfo;
use crate::port::Port;
use std::sync::{Arc, LazyLock};
use tokio::time::Duration;

/// What a driver can do, fixed per driver type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverCapabilities {
    /// Receives the lines of all other devices.
    pub nmea_out: bool,
    pub declare: bool,
    pub logger: bool,
    /// Offers a management dialog.
    pub manage: bool,
    /// Wants raw bytes instead of lines.
    pub binary: bool,
    /// Survives being reopened when the device goes silent.
    pub reopen_on_timeout: bool,
}

/// Everything a driver gets at creation.
pub struct DriverContext {
    /// Port to write to, wrapped by the traffic dump.
    pub port: Arc<dyn Port>,
    pub config: DeviceConfig,
}

pub type DriverFactory = fn(&DriverContext) -> Box<dyn Driver>;

/// Static description of a driver type.
#[derive(Debug, Clone, Copy)]
pub struct DriverRegister {
    pub name: &'static str,
    pub display_name: &'static str,
    pub capabilities: DriverCapabilities,
    /// Silence after which the device counts as gone.
    pub link_timeout: Duration,
    pub factory: DriverFactory,
}

impl DriverRegister {
    pub fn create(&self, context: &DriverContext) -> Box<dyn Driver> { (self.factory)(context) }
}

/// Name-keyed set of [`DriverRegister`]s.
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    drivers: Vec<DriverRegister>,
}

impl DriverRegistry {
    /// The drivers shipped with the crate.
    pub fn builtin() -> Self {
        let standard = DriverCapabilities { reopen_on_timeout: true, ..DriverCapabilities::default() };
        Self {
            drivers: vec![
                DriverRegister {
                    name: "generic",
                    display_name: "Generic NMEA",
                    capabilities: standard,
                    link_timeout: NmeaInfo::ALIVE_TIMEOUT,
                    factory: |_| Box::new(GenericDriver),
                },
                DriverRegister {
                    name: "nmea-out",
                    display_name: "NMEA output",
                    capabilities: DriverCapabilities { nmea_out: true, ..DriverCapabilities::default() },
                    link_timeout: NmeaInfo::ALIVE_TIMEOUT,
                    factory: |_| Box::new(NmeaOutDriver),
                },
                DriverRegister {
                    name: "pvar",
                    display_name: "PVAR vario",
                    capabilities: DriverCapabilities { declare: true, logger: true, ..standard },
                    link_timeout: Duration::from_secs(5),
                    factory: |context| Box::new(PvarDriver::new(Arc::clone(&context.port))),
                },
            ],
        }
    }

    /// Adds or replaces a driver type.
    pub fn register(&mut self, register: DriverRegister) {
        self.drivers.retain(|d| d.name != register.name);
        self.drivers.push(register);
    }

    pub fn find(&self, name: &str) -> Option<&DriverRegister> { self.drivers.iter().find(|d| d.name == name) }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ { self.drivers.iter().map(|d| d.name) }
}

static BUILTIN: LazyLock<DriverRegistry> = LazyLock::new(DriverRegistry::builtin);

/// Looks up a builtin driver.
pub fn find(name: &str) -> Option<&'static DriverRegister> { BUILTIN.find(name) }
