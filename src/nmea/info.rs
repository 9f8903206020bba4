use super::ExternalSettings;
use crate::util::Validity;
use chrono::{NaiveDate, NaiveTime};
use tokio::time::{Duration, Instant};

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self { Self { latitude, longitude } }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0
    }
}

/// Everything one device has told us so far.
///
/// Lives on the [`DeviceBlackboard`](crate::device::DeviceBlackboard), one record per
/// slot. Optional fields are `None` until the device (or a sensor) provided them.
#[derive(Debug, Clone, Default)]
pub struct NmeaInfo {
    /// Time of the last modification.
    pub clock: Option<Instant>,
    /// Updated whenever a line or sensor event was understood.
    pub alive: Validity,
    pub location: Option<GeoPoint>,
    pub location_available: Validity,
    /// Ground speed in m/s.
    pub ground_speed: Option<f64>,
    /// Track over ground in degrees.
    pub track: Option<f64>,
    /// GPS altitude above MSL in m.
    pub gps_altitude: Option<f64>,
    /// Barometric altitude in m as reported by the instrument.
    pub baro_altitude: Option<f64>,
    /// Altitude derived from the filtered static pressure (ISA) in m.
    pub pressure_altitude: Option<f64>,
    /// Static pressure in hPa.
    pub static_pressure: Option<f64>,
    /// Dynamic (pitot) pressure in hPa.
    pub dynamic_pressure: Option<f64>,
    /// Total-energy probe pressure in hPa.
    pub te_pressure: Option<f64>,
    /// Vertical speed in m/s derived from the static pressure.
    pub noncomp_vario: Option<f64>,
    /// Total-energy compensated vertical speed in m/s.
    pub total_energy_vario: Option<f64>,
    pub satellites_used: Option<u32>,
    pub fix_quality: Option<u8>,
    pub utc_time: Option<NaiveTime>,
    pub utc_date: Option<NaiveDate>,
    /// Supply voltage in V.
    pub voltage: Option<f64>,
    /// Outside air temperature in °C.
    pub temperature: Option<f64>,
    pub heart_rate: Option<u32>,
    /// Acceleration magnitude in g.
    pub g_load: Option<f64>,
    /// Settings the device reported that are not mere echoes.
    pub settings: ExternalSettings,
}

impl NmeaInfo {
    /// Age after which a device without new data counts as gone.
    pub const ALIVE_TIMEOUT: Duration = Duration::from_secs(10);
    /// Age after which a position is discarded.
    pub const LOCATION_TIMEOUT: Duration = Duration::from_secs(10);

    /// Marks the record as modified at `now`.
    pub fn update_clock(&mut self, now: Instant) { self.clock = Some(now); }

    /// `true` if the device delivered something understood within `timeout`.
    pub fn is_alive(&self, now: Instant, timeout: Duration) -> bool {
        self.alive.is_fresh(now, timeout)
    }

    pub fn provide_location(&mut self, now: Instant, location: GeoPoint) {
        self.location = Some(location);
        self.location_available.update(now);
    }

    /// Drops values that are too old to be trusted.
    pub fn expire(&mut self, now: Instant) {
        self.alive.expire(now, Self::ALIVE_TIMEOUT);
        self.location_available.expire(now, Self::LOCATION_TIMEOUT);
        if !self.location_available.is_valid() {
            self.location = None;
        }
    }

    /// Resets the record to "nothing known", used when a device is closed.
    pub fn reset(&mut self) { *self = Self::default(); }
}

/// Values computed by the flight computer that some drivers send back to their
/// instrument (e.g. a vario display showing the glide ratio).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedInfo {
    pub glide_ratio: Option<f64>,
    /// Average climb rate in m/s.
    pub average_climb: Option<f64>,
    /// MacCready value in use in m/s.
    pub mac_cready: f64,
    /// Netto vario in m/s.
    pub netto_vario: Option<f64>,
}
