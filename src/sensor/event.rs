use crate::nmea::GeoPoint;
use chrono::{DateTime, Utc};

/// Which family of sensors produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SensorSource {
    /// Sensors built into the host (GPS, barometer, accelerometer).
    Internal,
    /// External I2C/IOIO style sensor bus.
    SensorBus,
    /// Connection level events accepted from both.
    Any,
}

/// One sample or state change from a sensor.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    /// The GPS changed its connection state (0 = off, 1 = waiting for fix, 2 = fix).
    Connected(i32),
    Location {
        time: DateTime<Utc>,
        satellites: u32,
        location: GeoPoint,
        /// GPS altitude in m.
        altitude: Option<f64>,
        /// Track in degrees.
        bearing: Option<f64>,
        /// Ground speed in m/s.
        speed: Option<f64>,
    },
    /// Acceleration in m/s² per axis.
    Acceleration { x: f64, y: f64, z: f64 },
    /// Angular rate in rad/s per axis.
    Rotation { x: f64, y: f64, z: f64 },
    /// Magnetic field in µT per axis.
    MagneticField { x: f64, y: f64, z: f64 },
    /// Raw static pressure from the host barometer.
    BarometricPressure { pressure_hpa: f64, sensor_noise_variance: f64 },
    /// Pressure altitude in m computed by the sensor itself.
    PressureAltitude(f64),
    /// Pressure sample from a barometer on the sensor bus.
    SensorBusBaro { index: u32, sensor_type: i32, pressure_hpa: f64 },
    /// Total-energy vario in m/s.
    Vario(f64),
    HeartRate(u32),
    /// Raw ADC readings from the sensor bus. `temperature_adc` is negative when the
    /// sensor has no thermometer.
    Voltage { temperature_adc: i32, channel: usize, voltage_adc: i32 },
    /// The sensor stack changed state, the device list should refresh.
    StateChanged,
    /// The sensor stack failed, the slot must be closed.
    Error(String),
}

impl SensorEvent {
    /// The sensor family this event comes from.
    pub fn source(&self) -> SensorSource {
        match self {
            Self::Connected(_)
            | Self::Location { .. }
            | Self::Acceleration { .. }
            | Self::Rotation { .. }
            | Self::MagneticField { .. }
            | Self::BarometricPressure { .. }
            | Self::PressureAltitude(_)
            | Self::HeartRate(_) => SensorSource::Internal,
            Self::SensorBusBaro { .. } | Self::Vario(_) | Self::Voltage { .. } => SensorSource::SensorBus,
            Self::StateChanged | Self::Error(_) => SensorSource::Any,
        }
    }

    /// `true` if a subscriber of `source` should see this event.
    pub fn is_for(&self, source: SensorSource) -> bool {
        let own = self.source();
        own == SensorSource::Any || source == SensorSource::Any || own == source
    }
}
