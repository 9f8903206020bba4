use super::{KalmanParams, SelfTimingKalmanFilter1d, WindowFilter};
use crate::nmea::NmeaInfo;
use crate::sensor::SensorEvent;
use tokio::time::Instant;

/// Standard gravity in m/s².
const GRAVITY: f64 = 9.81;
/// Measurement variance assumed for sensor-bus barometers, which do not report one.
const BUS_BARO_NOISE_VARIANCE: f64 = 0.05;
/// Sensor type code of the BMP085 barometer.
const BMP085: i32 = 85;
/// Number of voltage channels a sensor bus reports.
const VOLTAGE_CHANNELS: usize = 1;
/// ISA sea level pressure in hPa.
const ISA_SEA_LEVEL_HPA: f64 = 1013.25;

/// Converts a static pressure in hPa to an altitude in m in the standard atmosphere.
pub fn pressure_to_altitude(pressure_hpa: f64) -> f64 {
    44330.8 * (1.0 - (pressure_hpa / ISA_SEA_LEVEL_HPA).powf(0.190_263))
}

/// What a barometer on the sensor bus is connected to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    serde::Serialize,
    serde::Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum PressureUse {
    #[default]
    Static,
    Pitot,
    TekProbe,
}

/// Linear calibration of the voltage ADC: `volts = offset + factor * adc`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageCalibration {
    pub offset: f64,
    pub factor: f64,
}

impl Default for VoltageCalibration {
    fn default() -> Self { Self { offset: 0.0, factor: 1.0 } }
}

/// Kalman parameter sets, overridable in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub phone_baro: KalmanParams,
    pub bus_baro: KalmanParams,
    pub bus_baro_bmp085: KalmanParams,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            phone_baro: KalmanParams::PHONE_BARO,
            bus_baro: KalmanParams::BUS_BARO,
            bus_baro_bmp085: KalmanParams::BUS_BARO_BMP085,
        }
    }
}

/// Per-slot state that turns raw [`SensorEvent`]s into [`NmeaInfo`] values.
#[derive(Debug, Clone)]
pub struct SensorFusion {
    config: FusionConfig,
    kalman: SelfTimingKalmanFilter1d,
    /// sensor type the bus Kalman filter is tuned for
    bus_sensor_type: Option<i32>,
    last_altitude: Option<(Instant, f64)>,
    pressure_use: PressureUse,
    pitot_offset: f64,
    calibration: VoltageCalibration,
    voltage_filters: [WindowFilter<16>; VOLTAGE_CHANNELS],
    temperature_filter: WindowFilter<64>,
}

impl SensorFusion {
    pub fn new(
        config: FusionConfig,
        pressure_use: PressureUse,
        pitot_offset: f64,
        calibration: VoltageCalibration,
    ) -> Self {
        Self {
            config,
            kalman: SelfTimingKalmanFilter1d::new(config.phone_baro),
            bus_sensor_type: None,
            last_altitude: None,
            pressure_use,
            pitot_offset,
            calibration,
            voltage_filters: std::array::from_fn(|_| WindowFilter::new()),
            temperature_filter: WindowFilter::new(),
        }
    }

    /// Fusion for host sensors, which only need the Kalman parameters.
    pub fn internal(config: FusionConfig) -> Self {
        Self::new(config, PressureUse::Static, 0.0, VoltageCalibration::default())
    }

    pub fn kalman(&self) -> &SelfTimingKalmanFilter1d { &self.kalman }

    /// Applies one event to `info`.
    ///
    /// # Arguments
    /// * `event` - the sensor sample
    /// * `info` - the slot's record on the blackboard
    /// * `now` - arrival time of the sample
    ///
    /// # Returns
    /// `true` if `info` changed and consumers should be notified
    pub fn apply(&mut self, event: &SensorEvent, info: &mut NmeaInfo, now: Instant) -> bool {
        match event {
            SensorEvent::Location { time, satellites, location, altitude, bearing, speed } => {
                info.utc_time = Some(time.time());
                info.utc_date = Some(time.date_naive());
                info.satellites_used = Some(*satellites);
                if location.is_valid() {
                    info.provide_location(now, *location);
                }
                info.gps_altitude = altitude.or(info.gps_altitude);
                info.track = bearing.or(info.track);
                info.ground_speed = speed.or(info.ground_speed);
            }
            SensorEvent::Acceleration { x, y, z } => {
                info.g_load = Some((x * x + y * y + z * z).sqrt() / GRAVITY);
            }
            SensorEvent::BarometricPressure { pressure_hpa, sensor_noise_variance } => {
                self.filter_static_pressure(*pressure_hpa, *sensor_noise_variance, info, now);
            }
            SensorEvent::PressureAltitude(altitude) => info.pressure_altitude = Some(*altitude),
            SensorEvent::SensorBusBaro { sensor_type, pressure_hpa, .. } => match self.pressure_use {
                PressureUse::Static => {
                    self.tune_bus_kalman(*sensor_type);
                    self.filter_static_pressure(*pressure_hpa, BUS_BARO_NOISE_VARIANCE, info, now);
                }
                PressureUse::Pitot => info.dynamic_pressure = Some((pressure_hpa - self.pitot_offset).max(0.0)),
                PressureUse::TekProbe => info.te_pressure = Some(*pressure_hpa),
            },
            SensorEvent::Vario(vario) => info.total_energy_vario = Some(*vario),
            SensorEvent::HeartRate(bpm) => info.heart_rate = Some(*bpm),
            SensorEvent::Voltage { temperature_adc, channel, voltage_adc } => {
                self.apply_voltage(*temperature_adc, *channel, *voltage_adc, info);
            }
            SensorEvent::Rotation { .. }
            | SensorEvent::MagneticField { .. }
            | SensorEvent::Connected(_)
            | SensorEvent::StateChanged
            | SensorEvent::Error(_) => return false,
        }
        info.alive.update(now);
        info.update_clock(now);
        true
    }

    fn tune_bus_kalman(&mut self, sensor_type: i32) {
        if self.bus_sensor_type == Some(sensor_type) {
            return;
        }
        let params =
            if sensor_type == BMP085 { self.config.bus_baro_bmp085 } else { self.config.bus_baro };
        self.kalman.set_params(params);
        self.bus_sensor_type = Some(sensor_type);
        self.last_altitude = None;
    }

    fn filter_static_pressure(&mut self, pressure_hpa: f64, variance: f64, info: &mut NmeaInfo, now: Instant) {
        self.kalman.update_at(pressure_hpa, variance, now);
        let pressure = self.kalman.estimate();
        let altitude = pressure_to_altitude(pressure);
        info.static_pressure = Some(pressure);
        info.pressure_altitude = Some(altitude);

        if let Some((last_time, last_altitude)) = self.last_altitude {
            let dt = now.saturating_duration_since(last_time).as_secs_f64();
            if dt > 0.0 && dt <= self.kalman.max_dt().as_secs_f64() {
                info.noncomp_vario = Some((altitude - last_altitude) / dt);
            }
        }
        self.last_altitude = Some((now, altitude));
    }

    fn apply_voltage(&mut self, temperature_adc: i32, channel: usize, voltage_adc: i32, info: &mut NmeaInfo) {
        if let Some(filter) = self.voltage_filters.get_mut(channel) {
            filter.push(f64::from(voltage_adc));
            if channel == 0 {
                if let Some(avg) = filter.mean() {
                    info.voltage = Some(self.calibration.offset + self.calibration.factor * avg);
                }
            }
        }
        if temperature_adc >= 0 {
            // the thermometer reports Kelvin
            self.temperature_filter.push(f64::from(temperature_adc));
            info.temperature = self.temperature_filter.mean().map(|kelvin| kelvin - 273.15);
        }
    }
}
