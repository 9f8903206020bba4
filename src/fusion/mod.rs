//! Smoothing of noisy scalar sensor streams.
//!
//! - [`SelfTimingKalmanFilter1d`] smooths barometric pressure under irregular sample timing.
//! - [`WindowFilter`] averages slow analog channels (voltage, temperature).
//! - [`SensorFusion`] applies [`SensorEvent`](crate::sensor::SensorEvent)s to a device record
//!   using both.

mod kalman;
mod sensor_fusion;
mod window_filter;

#[cfg(test)]
mod tests;

pub use kalman::{KalmanFilter1d, KalmanParams, SelfTimingKalmanFilter1d};
pub use sensor_fusion::{FusionConfig, PressureUse, SensorFusion, VoltageCalibration, pressure_to_altitude};
pub use window_filter::WindowFilter;
