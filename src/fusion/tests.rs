use super::*;
use crate::nmea::NmeaInfo;
use crate::sensor::SensorEvent;
use rand::Rng;
use tokio::time::{Duration, Instant};

#[test]
fn test_kalman_converges_monotonically_without_elapsed_time() {
    let now = Instant::now();
    let mut filter = SelfTimingKalmanFilter1d::new(KalmanParams::PHONE_BARO);
    filter.update_at(1000.0, 1.0, now);
    let target = 1010.0;
    let mut last_estimate = filter.estimate();
    let mut last_variance = filter.variance();
    for _ in 0..50 {
        filter.update_at(target, 1.0, now);
        assert!(filter.estimate() >= last_estimate);
        assert!(filter.estimate() <= target);
        assert!(filter.variance() <= last_variance);
        assert!(filter.variance() >= 0.0);
        last_estimate = filter.estimate();
        last_variance = filter.variance();
    }
    assert!((target - filter.estimate()).abs() < 0.5);
}

#[test]
fn test_kalman_resets_after_stale_gap() {
    let start = Instant::now();
    let mut filter = SelfTimingKalmanFilter1d::new(KalmanParams::BUS_BARO);
    filter.update_at(900.0, 0.05, start);
    filter.update_at(901.0, 0.05, start + Duration::from_secs(1));
    assert!(filter.estimate() < 901.0);

    let late = start + Duration::from_secs(1) + filter.max_dt() + Duration::from_millis(1);
    filter.update_at(950.0, 0.2, late);
    assert!((filter.estimate() - 950.0).abs() < f64::EPSILON);
    assert!((filter.variance() - 0.2).abs() < f64::EPSILON);
}

#[test]
fn test_kalman_drops_non_finite_samples() {
    let start = Instant::now();
    let mut filter = SelfTimingKalmanFilter1d::new(KalmanParams::BUS_BARO);
    filter.update_at(900.0, 0.05, start);
    filter.update_at(901.0, 0.05, start + Duration::from_millis(100));
    let (estimate, variance) = (filter.estimate(), filter.variance());

    filter.update_at(f64::NAN, 0.05, start + Duration::from_millis(200));
    filter.update_at(f64::INFINITY, 0.05, start + Duration::from_millis(300));
    filter.update_at(902.0, f64::NAN, start + Duration::from_millis(400));
    assert!((filter.estimate() - estimate).abs() < f64::EPSILON);
    assert!((filter.variance() - variance).abs() < f64::EPSILON);

    filter.update_at(902.0, 0.05, start + Duration::from_millis(500));
    assert!(filter.estimate().is_finite());
    assert!(filter.estimate() > estimate);
}

#[test]
fn test_kalman_smooths_noisy_samples() {
    let mut rng = rand::rng();
    let start = Instant::now();
    let mut filter = SelfTimingKalmanFilter1d::new(KalmanParams::PHONE_BARO);
    let truth = 980.0;
    for i in 0..200 {
        let noise: f64 = rng.random_range(-0.5..0.5);
        filter.update_at(truth + noise, 0.25, start + Duration::from_millis(100 * i));
    }
    assert!(filter.variance() >= 0.0);
    assert!((filter.estimate() - truth).abs() < 0.3);
}

#[test]
fn test_kalman_gain_with_exact_inputs() {
    let mut filter = KalmanFilter1d::new(0.0);
    filter.reset(5.0, 0.0);
    filter.update(7.0, 0.0, 0.0);
    assert!((filter.estimate() - 7.0).abs() < f64::EPSILON);
    assert!(filter.variance().abs() < f64::EPSILON);
}

#[test]
fn test_window_filter_evicts_oldest() {
    let mut filter = WindowFilter::<4>::new();
    assert_eq!(filter.mean(), None);
    for v in 1..=4 {
        filter.push(f64::from(v));
    }
    assert!(filter.is_full());
    assert_eq!(filter.mean(), Some(2.5));
    filter.push(9.0);
    assert_eq!(filter.len(), 4);
    // window is now 2, 3, 4, 9
    assert_eq!(filter.mean(), Some(4.5));
    assert_eq!(filter.median(), Some(3.5));
    filter.push(100.0);
    // 3, 4, 9, 100: the median ignores the spike
    assert_eq!(filter.median(), Some(6.5));
}

#[test]
fn test_window_filter_odd_median() {
    let mut filter = WindowFilter::<3>::new();
    filter.push(5.0);
    filter.push(-1.0);
    filter.push(2.0);
    assert_eq!(filter.median(), Some(2.0));
    filter.clear();
    assert!(filter.is_empty());
}

#[test]
fn test_pressure_to_altitude() {
    assert!(pressure_to_altitude(1013.25).abs() < 1e-6);
    let alt = pressure_to_altitude(898.75);
    assert!((alt - 1000.0).abs() < 5.0, "alt = {alt}");
}

#[test]
fn test_fusion_barometer_fills_altitude_and_vario() {
    let start = Instant::now();
    let mut fusion = SensorFusion::internal(FusionConfig::default());
    let mut info = NmeaInfo::default();
    assert!(fusion.apply(
        &SensorEvent::BarometricPressure { pressure_hpa: 1000.0, sensor_noise_variance: 0.0 },
        &mut info,
        start
    ));
    let first_alt = info.pressure_altitude.unwrap();
    assert_eq!(info.noncomp_vario, None);

    fusion.apply(
        &SensorEvent::BarometricPressure { pressure_hpa: 999.0, sensor_noise_variance: 0.0 },
        &mut info,
        start + Duration::from_secs(1),
    );
    assert!(info.pressure_altitude.unwrap() > first_alt);
    assert!(info.noncomp_vario.unwrap() > 0.0);
    assert!(info.alive.is_valid());
}

#[test]
fn test_fusion_bus_baro_modes() {
    let now = Instant::now();
    let mut info = NmeaInfo::default();
    let event = SensorEvent::SensorBusBaro { index: 0, sensor_type: 85, pressure_hpa: 3.5 };

    let mut pitot = SensorFusion::new(FusionConfig::default(), PressureUse::Pitot, 1.5, VoltageCalibration::default());
    pitot.apply(&event, &mut info, now);
    assert_eq!(info.dynamic_pressure, Some(2.0));

    let mut tek = SensorFusion::new(FusionConfig::default(), PressureUse::TekProbe, 0.0, VoltageCalibration::default());
    tek.apply(&event, &mut info, now);
    assert_eq!(info.te_pressure, Some(3.5));

    let mut stat = SensorFusion::new(FusionConfig::default(), PressureUse::Static, 0.0, VoltageCalibration::default());
    stat.apply(&SensorEvent::SensorBusBaro { index: 0, sensor_type: 85, pressure_hpa: 950.0 }, &mut info, now);
    assert_eq!(stat.kalman().max_dt(), KalmanParams::BUS_BARO_BMP085.max_dt());
    assert_eq!(info.static_pressure, Some(950.0));
}

#[test]
fn test_fusion_voltage_and_temperature_are_averaged() {
    let now = Instant::now();
    let calibration = VoltageCalibration { offset: 0.5, factor: 0.01 };
    let mut fusion = SensorFusion::new(FusionConfig::default(), PressureUse::Static, 0.0, calibration);
    let mut info = NmeaInfo::default();
    fusion.apply(&SensorEvent::Voltage { temperature_adc: 293, channel: 0, voltage_adc: 1200 }, &mut info, now);
    fusion.apply(&SensorEvent::Voltage { temperature_adc: 295, channel: 0, voltage_adc: 1300 }, &mut info, now);
    assert!((info.voltage.unwrap() - 13.0).abs() < 1e-9);
    assert!((info.temperature.unwrap() - 20.85).abs() < 1e-9);

    fusion.apply(&SensorEvent::Voltage { temperature_adc: -1, channel: 7, voltage_adc: 0 }, &mut info, now);
    assert!((info.voltage.unwrap() - 13.0).abs() < 1e-9);
}

#[test]
fn test_fusion_acceleration_and_ignored_events() {
    let now = Instant::now();
    let mut fusion = SensorFusion::internal(FusionConfig::default());
    let mut info = NmeaInfo::default();
    assert!(fusion.apply(&SensorEvent::Acceleration { x: 0.0, y: 0.0, z: 19.62 }, &mut info, now));
    assert!((info.g_load.unwrap() - 2.0).abs() < 1e-9);
    assert!(!fusion.apply(&SensorEvent::MagneticField { x: 1.0, y: 2.0, z: 3.0 }, &mut info, now));
    assert!(!fusion.apply(&SensorEvent::StateChanged, &mut info, now));
}
