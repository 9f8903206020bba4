use tokio::time::{Duration, Instant};

/// Tuning of a [`SelfTimingKalmanFilter1d`].
///
/// The values are tuned by hand for a given sensor, they cannot be derived from
/// each other.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct KalmanParams {
    /// Maximum gap between two samples in seconds before the filter restarts from
    /// the raw value.
    pub max_dt_secs: f64,
    /// Variance of the second derivative of the measured quantity (process noise).
    pub var_accel: f64,
}

impl KalmanParams {
    /// Phone barometer. The acceleration variance is wider than the maximum
    /// likelihood fit of recorded flights: the real distribution is heavy tailed.
    pub const PHONE_BARO: Self = Self { max_dt_secs: 60.0, var_accel: 0.0075 };
    /// Barometer on an external sensor bus.
    pub const BUS_BARO: Self = Self { max_dt_secs: 5.0, var_accel: 0.3 };
    /// BMP085 on an external sensor bus, which is as smooth as a phone barometer.
    pub const BUS_BARO_BMP085: Self = Self { max_dt_secs: 5.0, var_accel: 0.0075 };

    pub fn max_dt(&self) -> Duration { Duration::from_secs_f64(self.max_dt_secs.max(0.0)) }
}

/// Scalar Kalman filter for a slowly varying quantity.
///
/// State: the estimate and its variance. The process noise grows with the square of
/// the elapsed time, scaled by `var_accel`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanFilter1d {
    /// state estimate (x)
    estimate: f64,
    /// estimate variance (P)
    variance: f64,
    /// process noise scale (q)
    var_accel: f64,
}

impl KalmanFilter1d {
    pub fn new(var_accel: f64) -> Self { Self { estimate: 0.0, variance: 0.0, var_accel } }

    pub fn estimate(&self) -> f64 { self.estimate }
    pub fn variance(&self) -> f64 { self.variance }
    pub fn var_accel(&self) -> f64 { self.var_accel }

    pub fn set_var_accel(&mut self, var_accel: f64) { self.var_accel = var_accel; }

    /// Restarts the filter at the measurement `z` with variance `var_z`.
    pub fn reset(&mut self, z: f64, var_z: f64) {
        self.estimate = z;
        self.variance = var_z.max(0.0);
    }

    /// Predicts `dt` seconds ahead and corrects with the measurement `z`.
    ///
    /// # Arguments
    /// * `z` - measured value
    /// * `var_z` - variance of the measurement (R)
    /// * `dt` - seconds since the previous update, may be zero
    pub fn update(&mut self, z: f64, var_z: f64, dt: f64) {
        // Predict: x stays, P = P + q * dt^2
        let dt = dt.max(0.0);
        let predicted_var = self.variance + self.var_accel * dt * dt;

        // Innovation: y = z - x, S = P + R
        let innovation = z - self.estimate;
        let innovation_var = predicted_var + var_z.max(0.0);
        if innovation_var <= 0.0 {
            // both the estimate and the measurement are exact
            self.estimate = z;
            self.variance = 0.0;
            return;
        }

        // Gain: K = P / S
        let gain = predicted_var / innovation_var;

        // Update: x = x + K * y, P = (1 - K) * P
        self.estimate += gain * innovation;
        self.variance = ((1.0 - gain) * predicted_var).max(0.0);
    }
}

/// [`KalmanFilter1d`] that measures the time between samples itself.
///
/// If no sample arrived for longer than `max_dt` the prediction is not trusted any
/// more and the filter restarts from the raw measurement.
#[derive(Debug, Clone, Copy)]
pub struct SelfTimingKalmanFilter1d {
    filter: KalmanFilter1d,
    max_dt: Duration,
    last_update: Option<Instant>,
}

impl SelfTimingKalmanFilter1d {
    pub fn new(params: KalmanParams) -> Self {
        Self { filter: KalmanFilter1d::new(params.var_accel), max_dt: params.max_dt(), last_update: None }
    }

    /// Switches to a new parameter set and forgets the history.
    pub fn set_params(&mut self, params: KalmanParams) {
        self.filter.set_var_accel(params.var_accel);
        self.max_dt = params.max_dt();
        self.last_update = None;
    }

    pub fn max_dt(&self) -> Duration { self.max_dt }

    pub fn estimate(&self) -> f64 { self.filter.estimate() }
    pub fn variance(&self) -> f64 { self.filter.variance() }

    pub fn update(&mut self, z: f64, var_z: f64) { self.update_at(z, var_z, Instant::now()); }

    /// Non-finite samples are dropped and leave the filter untouched.
    pub fn update_at(&mut self, z: f64, var_z: f64, now: Instant) {
        if !z.is_finite() || !var_z.is_finite() {
            return;
        }
        match self.last_update.map(|last| now.saturating_duration_since(last)) {
            Some(dt) if dt <= self.max_dt => self.filter.update(z, var_z, dt.as_secs_f64()),
            _ => self.filter.reset(z, var_z),
        }
        self.last_update = Some(now);
    }
}
