/// A VHF radio frequency, stored in kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RadioFrequency(u32);

impl RadioFrequency {
    /// Lowest frequency of the air band.
    const MIN_KHZ: u32 = 118_000;
    /// Highest frequency of the air band.
    const MAX_KHZ: u32 = 137_000;

    pub fn from_khz(khz: u32) -> Option<Self> {
        (Self::MIN_KHZ..=Self::MAX_KHZ).contains(&khz).then_some(Self(khz))
    }

    pub fn khz(self) -> u32 { self.0 }
    pub fn mhz(self) -> u32 { self.0 / 1000 }
    pub fn khz_part(self) -> u32 { self.0 % 1000 }
}

impl std::fmt::Display for RadioFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:03}", self.mhz(), self.khz_part())
    }
}

/// Settings an instrument can report or accept: `None` means "not available".
///
/// Each slot keeps two of these: what we sent and what the device sent back.
/// They are only ever compared, never merged into each other.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExternalSettings {
    pub mac_cready: Option<f64>,
    pub bugs: Option<f64>,
    pub ballast_fraction: Option<f64>,
    pub ballast_overload: Option<f64>,
    /// QNH in hPa.
    pub qnh: Option<f64>,
    pub volume: Option<u32>,
    pub active_frequency: Option<RadioFrequency>,
    pub standby_frequency: Option<RadioFrequency>,
}

/// `true` if `value` is available and within `tolerance` of `other`.
fn close_to(value: Option<f64>, other: f64, tolerance: f64) -> bool {
    value.is_some_and(|v| (v - other).abs() <= tolerance)
}

fn same_f64(a: Option<f64>, b: Option<f64>, tolerance: f64) -> bool {
    b.is_some_and(|b| close_to(a, b, tolerance))
}

impl ExternalSettings {
    const MAC_CREADY_TOLERANCE: f64 = 0.05;
    const BUGS_TOLERANCE: f64 = 0.01;
    const BALLAST_TOLERANCE: f64 = 0.01;
    const QNH_TOLERANCE: f64 = 0.5;

    pub fn is_empty(&self) -> bool { *self == Self::default() }

    pub fn clear(&mut self) { *self = Self::default(); }

    pub fn compare_mac_cready(&self, value: f64) -> bool {
        close_to(self.mac_cready, value, Self::MAC_CREADY_TOLERANCE)
    }

    pub fn compare_bugs(&self, value: f64) -> bool {
        close_to(self.bugs, value, Self::BUGS_TOLERANCE)
    }

    pub fn compare_ballast(&self, fraction: f64, overload: f64) -> bool {
        close_to(self.ballast_fraction, fraction, Self::BALLAST_TOLERANCE)
            && close_to(self.ballast_overload, overload, Self::BALLAST_TOLERANCE)
    }

    pub fn compare_qnh(&self, hpa: f64) -> bool { close_to(self.qnh, hpa, Self::QNH_TOLERANCE) }

    pub fn compare_volume(&self, volume: u32) -> bool { self.volume == Some(volume) }

    /// Copies every field that is available in `other` into `self`.
    pub fn complement(&mut self, other: &ExternalSettings) {
        if other.mac_cready.is_some() {
            self.mac_cready = other.mac_cready;
        }
        if other.bugs.is_some() {
            self.bugs = other.bugs;
        }
        if other.ballast_fraction.is_some() {
            self.ballast_fraction = other.ballast_fraction;
        }
        if other.ballast_overload.is_some() {
            self.ballast_overload = other.ballast_overload;
        }
        if other.qnh.is_some() {
            self.qnh = other.qnh;
        }
        if other.volume.is_some() {
            self.volume = other.volume;
        }
        if other.active_frequency.is_some() {
            self.active_frequency = other.active_frequency;
        }
        if other.standby_frequency.is_some() {
            self.standby_frequency = other.standby_frequency;
        }
    }

    /// Clears every field that either repeats what we `sent` to the device or
    /// repeats the `previous` value the device reported.
    ///
    /// What is left afterwards is a genuine change made on the instrument.
    pub fn eliminate_redundant(&mut self, sent: &ExternalSettings, previous: &ExternalSettings) {
        if same_f64(sent.mac_cready, self.mac_cready, Self::MAC_CREADY_TOLERANCE)
            || same_f64(previous.mac_cready, self.mac_cready, Self::MAC_CREADY_TOLERANCE)
        {
            self.mac_cready = None;
        }
        if same_f64(sent.bugs, self.bugs, Self::BUGS_TOLERANCE)
            || same_f64(previous.bugs, self.bugs, Self::BUGS_TOLERANCE)
        {
            self.bugs = None;
        }
        if same_f64(sent.ballast_fraction, self.ballast_fraction, Self::BALLAST_TOLERANCE)
            || same_f64(previous.ballast_fraction, self.ballast_fraction, Self::BALLAST_TOLERANCE)
        {
            self.ballast_fraction = None;
        }
        if same_f64(sent.ballast_overload, self.ballast_overload, Self::BALLAST_TOLERANCE)
            || same_f64(previous.ballast_overload, self.ballast_overload, Self::BALLAST_TOLERANCE)
        {
            self.ballast_overload = None;
        }
        if same_f64(sent.qnh, self.qnh, Self::QNH_TOLERANCE)
            || same_f64(previous.qnh, self.qnh, Self::QNH_TOLERANCE)
        {
            self.qnh = None;
        }
        if self.volume.is_some() && (self.volume == sent.volume || self.volume == previous.volume) {
            self.volume = None;
        }
        if self.active_frequency.is_some()
            && (self.active_frequency == sent.active_frequency
                || self.active_frequency == previous.active_frequency)
        {
            self.active_frequency = None;
        }
        if self.standby_frequency.is_some()
            && (self.standby_frequency == sent.standby_frequency
                || self.standby_frequency == previous.standby_frequency)
        {
            self.standby_frequency = None;
        }
    }
}
