use super::{GeoPoint, NmeaInfo, verify_checksum};
use chrono::{NaiveDate, NaiveTime};
use strum_macros::Display;
use tokio::time::Instant;

/// Reasons a line was not understood.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum NmeaError {
    #[strum(to_string = "line does not start with '$'")]
    MissingStart,
    #[strum(to_string = "missing checksum")]
    MissingChecksum,
    #[strum(to_string = "checksum mismatch (expected {expected}, got {actual})")]
    BadChecksum { expected: u8, actual: u8 },
    #[strum(to_string = "unsupported sentence {sentence}")]
    Unsupported { sentence: String },
    #[strum(to_string = "malformed {sentence} sentence")]
    Malformed { sentence: String },
}

impl std::error::Error for NmeaError {}

/// A checksum-verified sentence split into its comma separated fields.
#[derive(Debug, Clone)]
pub struct NmeaSentence<'a> {
    fields: Vec<&'a str>,
}

impl<'a> NmeaSentence<'a> {
    /// Verifies the checksum of `line` and splits it.
    pub fn parse(line: &'a str, ignore_checksum: bool) -> Result<Self, NmeaError> {
        let body = verify_checksum(line, ignore_checksum)?;
        Ok(Self { fields: body.split(',').collect() })
    }

    /// Full sentence address, e.g. `GPRMC` or `PGRMZ`.
    pub fn address(&self) -> &'a str { self.fields.first().copied().unwrap_or_default() }

    /// Sentence type without the two letter talker id (`RMC` for `GPRMC`).
    /// Proprietary sentences (starting with `P`) are returned unchanged.
    pub fn kind(&self) -> &'a str {
        let address = self.address();
        if address.starts_with('P') { address } else { address.get(2..).unwrap_or(address) }
    }

    /// Field `i` (the address is field 0); missing fields read as empty.
    pub fn field(&self, i: usize) -> &'a str { self.fields.get(i).copied().unwrap_or_default() }

    pub fn len(&self) -> usize { self.fields.len() }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    pub fn f64(&self, i: usize) -> Option<f64> { self.field(i).trim().parse().ok() }

    pub fn u32(&self, i: usize) -> Option<u32> { self.field(i).trim().parse().ok() }

    fn malformed(&self) -> NmeaError { NmeaError::Malformed { sentence: self.address().to_string() } }
}

/// Parses `ddmm.mmm` (or `dddmm.mmm`) plus hemisphere into signed degrees.
fn parse_angle(value: &str, hemisphere: &str, degree_digits: usize) -> Option<f64> {
    if value.len() < degree_digits + 2 {
        return None;
    }
    let degrees: f64 = value.get(..degree_digits)?.parse().ok()?;
    let minutes: f64 = value.get(degree_digits..)?.parse().ok()?;
    if minutes >= 60.0 {
        return None;
    }
    let angle = degrees + minutes / 60.0;
    match hemisphere {
        "N" | "E" => Some(angle),
        "S" | "W" => Some(-angle),
        _ => None,
    }
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    let hms = value.get(..6)?;
    let hour = hms.get(..2)?.parse().ok()?;
    let min = hms.get(2..4)?.parse().ok()?;
    let sec = hms.get(4..6)?.parse().ok()?;
    NaiveTime::from_hms_opt(hour, min, sec)
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let day = value.get(..2)?.parse().ok()?;
    let month = value.get(2..4)?.parse().ok()?;
    let year: i32 = value.get(4..6)?.parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

/// Parser for the standard sentences every GPS speaks.
///
/// Holds only configuration; the decoded values go into the [`NmeaInfo`] passed in.
#[derive(Debug, Clone, Default)]
pub struct NmeaParser {
    ignore_checksum: bool,
}

impl NmeaParser {
    const KNOTS_TO_MS: f64 = 1852.0 / 3600.0;
    const FEET_TO_M: f64 = 0.3048;

    pub fn new() -> Self { Self::default() }

    pub fn set_ignore_checksum(&mut self, ignore: bool) { self.ignore_checksum = ignore; }

    /// Parses one line into `info`.
    ///
    /// # Returns
    /// - `Ok(())` if the sentence was understood and applied.
    /// - `Err(NmeaError::Unsupported)` for valid sentences this parser does not know.
    /// - any other `Err` for broken lines.
    pub fn parse_line(&mut self, line: &str, info: &mut NmeaInfo, now: Instant) -> Result<(), NmeaError> {
        let sentence = NmeaSentence::parse(line, self.ignore_checksum)?;
        if !sentence.address().is_ascii() {
            return Err(sentence.malformed());
        }
        match sentence.kind() {
            "RMC" => Self::rmc(&sentence, info, now),
            "GGA" => Self::gga(&sentence, info, now),
            "PGRMZ" => Self::pgrmz(&sentence, info),
            _ => Err(NmeaError::Unsupported { sentence: sentence.address().to_string() }),
        }
    }

    /// `$--RMC,time,status,lat,N,lon,E,speed,track,date,...`
    fn rmc(s: &NmeaSentence<'_>, info: &mut NmeaInfo, now: Instant) -> Result<(), NmeaError> {
        if s.len() < 10 {
            return Err(s.malformed());
        }
        info.utc_time = parse_time(s.field(1)).or(info.utc_time);
        info.utc_date = parse_date(s.field(9)).or(info.utc_date);
        if s.field(2) != "A" {
            // receiver has no fix, the sentence is still a sign of life
            return Ok(());
        }
        let lat = parse_angle(s.field(3), s.field(4), 2).ok_or_else(|| s.malformed())?;
        let lon = parse_angle(s.field(5), s.field(6), 3).ok_or_else(|| s.malformed())?;
        info.provide_location(now, GeoPoint::new(lat, lon));
        if let Some(knots) = s.f64(7) {
            info.ground_speed = Some(knots * Self::KNOTS_TO_MS);
        }
        if let Some(track) = s.f64(8) {
            info.track = Some(track);
        }
        Ok(())
    }

    /// `$--GGA,time,lat,N,lon,E,quality,sats,hdop,alt,M,...`
    fn gga(s: &NmeaSentence<'_>, info: &mut NmeaInfo, now: Instant) -> Result<(), NmeaError> {
        if s.len() < 11 {
            return Err(s.malformed());
        }
        let quality: u8 = s.field(6).trim().parse().map_err(|_| s.malformed())?;
        info.fix_quality = Some(quality);
        info.satellites_used = s.u32(7);
        if quality == 0 {
            return Ok(());
        }
        if let (Some(lat), Some(lon)) = (
            parse_angle(s.field(2), s.field(3), 2),
            parse_angle(s.field(4), s.field(5), 3),
        ) {
            info.provide_location(now, GeoPoint::new(lat, lon));
        }
        if let Some(alt) = s.f64(9) {
            info.gps_altitude = Some(alt);
        }
        Ok(())
    }

    /// `$PGRMZ,alt,f|m,...`: barometric altitude.
    fn pgrmz(s: &NmeaSentence<'_>, info: &mut NmeaInfo) -> Result<(), NmeaError> {
        let alt = s.f64(1).ok_or_else(|| s.malformed())?;
        info.baro_altitude = Some(match s.field(2) {
            "f" | "F" => alt * Self::FEET_TO_M,
            _ => alt,
        });
        Ok(())
    }
}
