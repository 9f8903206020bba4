use super::{Declaration, Driver, DriverError, RecordedFlightInfo};
use crate::job::OperationEnvironment;
use crate::nmea::{DerivedInfo, NmeaInfo, NmeaSentence, RadioFrequency, append_checksum};
use crate::port::{Port, PortError};
use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tokio::time::{Duration, Instant};

/// Frequency field like `122.475` or `122.5`.
static FREQUENCY_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{3})\.(\d{1,3})$").unwrap());

/// Characters that would break the comma separated framing.
static FIELD_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^,*$\r\n]*$").unwrap());

/// Driver for varios speaking the `$PVAR` protocol.
///
/// The vario reports total-energy vario, barometric altitude and its settings; we send
/// settings changes, the MacCready/glide data for its display and task declarations.
/// It also keeps a flight log that can be listed and downloaded.
pub struct PvarDriver {
    port: Arc<dyn Port>,
    /// bytes of an incomplete line read during a synchronous exchange
    pending: Vec<u8>,
}

impl PvarDriver {
    /// Silence after which a synchronous exchange gives up.
    const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
    /// Poll interval of synchronous reads, bounds the cancellation latency.
    const READ_SLICE: Duration = Duration::from_millis(100);
    const MAX_TURNPOINTS: usize = 10;

    pub fn new(port: Arc<dyn Port>) -> Self { Self { port, pending: Vec::new() } }

    fn send(&self, body: &str) -> bool {
        let line = format!("{}\r\n", append_checksum(body));
        match self.port.full_write(line.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                crate::event!("PVAR: failed to send {body}: {e}");
                false
            }
        }
    }

    fn send_checked(&self, body: &str) -> Result<(), DriverError> {
        let line = format!("{}\r\n", append_checksum(body));
        self.port.full_write(line.as_bytes())?;
        Ok(())
    }

    fn parse_frequency(value: &str) -> Option<RadioFrequency> {
        let caps = FREQUENCY_REGEX.captures(value)?;
        let mhz: u32 = caps[1].parse().ok()?;
        let fraction = format!("{:0<3}", &caps[2]);
        let khz: u32 = fraction.parse().ok()?;
        RadioFrequency::from_khz(mhz * 1000 + khz)
    }

    fn check_field(value: &str) -> Result<(), DriverError> {
        if FIELD_REGEX.is_match(value) {
            Ok(())
        } else {
            Err(DriverError::Rejected { reason: format!("invalid characters in '{value}'") })
        }
    }

    /// `$PVAR,S,mc,bugs,ballast,qnh,volume`, empty fields are not available.
    fn parse_settings(s: &NmeaSentence<'_>, info: &mut NmeaInfo) {
        let settings = &mut info.settings;
        settings.mac_cready = s.f64(2).or(settings.mac_cready);
        settings.bugs = s.f64(3).or(settings.bugs);
        settings.ballast_fraction = s.f64(4).or(settings.ballast_fraction);
        settings.qnh = s.f64(5).or(settings.qnh);
        settings.volume = s.u32(6).or(settings.volume);
    }

    /// Reads one line of a synchronous exchange.
    fn read_line(&mut self, env: &dyn OperationEnvironment) -> Result<String, DriverError> {
        let deadline = Instant::now() + Self::RESPONSE_TIMEOUT;
        let mut buf = [0u8; 256];
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                return Ok(String::from_utf8_lossy(&line).trim_end().to_string());
            }
            if env.is_cancelled() {
                return Err(DriverError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout);
            }
            match self.port.read(&mut buf, Self::READ_SLICE) {
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(PortError::Timeout) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reads lines until one with address `PVAR` and first field `kind` arrives.
    fn expect(&mut self, kind: &str, env: &dyn OperationEnvironment) -> Result<Vec<String>, DriverError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line(env)?;
            if let Ok(s) = NmeaSentence::parse(&line, false) {
                if s.address() == "PVAR" && s.field(1) == kind {
                    if s.field(2) == "ERR" {
                        return Err(DriverError::Rejected { reason: s.field(3).to_string() });
                    }
                    return Ok(lines);
                }
            }
            lines.push(line);
        }
    }

    fn parse_flight(line: &str) -> Option<RecordedFlightInfo> {
        let s = NmeaSentence::parse(line, false).ok()?;
        if s.address() != "PVAR" || s.field(1) != "FLIGHT" {
            return None;
        }
        Some(RecordedFlightInfo {
            id: s.field(2).to_string(),
            date: NaiveDate::parse_from_str(s.field(3), "%Y-%m-%d").ok()?,
            start_time: NaiveTime::parse_from_str(s.field(4), "%H:%M:%S").ok()?,
            end_time: NaiveTime::parse_from_str(s.field(5), "%H:%M:%S").ok()?,
        })
    }
}

impl Driver for PvarDriver {
    fn parse_nmea(&mut self, line: &str, info: &mut NmeaInfo) -> bool {
        let Ok(s) = NmeaSentence::parse(line, false) else { return false };
        if s.address() != "PVAR" {
            return false;
        }
        match s.field(1) {
            "S" => Self::parse_settings(&s, info),
            "V" => {
                info.total_energy_vario = s.f64(2).or(info.total_energy_vario);
                info.baro_altitude = s.f64(3).or(info.baro_altitude);
            }
            "F" => {
                let frequency = Self::parse_frequency(s.field(3));
                match s.field(2) {
                    "A" => info.settings.active_frequency = frequency.or(info.settings.active_frequency),
                    "S" => info.settings.standby_frequency = frequency.or(info.settings.standby_frequency),
                    _ => return false,
                }
            }
            _ => return false,
        }
        true
    }

    fn open(&mut self, env: &dyn OperationEnvironment) -> Result<(), DriverError> {
        env.set_text("Waking up vario");
        self.send_checked("PVAR,HELLO")?;
        self.port.drain()?;
        Ok(())
    }

    fn enable_nmea(&mut self, _env: &dyn OperationEnvironment) -> bool { self.send("PVAR,NMEA") }

    fn link_timeout(&mut self) { self.pending.clear(); }

    fn on_sys_ticker(&mut self) { self.send("PVAR,PING"); }

    fn on_calculated_update(&mut self, _basic: &NmeaInfo, calculated: &DerivedInfo) {
        let glide_ratio = calculated.glide_ratio.map(|ld| format!("{ld:.0}")).unwrap_or_default();
        self.send(&format!("PVAR,CALC,{:.1},{glide_ratio}", calculated.mac_cready));
    }

    fn put_mac_cready(&mut self, value: f64, _env: &dyn OperationEnvironment) -> bool {
        self.send(&format!("PVAR,SET,MC,{value:.1}"))
    }

    fn put_bugs(&mut self, value: f64, _env: &dyn OperationEnvironment) -> bool {
        self.send(&format!("PVAR,SET,BUGS,{value:.2}"))
    }

    fn put_ballast(&mut self, fraction: f64, overload: f64, _env: &dyn OperationEnvironment) -> bool {
        self.send(&format!("PVAR,SET,BAL,{fraction:.2},{overload:.2}"))
    }

    fn put_volume(&mut self, volume: u32, _env: &dyn OperationEnvironment) -> bool {
        // the vario only has 10 steps
        volume <= 10 && self.send(&format!("PVAR,SET,VOL,{volume}"))
    }

    fn put_qnh(&mut self, hpa: f64, _env: &dyn OperationEnvironment) -> bool {
        self.send(&format!("PVAR,SET,QNH,{hpa:.1}"))
    }

    fn put_pilot_event(&mut self, _env: &dyn OperationEnvironment) -> bool { self.send("PVAR,EVENT") }

    fn put_active_frequency(&mut self, frequency: RadioFrequency, name: &str, _env: &dyn OperationEnvironment) -> bool {
        Self::check_field(name).is_ok() && self.send(&format!("PVAR,SET,FREQ,A,{frequency},{name}"))
    }

    fn put_standby_frequency(
        &mut self,
        frequency: RadioFrequency,
        name: &str,
        _env: &dyn OperationEnvironment,
    ) -> bool {
        Self::check_field(name).is_ok() && self.send(&format!("PVAR,SET,FREQ,S,{frequency},{name}"))
    }

    fn declare(&mut self, declaration: &Declaration, env: &dyn OperationEnvironment) -> Result<(), DriverError> {
        if declaration.len() < 2 || declaration.len() > Self::MAX_TURNPOINTS {
            return Err(DriverError::Rejected {
                reason: format!("{} turnpoints, the vario accepts 2 to {}", declaration.len(), Self::MAX_TURNPOINTS),
            });
        }
        for field in [
            &declaration.pilot_name,
            &declaration.aircraft_type,
            &declaration.aircraft_registration,
            &declaration.competition_id,
        ]
        .into_iter()
        .chain(declaration.turnpoints.iter().map(|tp| &tp.name))
        {
            Self::check_field(field)?;
        }

        #[allow(clippy::cast_possible_truncation)]
        env.set_progress_range(declaration.len() as u32 + 2);
        self.pending.clear();
        self.send_checked(&format!(
            "PVAR,DECL,BEGIN,{},{},{},{},{}",
            declaration.pilot_name,
            declaration.aircraft_type,
            declaration.aircraft_registration,
            declaration.competition_id,
            declaration.len()
        ))?;
        for (i, tp) in declaration.turnpoints.iter().enumerate() {
            if env.is_cancelled() {
                return Err(DriverError::Cancelled);
            }
            self.send_checked(&format!(
                "PVAR,DECL,TP,{i},{},{:.5},{:.5},{:.0}",
                tp.name, tp.location.latitude, tp.location.longitude, tp.elevation
            ))?;
            #[allow(clippy::cast_possible_truncation)]
            env.set_progress_position(i as u32 + 1);
        }
        self.send_checked("PVAR,DECL,END")?;
        self.port.drain()?;
        self.expect("DECL", env)?;
        Ok(())
    }

    fn read_flight_list(&mut self, env: &dyn OperationEnvironment) -> Result<Vec<RecordedFlightInfo>, DriverError> {
        self.pending.clear();
        self.send_checked("PVAR,LIST")?;
        self.port.drain()?;
        let lines = self.expect("LIST", env)?;
        Ok(lines.iter().filter_map(|line| Self::parse_flight(line)).collect())
    }

    fn download_flight(
        &mut self,
        flight: &RecordedFlightInfo,
        path: &Path,
        env: &dyn OperationEnvironment,
    ) -> Result<(), DriverError> {
        Self::check_field(&flight.id)?;
        self.pending.clear();
        self.send_checked(&format!("PVAR,GET,{}", flight.id))?;
        self.port.drain()?;
        env.set_text(&format!("Downloading flight {}", flight.id));
        let lines = self.expect("GET", env)?;
        let mut file = std::fs::File::create(path)?;
        for line in &lines {
            writeln!(file, "{line}")?;
        }
        file.flush()?;
        Ok(())
    }
}
