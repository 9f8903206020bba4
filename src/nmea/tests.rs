use super::*;
use tokio::time::Instant;

#[test]
fn test_checksum_roundtrip_and_rejection() {
    let line = append_checksum("PGRMZ,1234,f,3");
    assert!(verify_checksum(&line, false).is_ok());
    let broken = line.replace("1234", "1235");
    assert!(matches!(verify_checksum(&broken, false), Err(NmeaError::BadChecksum { .. })));
    assert_eq!(verify_checksum(&broken, true), Ok("PGRMZ,1235,f,3"));
    assert_eq!(verify_checksum("$GPGGA,1,2", false), Err(NmeaError::MissingChecksum));
    assert_eq!(verify_checksum("GPGGA,1,2", true), Err(NmeaError::MissingStart));
}

#[test]
fn test_line_splitter_handles_partial_and_crlf() {
    let mut splitter = LineSplitter::new();
    let mut lines = Vec::new();
    splitter.feed(b"$GPRMC,1*00\r\n$PGR", |l| lines.push(l.to_string()));
    assert_eq!(lines, vec!["$GPRMC,1*00"]);
    splitter.feed(b"MZ,1*00\n\n", |l| lines.push(l.to_string()));
    assert_eq!(lines, vec!["$GPRMC,1*00", "$PGRMZ,1*00"]);
}

#[test]
fn test_line_splitter_discards_overlong_line() {
    let mut splitter = LineSplitter::new();
    let mut lines = Vec::new();
    let long = vec![b'x'; LineSplitter::MAX_LINE + 10];
    splitter.feed(&long, |l| lines.push(l.to_string()));
    splitter.feed(b"tail\n$OK\n", |l| lines.push(l.to_string()));
    assert_eq!(lines, vec!["$OK"]);
}

#[test]
fn test_parse_rmc() {
    let now = Instant::now();
    let mut info = NmeaInfo::default();
    let mut parser = NmeaParser::new();
    let line = append_checksum("GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W");
    parser.parse_line(&line, &mut info, now).unwrap();
    let loc = info.location.unwrap();
    assert!((loc.latitude - 48.1173).abs() < 1e-4);
    assert!((loc.longitude - 11.516_667).abs() < 1e-4);
    assert!((info.ground_speed.unwrap() - 22.4 * 1852.0 / 3600.0).abs() < 1e-9);
    assert_eq!(info.track, Some(84.4));
    assert_eq!(info.utc_date, chrono::NaiveDate::from_ymd_opt(2094, 3, 23));
}

#[test]
fn test_parse_rmc_without_fix_keeps_location_empty() {
    let mut info = NmeaInfo::default();
    let line = append_checksum("GPRMC,123519,V,,,,,,,230394,,");
    NmeaParser::new().parse_line(&line, &mut info, Instant::now()).unwrap();
    assert!(info.location.is_none());
    assert!(info.utc_time.is_some());
}

#[test]
fn test_parse_gga_and_pgrmz() {
    let now = Instant::now();
    let mut info = NmeaInfo::default();
    let mut parser = NmeaParser::new();
    let gga = append_checksum("GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
    parser.parse_line(&gga, &mut info, now).unwrap();
    assert_eq!(info.satellites_used, Some(8));
    assert_eq!(info.gps_altitude, Some(545.4));
    let rmz = append_checksum("PGRMZ,1000,f,3");
    parser.parse_line(&rmz, &mut info, now).unwrap();
    assert!((info.baro_altitude.unwrap() - 304.8).abs() < 1e-9);
}

#[test]
fn test_unknown_sentence_is_unsupported() {
    let mut info = NmeaInfo::default();
    let line = append_checksum("GPXYZ,1,2,3");
    let res = NmeaParser::new().parse_line(&line, &mut info, Instant::now());
    assert!(matches!(res, Err(NmeaError::Unsupported { .. })));
}

#[test]
fn test_non_ascii_address_is_malformed() {
    let mut info = NmeaInfo::default();
    let mut parser = NmeaParser::new();
    let line = append_checksum("GéRMC,1");
    let res = parser.parse_line(&line, &mut info, Instant::now());
    assert!(matches!(res, Err(NmeaError::Malformed { .. })));

    parser.set_ignore_checksum(true);
    let res = parser.parse_line("$\u{FFFD}RMC,1", &mut info, Instant::now());
    assert!(matches!(res, Err(NmeaError::Malformed { .. })));
    let res = parser.parse_line("$é", &mut info, Instant::now());
    assert!(matches!(res, Err(NmeaError::Malformed { .. })));
    assert!(info.location.is_none());
}

#[test]
fn test_settings_eliminate_echo_but_keep_changes() {
    let sent = ExternalSettings { mac_cready: Some(1.5), ..Default::default() };
    let previous = ExternalSettings { bugs: Some(0.9), ..Default::default() };

    let mut incoming = ExternalSettings {
        mac_cready: Some(1.5),
        bugs: Some(0.9),
        qnh: Some(1013.0),
        ..Default::default()
    };
    incoming.eliminate_redundant(&sent, &previous);
    assert_eq!(incoming.mac_cready, None);
    assert_eq!(incoming.bugs, None);
    assert_eq!(incoming.qnh, Some(1013.0));

    let mut changed = ExternalSettings { mac_cready: Some(2.0), ..Default::default() };
    changed.eliminate_redundant(&sent, &previous);
    assert_eq!(changed.mac_cready, Some(2.0));
}

#[test]
fn test_settings_complement_only_copies_available_fields() {
    let mut received = ExternalSettings { mac_cready: Some(1.0), volume: Some(3), ..Default::default() };
    received.complement(&ExternalSettings { mac_cready: Some(2.0), ..Default::default() });
    assert_eq!(received.mac_cready, Some(2.0));
    assert_eq!(received.volume, Some(3));
}

#[test]
fn test_radio_frequency_range() {
    assert!(RadioFrequency::from_khz(100_000).is_none());
    let f = RadioFrequency::from_khz(122_475).unwrap();
    assert_eq!(f.to_string(), "122.475");
}
