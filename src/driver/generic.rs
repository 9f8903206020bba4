use super::Driver;

/// Plain NMEA device. The generic parser handles everything it sends.
#[derive(Debug, Default)]
pub struct GenericDriver;

impl Driver for GenericDriver {}

/// Sink that repeats the lines of all other devices, e.g. for an external display.
#[derive(Debug, Default)]
pub struct NmeaOutDriver;

impl Driver for NmeaOutDriver {}
