use crate::nmea::GeoPoint;
use chrono::{NaiveDate, NaiveTime};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Waypoint {
    pub name: String,
    pub location: GeoPoint,
    /// Elevation above MSL in m.
    pub elevation: f64,
}

/// A task declaration sent to a logger before the flight.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Declaration {
    pub pilot_name: String,
    pub aircraft_type: String,
    pub aircraft_registration: String,
    pub competition_id: String,
    pub turnpoints: Vec<Waypoint>,
}

impl Declaration {
    pub fn len(&self) -> usize { self.turnpoints.len() }
    pub fn is_empty(&self) -> bool { self.turnpoints.is_empty() }
}

/// One entry of a logger's flight list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFlightInfo {
    /// Logger specific key used to download the flight.
    pub id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}
