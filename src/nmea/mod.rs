//! NMEA-level data model and the generic line parser.
//!
//! Everything a device delivers ends up in an [`NmeaInfo`] record: drivers write
//! their proprietary sentences into it, the generic [`NmeaParser`] handles the
//! standard ones, and the sensor dispatcher fills it from internal sensors.

mod checksum;
mod info;
mod line_splitter;
mod parser;
mod settings;

#[cfg(test)]
mod tests;

pub use checksum::{append_checksum, compute_checksum, verify_checksum};
pub use info::{DerivedInfo, GeoPoint, NmeaInfo};
pub use line_splitter::LineSplitter;
pub use parser::{NmeaError, NmeaParser, NmeaSentence};
pub use settings::{ExternalSettings, RadioFrequency};
