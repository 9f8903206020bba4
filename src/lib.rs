//! Instrument connection manager for a flight computer.
//!
//! Up to [`config::MAX_DEVICES`] device slots connect external instruments (serial,
//! TCP or simulated links) and the built-in sensors. Opening runs in the background,
//! received lines are parsed into one record per device on the
//! [`device::DeviceBlackboard`], and settings changed in flight are forwarded to the
//! instruments without echoing back what they reported.
#![allow(clippy::similar_names, clippy::missing_errors_doc, clippy::missing_panics_doc)]
#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]

pub mod logger;

pub mod config;
pub mod device;
pub mod driver;
pub mod fusion;
pub mod job;
pub mod nmea;
pub mod port;
pub mod sensor;
pub mod util;
