//! Internal and sensor-bus sensor events.
//!
//! Sensors publish [`SensorEvent`]s on a [`SensorHub`]. Every slot whose port type is
//! `Internal` or `SensorBus` subscribes while it is open and feeds the events into its
//! [`SensorFusion`](crate::fusion::SensorFusion).

mod event;
mod hub;

#[cfg(test)]
mod tests;

pub use event::{SensorEvent, SensorSource};
pub use hub::{SensorHub, SensorSubscription};
