//! Device slots and the list coordinating them.
//!
//! A [`DeviceSlot`] is owned by the main loop and therefore only ever touched from one
//! task. Everything background work needs (port, driver, parser, settings
//! snapshots) lives in its `SlotShared` behind a mutex. Workers report back to the
//! main loop with [`MainEvent`]s.

mod blackboard;
mod borrow;
mod context;
mod descriptor;
mod device_list;
mod dispatcher;
mod open_job;
mod shared;
mod slot_state;

#[cfg(test)]
mod tests;

pub use blackboard::DeviceBlackboard;
pub use borrow::{BorrowError, BorrowToken};
pub use context::SlotContext;
pub use descriptor::DeviceSlot;
pub use device_list::DeviceList;
pub use dispatcher::NmeaDispatcher;
pub use slot_state::SlotState;

use crate::job::JobId;

/// Notifications from I/O tasks and workers, processed in order by the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MainEvent {
    /// An open job of `slot` completed.
    JobFinished { slot: usize, job_id: JobId },
    PortStateChanged { slot: usize },
    PortError { slot: usize, message: String },
    /// `slot` reported settings that were changed on the instrument.
    SettingsReceived { slot: usize },
    SensorStateChanged { slot: usize },
}

impl MainEvent {
    pub fn slot(&self) -> usize {
        match self {
            Self::JobFinished { slot, .. }
            | Self::PortStateChanged { slot }
            | Self::PortError { slot, .. }
            | Self::SettingsReceived { slot }
            | Self::SensorStateChanged { slot } => *slot,
        }
    }
}
