use strum_macros::Display;

/// What a slot is doing, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SlotState {
    /// Not configured or disabled.
    Disabled,
    /// Configured but closed on purpose.
    NotOpen,
    /// The last open attempt or the transport failed, a retry is pending.
    Failed,
    /// An open job is in flight.
    Opening,
    Ready,
}

/// Inputs [`SlotState`] is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateInputs {
    pub available: bool,
    pub job_running: bool,
    /// `Some(failed)` if a port is installed.
    pub port_failed: Option<bool>,
    pub sensor_open: bool,
    pub sensor_failed: bool,
    /// The last open attempt or the transport failed.
    pub failed: bool,
}

impl SlotState {
    pub(crate) fn derive(inputs: StateInputs) -> Self {
        if !inputs.available {
            Self::Disabled
        } else if inputs.job_running {
            Self::Opening
        } else if let Some(port_failed) = inputs.port_failed {
            if port_failed { Self::Failed } else { Self::Ready }
        } else if inputs.sensor_open {
            if inputs.sensor_failed { Self::Failed } else { Self::Ready }
        } else if inputs.failed {
            Self::Failed
        } else {
            Self::NotOpen
        }
    }
}
