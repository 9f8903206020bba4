use crate::nmea::{DerivedInfo, NmeaInfo};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::time::Instant;

pub(crate) struct BlackboardState {
    pub real: Vec<NmeaInfo>,
    pub calculated: DerivedInfo,
}

/// Per-device records shared by all slots and their consumers.
///
/// Slots write their record while holding their own mutex; the blackboard mutex is
/// always taken second.
pub struct DeviceBlackboard {
    state: Mutex<BlackboardState>,
    changed: Notify,
}

impl DeviceBlackboard {
    pub fn new(devices: usize) -> Self {
        Self {
            state: Mutex::new(BlackboardState {
                real: vec![NmeaInfo::default(); devices],
                calculated: DerivedInfo::default(),
            }),
            changed: Notify::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, BlackboardState> { self.state.lock().unwrap() }

    pub fn len(&self) -> usize { self.lock().real.len() }
    pub fn is_empty(&self) -> bool { self.lock().real.is_empty() }

    /// Snapshot of the record of device `index`.
    pub fn real_state(&self, index: usize) -> NmeaInfo { self.lock().real.get(index).cloned().unwrap_or_default() }

    pub fn set_real_state(&self, index: usize, info: NmeaInfo) {
        if let Some(slot) = self.lock().real.get_mut(index) {
            *slot = info;
        }
        self.changed.notify_one();
    }

    /// Forgets everything device `index` reported.
    pub fn reset_state(&self, index: usize) {
        if let Some(slot) = self.lock().real.get_mut(index) {
            slot.reset();
        }
        self.changed.notify_one();
    }

    pub fn calculated(&self) -> DerivedInfo { self.lock().calculated }

    pub fn set_calculated(&self, calculated: DerivedInfo) { self.lock().calculated = calculated; }

    /// Drops stale values of all devices.
    pub fn expire(&self, now: Instant) {
        for info in &mut self.lock().real {
            info.expire(now);
        }
    }

    /// Wakes up one waiter of [`DeviceBlackboard::changed`].
    pub fn notify(&self) { self.changed.notify_one(); }

    /// Resolves after the next change of any record.
    pub async fn changed(&self) { self.changed.notified().await; }
}
