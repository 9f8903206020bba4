use super::shared::SlotShared;
use std::sync::{Arc, Weak};

/// Repeats every line a device sent to all slots configured as NMEA output.
///
/// Called by a slot after it released its own mutex, so two slots never hold each
/// other's locks.
pub struct NmeaDispatcher {
    slots: Vec<Weak<SlotShared>>,
}

impl NmeaDispatcher {
    pub(crate) fn new(slots: &[Arc<SlotShared>]) -> Self { Self { slots: slots.iter().map(Arc::downgrade).collect() } }

    /// Forwards `line` from slot `source` to every other output slot.
    ///
    /// # Returns
    /// The number of slots the line was written to
    pub fn forward(&self, source: usize, line: &str) -> usize {
        self.slots
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|slot| slot.index() != source)
            .filter(|slot| slot.forward_line(line))
            .count()
    }
}
