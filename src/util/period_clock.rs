use tokio::time::{Duration, Instant};

/// Remembers when something last happened and answers "has enough time passed?".
///
/// Used as the reopen clock of a device slot: it is updated on every open attempt
/// and on every failure, and `check_update` gates the next automatic retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodClock {
    /// Time of the last update, `None` if the clock was never started.
    last: Option<Instant>,
}

impl PeriodClock {
    /// Creates a clock that has never been updated.
    pub fn new() -> Self { Self { last: None } }

    /// Returns `true` if the clock was updated at least once.
    pub fn is_defined(&self) -> bool { self.last.is_some() }

    /// Marks "now" as the last update.
    pub fn update(&mut self) { self.update_at(Instant::now()); }

    pub fn update_at(&mut self, now: Instant) { self.last = Some(now); }

    /// Time since the last update, `None` if never updated.
    pub fn elapsed_at(&self, now: Instant) -> Option<Duration> {
        self.last.map(|last| now.saturating_duration_since(last))
    }

    /// Checks whether `period` has passed since the last update. If it has (or the
    /// clock was never updated) the clock is updated and `true` is returned.
    pub fn check_update(&mut self, period: Duration) -> bool {
        self.check_update_at(period, Instant::now())
    }

    pub fn check_update_at(&mut self, period: Duration, now: Instant) -> bool {
        match self.elapsed_at(now) {
            Some(elapsed) if elapsed < period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
