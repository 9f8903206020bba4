use tokio::time::{Duration, Instant};

/// Timestamp of the last time a value was provided.
///
/// A value is considered valid while the time since its last update is below the
/// maximum age the caller asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Validity {
    last: Option<Instant>,
}

impl Validity {
    pub fn invalid() -> Self { Self { last: None } }

    pub fn update(&mut self, now: Instant) { self.last = Some(now); }

    pub fn clear(&mut self) { self.last = None; }

    pub fn is_valid(&self) -> bool { self.last.is_some() }

    pub fn last_update(&self) -> Option<Instant> { self.last }

    /// `true` if the value was updated less than `max_age` before `now`.
    pub fn is_fresh(&self, now: Instant, max_age: Duration) -> bool {
        self.last.is_some_and(|last| now.saturating_duration_since(last) < max_age)
    }

    /// Invalidates the value if it is older than `max_age`.
    pub fn expire(&mut self, now: Instant, max_age: Duration) {
        if !self.is_fresh(now, max_age) {
            self.last = None;
        }
    }
}
