use tokio::runtime::Handle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Context of a blocking operation: cancellation, pacing and progress reporting.
pub trait OperationEnvironment: Send + Sync {
    fn is_cancelled(&self) -> bool;

    /// Blocks for `duration`, returning early when cancelled.
    fn sleep(&self, duration: Duration);

    fn set_error_message(&self, text: &str);
    fn set_text(&self, text: &str);
    fn set_progress_range(&self, range: u32);
    fn set_progress_position(&self, position: u32);
}

/// Environment that is never cancelled and discards all reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOperationEnvironment;

impl OperationEnvironment for NullOperationEnvironment {
    fn is_cancelled(&self) -> bool { false }
    fn sleep(&self, duration: Duration) { std::thread::sleep(duration); }
    fn set_error_message(&self, _text: &str) {}
    fn set_text(&self, _text: &str) {}
    fn set_progress_range(&self, _range: u32) {}
    fn set_progress_position(&self, _position: u32) {}
}

/// Environment that writes every report to the log.
#[derive(Debug, Clone)]
pub struct LogOperationEnvironment {
    label: String,
}

impl LogOperationEnvironment {
    pub fn new(label: &str) -> Self { Self { label: label.to_string() } }
}

impl OperationEnvironment for LogOperationEnvironment {
    fn is_cancelled(&self) -> bool { false }
    fn sleep(&self, duration: Duration) { std::thread::sleep(duration); }
    fn set_error_message(&self, text: &str) { crate::warn!("{}: {text}", self.label); }
    fn set_text(&self, text: &str) { crate::log!("{}: {text}", self.label); }
    fn set_progress_range(&self, _range: u32) {}
    fn set_progress_position(&self, _position: u32) {}
}

/// Environment of a job started by an [`AsyncJobRunner`](super::AsyncJobRunner).
///
/// Cancellation follows the runner's [`CancellationToken`], sleeping wakes up as soon
/// as the token is tripped.
#[derive(Debug, Clone)]
pub struct JobEnvironment {
    label: String,
    token: CancellationToken,
    handle: Handle,
}

impl JobEnvironment {
    pub fn new(label: &str, token: CancellationToken, handle: Handle) -> Self {
        Self { label: label.to_string(), token, handle }
    }

    pub fn token(&self) -> &CancellationToken { &self.token }
    pub fn handle(&self) -> &Handle { &self.handle }
}

impl OperationEnvironment for JobEnvironment {
    fn is_cancelled(&self) -> bool { self.token.is_cancelled() }

    fn sleep(&self, duration: Duration) {
        let token = self.token.clone();
        self.handle.block_on(async move {
            tokio::select! {
                () = tokio::time::sleep(duration) => {},
                () = token.cancelled() => {},
            }
        });
    }

    fn set_error_message(&self, text: &str) { crate::warn!("{}: {text}", self.label); }
    fn set_text(&self, text: &str) { crate::event!("{}: {text}", self.label); }
    fn set_progress_range(&self, _range: u32) {}
    fn set_progress_position(&self, position: u32) { crate::event!("{}: step {position}", self.label); }
}
