use super::JobEnvironment;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Identifies one job started by a runner. Ids are never reused.
pub type JobId = u64;

#[derive(Debug)]
struct RunningJob {
    id: JobId,
    token: CancellationToken,
}

/// Runs at most one blocking job at a time and matches completions to it.
///
/// Completion is reported from the worker through `on_done`, which must only send a
/// message to the owner. The owner calls [`AsyncJobRunner::finish`] when that
/// message arrives; completions of cancelled jobs are recognised by their stale id.
#[derive(Debug, Default)]
pub struct AsyncJobRunner {
    next_id: JobId,
    current: Option<RunningJob>,
}

impl AsyncJobRunner {
    pub fn new() -> Self { Self::default() }

    /// `true` from `start` until `finish` or `cancel`.
    pub fn is_busy(&self) -> bool { self.current.is_some() }

    pub fn current_id(&self) -> Option<JobId> { self.current.as_ref().map(|job| job.id) }

    /// Starts `work` on the blocking pool of `handle`, cancelling a previous job.
    ///
    /// # Arguments
    /// * `handle` - runtime owning the blocking pool
    /// * `label` - name used in log messages
    /// * `work` - the job body
    /// * `on_done` - called on the worker with the job id and the result, `None` if
    ///   `work` panicked
    ///
    /// # Returns
    /// The id of the new job
    pub fn start<R, W, D>(&mut self, handle: &Handle, label: &str, work: W, on_done: D) -> JobId
    where
        R: Send + 'static,
        W: FnOnce(&JobEnvironment) -> R + Send + 'static,
        D: FnOnce(JobId, Option<R>) + Send + 'static,
    {
        self.cancel();
        self.next_id += 1;
        let id = self.next_id;
        let token = CancellationToken::new();
        let env = JobEnvironment::new(label, token.clone(), handle.clone());
        let label = label.to_string();
        handle.spawn_blocking(move || {
            let result = catch_unwind(AssertUnwindSafe(|| work(&env)));
            if result.is_err() {
                crate::error!("{label}: job {id} panicked");
            }
            on_done(id, result.ok());
        });
        self.current = Some(RunningJob { id, token });
        id
    }

    /// Accepts the completion of job `id`.
    ///
    /// # Returns
    /// `true` if `id` is the current job, which is then forgotten; `false` for a
    /// completion of a cancelled or superseded job
    pub fn finish(&mut self, id: JobId) -> bool {
        if self.current_id() == Some(id) {
            self.current = None;
            true
        } else {
            false
        }
    }

    /// Trips the cancellation token of the current job and forgets it.
    pub fn cancel(&mut self) {
        if let Some(job) = self.current.take() {
            job.token.cancel();
        }
    }
}

impl Drop for AsyncJobRunner {
    fn drop(&mut self) { self.cancel(); }
}
