//! Cancellable background operations.
//!
//! Blocking work (connecting, driver handshakes, declarations) runs on the tokio
//! blocking pool through an [`AsyncJobRunner`]. The work sees its cancellation and
//! reports progress through an [`OperationEnvironment`].

mod async_job;
mod operation;

#[cfg(test)]
mod tests;

pub use async_job::{AsyncJobRunner, JobId};
pub use operation::{JobEnvironment, LogOperationEnvironment, NullOperationEnvironment, OperationEnvironment};
