//! Worker-pool capability consumed by the workflow engine.
//!
//! This module provides the execution primitives that step logic and
//! dispatchers opt into:
//! - [`ParallelOperations`]: Object-safe worker-pool interface
//! - [`TokioParallelOperations`]: Implementation over a Tokio runtime handle
//! - [`PeriodicHandle`]: Stoppable handle for non-stacking periodic work
//! - [`Decoupled`]: Moves event handling onto a dedicated drain thread
//! - [`retry`]: Bounded retry with a fixed inter-attempt delay

mod config;
mod decouple;
mod failure;
mod periodic;
mod retry;
mod runtime;

use std::sync::Arc;
use std::time::Duration;

pub use config::ParallelConfig;
pub use decouple::Decoupled;
pub use failure::{Criticality, Escalation, FailureRouter};
pub use periodic::PeriodicHandle;
pub use retry::retry;
pub use runtime::TokioParallelOperations;

use crate::{BoxedError, Result};

/// One-shot unit of work submitted to the pool.
pub type Task = Box<dyn FnOnce() -> std::result::Result<(), BoxedError> + Send + 'static>;

/// Unit of work invoked on every tick of a periodic schedule.
pub type RepeatingTask =
    Arc<dyn Fn() -> std::result::Result<(), BoxedError> + Send + Sync + 'static>;

/// Unit of work that may be invoked several times until it succeeds.
pub type RetryTask = Box<dyn FnMut() -> std::result::Result<(), BoxedError> + Send + 'static>;

/// Worker-pool interface.
///
/// Failures of submitted work never surface at the submission site; they are
/// routed by [`Criticality`] to either the escalation path or a log-only path.
pub trait ParallelOperations: Send + Sync {
    /// Runs `task` once on a pool thread (fire and forget).
    fn execute(&self, criticality: Criticality, task: Task);

    /// Runs `task` every `interval` until the returned handle is stopped.
    ///
    /// At most one invocation is active per schedule: a tick that fires while
    /// the previous invocation is still running is skipped, not queued.
    fn schedule_periodic(
        &self,
        interval: Duration,
        criticality: Criticality,
        task: RepeatingTask,
    ) -> Result<PeriodicHandle>;

    /// Runs `task` on a pool thread until it succeeds or `attempts` are used up.
    fn execute_with_retry(
        &self,
        criticality: Criticality,
        attempts: u32,
        delay: Duration,
        task: RetryTask,
    );
}
