//! Handle for periodic work.

use tokio_util::sync::CancellationToken;

/// Stoppable handle returned by [`super::ParallelOperations::schedule_periodic`].
///
/// Dropping the handle stops the schedule. An invocation already running
/// finishes, but no further ticks fire.
#[derive(Debug)]
pub struct PeriodicHandle {
    token: CancellationToken,
}

impl PeriodicHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Stops the schedule.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Returns whether the schedule was stopped.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PeriodicHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
