//! Disabled steps.

use std::sync::Arc;

use super::{TRACING_TARGET, take_token};
use crate::Result;
use crate::definition::Step;
use crate::runtime::{Place, Ports, Token, Transition, TransitionCore};

/// Transition of a disabled step.
///
/// Forwards every token to output 0 without raising "triggered", so no
/// step logic runs.
#[derive(Debug)]
pub struct SkipTransition {
    core: TransitionCore,
}

impl SkipTransition {
    /// Creates the transition for `step` wired to `ports`.
    ///
    /// Fails with [`crate::Error::InvalidOutput`] if output 0 is not
    /// connected.
    pub fn new(step: &Step, ports: Ports) -> Result<Self> {
        ports.require_output(step.id, 0)?;
        Ok(Self {
            core: TransitionCore::new(step, ports),
        })
    }
}

impl Transition for SkipTransition {
    fn core(&self) -> &TransitionCore {
        &self.core
    }

    fn on_token(self: Arc<Self>, _slot: usize, place: &Arc<Place>, token: &Token) {
        if !self.core.is_running() {
            return;
        }
        self.core.begin_execution();
        if self.core.claim(place, token) {
            tracing::trace!(
                target: TRACING_TARGET,
                step = %self.core.id(),
                "Skipping disabled step"
            );
            let result = self
                .core
                .forward(|stored| take_token(stored, token).map(|t| (0, t)).into_iter().collect());
            if let Err(error) = result {
                tracing::error!(
                    target: TRACING_TARGET,
                    step = %self.core.id(),
                    error = %error,
                    "Disabled step cannot forward"
                );
            }
        }
        self.core.end_execution();
    }
}
