//! Synchronously completed steps.

use std::sync::Arc;

use serde::Deserialize;

use super::{SkipTransition, TRACING_TARGET, parameters, take_token};
use crate::definition::Step;
use crate::instance::InstantiationEnv;
use crate::runtime::{Place, Ports, Token, Transition, TransitionCore};
use crate::{Error, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PassParameters {
    output: usize,
}

/// Transition of a `pass` step.
///
/// Raises "triggered" and immediately forwards the token to the output
/// named by the `output` parameter (default 0).
#[derive(Debug)]
pub struct PassTransition {
    core: TransitionCore,
    output: usize,
}

impl PassTransition {
    /// Creates the transition for `step` wired to `ports`.
    ///
    /// The `output` parameter must name a connected output.
    pub fn new(step: &Step, ports: Ports) -> Result<Self> {
        let PassParameters { output } = parameters(step)?;
        if output >= step.outputs.len() {
            return Err(Error::InvalidStepParameters {
                step: step.id,
                message: format!("output {output} out of {} outputs", step.outputs.len()),
            });
        }
        ports.require_output(step.id, output)?;
        Ok(Self {
            core: TransitionCore::new(step, ports),
            output,
        })
    }

    /// Creates the transition, or a [`SkipTransition`] if the step is
    /// disabled.
    pub fn create(
        step: &Step,
        ports: Ports,
        env: &InstantiationEnv,
    ) -> Result<Arc<dyn Transition>> {
        if env.is_disabled(step) {
            return Ok(Arc::new(SkipTransition::new(step, ports)?));
        }
        Ok(Arc::new(Self::new(step, ports)?))
    }

    /// Returns the output every token is forwarded to.
    pub fn output(&self) -> usize {
        self.output
    }
}

impl Transition for PassTransition {
    fn core(&self) -> &TransitionCore {
        &self.core
    }

    fn on_token(self: Arc<Self>, _slot: usize, place: &Arc<Place>, token: &Token) {
        if !self.core.is_running() {
            return;
        }
        self.core.begin_execution();
        if self.core.claim(place, token) {
            let this: Arc<dyn Transition> = self.clone();
            self.core.trigger(this);

            let output = self.output;
            let result = self.core.forward(|stored| {
                take_token(stored, token)
                    .map(|t| (output, t))
                    .into_iter()
                    .collect()
            });
            if let Err(error) = result {
                tracing::error!(
                    target: TRACING_TARGET,
                    step = %self.core.id(),
                    error = %error,
                    "Pass step cannot forward"
                );
            }
        }
        self.core.end_execution();
    }
}
