//! Forking steps.

use std::sync::Arc;

use super::{SkipTransition, TRACING_TARGET, take_token};
use crate::definition::Step;
use crate::instance::InstantiationEnv;
use crate::runtime::{Place, Ports, Token, Transition, TransitionCore};
use crate::{Error, Result};

/// Transition of a `split` step.
///
/// Places a split token wrapping the incoming token on every connected
/// output. All outputs receive their token before any is announced.
#[derive(Debug)]
pub struct SplitTransition {
    core: TransitionCore,
}

impl SplitTransition {
    /// Creates the transition for `step` wired to `ports`.
    ///
    /// At least one output must be connected.
    pub fn new(step: &Step, ports: Ports) -> Result<Self> {
        if ports.outputs.iter().all(Option::is_none) {
            return Err(Error::InvalidOutput {
                step: step.id,
                output: 0,
            });
        }
        Ok(Self {
            core: TransitionCore::new(step, ports),
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
}

impl Transition for SplitTransition {
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

            let outputs: Vec<usize> = self
                .core
                .outputs()
                .iter()
                .enumerate()
                .filter_map(|(index, place)| place.as_ref().map(|_| index))
                .collect();
            let result = self.core.forward(|stored| match take_token(stored, token) {
                Some(original) => outputs
                    .into_iter()
                    .map(|index| (index, Token::split(&original)))
                    .collect(),
                None => Vec::new(),
            });

            match result {
                Ok(forked) => tracing::trace!(
                    target: TRACING_TARGET,
                    step = %self.core.id(),
                    forked,
                    "Token split"
                ),
                Err(error) => tracing::error!(
                    target: TRACING_TARGET,
                    step = %self.core.id(),
                    error = %error,
                    "Split step cannot forward"
                ),
            }
        }
        self.core.end_execution();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Classification, Connector};
    use crate::engine::{Engine, ExecutionState};
    use crate::fixtures::{self, Recorder};
    use crate::runtime::FlowLock;

    #[test]
    fn test_split_forks_every_output_before_announcing() {
        let engine = Engine::default();
        let recorder = Recorder::attach(&engine);
        let instance = fixtures::initialize(&engine, fixtures::split_join());
        engine.start().expect("ready");

        assert_eq!(recorder.triggered(), vec!["fork", "left", "right"]);
        let left = fixtures::task(&instance, "left").stored_tokens();
        let right = fixtures::task(&instance, "right").stored_tokens();
        assert_eq!(left.len(), 1);
        assert_eq!(right.len(), 1);
        assert_ne!(left[0].id, right[0].id);
        assert_eq!(left[0].original(), right[0].original());
        assert!(left[0].original().is_some_and(|t| t.is_main()));

        fixtures::task(&instance, "left").complete(0).expect("held");
        fixtures::task(&instance, "right").complete(0).expect("held");
        fixtures::task(&instance, "finish").complete(0).expect("held");
        assert_eq!(engine.state(), ExecutionState::Idle);
    }

    #[test]
    fn test_split_needs_a_connected_output() {
        let flow = FlowLock::new();
        let step = Step::split("fork", 2);
        let ports = |outputs: Vec<Option<Arc<Place>>>| Ports {
            inputs: vec![None],
            outputs,
            flow: flow.clone(),
        };

        assert!(matches!(
            SplitTransition::new(&step, ports(vec![None, None])),
            Err(Error::InvalidOutput { output: 0, .. })
        ));

        let place = Connector::new("a", Classification::Intermediate).create_place(&flow);
        assert!(SplitTransition::new(&step, ports(vec![None, Some(place)])).is_ok());
    }
}
