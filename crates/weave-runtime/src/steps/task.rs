//! Externally completed steps.

use std::sync::Arc;

use super::{SkipTransition, TRACING_TARGET, take_first};
use crate::definition::Step;
use crate::instance::InstantiationEnv;
use crate::runtime::{Place, Ports, Token, Transition, TransitionCore};
use crate::{Error, Result};

/// Transition of a `task` step.
///
/// Takes one token at a time and raises "triggered"; the step logic runs
/// elsewhere, typically in a dispatcher handler, and reports the chosen
/// output through [`complete`](Self::complete). The transition counts as
/// executing until then.
#[derive(Debug)]
pub struct TaskTransition {
    core: TransitionCore,
}

impl TaskTransition {
    /// Creates the transition for `step` wired to `ports`.
    pub fn new(step: &Step, ports: Ports) -> Self {
        Self {
            core: TransitionCore::new(step, ports),
        }
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
        Ok(Arc::new(Self::new(step, ports)))
    }

    /// Returns the name of the originating step.
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Completes the oldest held token on output `result`.
    ///
    /// Fails with [`Error::NotExecuting`] if no token is held and with
    /// [`Error::InvalidOutput`] if `result` is not a connected output; the
    /// token stays held in both cases.
    pub fn complete(&self, result: usize) -> Result<()> {
        let forwarded = self
            .core
            .forward(|stored| take_first(stored).map(|t| (result, t)).into_iter().collect())?;
        if forwarded == 0 {
            return Err(Error::NotExecuting {
                step: self.core.id(),
            });
        }

        tracing::trace!(
            target: TRACING_TARGET,
            step = %self.core.id(),
            output = result,
            "Task completed"
        );
        self.core.end_execution();
        Ok(())
    }
}

impl Transition for TaskTransition {
    fn core(&self) -> &TransitionCore {
        &self.core
    }

    fn on_token(self: Arc<Self>, _slot: usize, place: &Arc<Place>, token: &Token) {
        if !self.core.is_running() {
            return;
        }
        self.core.begin_execution();
        if !self.core.claim(place, token) {
            self.core.end_execution();
            return;
        }
        let this: Arc<dyn Transition> = self.clone();
        self.core.trigger(this);
    }

    /// Re-triggers held tokens that no step logic is working on, which is
    /// the case after restoring a snapshot into a fresh instance.
    fn resume(self: Arc<Self>) {
        self.core.set_running(true);
        if self.core.is_executing() {
            return;
        }
        for _ in self.core.stored_tokens() {
            self.core.begin_execution();
            let this: Arc<dyn Transition> = self.clone();
            self.core.trigger(this);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, Recorder};
    use crate::engine::{Engine, ExecutionState};

    #[test]
    fn test_task_waits_for_completion() {
        let engine = Engine::default();
        let recorder = Recorder::attach(&engine);
        let instance = fixtures::initialize(&engine, fixtures::linear());
        engine.start().expect("ready");

        let task = fixtures::task(&instance, "work");
        assert_eq!(recorder.triggered(), vec!["work".to_string()]);
        assert!(task.is_executing());
        assert_eq!(engine.state(), ExecutionState::Running);

        task.complete(0).expect("token held");
        assert!(!task.is_executing());
        assert_eq!(engine.state(), ExecutionState::Idle);
        assert_eq!(recorder.completions(), vec!["end".to_string()]);
    }

    #[test]
    fn test_complete_without_token_fails() {
        let instance = fixtures::instantiate(fixtures::linear());
        let task = fixtures::task(&instance, "work");
        assert!(matches!(task.complete(0), Err(Error::NotExecuting { .. })));
    }

    #[test]
    fn test_complete_on_missing_output_keeps_token() {
        let engine = Engine::default();
        let instance = fixtures::initialize(&engine, fixtures::linear());
        engine.start().expect("ready");

        let task = fixtures::task(&instance, "work");
        assert!(matches!(task.complete(3), Err(Error::InvalidOutput { output: 3, .. })));
        assert_eq!(task.stored_tokens().len(), 1);
        assert!(task.is_executing());

        task.complete(0).expect("token held");
        assert_eq!(engine.state(), ExecutionState::Idle);
    }

    #[test]
    fn test_resume_retriggers_restored_token() {
        let engine = Engine::default();
        let recorder = Recorder::attach(&engine);
        let instance = fixtures::initialize(&engine, fixtures::linear());

        let task = fixtures::task(&instance, "work");
        task.restore(vec![Token::main()], None).expect("restored");
        Arc::clone(&task).resume();

        assert!(task.is_executing());
        assert_eq!(recorder.triggered(), vec!["work".to_string()]);
    }
}
