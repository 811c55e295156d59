//! Built-in step kinds.
//!
//! | Step type     | Transition                  | Behavior                                  |
//! |---------------|-----------------------------|-------------------------------------------|
//! | `task`        | [`TaskTransition`]          | completed from outside on a chosen output |
//! | `pass`        | [`PassTransition`]          | completes immediately on a fixed output   |
//! | `split`       | [`SplitTransition`]         | forks a token onto every output           |
//! | `join`        | [`JoinTransition`]          | merges one token from every input         |
//! | `subworkplan` | [`SubworkplanTransition`]   | runs a nested workplan in a child engine  |
//!
//! Every built-in kind instantiates as a [`SkipTransition`] when the
//! execution context disables the step.

use serde::de::DeserializeOwned;

mod join;
mod pass;
mod skip;
mod split;
mod subworkplan;
mod task;

pub use join::JoinTransition;
pub use pass::PassTransition;
pub use skip::SkipTransition;
pub use split::SplitTransition;
pub use subworkplan::SubworkplanTransition;
pub use task::TaskTransition;

use crate::definition::{Step, step_types};
use crate::instance::StepRegistry;
use crate::runtime::Token;
use crate::{Error, Result};

/// Tracing target for step execution.
pub const TRACING_TARGET: &str = "weave_runtime::steps";

/// Registers every built-in step kind.
pub(crate) fn register_builtins(registry: &mut StepRegistry) {
    registry.register(step_types::TASK, TaskTransition::create);
    registry.register(step_types::PASS, PassTransition::create);
    registry.register(step_types::SPLIT, SplitTransition::create);
    registry.register(step_types::JOIN, JoinTransition::create);
    registry.register(step_types::SUBWORKPLAN, SubworkplanTransition::create);
}

/// Parses the parameters of `step`, using the default for null parameters.
fn parameters<T>(step: &Step) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if step.parameters.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(step.parameters.clone()).map_err(|e| Error::InvalidStepParameters {
        step: step.id,
        message: e.to_string(),
    })
}

/// Removes `token` from `stored`.
fn take_token(stored: &mut Vec<Token>, token: &Token) -> Option<Token> {
    let index = stored.iter().position(|t| t.id == token.id)?;
    Some(stored.remove(index))
}

/// Removes the oldest held token.
fn take_first(stored: &mut Vec<Token>) -> Option<Token> {
    (!stored.is_empty()).then(|| stored.remove(0))
}
