//! Runtime error types.

use thiserror::Error as ThisError;

use crate::definition::ElementId;
use crate::engine::ExecutionState;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while defining, instantiating or running a workplan.
#[derive(Debug, ThisError)]
pub enum Error {
    /// An engine operation was invoked from a state that does not support it.
    #[error("cannot {operation} while the engine is {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the engine was in.
        state: ExecutionState,
    },

    /// A snapshot does not correspond to the instance it is applied to.
    #[error("snapshot does not match the instance: {0}")]
    SnapshotMismatch(String),

    /// Workplan definition is invalid.
    #[error("invalid workplan definition: {0}")]
    InvalidDefinition(String),

    /// No factory is registered for a step type.
    #[error("unknown step type '{step_type}' for step {step}")]
    UnknownStepType {
        /// Step with the unknown type.
        step: ElementId,
        /// Unregistered step type.
        step_type: String,
    },

    /// Step parameters could not be interpreted.
    #[error("invalid parameters for step {step}: {message}")]
    InvalidStepParameters {
        /// Step with invalid parameters.
        step: ElementId,
        /// Error message.
        message: String,
    },

    /// The workplan is no longer editable.
    #[error("workplan is {0} and can no longer be edited")]
    WorkplanLocked(String),

    /// An element does not exist in the workplan.
    #[error("element {0} not found")]
    ElementNotFound(ElementId),

    /// Pausing did not reach quiescence within the configured timeout.
    #[error("transitions still executing after the drain timeout")]
    DrainTimeout,

    /// An engine or snapshot belongs to a different workplan.
    #[error("workplan mismatch: {0}")]
    WorkplanMismatch(String),

    /// A transition tried to forward to an output it does not have.
    #[error("step {step} has no connected output {output}")]
    InvalidOutput {
        /// Step that tried to forward.
        step: ElementId,
        /// Requested output index.
        output: usize,
    },

    /// A completion was reported for a transition that holds no token.
    #[error("step {step} is not executing")]
    NotExecuting {
        /// Step that was completed.
        step: ElementId,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Creates a state-violation error.
    pub(crate) fn invalid_state(operation: &'static str, state: ExecutionState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Returns whether this is a state-violation error.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}
