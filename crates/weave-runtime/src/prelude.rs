//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types for ergonomic imports:
//!
//! ```rust
//! use weave_runtime::prelude::*;
//! ```

pub use crate::definition::{
    Classification, Connector, ElementId, Port, Step, ValidationAspect, ValidationError,
    Workplan, validate,
};
pub use crate::dispatcher::{DispatchMode, HandlerResult, TransitionDispatcher};
pub use crate::engine::{Engine, EngineConfig, EngineObserver, ExecutionState, Snapshot};
pub use crate::error::{Error, Result};
pub use crate::instance::{
    DefaultContext, DisabledSteps, InstantiationEnv, StepRegistry, WorkplanContext,
    WorkplanInstance,
};
pub use crate::prediction::{PathPredictor, PredictionMonitor};
pub use crate::runtime::{Place, Token, Transition};
pub use crate::steps::{
    JoinTransition, PassTransition, SkipTransition, SplitTransition, SubworkplanTransition,
    TaskTransition,
};
