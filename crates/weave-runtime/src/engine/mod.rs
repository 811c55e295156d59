//! Workplan execution engine.
//!
//! This module provides the state machine driving one run:
//! - [`Engine`]: initialize, start, pause, restore and destroy a run
//! - [`EngineConfig`]: pause drain options
//! - [`Snapshot`]: serializable record of a paused run
//! - [`EngineObserver`]: place-reached, triggered and completed events

mod config;
mod executor;
mod observer;
mod snapshot;
mod state;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use executor::Engine;
pub(crate) use executor::EngineCore;
pub use observer::{DecoupledObserver, EngineEvent, EngineObserver, ObserverId};
pub use snapshot::{HolderSnapshot, Snapshot};
pub use state::ExecutionState;

/// Tracing target for engine operations.
pub const TRACING_TARGET: &str = "weave_runtime::engine";
