//! Workplan definition types.
//!
//! This module contains the serializable, editor-friendly description of a
//! workplan:
//! - [`Workplan`]: ordered connectors and steps with a growing id counter
//! - [`Connector`]: definition of a place, carrying its [`Classification`]
//! - [`Step`]: definition of a transition, wired to connectors by id
//! - [`validate`]: structural checks such as lone wolves and dead ends
//!
//! To execute a workplan it must be instantiated into live places and
//! transitions using [`crate::instance::WorkplanInstance`].

mod connector;
mod id;
mod step;
mod util;
mod validation;
mod workplan;

pub use connector::{Classification, Connector, ConnectorBuilder};
pub use id::ElementId;
pub use step::{Port, Step, StepBuilder, step_types};
pub use util::Position;
pub use validation::{ValidationAspect, ValidationError, validate};
pub use workplan::{Workplan, WorkplanState};
