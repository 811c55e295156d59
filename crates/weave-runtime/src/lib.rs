#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod definition;
pub mod dispatcher;
pub mod engine;
mod error;
pub mod instance;
pub mod prediction;
pub mod runtime;
pub mod steps;

#[doc(hidden)]
pub mod prelude;

#[cfg(test)]
mod fixtures;

pub use error::{Error, Result};

/// Tracing target for runtime operations.
pub const TRACING_TARGET: &str = "weave_runtime";
