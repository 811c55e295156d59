#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for worker-pool operations.
pub const TRACING_TARGET_PARALLEL: &str = "weave_core::parallel";

mod error;

pub mod parallel;

#[doc(hidden)]
pub mod prelude;

pub use error::{BoxedError, Error, ErrorKind, Result};
