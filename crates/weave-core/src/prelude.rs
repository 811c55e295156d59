//! Convenient re-exports for common use.

pub use crate::error::{BoxedError, Error, ErrorKind, Result};
pub use crate::parallel::{
    Criticality, Decoupled, ParallelConfig, ParallelOperations, PeriodicHandle,
    TokioParallelOperations,
};
