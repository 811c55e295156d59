//! Live token-flow model.
//!
//! This module provides the runtime counterparts of the definition types:
//! - [`Place`]: token holder created from a connector
//! - [`Transition`]: token holder created from a step, with [`TransitionCore`]
//!   carrying the state shared by every step kind
//! - [`Token`]: unit of flow moving between holders
//! - [`FlowLock`]: per-instance lock making token movements atomic with
//!   respect to whole-instance scans

use std::any::Any;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

mod place;
mod token;
mod transition;

pub use place::{Place, PlaceObserver};
pub use token::{Token, TokenId, TokenKind};
pub use transition::{Ports, Transition, TransitionCore, TransitionObserver};

/// Tracing target for token movements.
pub(crate) const TRACING_TARGET: &str = "weave_runtime::runtime";

/// Lock shared by every holder of one workplan instance.
///
/// A token movement (remove from one holder, store in another) runs under
/// [`moving`](Self::moving); several movements may proceed concurrently.
/// Scans that must observe every token exactly once, such as snapshot
/// capture and path prediction, run under [`freeze`](Self::freeze).
///
/// Guards are never held while notifying observers, so neither guard may be
/// taken again by the same thread while it is held.
#[derive(Debug, Clone, Default)]
pub struct FlowLock {
    inner: Arc<RwLock<()>>,
}

impl FlowLock {
    /// Creates a new flow lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the shared guard for a single token movement.
    pub fn moving(&self) -> RwLockReadGuard<'_, ()> {
        self.inner.read()
    }

    /// Acquires the exclusive guard stopping every token movement.
    pub fn freeze(&self) -> RwLockWriteGuard<'_, ()> {
        self.inner.write()
    }
}

/// Downcasting support for trait objects.
pub trait AsAny: Any + Send + Sync {
    /// Returns `self` as [`Any`].
    fn as_any(&self) -> &dyn Any;

    /// Converts a shared pointer into a shared [`Any`].
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
