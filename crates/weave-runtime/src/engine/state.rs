//! Engine states.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use super::Snapshot;
use crate::instance::WorkplanInstance;

/// Observable state of an [`Engine`](super::Engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// No run in progress; initial and terminal state.
    Idle,
    /// Bound to an instance, not started.
    Ready,
    /// Bound to an instance with a snapshot waiting to be replayed.
    Restored,
    /// Tokens are flowing.
    Running,
    /// Stopped at a snapshot.
    Paused,
}

/// Internal state carrying the data each state owns.
pub(crate) enum EngineState {
    Idle {
        last: Option<Arc<WorkplanInstance>>,
    },
    Ready {
        instance: Arc<WorkplanInstance>,
    },
    Restored {
        instance: Arc<WorkplanInstance>,
        snapshot: Snapshot,
    },
    Running {
        instance: Arc<WorkplanInstance>,
    },
    Paused {
        instance: Arc<WorkplanInstance>,
        snapshot: Snapshot,
    },
}

impl EngineState {
    pub(crate) fn kind(&self) -> ExecutionState {
        match self {
            Self::Idle { .. } => ExecutionState::Idle,
            Self::Ready { .. } => ExecutionState::Ready,
            Self::Restored { .. } => ExecutionState::Restored,
            Self::Running { .. } => ExecutionState::Running,
            Self::Paused { .. } => ExecutionState::Paused,
        }
    }

    pub(crate) fn instance(&self) -> Option<&Arc<WorkplanInstance>> {
        match self {
            Self::Idle { last } => last.as_ref(),
            Self::Ready { instance }
            | Self::Restored { instance, .. }
            | Self::Running { instance }
            | Self::Paused { instance, .. } => Some(instance),
        }
    }

    pub(crate) fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            Self::Restored { snapshot, .. } | Self::Paused { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }
}
