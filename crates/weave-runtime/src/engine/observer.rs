//! Engine events and their observers.

use std::sync::Arc;

use derive_more::{Debug, Display, From, Into};
use serde::{Deserialize, Serialize};
use weave_core::parallel::Decoupled;

use crate::definition::{Classification, ElementId};
use crate::runtime::{Place, Transition};

/// Handle of an engine subscription.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Debug, Display, From, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[serde(transparent)]
pub struct ObserverId(u64);

/// Receives the events of an [`Engine`](super::Engine).
///
/// Events are delivered synchronously on the thread moving the token, in
/// subscription order. Every method defaults to doing nothing.
pub trait EngineObserver: Send + Sync {
    /// A token arrived at an intermediate place.
    fn place_reached(&self, _place: &Arc<Place>) {}

    /// A transition began handling a token.
    fn transition_triggered(&self, _transition: &Arc<dyn Transition>) {}

    /// The run reached an exit place.
    fn completed(&self, _place: &Arc<Place>) {}
}

/// Owned form of an engine event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A token arrived at an intermediate place.
    PlaceReached {
        /// Connector of the place.
        place: ElementId,
    },
    /// A transition began handling a token.
    TransitionTriggered {
        /// Step of the transition.
        step: ElementId,
        /// Step type of the transition.
        step_type: String,
    },
    /// The run reached an exit place.
    Completed {
        /// Connector of the exit place.
        place: ElementId,
        /// Classification of the exit place.
        classification: Classification,
    },
}

/// Observer handing events to a drain thread.
///
/// Use it for listeners that are slow or must not run on the thread moving
/// tokens.
#[derive(Debug, Clone)]
pub struct DecoupledObserver {
    sender: Decoupled<EngineEvent>,
}

impl DecoupledObserver {
    /// Spawns a drain thread named `name` running `handler` for every event.
    pub fn spawn<F>(name: impl Into<String>, handler: F) -> weave_core::Result<Self>
    where
        F: FnMut(EngineEvent) + Send + 'static,
    {
        Decoupled::spawn(name, handler).map(Self::from)
    }

    fn send(&self, event: EngineEvent) {
        if !self.sender.send(event) {
            tracing::warn!(
                target: super::TRACING_TARGET,
                "Decoupled observer drain thread is gone"
            );
        }
    }
}

impl From<Decoupled<EngineEvent>> for DecoupledObserver {
    fn from(sender: Decoupled<EngineEvent>) -> Self {
        Self { sender }
    }
}

impl EngineObserver for DecoupledObserver {
    fn place_reached(&self, place: &Arc<Place>) {
        self.send(EngineEvent::PlaceReached { place: place.id() });
    }

    fn transition_triggered(&self, transition: &Arc<dyn Transition>) {
        self.send(EngineEvent::TransitionTriggered {
            step: transition.id(),
            step_type: transition.core().step_type().to_owned(),
        });
    }

    fn completed(&self, place: &Arc<Place>) {
        self.send(EngineEvent::Completed {
            place: place.id(),
            classification: place.classification(),
        });
    }
}
