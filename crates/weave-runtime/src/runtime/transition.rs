//! Runtime transition contract and shared state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::{AsAny, FlowLock, Place, TRACING_TARGET, Token};
use crate::definition::{ElementId, Step};
use crate::{Error, Result};

/// Receives the "triggered" events of a [`Transition`].
pub trait TransitionObserver: Send + Sync {
    /// Called when `transition` begins handling a token.
    fn triggered(&self, transition: Arc<dyn Transition>);
}

/// Runtime places wired to a step, resolved during instantiation.
#[derive(Debug, Clone)]
pub struct Ports {
    /// Places wired to the input slots.
    pub inputs: Vec<Option<Arc<Place>>>,
    /// Places wired to the output slots.
    pub outputs: Vec<Option<Arc<Place>>>,
    /// Flow lock of the owning instance.
    pub flow: FlowLock,
}

impl Ports {
    /// Fails with [`Error::InvalidOutput`] unless output `index` of `step`
    /// is wired to a place.
    ///
    /// Steps that forward on their own call this at instantiation, since a
    /// token forwarded to an unconnected output would be stranded.
    pub fn require_output(&self, step: ElementId, index: usize) -> Result<()> {
        match self.outputs.get(index) {
            Some(Some(_)) => Ok(()),
            _ => Err(Error::InvalidOutput {
                step,
                output: index,
            }),
        }
    }
}

/// Token holder created from a step.
///
/// A transition is announced the tokens arriving at its input places. It
/// takes a token with [`TransitionCore::claim`], raises "triggered" through
/// [`TransitionCore::trigger`] when it begins handling it, and eventually
/// places result tokens on its outputs with [`TransitionCore::forward`].
///
/// Downcast a transition to its concrete step kind with
/// `transition.as_ref().as_any()`.
pub trait Transition: AsAny {
    /// Returns the state shared by every step kind.
    fn core(&self) -> &TransitionCore;

    /// Handles `token` arriving at the place wired to input `slot`.
    fn on_token(self: Arc<Self>, slot: usize, place: &Arc<Place>, token: &Token);

    /// Stops accepting tokens.
    fn pause(&self) {
        self.core().set_running(false);
    }

    /// Accepts tokens again and picks up work held from before the pause.
    fn resume(self: Arc<Self>) {
        self.core().set_running(true);
    }

    /// Returns step-specific data needed to resume from a snapshot.
    fn holder_state(&self) -> Option<serde_json::Value> {
        None
    }

    /// Replaces the held tokens and step-specific data from a snapshot.
    fn restore(&self, tokens: Vec<Token>, _state: Option<serde_json::Value>) -> Result<()> {
        self.core().set_stored(tokens);
        Ok(())
    }

    /// Returns the identifier of the originating step.
    fn id(&self) -> ElementId {
        self.core().id()
    }

    /// Returns whether step logic is in flight.
    fn is_executing(&self) -> bool {
        self.core().is_executing()
    }

    /// Returns a copy of the held tokens.
    fn stored_tokens(&self) -> Vec<Token> {
        self.core().stored_tokens()
    }
}

/// State and token movements shared by every step kind.
///
/// Locks are taken in the order flow guard, stored tokens, place tokens.
pub struct TransitionCore {
    id: ElementId,
    name: String,
    step_type: String,
    inputs: Vec<Option<Arc<Place>>>,
    outputs: Vec<Option<Arc<Place>>>,
    stored: Mutex<Vec<Token>>,
    executing: AtomicUsize,
    running: AtomicBool,
    observer: RwLock<Option<Weak<dyn TransitionObserver>>>,
    flow: FlowLock,
}

impl TransitionCore {
    /// Creates the shared state for `step` wired to `ports`.
    pub fn new(step: &Step, ports: Ports) -> Self {
        Self {
            id: step.id,
            name: step.name.clone(),
            step_type: step.step_type.clone(),
            inputs: ports.inputs,
            outputs: ports.outputs,
            stored: Mutex::new(Vec::new()),
            executing: AtomicUsize::new(0),
            running: AtomicBool::new(true),
            observer: RwLock::new(None),
            flow: ports.flow,
        }
    }

    /// Returns the identifier of the originating step.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Returns the name of the originating step.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the step type of the originating step.
    pub fn step_type(&self) -> &str {
        &self.step_type
    }

    /// Returns the places wired to the input slots.
    pub fn inputs(&self) -> &[Option<Arc<Place>>] {
        &self.inputs
    }

    /// Returns the places wired to the output slots.
    pub fn outputs(&self) -> &[Option<Arc<Place>>] {
        &self.outputs
    }

    /// Returns the place wired to output `index`.
    pub fn output(&self, index: usize) -> Option<&Arc<Place>> {
        self.outputs.get(index).and_then(Option::as_ref)
    }

    /// Returns the flow lock of the owning instance.
    pub fn flow(&self) -> &FlowLock {
        &self.flow
    }

    /// Returns a copy of the held tokens.
    pub fn stored_tokens(&self) -> Vec<Token> {
        self.stored.lock().clone()
    }

    /// Returns whether at least one token is held.
    pub fn has_stored(&self) -> bool {
        !self.stored.lock().is_empty()
    }

    /// Returns whether step logic is in flight.
    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst) > 0
    }

    /// Returns whether the transition accepts tokens.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Marks one unit of step logic as in flight.
    ///
    /// Call before [`claim`](Self::claim) so a pause never observes a held
    /// token without the executing mark.
    pub fn begin_execution(&self) {
        self.executing.fetch_add(1, Ordering::SeqCst);
    }

    /// Marks one unit of step logic as finished.
    pub fn end_execution(&self) {
        let _ = self
            .executing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Moves `token` from `place` into the held tokens.
    ///
    /// Returns `false` if another consumer took the token first.
    pub fn claim(&self, place: &Arc<Place>, token: &Token) -> bool {
        let claimed = {
            let _flow = self.flow.moving();
            let mut stored = self.stored.lock();
            let claimed = place.take(token);
            if claimed {
                stored.push(token.clone());
            }
            claimed
        };

        if claimed {
            tracing::trace!(
                target: TRACING_TARGET,
                step = %self.id,
                place = %place.id(),
                token = %token.id,
                "Token claimed"
            );
            place.notify_removed(token);
        }
        claimed
    }

    /// Moves held tokens onto outputs.
    ///
    /// `select` removes tokens from the held list and returns them paired
    /// with output indexes. All pairs are placed atomically and announced
    /// afterwards. If any index has no connected output, nothing is placed,
    /// the selected tokens are held again and [`Error::InvalidOutput`] is
    /// returned.
    pub fn forward<F>(&self, select: F) -> Result<usize>
    where
        F: FnOnce(&mut Vec<Token>) -> Vec<(usize, Token)>,
    {
        let placed = {
            let _flow = self.flow.moving();
            let mut stored = self.stored.lock();
            let moves = select(&mut *stored);

            if let Some(&(output, _)) = moves.iter().find(|(i, _)| self.output(*i).is_none()) {
                stored.extend(moves.into_iter().map(|(_, token)| token));
                return Err(Error::InvalidOutput {
                    step: self.id,
                    output,
                });
            }

            let mut placed = Vec::with_capacity(moves.len());
            for (output, token) in moves {
                if let Some(place) = self.output(output) {
                    place.put(token.clone());
                    placed.push((Arc::clone(place), token));
                }
            }
            placed
        };

        for (place, token) in &placed {
            tracing::trace!(
                target: TRACING_TARGET,
                step = %self.id,
                place = %place.id(),
                token = %token.id,
                "Token forwarded"
            );
            if place.is_running() {
                place.announce(token);
            }
        }
        Ok(placed.len())
    }

    /// Raises "triggered" for `transition`, the owner of this core or a
    /// transition relayed from a nested engine.
    pub fn trigger(&self, transition: Arc<dyn Transition>) {
        tracing::trace!(
            target: TRACING_TARGET,
            step = %self.id,
            triggered = %transition.id(),
            "Transition triggered"
        );
        if let Some(observer) = self.observer() {
            observer.triggered(transition);
        }
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub(crate) fn set_stored(&self, tokens: Vec<Token>) {
        *self.stored.lock() = tokens;
    }

    pub(crate) fn set_observer(&self, observer: Option<Weak<dyn TransitionObserver>>) {
        *self.observer.write() = observer;
    }

    fn observer(&self) -> Option<Arc<dyn TransitionObserver>> {
        self.observer.read().as_ref().and_then(Weak::upgrade)
    }
}

impl std::fmt::Debug for TransitionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("step_type", &self.step_type)
            .field("stored", &self.stored.lock().len())
            .field("executing", &self.executing.load(Ordering::SeqCst))
            .field("running", &self.is_running())
            .finish()
    }
}
