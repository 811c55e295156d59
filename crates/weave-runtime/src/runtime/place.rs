//! Runtime place.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::{FlowLock, TRACING_TARGET, Token, Transition};
use crate::definition::{Classification, ElementId};

/// Receives the token events of a [`Place`].
///
/// Notifications are synchronous and re-entrant: an observer may add tokens
/// to other places before returning.
pub trait PlaceObserver: Send + Sync {
    /// Called when `token` arrives at a running `place`, or when a resumed
    /// place re-raises a token it still holds.
    fn token_added(&self, place: &Arc<Place>, token: &Token);

    /// Called when `token` was actually removed from `place`.
    fn token_removed(&self, _place: &Arc<Place>, _token: &Token) {}
}

struct Consumer {
    transition: Weak<dyn Transition>,
    slot: usize,
}

/// Token holder created from a connector.
///
/// While running, every arriving token is announced first to the observer
/// (the engine) and then to the consuming transitions in registration order,
/// until one of them takes the token. A paused place keeps arriving tokens
/// queued without announcing them.
pub struct Place {
    id: ElementId,
    name: String,
    classification: Classification,
    tokens: Mutex<Vec<Token>>,
    running: AtomicBool,
    observer: RwLock<Option<Weak<dyn PlaceObserver>>>,
    consumers: RwLock<Vec<Consumer>>,
    flow: FlowLock,
}

impl Place {
    /// Creates an empty, running place.
    pub(crate) fn new(
        id: ElementId,
        name: String,
        classification: Classification,
        flow: FlowLock,
    ) -> Self {
        Self {
            id,
            name,
            classification,
            tokens: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
            observer: RwLock::new(None),
            consumers: RwLock::new(Vec::new()),
            flow,
        }
    }

    /// Returns the identifier of the originating connector.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Returns the name of the originating connector.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the classification of the originating connector.
    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// Returns a copy of the held tokens in arrival order.
    pub fn tokens(&self) -> Vec<Token> {
        self.tokens.lock().clone()
    }

    /// Returns whether the place holds at least one token.
    pub fn has_tokens(&self) -> bool {
        !self.tokens.lock().is_empty()
    }

    /// Returns whether the place holds `token`.
    pub fn holds(&self, token: &Token) -> bool {
        self.tokens.lock().iter().any(|t| t.id == token.id)
    }

    /// Returns whether arriving tokens are announced.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Appends `token` and announces it if the place is running.
    pub fn add(self: &Arc<Self>, token: Token) {
        {
            let _flow = self.flow.moving();
            self.put(token.clone());
        }

        tracing::trace!(
            target: TRACING_TARGET,
            place = %self.id,
            token = %token.id,
            running = self.is_running(),
            "Token added"
        );

        if self.is_running() {
            self.announce(&token);
        }
    }

    /// Removes `token` if present, returning whether it was held.
    pub fn remove(self: &Arc<Self>, token: &Token) -> bool {
        let removed = {
            let _flow = self.flow.moving();
            self.take(token)
        };

        if removed {
            self.notify_removed(token);
        }
        removed
    }

    /// Stops announcing arriving tokens.
    pub fn pause(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Restarts announcing and re-raises every token held at the time of the
    /// call that is still held when its turn comes.
    pub fn resume(self: &Arc<Self>) {
        let tokens = self.tokens();
        self.running.store(true, Ordering::SeqCst);

        for token in &tokens {
            if self.holds(token) {
                self.announce(token);
            }
        }
    }

    /// Appends `token` without announcing it; the caller holds the flow guard.
    pub(crate) fn put(&self, token: Token) {
        self.tokens.lock().push(token);
    }

    /// Removes `token` without notifying; the caller holds the flow guard.
    pub(crate) fn take(&self, token: &Token) -> bool {
        let mut tokens = self.tokens.lock();
        match tokens.iter().position(|t| t.id == token.id) {
            Some(index) => {
                tokens.remove(index);
                true
            }
            None => false,
        }
    }

    /// Replaces the held tokens without announcing them.
    pub(crate) fn set_tokens(&self, tokens: Vec<Token>) {
        *self.tokens.lock() = tokens;
    }

    /// Announces `token` to the observer, then to consumers until one takes it.
    pub(crate) fn announce(self: &Arc<Self>, token: &Token) {
        if let Some(observer) = self.observer() {
            observer.token_added(self, token);
        }

        let consumers: Vec<_> = self
            .consumers
            .read()
            .iter()
            .filter_map(|c| Some((c.transition.upgrade()?, c.slot)))
            .collect();

        for (transition, slot) in consumers {
            if !self.is_running() || !self.holds(token) {
                break;
            }
            transition.on_token(slot, self, token);
        }
    }

    pub(crate) fn notify_removed(self: &Arc<Self>, token: &Token) {
        if let Some(observer) = self.observer() {
            observer.token_removed(self, token);
        }
    }

    pub(crate) fn set_observer(&self, observer: Option<Weak<dyn PlaceObserver>>) {
        *self.observer.write() = observer;
    }

    pub(crate) fn add_consumer(&self, transition: Weak<dyn Transition>, slot: usize) {
        self.consumers.write().push(Consumer { transition, slot });
    }

    fn observer(&self) -> Option<Arc<dyn PlaceObserver>> {
        self.observer.read().as_ref().and_then(Weak::upgrade)
    }
}

impl std::fmt::Debug for Place {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Place")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("classification", &self.classification)
            .field("tokens", &self.tokens.lock().len())
            .field("running", &self.is_running())
            .finish()
    }
}
