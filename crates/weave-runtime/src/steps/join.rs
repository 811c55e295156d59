//! Merging steps.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{SkipTransition, TRACING_TARGET};
use crate::definition::Step;
use crate::instance::InstantiationEnv;
use crate::runtime::{Place, Ports, Token, TokenId, Transition, TransitionCore};
use crate::{Error, Result};

/// Resume data of a join: which held token arrived through which input.
#[derive(Debug, Default, Serialize, Deserialize)]
struct JoinState {
    slots: Vec<VecDeque<TokenId>>,
}

/// Transition of a `join` step.
///
/// Holds arriving tokens per input until every connected input delivered
/// one, then raises "triggered" and emits a single token: the common
/// original when all gathered tokens are splits of the same token,
/// otherwise the first gathered token. Partial gathers are kept in
/// snapshots.
#[derive(Debug)]
pub struct JoinTransition {
    core: TransitionCore,
    slots: Mutex<Vec<VecDeque<TokenId>>>,
}

impl JoinTransition {
    /// Creates the transition for `step` wired to `ports`.
    ///
    /// Output 0 must be connected.
    pub fn new(step: &Step, ports: Ports) -> Result<Self> {
        ports.require_output(step.id, 0)?;
        let slots = vec![VecDeque::new(); ports.inputs.len()];
        Ok(Self {
            core: TransitionCore::new(step, ports),
            slots: Mutex::new(slots),
        })
    }

    /// Creates the transition, or a [`SkipTransition`] if the step is
    /// disabled.
    pub fn create(
        step: &Step,
        ports: Ports,
        env: &InstantiationEnv,
    ) -> Result<Arc<dyn Transition>> {
        if env.is_disabled(step) {
            return Ok(Arc::new(SkipTransition::new(step, ports)?));
        }
        Ok(Arc::new(Self::new(step, ports)?))
    }

    /// Returns how many tokens wait on each input.
    pub fn pending(&self) -> Vec<usize> {
        self.slots.lock().iter().map(VecDeque::len).collect()
    }

    /// Records `token` on `slot` and pops one token per input once every
    /// connected input has one.
    fn gather(&self, slot: usize, token: TokenId) -> Option<Vec<TokenId>> {
        let mut slots = self.slots.lock();
        slots.get_mut(slot)?.push_back(token);

        let connected = self.core.inputs().iter().map(Option::is_some);
        let complete = slots
            .iter()
            .zip(connected)
            .all(|(queue, connected)| !connected || !queue.is_empty());
        if !complete {
            return None;
        }
        Some(slots.iter_mut().filter_map(VecDeque::pop_front).collect())
    }
}

/// Returns the common original of `tokens`, or the first token.
fn merge(mut tokens: Vec<Token>) -> Option<Token> {
    let common = tokens.first()?.original().cloned().filter(|original| {
        tokens
            .iter()
            .all(|t| t.original().is_some_and(|o| o.id == original.id))
    });
    match common {
        Some(original) => Some(original),
        None => Some(tokens.swap_remove(0)),
    }
}

impl Transition for JoinTransition {
    fn core(&self) -> &TransitionCore {
        &self.core
    }

    fn on_token(self: Arc<Self>, slot: usize, place: &Arc<Place>, token: &Token) {
        if !self.core.is_running() {
            return;
        }
        self.core.begin_execution();
        if !self.core.claim(place, token) {
            self.core.end_execution();
            return;
        }

        if let Some(gathered) = self.gather(slot, token.id) {
            let this: Arc<dyn Transition> = self.clone();
            self.core.trigger(this);

            let result = self.core.forward(|stored| {
                let tokens = gathered
                    .iter()
                    .filter_map(|id| {
                        let index = stored.iter().position(|t| t.id == *id)?;
                        Some(stored.remove(index))
                    })
                    .collect();
                merge(tokens).map(|t| (0, t)).into_iter().collect()
            });

            match result {
                Ok(_) => tracing::trace!(
                    target: TRACING_TARGET,
                    step = %self.core.id(),
                    merged = gathered.len(),
                    "Tokens joined"
                ),
                Err(error) => tracing::error!(
                    target: TRACING_TARGET,
                    step = %self.core.id(),
                    error = %error,
                    "Join step cannot forward"
                ),
            }
        }
        self.core.end_execution();
    }

    fn holder_state(&self) -> Option<serde_json::Value> {
        let state = JoinState {
            slots: self.slots.lock().clone(),
        };
        serde_json::to_value(state).ok()
    }

    fn restore(&self, tokens: Vec<Token>, state: Option<serde_json::Value>) -> Result<()> {
        let JoinState { slots } = match state {
            Some(state) => serde_json::from_value(state)?,
            None if tokens.is_empty() => JoinState::default(),
            None => {
                return Err(Error::SnapshotMismatch(format!(
                    "join {} holds tokens without gather state",
                    self.core.id()
                )));
            }
        };

        let inputs = self.core.inputs().len();
        let slots = if slots.is_empty() {
            vec![VecDeque::new(); inputs]
        } else {
            slots
        };
        let recorded = slots.iter().flatten().count();
        let known = |id: &TokenId| tokens.iter().any(|t| t.id == *id);
        if slots.len() != inputs || recorded != tokens.len() || !slots.iter().flatten().all(known)
        {
            return Err(Error::SnapshotMismatch(format!(
                "gather state of join {} does not match its tokens",
                self.core.id()
            )));
        }

        *self.slots.lock() = slots;
        self.core.set_stored(tokens);
        Ok(())
    }
}
