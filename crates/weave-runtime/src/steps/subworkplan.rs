//! Steps executing a nested workplan.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Deserialize;

use super::{SkipTransition, TRACING_TARGET, parameters, take_first};
use crate::definition::{ElementId, Step, Workplan};
use crate::engine::{Engine, EngineConfig, EngineObserver, Snapshot};
use crate::instance::{InstantiationEnv, WorkplanInstance};
use crate::runtime::{Place, Ports, Token, Transition, TransitionCore};
use crate::{Error, Result};

#[derive(Debug, Default, Deserialize)]
struct SubworkplanParameters {
    workplan: Option<Workplan>,
}

/// Transition of a `subworkplan` step.
///
/// Runs the nested workplan in a child engine for each held token, one at a
/// time. Output `i` is the `i`-th exit connector of the nested workplan.
/// Triggers of the child's transitions are raised as triggers of this
/// transition's owner, so the same dispatcher handles nested steps.
///
/// Pausing pauses the child and keeps its snapshot as resume data.
pub struct SubworkplanTransition {
    core: TransitionCore,
    workplan: Arc<Workplan>,
    exits: Vec<ElementId>,
    env: InstantiationEnv,
    child: Mutex<Option<Arc<Engine>>>,
    child_snapshot: Mutex<Option<Snapshot>>,
    busy: AtomicBool,
    this: Weak<Self>,
}

/// Relays child engine events to the owning transition.
struct Relay {
    owner: Weak<SubworkplanTransition>,
}

impl SubworkplanTransition {
    /// Creates the transition for `step` wired to `ports`.
    pub fn new(step: &Step, ports: Ports, env: &InstantiationEnv) -> Result<Arc<Self>> {
        let SubworkplanParameters { workplan } = parameters(step)?;
        let workplan = workplan.ok_or_else(|| Error::InvalidStepParameters {
            step: step.id,
            message: "missing nested workplan".into(),
        })?;

        let exits: Vec<_> = workplan.exit_connectors().map(|c| c.id).collect();
        if exits.len() != step.outputs.len() {
            return Err(Error::InvalidStepParameters {
                step: step.id,
                message: format!(
                    "{} outputs for {} exits of the nested workplan",
                    step.outputs.len(),
                    exits.len()
                ),
            });
        }

        for output in 0..exits.len() {
            ports.require_output(step.id, output)?;
        }

        let core = TransitionCore::new(step, ports);
        Ok(Arc::new_cyclic(|this| Self {
            core,
            workplan: Arc::new(workplan),
            exits,
            env: env.clone(),
            child: Mutex::new(None),
            child_snapshot: Mutex::new(None),
            busy: AtomicBool::new(false),
            this: this.clone(),
        }))
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
        Ok(Self::new(step, ports, env)?)
    }

    /// Returns the nested workplan.
    pub fn workplan(&self) -> &Arc<Workplan> {
        &self.workplan
    }

    /// Returns the engine running the nested workplan, if any.
    pub fn child(&self) -> Option<Arc<Engine>> {
        self.child.lock().clone()
    }

    /// Starts a child run for the oldest held token unless one is running.
    fn launch_next(&self, snapshot: Option<Snapshot>) {
        if !self.core.has_stored() || !self.core.is_running() {
            return;
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.core.begin_execution();
        if let Err(error) = self.launch(snapshot) {
            tracing::error!(
                target: TRACING_TARGET,
                step = %self.core.id(),
                error = %error,
                "Failed to start nested workplan"
            );
            self.child.lock().take();
            self.busy.store(false, Ordering::SeqCst);
            self.core.end_execution();
        }
    }

    fn launch(&self, snapshot: Option<Snapshot>) -> Result<()> {
        let instance =
            WorkplanInstance::instantiate_with(Arc::clone(&self.workplan), self.env.clone())?;
        let engine = Arc::new(Engine::new(EngineConfig::default()));
        engine.initialize(Arc::new(instance))?;
        engine.subscribe(Arc::new(Relay {
            owner: self.this.clone(),
        }));
        if let Some(snapshot) = snapshot {
            engine.restore(snapshot)?;
        }

        tracing::debug!(
            target: TRACING_TARGET,
            step = %self.core.id(),
            workplan = %self.workplan.name,
            "Starting nested workplan"
        );
        *self.child.lock() = Some(Arc::clone(&engine));
        engine.start()
    }

    /// Forwards the held token on the output of the reached exit.
    ///
    /// The child run is over either way, so execution ends even if the
    /// token cannot move; it then stays held and no further run starts.
    fn child_completed(&self, place: &Arc<Place>) {
        let child = self.child.lock().take();
        let forwarded = match self.exits.iter().position(|id| *id == place.id()) {
            Some(output) => self
                .core
                .forward(|stored| take_first(stored).map(|t| (output, t)).into_iter().collect())
                .map(|_| ()),
            None => Err(Error::InvalidDefinition(format!(
                "nested workplan completed on unknown exit {}",
                place.id()
            ))),
        };

        self.busy.store(false, Ordering::SeqCst);
        self.core.end_execution();
        drop(child);

        match forwarded {
            Ok(()) => self.launch_next(None),
            Err(error) => tracing::error!(
                target: TRACING_TARGET,
                step = %self.core.id(),
                error = %error,
                "Subworkplan step cannot forward"
            ),
        }
    }
}

impl Transition for SubworkplanTransition {
    fn core(&self) -> &TransitionCore {
        &self.core
    }

    fn on_token(self: Arc<Self>, _slot: usize, place: &Arc<Place>, token: &Token) {
        if !self.core.is_running() {
            return;
        }
        self.core.begin_execution();
        if self.core.claim(place, token) {
            let this: Arc<dyn Transition> = self.clone();
            self.core.trigger(this);
            self.launch_next(None);
        }
        self.core.end_execution();
    }

    fn pause(&self) {
        self.core.set_running(false);
        let Some(child) = self.child.lock().take() else {
            return;
        };

        match child.pause() {
            Ok(snapshot) => {
                *self.child_snapshot.lock() = Some(snapshot);
                self.busy.store(false, Ordering::SeqCst);
                self.core.end_execution();
            }
            // Completed while draining; the completion already forwarded.
            Err(error) if error.is_invalid_state() => {}
            Err(error) => tracing::error!(
                target: TRACING_TARGET,
                step = %self.core.id(),
                error = %error,
                "Failed to pause nested workplan"
            ),
        }
    }

    fn resume(self: Arc<Self>) {
        self.core.set_running(true);
        let snapshot = self.child_snapshot.lock().take();
        self.launch_next(snapshot);
    }

    fn holder_state(&self) -> Option<serde_json::Value> {
        let snapshot = self.child_snapshot.lock();
        snapshot
            .as_ref()
            .and_then(|snapshot| serde_json::to_value(snapshot).ok())
    }

    fn restore(&self, tokens: Vec<Token>, state: Option<serde_json::Value>) -> Result<()> {
        let snapshot = state.map(serde_json::from_value::<Snapshot>).transpose()?;
        *self.child_snapshot.lock() = snapshot;
        self.core.set_stored(tokens);
        Ok(())
    }
}

impl std::fmt::Debug for SubworkplanTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubworkplanTransition")
            .field("core", &self.core)
            .field("workplan", &self.workplan.name)
            .field("running_child", &self.busy.load(Ordering::SeqCst))
            .finish()
    }
}

impl EngineObserver for Relay {
    fn transition_triggered(&self, transition: &Arc<dyn Transition>) {
        if let Some(owner) = self.owner.upgrade() {
            owner.core.trigger(Arc::clone(transition));
        }
    }

    fn completed(&self, place: &Arc<Place>) {
        if let Some(owner) = self.owner.upgrade() {
            owner.child_completed(place);
        }
    }
}
