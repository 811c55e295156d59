//! Instantiation of workplans into live places and transitions.
//!
//! - [`WorkplanInstance`]: the live structure of one run
//! - [`WorkplanContext`]: per-step answers such as "is this step disabled"
//! - [`StepRegistry`]: factories creating the transition of each step kind

use std::collections::HashMap;
use std::sync::{Arc, Weak};

mod context;
mod registry;

pub use context::{DefaultContext, DisabledSteps, WorkplanContext};
pub use registry::{StepFactory, StepRegistry};

use crate::definition::{ElementId, Workplan};
use crate::runtime::{FlowLock, Place, PlaceObserver, Ports, Transition, TransitionObserver};
use crate::{Error, Result};

/// Tracing target for instantiation.
pub const TRACING_TARGET: &str = "weave_runtime::instance";

/// Everything a step factory may consult while creating a transition.
#[derive(Clone)]
pub struct InstantiationEnv {
    /// Execution context.
    pub context: Arc<dyn WorkplanContext>,
    /// Registry used for this and nested workplans.
    pub registry: Arc<StepRegistry>,
}

impl InstantiationEnv {
    /// Creates an environment from a context and a registry.
    pub fn new(context: Arc<dyn WorkplanContext>, registry: Arc<StepRegistry>) -> Self {
        Self { context, registry }
    }

    /// Returns whether `step` is disabled in this environment.
    pub fn is_disabled(&self, step: &crate::definition::Step) -> bool {
        self.context.is_disabled(step)
    }
}

impl Default for InstantiationEnv {
    fn default() -> Self {
        Self::new(Arc::new(DefaultContext), Arc::new(StepRegistry::default()))
    }
}

impl std::fmt::Debug for InstantiationEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstantiationEnv")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Live places and transitions of one run of a workplan.
///
/// There is exactly one place per connector and one transition per step, in
/// definition order. Steps referencing the same connector share its place.
pub struct WorkplanInstance {
    workplan: Arc<Workplan>,
    places: Vec<Arc<Place>>,
    transitions: Vec<Arc<dyn Transition>>,
    flow: FlowLock,
    env: InstantiationEnv,
}

impl WorkplanInstance {
    /// Instantiates `workplan` with the built-in step kinds.
    pub fn instantiate(workplan: Arc<Workplan>, context: Arc<dyn WorkplanContext>) -> Result<Self> {
        Self::instantiate_with(
            workplan,
            InstantiationEnv::new(context, Arc::new(StepRegistry::default())),
        )
    }

    /// Instantiates `workplan` in `env`.
    ///
    /// Every call builds an independent structure; nothing is shared between
    /// instances of the same workplan.
    pub fn instantiate_with(workplan: Arc<Workplan>, env: InstantiationEnv) -> Result<Self> {
        let flow = FlowLock::new();
        let mut cache: HashMap<ElementId, Arc<Place>> = HashMap::new();
        let mut resolve = |slot: &Option<ElementId>| -> Result<Option<Arc<Place>>> {
            let Some(id) = slot else {
                return Ok(None);
            };
            if let Some(place) = cache.get(id) {
                return Ok(Some(Arc::clone(place)));
            }
            let connector = workplan.connector(*id).ok_or_else(|| {
                Error::InvalidDefinition(format!("reference to missing connector {id}"))
            })?;
            let place = connector.create_place(&flow);
            cache.insert(*id, Arc::clone(&place));
            Ok(Some(place))
        };

        let mut transitions = Vec::with_capacity(workplan.steps.len());
        for step in &workplan.steps {
            let ports = Ports {
                inputs: step.inputs.iter().map(&mut resolve).collect::<Result<_>>()?,
                outputs: step.outputs.iter().map(&mut resolve).collect::<Result<_>>()?,
                flow: flow.clone(),
            };

            let factory = env
                .registry
                .get(&step.step_type)
                .ok_or_else(|| Error::UnknownStepType {
                    step: step.id,
                    step_type: step.step_type.clone(),
                })?;
            let transition = factory.create(step, ports, &env)?;

            for (slot, place) in transition.core().inputs().iter().enumerate() {
                if let Some(place) = place {
                    place.add_consumer(Arc::downgrade(&transition), slot);
                }
            }
            transitions.push(transition);
        }

        let places = workplan
            .connectors
            .iter()
            .map(|connector| {
                cache
                    .remove(&connector.id)
                    .unwrap_or_else(|| connector.create_place(&flow))
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            target: TRACING_TARGET,
            workplan = %workplan.name,
            places = places.len(),
            transitions = transitions.len(),
            "Instantiated workplan"
        );

        Ok(Self {
            workplan,
            places,
            transitions,
            flow,
            env,
        })
    }

    /// Returns the instantiated workplan.
    pub fn workplan(&self) -> &Arc<Workplan> {
        &self.workplan
    }

    /// Returns the places in connector definition order.
    pub fn places(&self) -> &[Arc<Place>] {
        &self.places
    }

    /// Returns the transitions in step definition order.
    pub fn transitions(&self) -> &[Arc<dyn Transition>] {
        &self.transitions
    }

    /// Returns the place created from connector `id`.
    pub fn place(&self, id: ElementId) -> Option<&Arc<Place>> {
        self.places.iter().find(|p| p.id() == id)
    }

    /// Returns the transition created from step `id`.
    pub fn transition(&self, id: ElementId) -> Option<&Arc<dyn Transition>> {
        self.transitions.iter().find(|t| t.id() == id)
    }

    /// Returns the flow lock shared by every holder.
    pub fn flow(&self) -> &FlowLock {
        &self.flow
    }

    /// Returns the environment the instance was created in.
    pub fn env(&self) -> &InstantiationEnv {
        &self.env
    }

    /// Returns whether no holder owns a token.
    pub fn is_fresh(&self) -> bool {
        let _frozen = self.flow.freeze();
        !self.places.iter().any(|p| p.has_tokens())
            && !self.transitions.iter().any(|t| t.core().has_stored())
    }

    /// Returns whether any transition has step logic in flight.
    pub fn is_executing(&self) -> bool {
        self.transitions.iter().any(|t| t.is_executing())
    }

    /// Routes place and transition events to the given observers.
    pub(crate) fn attach(
        &self,
        places: Weak<dyn PlaceObserver>,
        transitions: Weak<dyn TransitionObserver>,
    ) {
        for place in &self.places {
            place.set_observer(Some(places.clone()));
        }
        for transition in &self.transitions {
            transition.core().set_observer(Some(transitions.clone()));
        }
    }

    /// Stops routing place and transition events.
    pub(crate) fn detach(&self) {
        for place in &self.places {
            place.set_observer(None);
        }
        for transition in &self.transitions {
            transition.core().set_observer(None);
        }
    }

    /// Pauses every place, then every transition holding tokens.
    pub(crate) fn pause(&self) {
        for place in &self.places {
            place.pause();
        }
        for transition in &self.transitions {
            if transition.core().has_stored() {
                transition.pause();
            }
        }
    }

    /// Resumes every transition, token holders first, then every place.
    pub(crate) fn resume(&self) {
        let (holders, others): (Vec<_>, Vec<_>) = self
            .transitions
            .iter()
            .partition(|t| t.core().has_stored());

        for transition in holders.into_iter().chain(others) {
            Arc::clone(transition).resume();
        }
        for place in &self.places {
            place.resume();
        }
    }
}

impl std::fmt::Debug for WorkplanInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkplanInstance")
            .field("workplan", &self.workplan.name)
            .field("places", &self.places)
            .field("transitions", &self.transitions.len())
            .finish()
    }
}
