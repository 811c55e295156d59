//! Routing of triggered transitions to step-specific handlers.

use std::sync::Arc;

use weave_core::BoxedError;
use weave_core::parallel::{Criticality, FailureRouter, ParallelOperations};

use crate::engine::{Engine, EngineObserver, ObserverId};
use crate::runtime::{AsAny, Transition};

/// Tracing target for dispatching.
pub const TRACING_TARGET: &str = "weave_runtime::dispatcher";

/// Outcome of a handler.
pub type HandlerResult = std::result::Result<(), BoxedError>;

type Matcher = fn(&dyn Transition) -> bool;
type Invoker = Arc<dyn Fn(Arc<dyn Transition>) -> HandlerResult + Send + Sync>;

struct Registration {
    type_name: &'static str,
    matches: Matcher,
    invoke: Invoker,
}

/// Where handlers run.
#[derive(Clone, Default)]
pub enum DispatchMode {
    /// On the thread raising the trigger.
    #[default]
    Direct,
    /// Submitted to a worker pool.
    Pool(Arc<dyn ParallelOperations>),
}

impl std::fmt::Debug for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => f.write_str("Direct"),
            Self::Pool(_) => f.write_str("Pool"),
        }
    }
}

/// Maps "triggered" events to handlers by concrete transition type.
///
/// Handlers are tried in registration order and the first whose type
/// matches the triggered transition runs; unmatched triggers are ignored.
/// Handler failures are reported through [`Criticality`] routing, never
/// returned to the engine.
pub struct TransitionDispatcher {
    registrations: Vec<Registration>,
    mode: DispatchMode,
    criticality: Criticality,
    router: FailureRouter,
}

impl TransitionDispatcher {
    /// Creates a dispatcher running handlers on the triggering thread.
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            mode: DispatchMode::Direct,
            criticality: Criticality::default(),
            router: FailureRouter::new(),
        }
    }

    /// Creates a dispatcher submitting handlers to `pool`.
    pub fn pooled(pool: Arc<dyn ParallelOperations>) -> Self {
        Self::new().with_mode(DispatchMode::Pool(pool))
    }

    /// Sets where handlers run.
    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets how handler failures are reported.
    pub fn with_criticality(mut self, criticality: Criticality) -> Self {
        self.criticality = criticality;
        self
    }

    /// Sets the router for failures of directly run handlers.
    ///
    /// Pooled handlers report through the pool's own router.
    pub fn with_router(mut self, router: FailureRouter) -> Self {
        self.router = router;
        self
    }

    /// Registers `handler` for transitions of type `T`.
    pub fn register<T, F>(&mut self, handler: F) -> &mut Self
    where
        T: Transition,
        F: Fn(Arc<T>) -> HandlerResult + Send + Sync + 'static,
    {
        let invoke: Invoker = Arc::new(move |transition: Arc<dyn Transition>| {
            let transition = AsAny::into_any(transition)
                .downcast::<T>()
                .map_err(|_| BoxedError::from("transition type changed while dispatching"))?;
            handler(transition)
        });

        self.registrations.push(Registration {
            type_name: std::any::type_name::<T>(),
            matches: |transition| transition.as_any().is::<T>(),
            invoke,
        });
        self
    }

    /// Registers `handler` and returns the dispatcher.
    pub fn with_handler<T, F>(mut self, handler: F) -> Self
    where
        T: Transition,
        F: Fn(Arc<T>) -> HandlerResult + Send + Sync + 'static,
    {
        self.register::<T, F>(handler);
        self
    }

    /// Subscribes the dispatcher to `engine`.
    pub fn attach(self: Arc<Self>, engine: &Engine) -> ObserverId {
        engine.subscribe(self)
    }

    /// Runs the first matching handler for `transition`.
    ///
    /// Returns whether a handler matched.
    pub fn dispatch(&self, transition: &Arc<dyn Transition>) -> bool {
        let Some(registration) = self
            .registrations
            .iter()
            .find(|r| (r.matches)(transition.as_ref()))
        else {
            tracing::trace!(
                target: TRACING_TARGET,
                step = %transition.id(),
                "No handler for triggered transition"
            );
            return false;
        };

        tracing::trace!(
            target: TRACING_TARGET,
            step = %transition.id(),
            handler = registration.type_name,
            mode = ?self.mode,
            "Dispatching triggered transition"
        );

        let invoke = Arc::clone(&registration.invoke);
        let transition = Arc::clone(transition);
        match &self.mode {
            DispatchMode::Direct => {
                if let Err(error) = invoke(transition) {
                    self.router.route(self.criticality, &error);
                }
            }
            DispatchMode::Pool(pool) => {
                pool.execute(self.criticality, Box::new(move || invoke(transition)));
            }
        }
        true
    }
}

impl Default for TransitionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineObserver for TransitionDispatcher {
    fn transition_triggered(&self, transition: &Arc<dyn Transition>) {
        self.dispatch(transition);
    }
}

impl std::fmt::Debug for TransitionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers: Vec<_> = self.registrations.iter().map(|r| r.type_name).collect();
        f.debug_struct("TransitionDispatcher")
            .field("handlers", &handlers)
            .field("mode", &self.mode)
            .field("criticality", &self.criticality)
            .finish()
    }
}
