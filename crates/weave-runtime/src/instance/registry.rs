//! Registry of step factories.

use std::collections::HashMap;
use std::sync::Arc;

use super::InstantiationEnv;
use crate::Result;
use crate::definition::Step;
use crate::runtime::{Ports, Transition};

/// Creates the runtime transition of a step.
pub trait StepFactory: Send + Sync {
    /// Creates the transition for `step` wired to `ports`.
    fn create(&self, step: &Step, ports: Ports, env: &InstantiationEnv)
    -> Result<Arc<dyn Transition>>;
}

impl<F> StepFactory for F
where
    F: Fn(&Step, Ports, &InstantiationEnv) -> Result<Arc<dyn Transition>> + Send + Sync,
{
    fn create(
        &self,
        step: &Step,
        ports: Ports,
        env: &InstantiationEnv,
    ) -> Result<Arc<dyn Transition>> {
        self(step, ports, env)
    }
}

/// Maps step type names to the factories creating their transitions.
///
/// The default registry knows every built-in step kind; custom kinds are
/// added with [`register`](Self::register).
#[derive(Clone)]
pub struct StepRegistry {
    factories: HashMap<String, Arc<dyn StepFactory>>,
}

impl StepRegistry {
    /// Creates a registry without any step kinds.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers `factory` for `step_type`, replacing any previous one.
    pub fn register<F>(&mut self, step_type: impl Into<String>, factory: F)
    where
        F: StepFactory + 'static,
    {
        self.factories.insert(step_type.into(), Arc::new(factory));
    }

    /// Registers `factory` for `step_type` and returns the registry.
    pub fn with<F>(mut self, step_type: impl Into<String>, factory: F) -> Self
    where
        F: StepFactory + 'static,
    {
        self.register(step_type, factory);
        self
    }

    /// Returns the factory registered for `step_type`.
    pub fn get(&self, step_type: &str) -> Option<&Arc<dyn StepFactory>> {
        self.factories.get(step_type)
    }

    /// Returns whether a factory is registered for `step_type`.
    pub fn contains(&self, step_type: &str) -> bool {
        self.factories.contains_key(step_type)
    }

    /// Iterates over the registered step types.
    pub fn step_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        crate::steps::register_builtins(&mut registry);
        registry
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut step_types: Vec<_> = self.step_types().collect();
        step_types.sort_unstable();
        f.debug_struct("StepRegistry")
            .field("step_types", &step_types)
            .finish()
    }
}
