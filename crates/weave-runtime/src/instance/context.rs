//! Execution context consulted during instantiation.

use std::collections::HashSet;

use crate::definition::{ElementId, Step};

/// Answers per-step questions about the environment a workplan runs in.
pub trait WorkplanContext: Send + Sync {
    /// Returns whether `step` should be instantiated as a disabled variant
    /// that forwards tokens without applying its logic.
    fn is_disabled(&self, step: &Step) -> bool;
}

/// Context with every step enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultContext;

impl WorkplanContext for DefaultContext {
    fn is_disabled(&self, _step: &Step) -> bool {
        false
    }
}

/// Context disabling an explicit set of steps.
#[derive(Debug, Default, Clone)]
pub struct DisabledSteps {
    steps: HashSet<ElementId>,
}

impl DisabledSteps {
    /// Creates a context with every step enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables the step with the given identifier.
    pub fn with_disabled(mut self, step: ElementId) -> Self {
        self.steps.insert(step);
        self
    }
}

impl FromIterator<ElementId> for DisabledSteps {
    fn from_iter<I: IntoIterator<Item = ElementId>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl WorkplanContext for DisabledSteps {
    fn is_disabled(&self, step: &Step) -> bool {
        self.steps.contains(&step.id)
    }
}
