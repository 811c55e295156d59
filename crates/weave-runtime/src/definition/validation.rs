//! Structural validation of workplans.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};

use super::{ElementId, Position, Workplan};

/// Tracing target for workplan validation.
pub const TRACING_TARGET: &str = "weave_runtime::validation";

/// A structural property checked by [`validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ValidationAspect {
    /// Steps whose output leads nowhere: an unconnected output slot, or an
    /// intermediate connector that no step consumes.
    LoneWolf,
    /// Connectors consumed by a step that neither start a run nor are
    /// produced by any step, so no token can ever arrive.
    DeadEnd,
    /// Step slots referencing a connector missing from the workplan.
    DanglingReference,
}

impl ValidationAspect {
    /// Returns every validation aspect.
    pub fn all() -> Vec<Self> {
        Self::iter().collect()
    }
}

/// A single validation finding, positioned at the offending element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{aspect} at element {element}: {message}")]
pub struct ValidationError {
    /// Aspect that reported the finding.
    pub aspect: ValidationAspect,
    /// Offending step or connector.
    pub element: ElementId,
    /// Editor position of the offending element.
    pub position: Option<Position>,
    /// Human readable description.
    pub message: String,
}

/// Checks `workplan` for the given aspects.
///
/// An empty result means the workplan passed every requested check.
pub fn validate(workplan: &Workplan, aspects: &[ValidationAspect]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for aspect in aspects.iter().filter(|aspect| seen.insert(**aspect)) {
        match aspect {
            ValidationAspect::LoneWolf => lone_wolves(workplan, &mut errors),
            ValidationAspect::DeadEnd => dead_ends(workplan, &mut errors),
            ValidationAspect::DanglingReference => dangling_references(workplan, &mut errors),
        }
    }

    tracing::debug!(
        target: TRACING_TARGET,
        workplan = %workplan.name,
        errors = errors.len(),
        "Validated workplan"
    );
    errors
}

fn lone_wolves(workplan: &Workplan, errors: &mut Vec<ValidationError>) {
    let consumed: HashSet<ElementId> = workplan
        .steps
        .iter()
        .flat_map(|s| s.inputs.iter().flatten().copied())
        .collect();

    for step in &workplan.steps {
        let leads_nowhere = step.outputs.iter().any(|slot| match slot {
            None => true,
            Some(id) => workplan
                .connector(*id)
                .is_some_and(|c| !c.is_exit() && !consumed.contains(id)),
        });

        if leads_nowhere {
            errors.push(ValidationError {
                aspect: ValidationAspect::LoneWolf,
                element: step.id,
                position: step.position,
                message: format!("step '{}' has an output that leads nowhere", step.name),
            });
        }
    }
}

fn dead_ends(workplan: &Workplan, errors: &mut Vec<ValidationError>) {
    let produced: HashSet<ElementId> = workplan
        .steps
        .iter()
        .flat_map(|s| s.outputs.iter().flatten().copied())
        .collect();

    for connector in &workplan.connectors {
        let consumed = workplan.steps.iter().any(|s| s.consumes(connector.id));
        if consumed && !connector.classification.is_start() && !produced.contains(&connector.id) {
            errors.push(ValidationError {
                aspect: ValidationAspect::DeadEnd,
                element: connector.id,
                position: connector.position,
                message: format!("connector '{}' is never reached by a token", connector.name),
            });
        }
    }
}

fn dangling_references(workplan: &Workplan, errors: &mut Vec<ValidationError>) {
    for step in &workplan.steps {
        for id in step.references() {
            if workplan.connector(id).is_none() {
                errors.push(ValidationError {
                    aspect: ValidationAspect::DanglingReference,
                    element: step.id,
                    position: step.position,
                    message: format!("step '{}' references missing connector {id}", step.name),
                });
            }
        }
    }
}
