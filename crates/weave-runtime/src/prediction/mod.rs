//! Early prediction of a run's outcome.
//!
//! A [`PathPredictor`] analyzes a workplan once and can then monitor any
//! number of runs of it. A [`PredictionMonitor`] announces the exit
//! classification a run will end in as soon as it is the only one still
//! reachable from the current token positions.

use std::collections::BTreeSet;
use std::sync::Arc;

mod monitor;
mod reachability;

pub use monitor::PredictionMonitor;
use reachability::Reachability;

use crate::definition::{Classification, ElementId, Workplan};
use crate::engine::Engine;
use crate::{Error, Result};

/// Tracing target for path prediction.
pub const TRACING_TARGET: &str = "weave_runtime::prediction";

/// Reusable outcome predictor for one workplan.
#[derive(Debug, Clone)]
pub struct PathPredictor {
    workplan_id: u64,
    workplan_name: String,
    workplan_version: u32,
    reachability: Arc<Reachability>,
}

impl PathPredictor {
    /// Analyzes `workplan`.
    ///
    /// Fails with [`Error::InvalidDefinition`] if a step references a
    /// connector that does not exist.
    pub fn new(workplan: &Workplan) -> Result<Self> {
        Ok(Self {
            workplan_id: workplan.id,
            workplan_name: workplan.name.clone(),
            workplan_version: workplan.version,
            reachability: Arc::new(Reachability::build(workplan)?),
        })
    }

    /// Returns the exit classifications reachable from `element`.
    pub fn reachable_exits(&self, element: ElementId) -> Option<&BTreeSet<Classification>> {
        self.reachability.get(element)
    }

    /// Returns the only exit classification reachable from all of
    /// `positions`, if there is exactly one.
    pub fn outcome<I>(&self, positions: I) -> Option<Classification>
    where
        I: IntoIterator<Item = ElementId>,
    {
        let mut union = BTreeSet::new();
        for position in positions {
            if let Some(exits) = self.reachable_exits(position) {
                union.extend(exits.iter().copied());
            }
        }

        match union.len() {
            1 => union.pop_first(),
            _ => None,
        }
    }

    /// Monitors the run driven by `engine`, calling `callback` at most once
    /// with the predicted classification.
    pub fn monitor<F>(&self, engine: &Engine, callback: F) -> Result<PredictionMonitor>
    where
        F: Fn(Classification) + Send + Sync + 'static,
    {
        let instance = engine
            .instance()
            .ok_or_else(|| Error::invalid_state("monitor", engine.state()))?;

        let workplan = instance.workplan();
        if workplan.id != self.workplan_id
            || workplan.name != self.workplan_name
            || workplan.version != self.workplan_version
        {
            return Err(Error::WorkplanMismatch(format!(
                "predictor for '{}' cannot monitor '{}'",
                self.workplan_name, workplan.name
            )));
        }

        Ok(PredictionMonitor::attach(
            self.clone(),
            engine,
            instance,
            Box::new(callback),
        ))
    }
}
