//! Per-run prediction monitor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{PathPredictor, TRACING_TARGET};
use crate::definition::{Classification, ElementId};
use crate::engine::{Engine, EngineCore, EngineObserver, ExecutionState, ObserverId};
use crate::instance::WorkplanInstance;
use crate::runtime::{Place, Transition};

type Callback = Box<dyn Fn(Classification) + Send + Sync>;

/// Observes one run and predicts its outcome.
///
/// The monitor is subscribed ahead of every other engine observer, so it
/// sees each event before handlers react to it. Dropping the monitor
/// unsubscribes it.
pub struct PredictionMonitor {
    engine: Weak<EngineCore>,
    id: ObserverId,
    state: Arc<MonitorState>,
}

struct MonitorState {
    predictor: PathPredictor,
    instance: Arc<WorkplanInstance>,
    predicted: Mutex<Option<Classification>>,
    finished: AtomicBool,
    callback: Callback,
}

impl PredictionMonitor {
    pub(super) fn attach(
        predictor: PathPredictor,
        engine: &Engine,
        instance: Arc<WorkplanInstance>,
        callback: Callback,
    ) -> Self {
        let state = Arc::new(MonitorState {
            predictor,
            instance,
            predicted: Mutex::new(None),
            finished: AtomicBool::new(false),
            callback,
        });
        let id = engine.subscribe_first(Arc::clone(&state) as Arc<dyn EngineObserver>);

        match (engine.state(), engine.snapshot()) {
            (ExecutionState::Restored, Some(snapshot)) => {
                state.evaluate(snapshot.occupied().map(|h| h.holder_id).collect());
            }
            (ExecutionState::Running | ExecutionState::Paused, _) => state.evaluate_live(),
            _ => {}
        }

        Self {
            engine: engine.downgrade(),
            id,
            state,
        }
    }

    /// Returns the predicted classification, if one was announced.
    pub fn predicted(&self) -> Option<Classification> {
        *self.state.predicted.lock()
    }

    /// Returns whether the monitored run completed.
    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::SeqCst)
    }
}

impl Drop for PredictionMonitor {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.upgrade() {
            engine.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for PredictionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionMonitor")
            .field("id", &self.id)
            .field("predicted", &self.predicted())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl MonitorState {
    /// Evaluates the positions of every token currently in the instance.
    fn evaluate_live(&self) {
        let positions: Vec<ElementId> = {
            let _frozen = self.instance.flow().freeze();
            let places = self
                .instance
                .places()
                .iter()
                .filter(|p| p.has_tokens())
                .map(|p| p.id());
            let transitions = self
                .instance
                .transitions()
                .iter()
                .filter(|t| t.core().has_stored())
                .map(|t| t.id());
            places.chain(transitions).collect()
        };
        self.evaluate(positions);
    }

    fn evaluate(&self, positions: Vec<ElementId>) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        let Some(outcome) = self.predictor.outcome(positions) else {
            return;
        };

        {
            let mut predicted = self.predicted.lock();
            if predicted.is_some() {
                return;
            }
            *predicted = Some(outcome);
        }

        tracing::info!(
            target: TRACING_TARGET,
            workplan = %self.instance.workplan().name,
            outcome = %outcome,
            "Run outcome predicted"
        );
        (self.callback)(outcome);
    }
}

impl EngineObserver for MonitorState {
    fn place_reached(&self, _place: &Arc<Place>) {
        self.evaluate_live();
    }

    fn transition_triggered(&self, _transition: &Arc<dyn Transition>) {
        self.evaluate_live();
    }

    fn completed(&self, place: &Arc<Place>) {
        self.finished.store(true, Ordering::SeqCst);
        tracing::debug!(
            target: TRACING_TARGET,
            outcome = %place.classification(),
            predicted = ?*self.predicted.lock(),
            "Monitored run completed"
        );
    }
}
