//! Workplan execution engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use super::state::EngineState;
use super::{EngineConfig, EngineObserver, ExecutionState, ObserverId, Snapshot, TRACING_TARGET};
use crate::definition::Classification;
use crate::instance::WorkplanInstance;
use crate::runtime::{Place, PlaceObserver, Token, Transition, TransitionObserver};
use crate::{Error, Result};

/// The workplan execution engine.
///
/// Drives one [`WorkplanInstance`] through
/// `Idle -> Ready -> Running -> (Paused <-> Restored) -> Idle`. Operations
/// invoked from a state that does not support them fail with
/// [`Error::InvalidState`] and leave the engine untouched.
///
/// Token propagation runs synchronously on the thread that moves a token;
/// control operations must not be invoked concurrently on the same engine.
/// Dropping the engine stops token flow and detaches it like
/// [`destroy`](Self::destroy), but without waiting for step logic in flight.
pub struct Engine {
    core: Arc<EngineCore>,
}

/// Shared engine state, observed by the places and transitions it drives.
pub(crate) struct EngineCore {
    config: EngineConfig,
    state: Mutex<EngineState>,
    observers: RwLock<Vec<(ObserverId, Arc<dyn EngineObserver>)>>,
    next_observer: AtomicU64,
    this: Weak<EngineCore>,
}

enum Launch {
    Seed,
    Resume,
}

impl Engine {
    /// Creates an idle engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        let core = Arc::new_cyclic(|this| EngineCore {
            config,
            state: Mutex::new(EngineState::Idle { last: None }),
            observers: RwLock::new(Vec::new()),
            next_observer: AtomicU64::new(1),
            this: this.clone(),
        });
        Self { core }
    }

    /// Creates an idle engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// Returns the current state.
    pub fn state(&self) -> ExecutionState {
        self.core.state()
    }

    /// Returns the bound instance, or the last one after completion.
    pub fn instance(&self) -> Option<Arc<WorkplanInstance>> {
        self.core.state.lock().instance().cloned()
    }

    /// Returns the snapshot of a paused or restored engine.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.core.state.lock().snapshot().cloned()
    }

    /// Binds the engine to `instance` and observes its holders.
    pub fn initialize(&self, instance: Arc<WorkplanInstance>) -> Result<()> {
        let mut state = self.core.state.lock();
        let EngineState::Idle { .. } = &*state else {
            return Err(Error::invalid_state("initialize", state.kind()));
        };

        let places: Weak<dyn PlaceObserver> = self.core.this.clone();
        let transitions: Weak<dyn TransitionObserver> = self.core.this.clone();
        instance.attach(places, transitions);

        tracing::debug!(
            target: TRACING_TARGET,
            workplan = %instance.workplan().name,
            "Engine initialized"
        );
        *state = EngineState::Ready { instance };
        Ok(())
    }

    /// Starts or continues the run.
    ///
    /// From `Ready`, every Start place receives one main token. From
    /// `Restored` the snapshot is copied onto the instance first; from
    /// `Restored` and `Paused` every transition and place is then resumed,
    /// token-holding transitions first.
    pub fn start(&self) -> Result<()> {
        let (instance, launch) = {
            let mut state = self.core.state.lock();
            let (instance, launch) = match &*state {
                EngineState::Ready { instance } => (Arc::clone(instance), Launch::Seed),
                EngineState::Restored { instance, snapshot } => {
                    snapshot.apply_to(instance)?;
                    (Arc::clone(instance), Launch::Resume)
                }
                EngineState::Paused { instance, .. } => (Arc::clone(instance), Launch::Resume),
                other => return Err(Error::invalid_state("start", other.kind())),
            };

            tracing::debug!(
                target: TRACING_TARGET,
                workplan = %instance.workplan().name,
                from = %state.kind(),
                "Engine running"
            );
            *state = EngineState::Running {
                instance: Arc::clone(&instance),
            };
            (instance, launch)
        };

        match launch {
            Launch::Seed => {
                let starts = instance
                    .places()
                    .iter()
                    .filter(|p| p.classification().is_start());
                for place in starts {
                    place.add(Token::main());
                }
            }
            Launch::Resume => instance.resume(),
        }
        Ok(())
    }

    /// Pauses the run and returns its snapshot.
    ///
    /// Every place and every token-holding transition stops moving tokens,
    /// then the call blocks until no transition has step logic in flight.
    /// Without a configured drain timeout this waits indefinitely; with one,
    /// an expired wait resumes the run and fails with
    /// [`Error::DrainTimeout`].
    pub fn pause(&self) -> Result<Snapshot> {
        let instance = {
            let state = self.core.state.lock();
            match &*state {
                EngineState::Running { instance } => Arc::clone(instance),
                other => return Err(Error::invalid_state("pause", other.kind())),
            }
        };

        tracing::debug!(
            target: TRACING_TARGET,
            workplan = %instance.workplan().name,
            "Pausing engine"
        );
        instance.pause();

        if let Err(error) = self.core.drain(&instance) {
            instance.resume();
            return Err(error);
        }

        let snapshot = Snapshot::capture(&instance);

        let mut state = self.core.state.lock();
        match &*state {
            EngineState::Running { .. } => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    workplan = %instance.workplan().name,
                    tokens = snapshot.token_count(),
                    "Engine paused"
                );
                *state = EngineState::Paused {
                    instance,
                    snapshot: snapshot.clone(),
                };
                Ok(snapshot)
            }
            other => Err(Error::invalid_state("pause", other.kind())),
        }
    }

    /// Stages `snapshot` to be replayed by the next [`start`](Self::start).
    ///
    /// From `Ready` the instance must be fresh and match the snapshot
    /// holder by holder. From `Paused` only the snapshot produced by that
    /// pause is accepted.
    pub fn restore(&self, snapshot: Snapshot) -> Result<()> {
        let mut state = self.core.state.lock();
        let instance = match &*state {
            EngineState::Ready { instance } => {
                snapshot.validate_against(instance)?;
                if !instance.is_fresh() {
                    return Err(Error::SnapshotMismatch(
                        "instance already holds tokens".into(),
                    ));
                }
                Arc::clone(instance)
            }
            EngineState::Paused {
                instance,
                snapshot: current,
            } => {
                if *current != snapshot {
                    return Err(Error::SnapshotMismatch(
                        "a paused engine only restores its own snapshot".into(),
                    ));
                }
                Arc::clone(instance)
            }
            other => return Err(Error::invalid_state("restore", other.kind())),
        };

        tracing::debug!(
            target: TRACING_TARGET,
            workplan = %snapshot.workplan_name,
            tokens = snapshot.token_count(),
            "Engine restored"
        );
        *state = EngineState::Restored { instance, snapshot };
        Ok(())
    }

    /// Pauses a running engine, detaches it from its instance and drops
    /// every subscription.
    pub fn destroy(&self) -> Result<()> {
        if self.state() == ExecutionState::Running {
            match self.pause() {
                Ok(_) => {}
                // Completed while draining.
                Err(error) if error.is_invalid_state() => {}
                Err(error) => return Err(error),
            }
        }
        self.core.release();
        Ok(())
    }

    /// Subscribes `observer` to engine events.
    pub fn subscribe(&self, observer: Arc<dyn EngineObserver>) -> ObserverId {
        self.core.subscribe(observer, false)
    }

    /// Removes a subscription, returning whether it existed.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.core.unsubscribe(id)
    }

    /// Subscribes `observer` ahead of every existing subscription.
    pub(crate) fn subscribe_first(&self, observer: Arc<dyn EngineObserver>) -> ObserverId {
        self.core.subscribe(observer, true)
    }

    pub(crate) fn downgrade(&self) -> Weak<EngineCore> {
        Arc::downgrade(&self.core)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let running = match &*self.core.state.lock() {
            EngineState::Running { instance } => Some(Arc::clone(instance)),
            _ => None,
        };
        if let Some(instance) = running {
            if instance.is_executing() {
                tracing::warn!(
                    target: TRACING_TARGET,
                    workplan = %instance.workplan().name,
                    "Engine dropped with transitions still executing"
                );
            }
            // Places only; pausing transitions would wait on nested runs.
            for place in instance.places() {
                place.pause();
            }
        }
        self.core.release();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.core.config)
            .field("state", &self.state())
            .field("observers", &self.core.observers.read().len())
            .finish()
    }
}

impl EngineCore {
    pub(crate) fn state(&self) -> ExecutionState {
        self.state.lock().kind()
    }

    pub(crate) fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    fn subscribe(&self, observer: Arc<dyn EngineObserver>, first: bool) -> ObserverId {
        let id = ObserverId::from(self.next_observer.fetch_add(1, Ordering::Relaxed));
        let mut observers = self.observers.write();
        if first {
            observers.insert(0, (id, observer));
        } else {
            observers.push((id, observer));
        }
        id
    }

    fn observers(&self) -> Vec<Arc<dyn EngineObserver>> {
        self.observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    fn release(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), EngineState::Idle { last: None });
        if let Some(instance) = previous.instance() {
            instance.detach();
        }
        self.observers.write().clear();

        tracing::debug!(
            target: TRACING_TARGET,
            from = %previous.kind(),
            "Engine destroyed"
        );
    }

    fn drain(&self, instance: &WorkplanInstance) -> Result<()> {
        let started = Instant::now();
        while instance.is_executing() {
            if let Some(timeout) = self.config.drain_timeout
                && started.elapsed() >= timeout
            {
                tracing::warn!(
                    target: TRACING_TARGET,
                    workplan = %instance.workplan().name,
                    timeout = ?timeout,
                    "Transitions still executing, resuming run"
                );
                return Err(Error::DrainTimeout);
            }
            std::thread::sleep(self.config.drain_poll_interval);
        }
        Ok(())
    }

    fn complete(&self, place: &Arc<Place>) {
        let completed = {
            let mut state = self.state.lock();
            match &*state {
                EngineState::Running { instance } => {
                    let last = Some(Arc::clone(instance));
                    *state = EngineState::Idle { last };
                    true
                }
                _ => false,
            }
        };

        if completed {
            tracing::info!(
                target: TRACING_TARGET,
                place = %place.id(),
                classification = %place.classification(),
                "Run completed"
            );
            for observer in self.observers() {
                observer.completed(place);
            }
        }
    }
}

impl PlaceObserver for EngineCore {
    fn token_added(&self, place: &Arc<Place>, token: &Token) {
        let classification = place.classification();
        if classification.is_exit() {
            if token.is_main() || classification == Classification::Failed {
                self.complete(place);
            }
        } else if classification.is_intermediate() {
            for observer in self.observers() {
                observer.place_reached(place);
            }
        }
    }

    fn token_removed(&self, place: &Arc<Place>, token: &Token) {
        tracing::trace!(
            target: TRACING_TARGET,
            place = %place.id(),
            token = %token.id,
            "Token left place"
        );
    }
}

impl TransitionObserver for EngineCore {
    fn triggered(&self, transition: Arc<dyn Transition>) {
        for observer in self.observers() {
            observer.transition_triggered(&transition);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::definition::{Connector, Port, Step, Workplan};
    use crate::dispatcher::TransitionDispatcher;
    use crate::fixtures::{self, Recorder, Script};
    use crate::steps::TaskTransition;

    /// Completes the named tasks of `instance` in order.
    fn drive(instance: &WorkplanInstance, completions: &[(&str, usize)]) {
        for (name, output) in completions {
            fixtures::task(instance, name).complete(*output).expect("held");
        }
    }

    /// Counts main tokens across every holder at each engine event.
    struct MainTokenCensus {
        instance: Arc<WorkplanInstance>,
        counts: Mutex<Vec<usize>>,
    }

    impl MainTokenCensus {
        fn attach(engine: &Engine, instance: &Arc<WorkplanInstance>) -> Arc<Self> {
            let census = Arc::new(Self {
                instance: Arc::clone(instance),
                counts: Mutex::new(Vec::new()),
            });
            engine.subscribe(Arc::clone(&census) as Arc<dyn EngineObserver>);
            census
        }

        fn record(&self) {
            let count = {
                let _frozen = self.instance.flow().freeze();
                let places = self.instance.places().iter().flat_map(|p| p.tokens());
                let stored = self.instance.transitions().iter().flat_map(|t| t.stored_tokens());
                places.chain(stored).filter(Token::is_main).count()
            };
            self.counts.lock().push(count);
        }
    }

    impl EngineObserver for MainTokenCensus {
        fn place_reached(&self, _place: &Arc<Place>) {
            self.record();
        }

        fn transition_triggered(&self, _transition: &Arc<dyn Transition>) {
            self.record();
        }

        fn completed(&self, _place: &Arc<Place>) {
            self.record();
        }
    }

    fn scripted(engine: &Engine, script: Arc<Script>) {
        let dispatcher = TransitionDispatcher::new()
            .with_handler::<TaskTransition, _>(move |task| script.handle(task));
        Arc::new(dispatcher).attach(engine);
    }

    #[test]
    fn test_operations_in_wrong_state_are_rejected() {
        let engine = Engine::default();
        let snapshot = Snapshot::capture(&fixtures::instantiate(fixtures::linear()));

        assert!(engine.start().is_err_and(|e| e.is_invalid_state()));
        assert!(engine.pause().is_err_and(|e| e.is_invalid_state()));
        assert!(engine.restore(snapshot).is_err_and(|e| e.is_invalid_state()));
        assert_eq!(engine.state(), ExecutionState::Idle);

        fixtures::initialize(&engine, fixtures::linear());
        let again = fixtures::instantiate(fixtures::linear());
        assert!(engine.initialize(again).is_err_and(|e| e.is_invalid_state()));
        assert!(engine.pause().is_err_and(|e| e.is_invalid_state()));
        assert_eq!(engine.state(), ExecutionState::Ready);
    }

    #[test]
    fn test_branching_paths_reach_the_same_end() {
        for (output, expected) in [(0, vec!["A", "C"]), (1, vec!["A", "B", "C"])] {
            let engine = Engine::default();
            let recorder = Recorder::attach(&engine);
            scripted(&engine, Script::new([("A", vec![output])]));
            fixtures::initialize(&engine, fixtures::branching());

            engine.start().expect("ready");
            assert_eq!(engine.state(), ExecutionState::Idle);
            assert_eq!(recorder.triggered(), expected);
            assert_eq!(recorder.completions(), vec!["end"]);
        }
    }

    #[test]
    fn test_intermediate_places_are_reported() {
        let engine = Engine::default();
        let recorder = Recorder::attach(&engine);
        scripted(&engine, Script::new([("A", vec![1])]));
        fixtures::initialize(&engine, fixtures::branching());

        engine.start().expect("ready");
        assert_eq!(recorder.reached(), vec!["right", "left"]);
    }

    #[test]
    fn test_pause_and_restore_into_fresh_instance() {
        let engine = Engine::default();
        let instance = fixtures::initialize(&engine, fixtures::linear());
        engine.start().expect("ready");

        let snapshot = fixtures::pause_while_held(&engine, &fixtures::task(&instance, "work"), 0);
        assert_eq!(engine.state(), ExecutionState::Paused);
        assert_eq!(engine.snapshot(), Some(snapshot.clone()));
        assert!(fixtures::place(&instance, "end").has_tokens());

        let json = serde_json::to_string(&snapshot).expect("serialization failed");
        let snapshot: Snapshot = serde_json::from_str(&json).expect("deserialization failed");

        let restored = Engine::default();
        let recorder = Recorder::attach(&restored);
        fixtures::initialize(&restored, fixtures::linear());
        restored.restore(snapshot).expect("fresh instance");
        assert_eq!(restored.state(), ExecutionState::Restored);

        restored.start().expect("restored");
        assert_eq!(restored.state(), ExecutionState::Idle);
        assert_eq!(recorder.completions(), vec!["end"]);
    }

    #[test]
    fn test_restored_task_is_triggered_again() {
        let previous = fixtures::instantiate(fixtures::linear());
        fixtures::task(&previous, "work")
            .restore(vec![Token::main()], None)
            .expect("restored");
        let snapshot = Snapshot::capture(&previous);

        let engine = Engine::default();
        let recorder = Recorder::attach(&engine);
        let instance = fixtures::initialize(&engine, fixtures::linear());
        engine.restore(snapshot).expect("fresh instance");
        engine.start().expect("restored");
        assert_eq!(recorder.triggered(), vec!["work"]);

        fixtures::task(&instance, "work").complete(0).expect("held");
        assert_eq!(engine.state(), ExecutionState::Idle);
        assert_eq!(recorder.completions(), vec!["end"]);
    }

    #[test]
    fn test_paused_engine_continues_on_start() {
        let engine = Engine::default();
        let recorder = Recorder::attach(&engine);
        let instance = fixtures::initialize(&engine, fixtures::linear());
        engine.start().expect("ready");

        fixtures::pause_while_held(&engine, &fixtures::task(&instance, "work"), 0);
        assert!(recorder.completions().is_empty());

        engine.start().expect("paused");
        assert_eq!(engine.state(), ExecutionState::Idle);
        assert_eq!(recorder.completions(), vec!["end"]);
    }

    #[test]
    fn test_paused_engine_restores_only_its_snapshot() {
        let engine = Engine::default();
        let instance = fixtures::initialize(&engine, fixtures::linear());
        engine.start().expect("ready");
        let snapshot = fixtures::pause_while_held(&engine, &fixtures::task(&instance, "work"), 0);

        let foreign = Snapshot::capture(&fixtures::instantiate(fixtures::linear()));
        assert!(matches!(
            engine.restore(foreign),
            Err(Error::SnapshotMismatch(_))
        ));
        assert_eq!(engine.state(), ExecutionState::Paused);

        engine.restore(snapshot).expect("own snapshot");
        assert_eq!(engine.state(), ExecutionState::Restored);
        engine.start().expect("restored");
        assert_eq!(engine.state(), ExecutionState::Idle);
    }

    #[test]
    fn test_restore_requires_fresh_instance() {
        let snapshot = Snapshot::capture(&fixtures::instantiate(fixtures::linear()));

        let engine = Engine::default();
        let instance = fixtures::initialize(&engine, fixtures::linear());
        fixtures::place(&instance, "start").set_tokens(vec![Token::main()]);

        assert!(matches!(
            engine.restore(snapshot),
            Err(Error::SnapshotMismatch(_))
        ));
        assert_eq!(engine.state(), ExecutionState::Ready);
    }

    #[test]
    fn test_drain_timeout_keeps_running() {
        let config = EngineConfig::builder()
            .drain_poll_interval(Duration::from_millis(1))
            .drain_timeout(Duration::from_millis(20))
            .build()
            .expect("valid config");
        let engine = Engine::new(config);
        let recorder = Recorder::attach(&engine);
        let instance = fixtures::initialize(&engine, fixtures::linear());
        engine.start().expect("ready");

        assert!(matches!(engine.pause(), Err(Error::DrainTimeout)));
        assert_eq!(engine.state(), ExecutionState::Running);

        let task = fixtures::task(&instance, "work");
        assert!(task.core().is_running());
        task.complete(0).expect("held");
        assert_eq!(engine.state(), ExecutionState::Idle);
        assert_eq!(recorder.completions(), vec!["end"]);
    }

    #[test]
    fn test_destroy_returns_to_idle() {
        let engine = Engine::default();
        scripted(&engine, Script::new([]));
        fixtures::initialize(&engine, fixtures::linear());
        engine.start().expect("ready");
        assert_eq!(engine.state(), ExecutionState::Idle);
        assert!(engine.instance().is_some());

        engine.destroy().expect("idle");
        assert_eq!(engine.state(), ExecutionState::Idle);
        assert!(engine.instance().is_none());

        fixtures::initialize(&engine, fixtures::linear());
        engine.destroy().expect("ready");
        assert_eq!(engine.state(), ExecutionState::Idle);
        assert!(engine.instance().is_none());
    }

    #[test]
    fn test_dropping_running_engine_detaches_without_draining() {
        let engine = Engine::default();
        let recorder = Recorder::attach(&engine);
        let instance = fixtures::initialize(&engine, fixtures::linear());
        engine.start().expect("ready");

        let work = fixtures::task(&instance, "work");
        assert!(work.is_executing());
        drop(engine);

        work.complete(0).expect("held");
        assert!(fixtures::place(&instance, "end").has_tokens());
        assert!(recorder.completions().is_empty());
    }

    #[test]
    fn test_paused_and_restored_run_takes_the_same_path() {
        let path = [("inspect", 0), ("rework", 0), ("retest", 0), ("pack", 0)];

        let engine = Engine::default();
        let uninterrupted = Recorder::attach(&engine);
        let instance = fixtures::initialize(&engine, fixtures::big());
        engine.start().expect("ready");
        drive(&instance, &path);
        assert_eq!(engine.state(), ExecutionState::Idle);

        let first = Engine::default();
        let before = Recorder::attach(&first);
        let instance = fixtures::initialize(&first, fixtures::big());
        first.start().expect("ready");
        drive(&instance, &path[..1]);
        let snapshot = fixtures::pause_while_held(&first, &fixtures::task(&instance, "rework"), 0);

        let second = Engine::default();
        let after = Recorder::attach(&second);
        let instance = fixtures::initialize(&second, fixtures::big());
        second.restore(snapshot).expect("fresh instance");
        second.start().expect("restored");
        drive(&instance, &path[2..]);
        assert_eq!(second.state(), ExecutionState::Idle);

        let joined = |a: Vec<String>, b: Vec<String>| [a, b].concat();
        assert_eq!(
            joined(before.triggered(), after.triggered()),
            uninterrupted.triggered()
        );
        assert_eq!(joined(before.reached(), after.reached()), uninterrupted.reached());
        assert!(before.completions().is_empty());
        assert_eq!(after.completions(), uninterrupted.completions());
        assert_eq!(after.completions(), vec!["ok"]);
    }

    #[test]
    fn test_single_main_token_on_unforked_runs() {
        let runs = [
            (fixtures::linear(), Script::new([]), "end"),
            (fixtures::branching(), Script::new([("A", vec![1])]), "end"),
            (
                fixtures::looping(),
                Script::new([("A", vec![0]), ("B", vec![1, 1, 0])]),
                "end",
            ),
        ];

        for (workplan, script, exit) in runs {
            let engine = Engine::default();
            let instance = fixtures::initialize(&engine, workplan);
            let census = MainTokenCensus::attach(&engine, &instance);
            let recorder = Recorder::attach(&engine);
            scripted(&engine, script);
            engine.start().expect("ready");

            assert_eq!(engine.state(), ExecutionState::Idle);
            assert_eq!(recorder.completions(), vec![exit]);
            let counts = census.counts.lock().clone();
            assert!(!counts.is_empty());
            assert!(counts.iter().all(|count| *count == 1), "{counts:?}");

            let at_exit = fixtures::place(&instance, exit).tokens();
            assert_eq!(at_exit.len(), 1);
            assert!(at_exit[0].is_main());
        }
    }

    /// `fork` splits onto `x` (ending in End) and `y` (ending in Failed).
    fn fork_to_failure() -> Workplan {
        let mut workplan = Workplan::new("fork-to-failure").with_id(9);
        let start = workplan
            .add_connector(Connector::new("start", Classification::Start))
            .expect("editable");
        let x = workplan
            .add_connector(Connector::new("x", Classification::Intermediate))
            .expect("editable");
        let y = workplan
            .add_connector(Connector::new("y", Classification::Intermediate))
            .expect("editable");
        let end = workplan
            .add_connector(Connector::new("end", Classification::End))
            .expect("editable");
        let scrap = workplan
            .add_connector(Connector::new("scrap", Classification::Failed))
            .expect("editable");

        let wiring = [
            (Step::split("fork", 2), vec![start], vec![x, y]),
            (Step::task("left", 1), vec![x], vec![end]),
            (Step::task("right", 1), vec![y], vec![scrap]),
        ];
        for (step, inputs, outputs) in wiring {
            let id = workplan.add_step(step).expect("editable");
            for (slot, connector) in inputs.into_iter().enumerate() {
                workplan.link(id, Port::Input(slot), connector).expect("linked");
            }
            for (slot, connector) in outputs.into_iter().enumerate() {
                workplan.link(id, Port::Output(slot), connector).expect("linked");
            }
        }
        workplan
    }

    #[test]
    fn test_only_main_token_or_failure_completes() {
        let engine = Engine::default();
        let recorder = Recorder::attach(&engine);
        let instance = fixtures::initialize(&engine, fork_to_failure());
        engine.start().expect("ready");

        fixtures::task(&instance, "left").complete(0).expect("held");
        assert_eq!(engine.state(), ExecutionState::Running);
        let at_end = fixtures::place(&instance, "end").tokens();
        assert!(at_end.iter().all(|t| !t.is_main()));

        fixtures::task(&instance, "right").complete(0).expect("held");
        assert_eq!(engine.state(), ExecutionState::Idle);
        assert_eq!(recorder.completions(), vec!["scrap"]);
    }

    #[test]
    fn test_join_restores_the_main_token() {
        let engine = Engine::default();
        let recorder = Recorder::attach(&engine);
        let instance = fixtures::initialize(&engine, fixtures::split_join());
        engine.start().expect("ready");

        let main_tokens = || {
            let places = instance.places().iter().flat_map(|p| p.tokens());
            let stored = instance.transitions().iter().flat_map(|t| t.stored_tokens());
            places.chain(stored).filter(Token::is_main).count()
        };
        assert_eq!(main_tokens(), 0);

        fixtures::task(&instance, "left").complete(0).expect("held");
        fixtures::task(&instance, "right").complete(0).expect("held");
        let finish = fixtures::task(&instance, "finish");
        assert!(finish.stored_tokens().iter().all(Token::is_main));
        assert_eq!(main_tokens(), 1);

        finish.complete(0).expect("held");
        assert_eq!(engine.state(), ExecutionState::Idle);
        assert_eq!(recorder.completions(), vec!["end"]);
    }

    #[test]
    fn test_disabled_steps_are_not_triggered_but_flow() {
        let workplan = fixtures::branching();
        let disabled = crate::instance::DisabledSteps::new()
            .with_disabled(fixtures::element(&workplan, "A"));
        let instance = WorkplanInstance::instantiate(Arc::new(workplan), Arc::new(disabled))
            .expect("instantiated");

        let engine = Engine::default();
        let recorder = Recorder::attach(&engine);
        scripted(&engine, Script::new([]));
        engine.initialize(Arc::new(instance)).expect("idle");
        engine.start().expect("ready");

        assert_eq!(recorder.triggered(), vec!["C"]);
        assert_eq!(recorder.completions(), vec!["end"]);
    }
}
