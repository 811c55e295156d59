//! Workplans and helpers shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::definition::{Classification, Connector, ElementId, Port, Position, Step, Workplan};
use crate::dispatcher::HandlerResult;
use crate::engine::{Engine, EngineObserver, Snapshot};
use crate::instance::{DefaultContext, WorkplanInstance};
use crate::runtime::{AsAny, Place, Transition};
use crate::steps::TaskTransition;

/// Incremental workplan construction with laid-out positions.
struct Layout {
    workplan: Workplan,
    placed: usize,
}

impl Layout {
    fn new(id: u64, name: &str) -> Self {
        Self {
            workplan: Workplan::new(name).with_id(id).with_version(1),
            placed: 0,
        }
    }

    fn position(&mut self) -> Position {
        self.placed += 1;
        Position::new(120.0 * self.placed as f32, 80.0 * (self.placed % 3) as f32)
    }

    fn connector(&mut self, name: &str, classification: Classification) -> ElementId {
        let mut connector = Connector::new(name, classification);
        connector.position = Some(self.position());
        self.workplan.add_connector(connector).expect("editable")
    }

    fn step(&mut self, step: Step, inputs: &[ElementId], outputs: &[ElementId]) -> ElementId {
        let position = self.position();
        let id = self
            .workplan
            .add_step(step.with_position(position))
            .expect("editable");
        for (slot, connector) in inputs.iter().enumerate() {
            self.workplan
                .link(id, Port::Input(slot), *connector)
                .expect("linked");
        }
        for (slot, connector) in outputs.iter().enumerate() {
            self.workplan
                .link(id, Port::Output(slot), *connector)
                .expect("linked");
        }
        id
    }

    fn finish(self) -> Workplan {
        self.workplan
    }
}

/// `start -> work -> end`
pub fn linear() -> Workplan {
    let mut layout = Layout::new(1, "linear");
    let start = layout.connector("start", Classification::Start);
    let end = layout.connector("end", Classification::End);
    layout.step(Step::task("work", 1), &[start], &[end]);
    layout.finish()
}

/// `A` either goes straight to `C` or detours through `B`.
pub fn branching() -> Workplan {
    let mut layout = Layout::new(2, "branching");
    let start = layout.connector("start", Classification::Start);
    let left = layout.connector("left", Classification::Intermediate);
    let right = layout.connector("right", Classification::Intermediate);
    let end = layout.connector("end", Classification::End);
    layout.step(Step::task("A", 2), &[start], &[left, right]);
    layout.step(Step::task("B", 1), &[right], &[left]);
    layout.step(Step::task("C", 1), &[left], &[end]);
    layout.finish()
}

/// `fork` splits into `left` and `right`, `merge` joins them before `finish`.
pub fn split_join() -> Workplan {
    let mut layout = Layout::new(3, "split-join");
    let start = layout.connector("start", Classification::Start);
    let a = layout.connector("a", Classification::Intermediate);
    let b = layout.connector("b", Classification::Intermediate);
    let a2 = layout.connector("a2", Classification::Intermediate);
    let b2 = layout.connector("b2", Classification::Intermediate);
    let joined = layout.connector("joined", Classification::Intermediate);
    let end = layout.connector("end", Classification::End);
    layout.step(Step::split("fork", 2), &[start], &[a, b]);
    layout.step(Step::task("left", 1), &[a], &[a2]);
    layout.step(Step::task("right", 1), &[b], &[b2]);
    layout.step(Step::join("merge", 2), &[a2, b2], &[joined]);
    layout.step(Step::task("finish", 1), &[joined], &[end]);
    layout.finish()
}

/// `B` may send the token back through `C` any number of times; `A` may
/// fail the run.
pub fn looping() -> Workplan {
    let mut layout = Layout::new(4, "looping");
    let start = layout.connector("start", Classification::Start);
    let m1 = layout.connector("m1", Classification::Intermediate);
    let back = layout.connector("back", Classification::Intermediate);
    let end = layout.connector("end", Classification::End);
    let failed = layout.connector("failed", Classification::Failed);
    layout.step(Step::task("A", 2), &[start], &[m1, failed]);
    layout.step(Step::task("B", 2), &[m1], &[end, back]);
    layout.step(Step::pass("C", 1, 0), &[back], &[m1]);
    layout.finish()
}

/// Assembly line ending in `ok` (End) or `scrap` (Failed).
///
/// After `inspect` chooses output 1 only `ok` is reachable; output 0 keeps
/// both outcomes open until `rework` or `retest` decide.
pub fn big() -> Workplan {
    let mut layout = Layout::new(5, "assembly");
    let start = layout.connector("start", Classification::Start);
    let c1 = layout.connector("c1", Classification::Intermediate);
    let c2 = layout.connector("c2", Classification::Intermediate);
    let c3 = layout.connector("c3", Classification::Intermediate);
    let c4 = layout.connector("c4", Classification::Intermediate);
    let c5 = layout.connector("c5", Classification::Intermediate);
    let ok = layout.connector("ok", Classification::End);
    let scrap = layout.connector("scrap", Classification::Failed);
    layout.step(Step::task("inspect", 2), &[start], &[c1, c2]);
    layout.step(Step::task("rework", 2), &[c1], &[c3, scrap]);
    layout.step(Step::task("assemble", 1), &[c2], &[c4]);
    layout.step(Step::task("retest", 2), &[c3], &[c4, c5]);
    layout.step(Step::task("recycle", 1), &[c5], &[scrap]);
    layout.step(Step::task("pack", 1), &[c4], &[ok]);
    layout.finish()
}

/// Linear workplan plus a step `lonely` whose output nobody consumes.
pub fn lone_wolf() -> Workplan {
    let mut layout = Layout::new(6, "lone-wolf");
    let start = layout.connector("start", Classification::Start);
    let end = layout.connector("end", Classification::End);
    let loose = layout.connector("loose", Classification::Intermediate);
    layout.step(Step::task("work", 1), &[start], &[end]);
    layout.step(Step::task("lonely", 1), &[start], &[loose]);
    layout.finish()
}

/// Linear workplan plus a connector `orphan` that no step produces.
pub fn dead_end() -> Workplan {
    let mut layout = Layout::new(7, "dead-end");
    let start = layout.connector("start", Classification::Start);
    let end = layout.connector("end", Classification::End);
    let orphan = layout.connector("orphan", Classification::Intermediate);
    layout.step(Step::task("work", 1), &[start], &[end]);
    layout.step(Step::task("stray", 1), &[orphan], &[end]);
    layout.finish()
}

/// `start -> inner -> end` where `inner` runs [`linear`].
pub fn nested() -> Workplan {
    let mut layout = Layout::new(8, "nested");
    let start = layout.connector("start", Classification::Start);
    let end = layout.connector("end", Classification::End);
    let inner = Step::subworkplan("inner", &linear()).expect("serializable");
    layout.step(inner, &[start], &[end]);
    layout.finish()
}

/// Instantiates `workplan` with every step enabled.
pub fn instantiate(workplan: Workplan) -> Arc<WorkplanInstance> {
    let instance = WorkplanInstance::instantiate(Arc::new(workplan), Arc::new(DefaultContext))
        .expect("instantiated");
    Arc::new(instance)
}

/// Instantiates `workplan` and binds it to `engine`.
pub fn initialize(engine: &Engine, workplan: Workplan) -> Arc<WorkplanInstance> {
    let instance = instantiate(workplan);
    engine
        .initialize(Arc::clone(&instance))
        .expect("engine idle");
    instance
}

/// Returns the connector or step named `name`.
pub fn element(workplan: &Workplan, name: &str) -> ElementId {
    workplan
        .connectors
        .iter()
        .map(|c| (c.id, &c.name))
        .chain(workplan.steps.iter().map(|s| (s.id, &s.name)))
        .find(|(_, n)| *n == name)
        .map(|(id, _)| id)
        .unwrap_or_else(|| panic!("no element named '{name}'"))
}

/// Returns the transition of the step named `name` as a `T`.
pub fn transition<T: Transition>(instance: &WorkplanInstance, name: &str) -> Arc<T> {
    let transition = instance
        .transitions()
        .iter()
        .find(|t| t.core().name() == name)
        .unwrap_or_else(|| panic!("no step named '{name}'"));
    AsAny::into_any(Arc::clone(transition))
        .downcast::<T>()
        .unwrap_or_else(|_| panic!("step '{name}' has another type"))
}

/// Returns the task transition of the step named `name`.
pub fn task(instance: &WorkplanInstance, name: &str) -> Arc<TaskTransition> {
    transition(instance, name)
}

/// Pauses `engine` on another thread while `task` holds its token, then
/// completes the task on `output` so the pause can drain.
pub fn pause_while_held(engine: &Engine, task: &Arc<TaskTransition>, output: usize) -> Snapshot {
    std::thread::scope(|scope| {
        let pausing = scope.spawn(|| engine.pause());
        while task.core().is_running() {
            std::thread::sleep(Duration::from_millis(1));
        }
        task.complete(output).expect("token held");
        pausing.join().expect("pause thread").expect("drained")
    })
}

/// Returns the place of the connector named `name`.
pub fn place(instance: &WorkplanInstance, name: &str) -> Arc<Place> {
    instance
        .places()
        .iter()
        .find(|p| p.name() == name)
        .cloned()
        .unwrap_or_else(|| panic!("no connector named '{name}'"))
}

/// Observer recording engine events by element name.
#[derive(Default)]
pub struct Recorder {
    triggered: Mutex<Vec<String>>,
    reached: Mutex<Vec<String>>,
    completions: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn attach(engine: &Engine) -> Arc<Self> {
        let recorder = Arc::new(Self::default());
        engine.subscribe(Arc::clone(&recorder) as Arc<dyn EngineObserver>);
        recorder
    }

    pub fn triggered(&self) -> Vec<String> {
        self.triggered.lock().clone()
    }

    pub fn reached(&self) -> Vec<String> {
        self.reached.lock().clone()
    }

    pub fn completions(&self) -> Vec<String> {
        self.completions.lock().clone()
    }
}

impl EngineObserver for Recorder {
    fn place_reached(&self, place: &Arc<Place>) {
        self.reached.lock().push(place.name().to_owned());
    }

    fn transition_triggered(&self, transition: &Arc<dyn Transition>) {
        self.triggered.lock().push(transition.core().name().to_owned());
    }

    fn completed(&self, place: &Arc<Place>) {
        self.completions.lock().push(place.name().to_owned());
    }
}

/// Task handler completing each step on scripted outputs, output 0 once a
/// step's script runs out.
#[derive(Default)]
pub struct Script {
    outputs: Mutex<HashMap<String, VecDeque<usize>>>,
}

impl Script {
    pub fn new<'a>(steps: impl IntoIterator<Item = (&'a str, Vec<usize>)>) -> Arc<Self> {
        let outputs = steps
            .into_iter()
            .map(|(name, outputs)| (name.to_owned(), outputs.into()))
            .collect();
        Arc::new(Self {
            outputs: Mutex::new(outputs),
        })
    }

    pub fn handle(&self, task: Arc<TaskTransition>) -> HandlerResult {
        let output = self
            .outputs
            .lock()
            .get_mut(task.name())
            .and_then(VecDeque::pop_front)
            .unwrap_or(0);
        task.complete(output)?;
        Ok(())
    }
}
