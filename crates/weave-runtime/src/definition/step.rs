//! Step (transition definition) types.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use super::{ElementId, Position, Workplan};

/// Step type names registered by default.
pub mod step_types {
    /// Step whose completion is reported from outside the engine.
    pub const TASK: &str = "task";
    /// Step that completes synchronously on a fixed output.
    pub const PASS: &str = "pass";
    /// Step forking one token onto every output.
    pub const SPLIT: &str = "split";
    /// Step merging the tokens of every input into one.
    pub const JOIN: &str = "join";
    /// Step executing a nested workplan.
    pub const SUBWORKPLAN: &str = "subworkplan";
}

/// A slot of a step that can be wired to a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case", tag = "port", content = "slot")]
pub enum Port {
    /// Input slot at the given index.
    Input(usize),
    /// Output slot at the given index.
    Output(usize),
}

/// A step definition: the persisted form of a runtime transition.
///
/// Input and output arities are fixed when the step is created; unconnected
/// slots hold `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(
    name = "StepBuilder",
    pattern = "owned",
    setter(into, strip_option, prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct Step {
    /// Identifier assigned by the owning workplan.
    #[serde(default)]
    #[builder(default)]
    pub id: ElementId,
    /// Display name of the step.
    pub name: String,
    /// Registered step type used to create the runtime transition.
    pub step_type: String,
    /// Input connector references.
    #[serde(default)]
    #[builder(default)]
    pub inputs: Vec<Option<ElementId>>,
    /// Output connector references.
    #[serde(default)]
    #[builder(default)]
    pub outputs: Vec<Option<ElementId>>,
    /// Step-type-specific parameters.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    #[builder(default)]
    pub parameters: serde_json::Value,
    /// Position in the visual editor.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub position: Option<Position>,
}

impl StepBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(step_type) = &self.step_type
            && step_type.trim().is_empty()
        {
            return Err("step type cannot be empty".into());
        }
        Ok(())
    }

    /// Sets the number of input slots, leaving them unconnected.
    pub fn with_input_count(self, count: usize) -> Self {
        self.with_inputs(vec![None; count])
    }

    /// Sets the number of output slots, leaving them unconnected.
    pub fn with_output_count(self, count: usize) -> Self {
        self.with_outputs(vec![None; count])
    }
}

impl Step {
    /// Creates a step with the given arities and no parameters.
    pub fn new(
        name: impl Into<String>,
        step_type: impl Into<String>,
        inputs: usize,
        outputs: usize,
    ) -> Self {
        Self {
            id: ElementId::default(),
            name: name.into(),
            step_type: step_type.into(),
            inputs: vec![None; inputs],
            outputs: vec![None; outputs],
            parameters: serde_json::Value::Null,
            position: None,
        }
    }

    /// Returns a builder for creating a step.
    pub fn builder() -> StepBuilder {
        StepBuilder::default()
    }

    /// Creates a task step with one input and `outputs` outputs.
    pub fn task(name: impl Into<String>, outputs: usize) -> Self {
        Self::new(name, step_types::TASK, 1, outputs)
    }

    /// Creates a pass step with one input and `outputs` outputs that always
    /// completes on `output`.
    pub fn pass(name: impl Into<String>, outputs: usize, output: usize) -> Self {
        Self::new(name, step_types::PASS, 1, outputs)
            .with_parameters(serde_json::json!({ "output": output }))
    }

    /// Creates a split step with one input and `outputs` outputs.
    pub fn split(name: impl Into<String>, outputs: usize) -> Self {
        Self::new(name, step_types::SPLIT, 1, outputs)
    }

    /// Creates a join step with `inputs` inputs and one output.
    pub fn join(name: impl Into<String>, inputs: usize) -> Self {
        Self::new(name, step_types::JOIN, inputs, 1)
    }

    /// Creates a step executing `workplan`.
    ///
    /// The step gets one output per exit connector of the nested workplan, in
    /// definition order.
    pub fn subworkplan(name: impl Into<String>, workplan: &Workplan) -> serde_json::Result<Self> {
        let outputs = workplan.exit_connectors().count();
        let parameters = serde_json::json!({ "workplan": serde_json::to_value(workplan)? });
        Ok(Self::new(name, step_types::SUBWORKPLAN, 1, outputs).with_parameters(parameters))
    }

    /// Replaces the step parameters.
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the editor position.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Returns the connector wired to `port`, if any.
    pub fn slot(&self, port: Port) -> Option<ElementId> {
        match port {
            Port::Input(index) => self.inputs.get(index).copied().flatten(),
            Port::Output(index) => self.outputs.get(index).copied().flatten(),
        }
    }

    /// Returns whether `port` exists on this step.
    pub fn has_port(&self, port: Port) -> bool {
        match port {
            Port::Input(index) => index < self.inputs.len(),
            Port::Output(index) => index < self.outputs.len(),
        }
    }

    /// Iterates over every connector this step references, inputs first.
    pub fn references(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.inputs.iter().chain(self.outputs.iter()).flatten().copied()
    }

    /// Returns whether `connector` is wired to one of the inputs.
    pub fn consumes(&self, connector: ElementId) -> bool {
        self.inputs.contains(&Some(connector))
    }

    /// Returns whether `connector` is wired to one of the outputs.
    pub fn produces(&self, connector: ElementId) -> bool {
        self.outputs.contains(&Some(connector))
    }
}
