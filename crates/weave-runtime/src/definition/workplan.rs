//! Workplan (graph definition) type.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::{Classification, Connector, ElementId, Port, Step};
use crate::{Error, Result};

/// Editing lifecycle of a workplan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkplanState {
    /// Editable.
    #[default]
    New,
    /// Released for production; no longer editable.
    Released,
    /// Withdrawn; no longer editable.
    Revoked,
}

/// Serializable workplan definition.
///
/// A workplan is a directed graph alternating between connectors and steps.
/// Element identifiers are handed out from `max_element_id`, which only
/// grows: removing an element never renumbers the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workplan {
    /// Identifier of the workplan.
    #[serde(default)]
    pub id: u64,
    /// Display name of the workplan.
    pub name: String,
    /// Version of the workplan.
    #[serde(default)]
    pub version: u32,
    /// Editing lifecycle.
    #[serde(default)]
    pub state: WorkplanState,
    /// Highest element identifier handed out so far.
    #[serde(default)]
    pub max_element_id: u64,
    /// Connectors in definition order.
    #[serde(default)]
    pub connectors: Vec<Connector>,
    /// Steps in definition order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Workplan {
    /// Creates an empty, editable workplan.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the workplan identifier.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Sets the workplan version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Returns whether the workplan can still be edited.
    pub fn is_editable(&self) -> bool {
        self.state == WorkplanState::New
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.is_editable() {
            Ok(())
        } else {
            Err(Error::WorkplanLocked(self.state.to_string()))
        }
    }

    fn next_element_id(&mut self) -> ElementId {
        self.max_element_id += 1;
        ElementId::new(self.max_element_id)
    }

    /// Adds a connector and returns its newly assigned identifier.
    pub fn add_connector(&mut self, mut connector: Connector) -> Result<ElementId> {
        self.ensure_editable()?;
        connector.id = self.next_element_id();
        let id = connector.id;
        self.connectors.push(connector);
        Ok(id)
    }

    /// Adds a step and returns its newly assigned identifier.
    pub fn add_step(&mut self, mut step: Step) -> Result<ElementId> {
        self.ensure_editable()?;
        step.id = self.next_element_id();
        let id = step.id;
        self.steps.push(step);
        Ok(id)
    }

    /// Removes a connector and unwires every slot referencing it.
    pub fn remove_connector(&mut self, id: ElementId) -> Result<Connector> {
        self.ensure_editable()?;
        let index = self
            .connectors
            .iter()
            .position(|c| c.id == id)
            .ok_or(Error::ElementNotFound(id))?;

        for step in &mut self.steps {
            for slot in step.inputs.iter_mut().chain(step.outputs.iter_mut()) {
                if *slot == Some(id) {
                    *slot = None;
                }
            }
        }

        Ok(self.connectors.remove(index))
    }

    /// Removes a step.
    pub fn remove_step(&mut self, id: ElementId) -> Result<Step> {
        self.ensure_editable()?;
        let index = self
            .steps
            .iter()
            .position(|s| s.id == id)
            .ok_or(Error::ElementNotFound(id))?;
        Ok(self.steps.remove(index))
    }

    /// Wires `port` of `step` to `connector`.
    pub fn link(&mut self, step: ElementId, port: Port, connector: ElementId) -> Result<()> {
        self.ensure_editable()?;
        if self.connector(connector).is_none() {
            return Err(Error::ElementNotFound(connector));
        }

        let step = self
            .steps
            .iter_mut()
            .find(|s| s.id == step)
            .ok_or(Error::ElementNotFound(step))?;

        let id = step.id;
        let slot = match port {
            Port::Input(index) => step.inputs.get_mut(index),
            Port::Output(index) => step.outputs.get_mut(index),
        };
        let slot = slot
            .ok_or_else(|| Error::InvalidDefinition(format!("step {id} has no {port} port")))?;
        *slot = Some(connector);
        Ok(())
    }

    /// Unwires `port` of `step`.
    pub fn unlink(&mut self, step: ElementId, port: Port) -> Result<()> {
        self.ensure_editable()?;
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.id == step)
            .ok_or(Error::ElementNotFound(step))?;

        let id = step.id;
        let slot = match port {
            Port::Input(index) => step.inputs.get_mut(index),
            Port::Output(index) => step.outputs.get_mut(index),
        };
        let slot = slot
            .ok_or_else(|| Error::InvalidDefinition(format!("step {id} has no {port} port")))?;
        *slot = None;
        Ok(())
    }

    /// Locks the workplan against further edits.
    pub fn release(&mut self) {
        self.state = WorkplanState::Released;
    }

    /// Withdraws the workplan.
    pub fn revoke(&mut self) {
        self.state = WorkplanState::Revoked;
    }

    /// Returns the connector with the given identifier.
    pub fn connector(&self, id: ElementId) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.id == id)
    }

    /// Returns the step with the given identifier.
    pub fn step(&self, id: ElementId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Returns whether an element with the given identifier exists.
    pub fn contains(&self, id: ElementId) -> bool {
        self.connector(id).is_some() || self.step(id).is_some()
    }

    /// Iterates over Start-classified connectors.
    pub fn start_connectors(&self) -> impl Iterator<Item = &Connector> {
        self.connectors
            .iter()
            .filter(|c| c.classification == Classification::Start)
    }

    /// Iterates over exit connectors (End or Failed) in definition order.
    pub fn exit_connectors(&self) -> impl Iterator<Item = &Connector> {
        self.connectors.iter().filter(|c| c.is_exit())
    }
}
