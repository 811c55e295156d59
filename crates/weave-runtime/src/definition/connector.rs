//! Connector (place definition) types.

use std::sync::Arc;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::{ElementId, Position};
use crate::runtime::{FlowLock, Place};

/// Role of a connector in the flow of a workplan.
///
/// `End` and `Failed` are the exit classifications: a run completes when the
/// main token reaches an `End` connector, or when any token reaches a
/// `Failed` connector.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(AsRefStr, Display, EnumString, EnumIter)]
#[derive(Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Entry point seeded with the main token when a run starts.
    Start,
    /// Regular connector between two steps.
    #[default]
    Intermediate,
    /// Successful exit.
    End,
    /// Failed exit.
    Failed,
}

impl Classification {
    /// Returns whether this classification terminates a run.
    #[must_use]
    pub const fn is_exit(&self) -> bool {
        matches!(self, Self::End | Self::Failed)
    }

    /// Returns whether this is a start classification.
    #[must_use]
    pub const fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    /// Returns whether this is an intermediate classification.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        matches!(self, Self::Intermediate)
    }
}

/// A connector definition: the persisted form of a runtime [`Place`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(
    name = "ConnectorBuilder",
    pattern = "owned",
    setter(into, strip_option, prefix = "with")
)]
pub struct Connector {
    /// Identifier assigned by the owning workplan.
    #[serde(default)]
    #[builder(default)]
    pub id: ElementId,
    /// Display name of the connector.
    pub name: String,
    /// Role of the connector in the flow.
    #[serde(default)]
    #[builder(default)]
    pub classification: Classification,
    /// Position in the visual editor.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub position: Option<Position>,
}

impl Connector {
    /// Creates a new connector with the given name and classification.
    pub fn new(name: impl Into<String>, classification: Classification) -> Self {
        Self {
            id: ElementId::default(),
            name: name.into(),
            classification,
            position: None,
        }
    }

    /// Returns a builder for creating a connector.
    pub fn builder() -> ConnectorBuilder {
        ConnectorBuilder::default()
    }

    /// Returns whether this connector terminates a run.
    pub const fn is_exit(&self) -> bool {
        self.classification.is_exit()
    }

    /// Creates the runtime place for this connector.
    pub fn create_place(&self, flow: &FlowLock) -> Arc<Place> {
        Arc::new(Place::new(
            self.id,
            self.name.clone(),
            self.classification,
            flow.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_classifications() {
        assert!(Classification::End.is_exit());
        assert!(Classification::Failed.is_exit());
        assert!(!Classification::Start.is_exit());
        assert!(!Classification::Intermediate.is_exit());
    }

    #[test]
    fn test_classification_parse() {
        assert_eq!("failed".parse::<Classification>().ok(), Some(Classification::Failed));
        assert_eq!(Classification::Start.as_ref(), "start");
    }

    #[test]
    fn test_connector_builder() {
        let connector = Connector::builder()
            .with_name("packaged")
            .with_classification(Classification::End)
            .with_position(Position::new(10.0, 20.0))
            .build()
            .expect("valid connector");

        assert_eq!(connector.name, "packaged");
        assert!(connector.is_exit());
        assert!(!connector.id.is_assigned());
    }

    #[test]
    fn test_connector_creates_place() {
        let mut connector = Connector::new("input", Classification::Start);
        connector.id = ElementId::new(3);

        let place = connector.create_place(&FlowLock::default());
        assert_eq!(place.id(), ElementId::new(3));
        assert_eq!(place.classification(), Classification::Start);
        assert!(place.tokens().is_empty());
    }
}
