//! Serializable record of a paused run.

use std::collections::HashSet;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::TRACING_TARGET;
use crate::definition::ElementId;
use crate::instance::WorkplanInstance;
use crate::runtime::Token;
use crate::{Error, Result};

/// Tokens and resume data of one place or transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderSnapshot {
    /// Identifier of the connector or step the holder was created from.
    pub holder_id: ElementId,
    /// Held tokens in order.
    pub tokens: Vec<Token>,
    /// Step-specific resume data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_state: Option<serde_json::Value>,
}

/// Record of which holder owned which tokens when a run was paused.
///
/// Every place is recorded, even when empty; transitions are recorded only
/// while holding tokens. A snapshot can only be restored into a fresh
/// instance of the same workplan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Identifier of the workplan.
    pub workplan_id: u64,
    /// Name of the workplan.
    pub workplan_name: String,
    /// Version of the workplan.
    pub workplan_version: u32,
    /// Per-holder records.
    pub holders: Vec<HolderSnapshot>,
    /// When the snapshot was taken.
    pub taken_at: Timestamp,
}

impl Snapshot {
    /// Records every holder of `instance`.
    ///
    /// Token movements are frozen for the duration of the capture, so every
    /// token is recorded exactly once.
    pub fn capture(instance: &WorkplanInstance) -> Self {
        let workplan = instance.workplan();
        let _frozen = instance.flow().freeze();

        let places = instance.places().iter().map(|place| HolderSnapshot {
            holder_id: place.id(),
            tokens: place.tokens(),
            holder_state: None,
        });
        let transitions = instance
            .transitions()
            .iter()
            .filter(|t| t.core().has_stored())
            .map(|transition| HolderSnapshot {
                holder_id: transition.id(),
                tokens: transition.stored_tokens(),
                holder_state: transition.holder_state(),
            });

        Self {
            workplan_id: workplan.id,
            workplan_name: workplan.name.clone(),
            workplan_version: workplan.version,
            holders: places.chain(transitions).collect(),
            taken_at: Timestamp::now(),
        }
    }

    /// Returns the record of holder `id`.
    pub fn holder(&self, id: ElementId) -> Option<&HolderSnapshot> {
        self.holders.iter().find(|h| h.holder_id == id)
    }

    /// Iterates over the holders owning at least one token.
    pub fn occupied(&self) -> impl Iterator<Item = &HolderSnapshot> {
        self.holders.iter().filter(|h| !h.tokens.is_empty())
    }

    /// Returns the number of recorded tokens.
    pub fn token_count(&self) -> usize {
        self.holders.iter().map(|h| h.tokens.len()).sum()
    }

    /// Checks that the snapshot was taken from an instance of the same
    /// workplan with the same holders.
    pub fn validate_against(&self, instance: &WorkplanInstance) -> Result<()> {
        let workplan = instance.workplan();
        if workplan.id != self.workplan_id
            || workplan.name != self.workplan_name
            || workplan.version != self.workplan_version
        {
            return Err(Error::WorkplanMismatch(format!(
                "snapshot of '{}' v{} cannot restore '{}' v{}",
                self.workplan_name, self.workplan_version, workplan.name, workplan.version
            )));
        }

        let mut recorded = HashSet::new();
        for holder in &self.holders {
            if !recorded.insert(holder.holder_id) {
                return Err(Error::SnapshotMismatch(format!(
                    "holder {} is recorded twice",
                    holder.holder_id
                )));
            }
            if instance.place(holder.holder_id).is_none()
                && instance.transition(holder.holder_id).is_none()
            {
                return Err(Error::SnapshotMismatch(format!(
                    "holder {} does not exist in the instance",
                    holder.holder_id
                )));
            }
        }

        if let Some(place) = instance.places().iter().find(|p| !recorded.contains(&p.id())) {
            return Err(Error::SnapshotMismatch(format!(
                "place {} is missing from the snapshot",
                place.id()
            )));
        }
        Ok(())
    }

    /// Copies tokens and resume data onto the matching holders of
    /// `instance` without announcing anything.
    ///
    /// Transitions are restored before places. If any transition rejects
    /// its record, the transitions restored so far get their previous
    /// contents back and no place is touched.
    pub(crate) fn apply_to(&self, instance: &WorkplanInstance) -> Result<()> {
        self.validate_against(instance)?;
        let _frozen = instance.flow().freeze();

        let mut restored: Vec<(
            &std::sync::Arc<dyn crate::runtime::Transition>,
            (Vec<Token>, Option<serde_json::Value>),
        )> = Vec::new();
        for holder in &self.holders {
            let Some(transition) = instance.transition(holder.holder_id) else {
                continue;
            };
            let previous = (transition.stored_tokens(), transition.holder_state());
            let result = transition.restore(holder.tokens.clone(), holder.holder_state.clone());
            if let Err(error) = result {
                for (transition, (tokens, state)) in restored.into_iter().rev() {
                    if let Err(error) = transition.restore(tokens, state) {
                        tracing::warn!(
                            target: TRACING_TARGET,
                            step = %transition.id(),
                            error = %error,
                            "Failed to roll back restored transition"
                        );
                    }
                }
                return Err(error);
            }
            restored.push((transition, previous));
        }

        for holder in &self.holders {
            if let Some(place) = instance.place(holder.holder_id) {
                place.set_tokens(holder.tokens.clone());
            }
        }
        Ok(())
    }
}
