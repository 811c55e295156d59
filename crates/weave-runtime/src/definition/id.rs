//! Element identifier type.

use std::str::FromStr;

use derive_more::{Debug, Display, From, Into};
use serde::{Deserialize, Serialize};

/// Identifier of a connector or step within a workplan.
///
/// Connectors and steps share one identifier space: the workplan hands out
/// identifiers from a single growing counter and never reuses or renumbers
/// them. The zero value marks an element that was not added to a workplan yet.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Debug, Display, From, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[serde(transparent)]
pub struct ElementId(u64);

impl ElementId {
    /// Creates an element ID from a raw value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns whether this ID was assigned by a workplan.
    #[inline]
    pub const fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

impl FromStr for ElementId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(u64::from_str(s)?))
    }
}
