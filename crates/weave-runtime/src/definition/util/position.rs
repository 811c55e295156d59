//! Position type for the visual workplan editor.

use serde::{Deserialize, Serialize};

/// Layout position of a connector or step in the visual editor.
///
/// Presentation only: the engine never reads it, but validation reports
/// carry it so an editor can highlight the offending element.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
}

impl Position {
    /// Creates a new position.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}
