//! Presentation helpers shared by definition types.

mod position;

pub use position::Position;
