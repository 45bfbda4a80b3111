//! Warfield - authoritative game-state core for a turn-based grid-strategy
//! engine.
//!
//! The crate owns the map's tiles, units and armies, answers spatial queries,
//! computes legal movement paths under terrain/fuel/occupancy constraints,
//! maintains per-army fog-of-war visibility, and provides an undo/redo
//! journal over the entire map state. Rendering, audio, input and combat
//! resolution are external collaborators.

pub mod catalog;
pub mod core;
pub mod grid;
pub mod map;
