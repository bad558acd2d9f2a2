//! Layered Auto-Layout
//!
//! Two-stage layout of the active view: [`leveling`] assigns each node to a
//! column via longest-path relaxation, and [`slices`] turns columns into
//! canvas geometry through a pluggable [`PositionSolver`].

pub mod leveling;
pub mod slices;

pub use leveling::{assign_levels, LevelAssignment};
pub use slices::{
    compute_slices, estimated_width, ColumnStackSolver, NodeMeasurements, Position,
    PositionSolver, Slice, SolveRequest, DEFAULT_NODE_HEIGHT, DEFAULT_NODE_WIDTH, GAP_DISTANCE,
    MAX_SANE_HEIGHT, MAX_SANE_WIDTH, VERTICAL_NODE_SPACING,
};
