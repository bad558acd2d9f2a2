//! Data Models for GoalGraph
//!
//! This module contains the core data structures of the goal graph engine:
//!
//! - [`HierarchyNode`]: a single objective in the DAG
//! - [`GraphDocument`]: the arena of nodes plus derived structural views
//! - [`wire`]: normalization from legacy wire shapes and serialization back
//! - [`time`]: clock and day-boundary abstractions for deterministic tests

pub mod document;
pub mod node;
pub mod time;
pub mod wire;

pub use document::{DayProgress, GraphDocument, GraphError, NodeView};
pub use node::{
    GoalStatus, HierarchyNode, ValidationError, Viewport, DEFAULT_NODE_TYPE, DEFAULT_WEIGHT,
    MAIN_GRAPH_ID,
};
pub use time::{DayWindow, SystemTimeProvider, TimeProvider};
