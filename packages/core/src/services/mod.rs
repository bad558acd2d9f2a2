//! Service Layer for GoalGraph
//!
//! [`GraphService`] is the engine's front door: document lifecycle, tracked
//! mutations, auto-layout and the rendered view. [`SyncReconciler`] feeds it
//! external updates from the store change feed and collaborator patches.

pub mod error;
pub mod graph_service;
pub mod reconciler;

pub use error::GraphServiceError;
pub use graph_service::{
    ChildSummary, GraphService, MutationOutcome, MutationState, RenderEdge, RenderNode,
};
pub use reconciler::SyncReconciler;
