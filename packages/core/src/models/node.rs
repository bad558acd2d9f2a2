//! Goal Node Data Structures
//!
//! This module defines the core `HierarchyNode` struct and related types for
//! GoalGraph's goal DAG.
//!
//! # Architecture
//!
//! - **Universal Node**: a single struct represents every objective archetype;
//!   the `node_type` tag only drives visual rendering
//! - **Child→Parent Edges**: `parents` lists the objectives this node
//!   contributes toward (rendered left-to-right)
//! - **Container Field**: `graph` names the node whose nested sub-view this
//!   node is drawn inside; `"main"` is the top-level canvas
//! - **Passthrough Fields**: unrecognized wire fields survive round-trips in
//!   the flattened `extra` map
//!
//! # Examples
//!
//! ```rust
//! use goalgraph_core::models::{GoalStatus, HierarchyNode};
//!
//! let goal = HierarchyNode::new("goal-1", "Ship the product");
//! assert_eq!(goal.status, GoalStatus::NotStarted);
//!
//! let sub = HierarchyNode::new("sub-1", "Write the docs")
//!     .with_parents(["goal-1"])
//!     .with_weight(60.0);
//! assert_eq!(sub.parents, vec!["goal-1".to_string()]);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Container id of the top-level canvas.
pub const MAIN_GRAPH_ID: &str = "main";

/// Visual archetype assigned when the wire document carries none.
pub const DEFAULT_NODE_TYPE: &str = "objectiveNode";

/// Aggregation weight assigned when the wire document carries none.
pub const DEFAULT_WEIGHT: f64 = 100.0;

/// Validation errors for node-level invariants
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid aggregation weight: {0}")]
    InvalidWeight(f64),
}

/// Completion status of a goal node.
///
/// The wire format is kebab-case; `complete` is accepted as a legacy alias
/// for `completed`. Unknown wire strings fall back to `NotStarted` via
/// [`GoalStatus::parse`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalStatus {
    #[default]
    NotStarted,
    InProgress,
    #[serde(alias = "complete")]
    Completed,
    Blocked,
}

impl GoalStatus {
    /// Parse a wire status string, falling back to `NotStarted` for anything
    /// unrecognized (legacy documents contain free-form statuses).
    pub fn parse(raw: &str) -> Self {
        match raw {
            "in-progress" => Self::InProgress,
            "completed" | "complete" => Self::Completed,
            "blocked" => Self::Blocked,
            _ => Self::NotStarted,
        }
    }

    /// Wire representation of this status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }

    /// Whether this status counts toward the progress ledger
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pan/zoom state of the canvas, persisted with the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn new(x: f64, y: f64, zoom: f64) -> Self {
        Self { x, y, zoom }
    }
}

/// A single objective in the goal DAG.
///
/// # Fields
///
/// - `id`: unique identifier
/// - `node_type`: visual archetype tag (wire key `type`)
/// - `label`: display text (defaults to the id on the wire)
/// - `status`: completion state, see [`GoalStatus`]
/// - `parents`: ordered ids this node contributes toward (child→parent edges)
/// - `graph`: id of the container whose sub-view this node belongs to
/// - `percentage_of_parent`: aggregation weight, default 100
/// - `completed_at`: stamp shared by an entire completion cascade
/// - `scheduled_start` / `scheduled_end`: optional scheduling window
/// - `extra`: passthrough fields preserved verbatim across round-trips
///
/// # Views, not copies
///
/// A node never stores its children. Tree structure (roots, per-container
/// children) is always derived from the owning
/// [`GraphDocument`](crate::models::GraphDocument) arena, so a mutation is
/// visible through every view by construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyNode {
    pub id: String,

    /// Visual archetype (wire key `type`)
    #[serde(rename = "type")]
    pub node_type: String,

    pub label: String,

    pub status: GoalStatus,

    /// Ordered ids this node contributes toward (child→parent edges)
    pub parents: Vec<String>,

    /// Container id; `"main"` or a missing id means this node is a root
    pub graph: String,

    /// Aggregation weight relative to siblings contributing to the same goal
    pub percentage_of_parent: f64,

    /// Set for every node reached by a completion cascade; one shared stamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_start: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_end: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Free-form passthrough fields from the wire document
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl HierarchyNode {
    /// Create a node with default type, status, weight and container
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: DEFAULT_NODE_TYPE.to_string(),
            label: label.into(),
            status: GoalStatus::NotStarted,
            parents: Vec::new(),
            graph: MAIN_GRAPH_ID.to_string(),
            percentage_of_parent: DEFAULT_WEIGHT,
            completed_at: None,
            scheduled_start: None,
            scheduled_end: None,
            color: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Set the visual archetype
    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = node_type.into();
        self
    }

    /// Set the completion status
    pub fn with_status(mut self, status: GoalStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the parent edge list
    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }

    /// Set the container this node is drawn inside
    pub fn with_graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = graph.into();
        self
    }

    /// Set the aggregation weight
    pub fn with_weight(mut self, percentage_of_parent: f64) -> Self {
        self.percentage_of_parent = percentage_of_parent;
        self
    }

    /// Set the scheduling window start
    pub fn with_scheduled_start(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_start = Some(at);
        self
    }

    /// Validate node-level invariants
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the id is empty or the aggregation weight
    /// is negative or non-finite. Structural invariants (dangling parents,
    /// cycles) are the document's concern, not the node's.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id".to_string()));
        }
        if !self.percentage_of_parent.is_finite() || self.percentage_of_parent < 0.0 {
            return Err(ValidationError::InvalidWeight(self.percentage_of_parent));
        }
        Ok(())
    }

    /// Whether this node belongs to the given container's sub-view
    pub fn is_in_container(&self, container_id: &str) -> bool {
        self.graph == container_id
    }
}
