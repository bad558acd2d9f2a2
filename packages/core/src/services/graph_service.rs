//! Graph Service - Mutations, Layout and Sync Application
//!
//! The service owns the in-memory [`GraphDocument`] behind an async
//! `RwLock` and is the single writer for every mutation: status changes
//! (with completion cascades), deletions, edge additions, viewport moves,
//! schedule rollover and ledger refreshes.
//!
//! # Mutation protocol
//!
//! Every mutation follows the same shape:
//!
//! 1. validate against the current document (unknown ids fail fast)
//! 2. apply to a cloned document and swap it in under the write lock, so
//!    readers never observe a half-applied change and the local view updates
//!    before any network round-trip
//! 3. recompute layout
//! 4. persist the serialized document while still holding the write lock;
//!    the store-assigned version becomes the service's echo watermark and the
//!    tracked operation moves from `Pending` to `Committed` (or `Failed`).
//!    Because the lock spans the save, an echo of the write cannot be version
//!    checked before the watermark covers it.
//!
//! # Echo suppression
//!
//! Store change feeds echo this process's own writes back. [`apply_update`]
//! drops any `Remote` update whose version is at or below the watermark of
//! the service's last own write; collaborator `Patch` updates are always
//! applied. No timers are involved.
//!
//! [`apply_update`]: GraphService::apply_update

use crate::db::{DocumentUpdate, GraphStore, UpdateSource};
use crate::layout::{
    assign_levels, compute_slices, ColumnStackSolver, NodeMeasurements, Position, PositionSolver,
    SolveRequest, DEFAULT_NODE_WIDTH, GAP_DISTANCE, VERTICAL_NODE_SPACING,
};
use crate::models::{
    wire, DayWindow, GoalStatus, GraphDocument, HierarchyNode, NodeView, SystemTimeProvider,
    TimeProvider, Viewport, MAIN_GRAPH_ID,
};
use crate::progress;
use crate::services::error::GraphServiceError;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle of one tracked mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// Applied locally, persistence still in flight
    Pending,
    /// Persisted; the returned version is the echo watermark
    Committed,
    /// Local state holds the change but the store write failed
    Failed,
}

/// Result of a successfully persisted mutation
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub operation_id: Uuid,
    /// Store version the mutation was persisted at
    pub version: u64,
    /// Sorted ids the mutation touched
    pub affected_nodes: Vec<String>,
}

/// Child info embedded in a rendered node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildSummary {
    pub id: String,
    pub label: String,
    pub status: GoalStatus,
    pub color: Option<String>,
}

/// One node of the active view, resolved for rendering
#[derive(Debug, Clone, Serialize)]
pub struct RenderNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    pub status: GoalStatus,
    pub color: Option<String>,
    pub position: Position,
    pub parents: Vec<String>,
    pub graph: String,
    pub children: Vec<ChildSummary>,
}

/// One contribution edge of the active view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

#[derive(Debug)]
struct GraphState {
    doc: GraphDocument,
    active_graph_id: String,
    positions: HashMap<String, Position>,
    layout_ready: bool,
    filter_to_day: bool,
    day_window: Option<DayWindow>,
    measurements: NodeMeasurements,
    /// Version of this service's most recent own write
    last_written_version: u64,
    operations: HashMap<Uuid, MutationState>,
}

impl Default for GraphState {
    fn default() -> Self {
        Self {
            doc: GraphDocument::new(),
            active_graph_id: MAIN_GRAPH_ID.to_string(),
            positions: HashMap::new(),
            layout_ready: false,
            filter_to_day: true,
            day_window: None,
            measurements: NodeMeasurements::new(),
            last_written_version: 0,
            operations: HashMap::new(),
        }
    }
}

/// The goal graph engine: document state, mutations, layout and sync
pub struct GraphService {
    store: Arc<dyn GraphStore>,
    time: Arc<dyn TimeProvider>,
    solver: Arc<dyn PositionSolver>,
    state: RwLock<GraphState>,
}

impl GraphService {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            time: Arc::new(SystemTimeProvider),
            solver: Arc::new(ColumnStackSolver),
            state: RwLock::new(GraphState::default()),
        }
    }

    /// Swap in a different clock (tests pin time with this)
    pub fn with_time_provider(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.time = time;
        self
    }

    /// Swap in a different placement strategy
    pub fn with_solver(mut self, solver: Arc<dyn PositionSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Load the document from the store, refresh the ledger and lay out the
    /// active view. A store with no document yields an empty graph.
    ///
    /// # Errors
    ///
    /// Fails on store errors or a structurally cyclic document.
    pub async fn fetch_document(&self) -> Result<(), GraphServiceError> {
        let raw = self.store.fetch_document().await?;
        let doc = match raw {
            Some(value) => wire::normalize(&value)?,
            None => GraphDocument::new(),
        };
        info!(nodes = doc.len(), "graph document fetched");

        {
            let mut state = self.state.write().await;
            state.doc = doc;
            state.layout_ready = false;
        }
        self.record_historical_progress().await?;
        self.calculate_auto_layout().await
    }

    /// Snapshot of the current document
    pub async fn document(&self) -> GraphDocument {
        self.state.read().await.doc.clone()
    }

    pub async fn active_graph_id(&self) -> String {
        self.state.read().await.active_graph_id.clone()
    }

    /// Switch the active container view and re-lay it out
    pub async fn set_active_graph_id(
        &self,
        graph_id: impl Into<String>,
    ) -> Result<(), GraphServiceError> {
        {
            let mut state = self.state.write().await;
            state.active_graph_id = graph_id.into();
            state.layout_ready = false;
        }
        self.calculate_auto_layout().await
    }

    /// Flip day filtering and return the new setting
    pub async fn toggle_day_filter(&self) -> Result<bool, GraphServiceError> {
        let enabled = {
            let mut state = self.state.write().await;
            state.filter_to_day = !state.filter_to_day;
            state.layout_ready = false;
            state.filter_to_day
        };
        self.calculate_auto_layout().await?;
        Ok(enabled)
    }

    /// Set (or clear) the day window the filter applies
    pub async fn set_day_window(
        &self,
        window: Option<DayWindow>,
    ) -> Result<(), GraphServiceError> {
        {
            let mut state = self.state.write().await;
            state.day_window = window;
            state.layout_ready = false;
        }
        self.calculate_auto_layout().await
    }

    /// Fold in a renderer-reported node size and re-lay out
    pub async fn handle_node_measure(
        &self,
        node_id: &str,
        width: f64,
        height: f64,
    ) -> Result<(), GraphServiceError> {
        {
            let mut state = self.state.write().await;
            state.measurements.record(node_id, width, height);
            state.layout_ready = false;
        }
        self.calculate_auto_layout().await
    }

    pub async fn layout_ready(&self) -> bool {
        self.state.read().await.layout_ready
    }

    pub async fn positions(&self) -> HashMap<String, Position> {
        self.state.read().await.positions.clone()
    }

    pub async fn viewport(&self) -> Option<Viewport> {
        self.state.read().await.doc.viewport.clone()
    }

    /// Lifecycle state of a tracked mutation, if known
    pub async fn operation_state(&self, operation_id: Uuid) -> Option<MutationState> {
        self.state.read().await.operations.get(&operation_id).copied()
    }

    /// Set a node's status.
    ///
    /// Completing a node cascades: every transitive contributor that is not
    /// already completed flips to `completed` with one shared timestamp.
    /// Any other target status applies to the named node alone and clears
    /// its completion stamp. The ledger is rebuilt afterwards.
    ///
    /// # Errors
    ///
    /// Fails with `NodeNotFound` for unknown ids, and with a persistence
    /// error (local state keeps the change, tracked as `Failed`) when the
    /// store write fails.
    pub async fn set_node_status(
        &self,
        node_id: &str,
        status: GoalStatus,
    ) -> Result<MutationOutcome, GraphServiceError> {
        let operation_id = Uuid::new_v4();
        let affected = {
            let mut state = self.state.write().await;
            if !state.doc.contains(node_id) {
                return Err(GraphServiceError::node_not_found(node_id));
            }
            state.operations.insert(operation_id, MutationState::Pending);

            let mut doc = state.doc.clone();
            let affected = if status == GoalStatus::Completed {
                let targets = doc.cascade_targets(node_id, true);
                let completed_at = self.time.now();
                for id in &targets {
                    if let Some(node) = doc.get_mut(id) {
                        node.status = GoalStatus::Completed;
                        node.completed_at = Some(completed_at);
                    }
                }
                targets
            } else {
                if let Some(node) = doc.get_mut(node_id) {
                    node.status = status;
                    node.completed_at = None;
                }
                vec![node_id.to_string()]
            };

            let today = self.time.now().date_naive();
            match progress::compute_history(&doc, today) {
                Ok(history) => doc.historical_progress = history,
                Err(err) => {
                    state.operations.insert(operation_id, MutationState::Failed);
                    return Err(err.into());
                }
            }

            state.doc = doc;
            state.layout_ready = false;
            affected
        };

        self.calculate_auto_layout().await?;
        self.persist(operation_id, affected).await
    }

    /// Delete a node and every transitive contributor to it, stripping the
    /// removed ids from surviving `parents` lists.
    pub async fn delete_node(
        &self,
        node_id: &str,
    ) -> Result<MutationOutcome, GraphServiceError> {
        let operation_id = Uuid::new_v4();
        let removed = {
            let mut state = self.state.write().await;
            if !state.doc.contains(node_id) {
                return Err(GraphServiceError::node_not_found(node_id));
            }
            state.operations.insert(operation_id, MutationState::Pending);

            let mut doc = state.doc.clone();
            // Deletion cascades through completed nodes too.
            let targets = doc.cascade_targets(node_id, false);
            let removed_set: HashSet<&String> = targets.iter().collect();
            doc.nodes.retain(|id, _| !removed_set.contains(id));
            for node in doc.nodes.values_mut() {
                node.parents.retain(|parent| !removed_set.contains(parent));
            }

            state.doc = doc;
            state.layout_ready = false;
            targets
        };

        self.calculate_auto_layout().await?;
        self.persist(operation_id, removed).await
    }

    /// Make `target` list `source` as a contributor. Adding an edge that
    /// already exists is a committed no-op; adding one that would close a
    /// cycle is rejected.
    pub async fn add_relationship(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> Result<MutationOutcome, GraphServiceError> {
        let operation_id = Uuid::new_v4();
        let changed = {
            let mut state = self.state.write().await;
            if !state.doc.contains(target_id) {
                return Err(GraphServiceError::node_not_found(target_id));
            }

            let already_linked = state
                .doc
                .get(target_id)
                .is_some_and(|n| n.parents.iter().any(|p| p == source_id));
            if already_linked {
                state.operations.insert(operation_id, MutationState::Committed);
                let version = state.last_written_version;
                return Ok(MutationOutcome {
                    operation_id,
                    version,
                    affected_nodes: Vec::new(),
                });
            }

            state.operations.insert(operation_id, MutationState::Pending);
            let mut doc = state.doc.clone();
            if let Some(node) = doc.get_mut(target_id) {
                node.parents.push(source_id.to_string());
            }
            if let Err(err) = doc.aggregation_order() {
                state.operations.insert(operation_id, MutationState::Failed);
                return Err(err.into());
            }

            state.doc = doc;
            state.layout_ready = false;
            vec![target_id.to_string()]
        };

        self.calculate_auto_layout().await?;
        self.persist(operation_id, changed).await
    }

    /// Persist a new pan/zoom state. Layout is untouched.
    pub async fn update_viewport(
        &self,
        x: f64,
        y: f64,
        zoom: f64,
    ) -> Result<MutationOutcome, GraphServiceError> {
        let operation_id = Uuid::new_v4();
        {
            let mut state = self.state.write().await;
            state.operations.insert(operation_id, MutationState::Pending);
            let mut doc = state.doc.clone();
            doc.viewport = Some(Viewport::new(x, y, zoom));
            state.doc = doc;
        }
        self.persist(operation_id, Vec::new()).await
    }

    /// Day rollover: yesterday's still-in-progress scheduled nodes reset to
    /// `not-started`, today's not-yet-started scheduled nodes move to
    /// `in-progress`. Returns `None` when nothing needed patching.
    pub async fn roll_over_schedule(
        &self,
    ) -> Result<Option<MutationOutcome>, GraphServiceError> {
        let operation_id = Uuid::new_v4();
        let today = self.time.now().date_naive();
        let Some(yesterday) = today.pred_opt() else {
            return Ok(None);
        };

        let patched = {
            let mut state = self.state.write().await;
            let mut patched = Vec::new();
            for node in state.doc.nodes.values_mut() {
                let Some(scheduled) = node.scheduled_start else {
                    continue;
                };
                let day = scheduled.date_naive();
                if day == yesterday && node.status == GoalStatus::InProgress {
                    node.status = GoalStatus::NotStarted;
                    patched.push(node.id.clone());
                } else if day == today && node.status == GoalStatus::NotStarted {
                    node.status = GoalStatus::InProgress;
                    patched.push(node.id.clone());
                }
            }
            if patched.is_empty() {
                return Ok(None);
            }
            patched.sort_unstable();
            state.operations.insert(operation_id, MutationState::Pending);
            patched
        };

        info!(count = patched.len(), "schedule rollover applied");
        self.persist(operation_id, patched).await.map(Some)
    }

    /// Rebuild the completion ledger and persist it if it differs from what
    /// the document already carries. Returns `None` when it was up to date.
    pub async fn record_historical_progress(
        &self,
    ) -> Result<Option<MutationOutcome>, GraphServiceError> {
        let operation_id = Uuid::new_v4();
        {
            let mut state = self.state.write().await;
            let today = self.time.now().date_naive();
            let history = progress::compute_history(&state.doc, today)?;
            if history == state.doc.historical_progress {
                return Ok(None);
            }
            state.operations.insert(operation_id, MutationState::Pending);
            state.doc.historical_progress = history;
        }

        debug!("completion ledger refreshed");
        self.persist(operation_id, Vec::new()).await.map(Some)
    }

    /// Recompute positions for the active, day-filtered view.
    ///
    /// # Errors
    ///
    /// Fails with a structure error when leveling diverges, which only
    /// happens on a cyclic `parents` relation.
    pub async fn calculate_auto_layout(&self) -> Result<(), GraphServiceError> {
        let mut state = self.state.write().await;

        let visible = visible_ids(&state.doc, state.filter_to_day, state.day_window.as_ref());
        let view: HashMap<String, &HierarchyNode> = state
            .doc
            .subgraph(&state.active_graph_id)
            .into_iter()
            .filter(|(id, _)| visible.as_ref().is_none_or(|kept| kept.contains(id)))
            .collect();

        if view.is_empty() {
            state.positions = HashMap::new();
            state.layout_ready = true;
            return Ok(());
        }

        let assignment = assign_levels(&view)?;
        let widths: HashMap<String, f64> = view
            .iter()
            .map(|(id, node)| (id.clone(), state.measurements.width_of(node)))
            .collect();
        let heights: HashMap<String, f64> = view
            .iter()
            .map(|(id, node)| (id.clone(), state.measurements.height_of(node)))
            .collect();

        let slices = compute_slices(&assignment, GAP_DISTANCE, |id| {
            widths.get(id).copied().unwrap_or(DEFAULT_NODE_WIDTH)
        });
        let positions = self.solver.solve(&SolveRequest {
            assignment: &assignment,
            slices: &slices,
            widths: &widths,
            heights: &heights,
            vertical_spacing: VERTICAL_NODE_SPACING,
        });

        state.positions = positions;
        state.layout_ready = true;
        Ok(())
    }

    /// The active view resolved for rendering: nodes with positions and
    /// child summaries, plus the contribution edges whose endpoints are both
    /// visible. Output is sorted by id for determinism.
    pub async fn graph_view(&self) -> (Vec<RenderNode>, Vec<RenderEdge>) {
        let state = self.state.read().await;

        let visible = visible_ids(&state.doc, state.filter_to_day, state.day_window.as_ref());
        let mut members: Vec<&HierarchyNode> = state
            .doc
            .subgraph(&state.active_graph_id)
            .into_iter()
            .filter(|(id, _)| visible.as_ref().is_none_or(|kept| kept.contains(id)))
            .map(|(_, node)| node)
            .collect();
        members.sort_unstable_by(|a, b| a.id.cmp(&b.id));

        let member_ids: HashSet<&str> = members.iter().map(|n| n.id.as_str()).collect();

        let nodes: Vec<RenderNode> = members
            .iter()
            .map(|node| RenderNode {
                id: node.id.clone(),
                node_type: node.node_type.clone(),
                label: node.label.clone(),
                status: node.status,
                color: node.color.clone(),
                position: state.positions.get(&node.id).copied().unwrap_or_default(),
                parents: node.parents.clone(),
                graph: node.graph.clone(),
                children: state
                    .doc
                    .children_ids(&node.id)
                    .into_iter()
                    .filter_map(|child_id| state.doc.get(child_id))
                    .map(|child| ChildSummary {
                        id: child.id.clone(),
                        label: child.label.clone(),
                        status: child.status,
                        color: child.color.clone(),
                    })
                    .collect(),
            })
            .collect();

        let member_ids = &member_ids;
        let edges: Vec<RenderEdge> = members
            .iter()
            .flat_map(|node| {
                let node: &HierarchyNode = node;
                node.parents
                    .iter()
                    .enumerate()
                    .filter(move |(_, parent)| member_ids.contains(parent.as_str()))
                    .map(move |(idx, parent)| RenderEdge {
                        id: format!("{}-{}-{}", node.id, parent, idx),
                        source: node.id.clone(),
                        target: parent.clone(),
                    })
            })
            .collect();

        (nodes, edges)
    }

    /// Apply an external document update.
    ///
    /// `Remote` updates at or below this service's own-write watermark are
    /// echoes of its own saves and are dropped; `Patch` updates from
    /// collaborators always apply. Malformed documents are logged and
    /// ignored. Returns whether the update was applied.
    pub async fn apply_update(
        &self,
        update: &DocumentUpdate,
    ) -> Result<bool, GraphServiceError> {
        if update.source == UpdateSource::Remote {
            let state = self.state.read().await;
            if update.version <= state.last_written_version {
                debug!(
                    version = update.version,
                    watermark = state.last_written_version,
                    "dropping echo of own write"
                );
                return Ok(false);
            }
        }

        let doc = match wire::normalize(&update.document) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(%err, version = update.version, "ignoring malformed document update");
                return Ok(false);
            }
        };

        {
            let mut state = self.state.write().await;
            state.doc = doc;
            state.layout_ready = false;
        }
        self.calculate_auto_layout().await?;
        Ok(true)
    }

    async fn persist(
        &self,
        operation_id: Uuid,
        affected_nodes: Vec<String>,
    ) -> Result<MutationOutcome, GraphServiceError> {
        // The write lock is held across the save so the watermark is recorded
        // before any echo of this write can pass the version check in
        // `apply_update`. Echoes block on the lock until then.
        let mut state = self.state.write().await;
        let serialized = wire::serialize(&state.doc);

        match self.store.save_document(serialized).await {
            Ok(version) => {
                state.last_written_version = state.last_written_version.max(version);
                state.operations.insert(operation_id, MutationState::Committed);
                Ok(MutationOutcome {
                    operation_id,
                    version,
                    affected_nodes,
                })
            }
            Err(err) => {
                state.operations.insert(operation_id, MutationState::Failed);
                error!(%operation_id, "failed to persist graph document: {err}");
                Err(GraphServiceError::Persistence(err))
            }
        }
    }
}

/// Ids surviving the day filter, or `None` when filtering is off.
///
/// A node survives if it is unscheduled or scheduled inside the window, or
/// if any node in its container subtree survives (so a scheduled leaf keeps
/// its enclosing containers visible).
fn visible_ids(
    doc: &GraphDocument,
    filter_to_day: bool,
    window: Option<&DayWindow>,
) -> Option<HashSet<String>> {
    let window = window?;
    if !filter_to_day {
        return None;
    }

    let mut kept = HashSet::new();
    for view in doc.tree() {
        collect_visible(&view, window, &mut kept);
    }
    Some(kept)
}

fn collect_visible(view: &NodeView<'_>, window: &DayWindow, kept: &mut HashSet<String>) -> bool {
    let mut any_child = false;
    for child in &view.children {
        any_child |= collect_visible(child, window, kept);
    }
    let self_visible = view
        .node
        .scheduled_start
        .map_or(true, |at| window.contains(at));
    if self_visible || any_child {
        kept.insert(view.node.id.clone());
        return true;
    }
    false
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "graph_service_test.rs"]
mod graph_service_test;
