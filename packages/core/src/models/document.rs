//! Graph Document - Arena of Nodes with Derived Views
//!
//! The document owns every node exactly once in a flat id→node arena. Roots
//! and per-container children are *views* reconstructed on demand from each
//! node's `graph` field, so there is no stored tree that could drift from the
//! arena.
//!
//! # Structural queries
//!
//! - [`GraphDocument::root_ids`] / [`GraphDocument::children_ids`]: container views
//! - [`GraphDocument::subgraph`]: the active container's member map
//! - [`GraphDocument::dependents_index`]: inverse of the `parents` relation
//! - [`GraphDocument::aggregation_order`]: dependents-first topological order
//!   with cycle detection
//! - [`GraphDocument::cascade_targets`]: forward BFS used by completion and
//!   deletion cascades

use crate::models::node::{GoalStatus, HierarchyNode, Viewport, MAIN_GRAPH_ID};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Structural errors of the parents relation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The `parents` relation contains a cycle; the offending node ids are
    /// the ones left unordered by the topological sort.
    #[error("Cycle detected in parents relation involving nodes: {nodes:?}")]
    CycleDetected { nodes: Vec<String> },

    /// Level relaxation hit its iteration cap without converging, which only
    /// happens when the relation is cyclic.
    #[error("Leveling failed to converge after {iterations} iterations (cycle suspected)")]
    LevelingDiverged { iterations: usize },
}

/// One day's entry in the completion ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayProgress {
    /// Ids completed on this day (sorted for determinism)
    #[serde(default)]
    pub completed_nodes: Vec<String>,

    /// Cumulative weighted completion at end of day, 0..=100
    #[serde(default)]
    pub total_percentage_complete: f64,

    /// Delta from the previous ledger day
    #[serde(default)]
    pub daily_gain: f64,
}

/// A nested view over the arena, reconstructed on demand
#[derive(Debug)]
pub struct NodeView<'a> {
    pub node: &'a HierarchyNode,
    pub children: Vec<NodeView<'a>>,
}

/// The goal graph document: node arena plus canvas/ledger/passthrough state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphDocument {
    /// The single owning store; every tree structure is a view over this map
    pub nodes: HashMap<String, HierarchyNode>,

    /// Pan/zoom state, if the document carries one
    pub viewport: Option<Viewport>,

    /// Day-by-day completion ledger, keyed by UTC day
    pub historical_progress: BTreeMap<NaiveDate, DayProgress>,

    /// Top-level passthrough fields preserved across round-trips
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl GraphDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&HierarchyNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut HierarchyNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Insert a node into the arena, replacing any previous node with that id
    pub fn insert(&mut self, node: HierarchyNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Whether a node is a root: its container is `"main"` or references a
    /// node that does not exist.
    pub fn is_root(&self, node: &HierarchyNode) -> bool {
        node.graph == MAIN_GRAPH_ID || !self.nodes.contains_key(&node.graph)
    }

    /// Ids of the top-level nodes, sorted for determinism
    pub fn root_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .nodes
            .values()
            .filter(|n| self.is_root(n))
            .map(|n| n.id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of the direct members of a container's sub-view, sorted
    pub fn children_ids(&self, container_id: &str) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .nodes
            .values()
            .filter(|n| n.graph == container_id && n.id != container_id)
            .map(|n| n.id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// The active container's member map: roots for `"main"`, otherwise the
    /// direct children of an existing container (empty if it doesn't exist).
    pub fn subgraph(&self, active_graph_id: &str) -> HashMap<String, &HierarchyNode> {
        let ids = if active_graph_id == MAIN_GRAPH_ID {
            self.root_ids()
        } else if self.nodes.contains_key(active_graph_id) {
            self.children_ids(active_graph_id)
        } else {
            Vec::new()
        };
        ids.into_iter()
            .filter_map(|id| self.nodes.get(id).map(|n| (id.to_string(), n)))
            .collect()
    }

    /// Reconstruct the nested roots view over the arena.
    ///
    /// A visited guard keeps the walk bounded even if `graph` fields form a
    /// loop (malformed input; tolerated, not crashed on).
    pub fn tree(&self) -> Vec<NodeView<'_>> {
        let mut visited = HashSet::new();
        self.root_ids()
            .into_iter()
            .filter_map(|id| self.subtree(id, &mut visited))
            .collect()
    }

    fn subtree<'a>(&'a self, id: &str, visited: &mut HashSet<String>) -> Option<NodeView<'a>> {
        if !visited.insert(id.to_string()) {
            return None;
        }
        let node = self.nodes.get(id)?;
        let children = self
            .children_ids(id)
            .into_iter()
            .filter_map(|child| self.subtree(child, visited))
            .collect();
        Some(NodeView { node, children })
    }

    /// Inverse of the `parents` relation: for each id, the sorted ids of the
    /// nodes that list it as a parent (its forward dependents).
    ///
    /// Dangling parent entries produce index keys with no backing node; the
    /// traversal helpers simply never reach them.
    pub fn dependents_index(&self) -> HashMap<String, Vec<String>> {
        let mut index: HashMap<String, Vec<String>> = HashMap::new();
        for node in self.nodes.values() {
            for parent in &node.parents {
                index.entry(parent.clone()).or_default().push(node.id.clone());
            }
        }
        for dependents in index.values_mut() {
            dependents.sort_unstable();
        }
        index
    }

    /// Ids of end nodes: nodes no in-graph node lists as a parent. These are
    /// the terminal contributors the weighted rollup is anchored to.
    pub fn end_node_ids(&self) -> Vec<String> {
        let index = self.dependents_index();
        let mut ids: Vec<String> = self
            .nodes
            .keys()
            .filter(|id| index.get(*id).map_or(true, |deps| deps.is_empty()))
            .cloned()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Dependents-first topological order of the arena.
    ///
    /// End nodes come first; a node appears only after every node that lists
    /// it as a parent. This is exactly the evaluation order the weighted
    /// rollup needs, and doubles as the document's cycle check.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CycleDetected`] naming the unordered nodes when
    /// the `parents` relation is cyclic.
    pub fn aggregation_order(&self) -> Result<Vec<String>, GraphError> {
        // indegree of n = number of in-graph nodes listing n as a parent
        let mut indegree: HashMap<&str, usize> = self.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        for node in self.nodes.values() {
            for parent in &node.parents {
                if let Some(count) = indegree.get_mut(parent.as_str()) {
                    *count += 1;
                }
            }
        }

        let mut queue: Vec<&str> = indegree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        queue.sort_unstable();
        let mut queue: VecDeque<&str> = queue.into();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            if let Some(node) = self.nodes.get(id) {
                for parent in &node.parents {
                    if let Some(count) = indegree.get_mut(parent.as_str()) {
                        *count -= 1;
                        if *count == 0 {
                            queue.push_back(parent.as_str());
                        }
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
            let mut nodes: Vec<String> = self
                .nodes
                .keys()
                .filter(|id| !ordered.contains(id.as_str()))
                .cloned()
                .collect();
            nodes.sort_unstable();
            return Err(GraphError::CycleDetected { nodes });
        }
        Ok(order)
    }

    /// Forward BFS over the dependents relation starting at `start`,
    /// returning the sorted set of reached ids (including `start`).
    ///
    /// With `stop_at_completed`, nodes already `completed` are neither
    /// included nor traversed past, since a completed node is assumed to have
    /// already cascaded. Deletion cascades traverse everything.
    pub fn cascade_targets(&self, start: &str, stop_at_completed: bool) -> Vec<String> {
        let index = self.dependents_index();
        let mut reached = HashSet::new();
        let mut queue = VecDeque::from([start.to_string()]);

        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if reached.contains(&id) {
                continue;
            }
            if stop_at_completed && node.status == GoalStatus::Completed {
                continue;
            }
            reached.insert(id.clone());
            if let Some(dependents) = index.get(&id) {
                queue.extend(dependents.iter().cloned());
            }
        }

        let mut targets: Vec<String> = reached.into_iter().collect();
        targets.sort_unstable();
        targets
    }

    /// Ids of all completed nodes, for layout's active-column accounting
    pub fn completed_ids(&self) -> HashSet<String> {
        self.nodes
            .values()
            .filter(|n| n.status.is_completed())
            .map(|n| n.id.clone())
            .collect()
    }
}
