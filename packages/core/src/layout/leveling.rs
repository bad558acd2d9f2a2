//! Column Assignment via Longest-Path Leveling
//!
//! Assigns every node of the active view to a column so that each node sits
//! strictly left of every goal it contributes toward. Assignment runs in two
//! phases:
//!
//! 1. **Right-to-left relaxation**: a node with no in-view parents sits at
//!    distance 0; otherwise at `1 + max(parent distance)`. Relaxation repeats
//!    until a fixpoint, bounded by `node count + 5` passes.
//! 2. **Inversion**: distances are flipped against the maximum so terminal
//!    goals (and orphan nodes, which relax to distance 0) land in the
//!    rightmost column.
//!
//! On a cyclic `parents` relation the relaxation never stabilizes; hitting
//! the pass cap is reported as [`GraphError::LevelingDiverged`] rather than
//! silently producing a half-relaxed layout.

use crate::models::{GraphError, HierarchyNode};
use std::collections::{BTreeMap, HashMap};

/// Extra relaxation passes allowed beyond one per node.
const RELAXATION_SLACK: usize = 5;

/// The column structure of one laid-out view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelAssignment {
    /// Column index → sorted member ids, ascending left to right
    pub levels: BTreeMap<u32, Vec<String>>,

    /// Reverse lookup from node id to its column
    pub node_to_level: HashMap<String, u32>,
}

impl LevelAssignment {
    pub fn level_of(&self, id: &str) -> Option<u32> {
        self.node_to_level.get(id).copied()
    }

    /// Number of occupied columns
    pub fn column_count(&self) -> usize {
        self.levels.len()
    }

    /// Number of columns still holding at least one incomplete node
    pub fn active_column_count(&self, nodes: &HashMap<String, &HierarchyNode>) -> usize {
        self.levels
            .values()
            .filter(|members| {
                members
                    .iter()
                    .any(|id| nodes.get(id).is_some_and(|n| !n.status.is_completed()))
            })
            .count()
    }

    /// The column with the most members; ties resolve to the leftmost column
    pub fn find_densest_column(&self) -> Option<u32> {
        self.levels
            .iter()
            .max_by(|(level_a, members_a), (level_b, members_b)| {
                members_a
                    .len()
                    .cmp(&members_b.len())
                    // BTreeMap iterates ascending, so prefer the earlier
                    // (lower) level on equal density.
                    .then(level_b.cmp(level_a))
            })
            .map(|(level, _)| *level)
    }
}

/// Assign every node of the view to a column.
///
/// Only parents present in `nodes` participate; edges leaving the active view
/// are ignored. Iteration is over sorted ids so the result is deterministic
/// regardless of map ordering.
///
/// # Errors
///
/// Returns [`GraphError::LevelingDiverged`] when relaxation fails to
/// stabilize within `nodes.len() + 5` passes, which only happens on a cyclic
/// `parents` relation.
pub fn assign_levels(
    nodes: &HashMap<String, &HierarchyNode>,
) -> Result<LevelAssignment, GraphError> {
    if nodes.is_empty() {
        return Ok(LevelAssignment::default());
    }

    let mut ids: Vec<&str> = nodes.keys().map(String::as_str).collect();
    ids.sort_unstable();

    let mut distance: HashMap<&str, u32> = ids.iter().map(|id| (*id, 0)).collect();
    let cap = nodes.len() + RELAXATION_SLACK;
    let mut passes = 0;
    loop {
        let mut changed = false;
        for id in &ids {
            let desired = nodes[*id]
                .parents
                .iter()
                .filter_map(|parent| distance.get(parent.as_str()))
                .max()
                .map_or(0, |farthest| farthest + 1);
            if distance[*id] != desired {
                distance.insert(*id, desired);
                changed = true;
            }
        }
        if !changed {
            break;
        }
        passes += 1;
        if passes >= cap {
            return Err(GraphError::LevelingDiverged { iterations: passes });
        }
    }

    let max_distance = distance.values().copied().max().unwrap_or(0);

    let mut assignment = LevelAssignment::default();
    for id in &ids {
        let level = max_distance - distance[*id];
        assignment.levels.entry(level).or_default().push((*id).to_string());
        assignment.node_to_level.insert((*id).to_string(), level);
    }
    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HierarchyNode;

    fn view(nodes: &[HierarchyNode]) -> HashMap<String, &HierarchyNode> {
        nodes.iter().map(|n| (n.id.clone(), n)).collect()
    }

    #[test]
    fn test_single_chain_parent_sits_right_of_child() {
        let nodes = [
            HierarchyNode::new("goal", "Goal"),
            HierarchyNode::new("mid", "Mid").with_parents(["goal"]),
            HierarchyNode::new("leaf", "Leaf").with_parents(["mid"]),
        ];

        let assignment = assign_levels(&view(&nodes)).unwrap();
        assert!(assignment.level_of("leaf") < assignment.level_of("mid"));
        assert!(assignment.level_of("mid") < assignment.level_of("goal"));
        assert_eq!(assignment.column_count(), 3);
    }

    #[test]
    fn test_diamond_uses_longest_path() {
        // d contributes to both b (one hop from a) and a directly; the
        // longest chain decides its column.
        let nodes = [
            HierarchyNode::new("a", "A"),
            HierarchyNode::new("b", "B").with_parents(["a"]),
            HierarchyNode::new("c", "C").with_parents(["a"]),
            HierarchyNode::new("d", "D").with_parents(["b", "a"]),
        ];

        let assignment = assign_levels(&view(&nodes)).unwrap();
        assert_eq!(assignment.level_of("a"), Some(2));
        assert_eq!(assignment.level_of("b"), Some(1));
        assert_eq!(assignment.level_of("c"), Some(1));
        assert_eq!(assignment.level_of("d"), Some(0));
    }

    #[test]
    fn test_orphan_lands_rightmost() {
        let nodes = [
            HierarchyNode::new("goal", "Goal"),
            HierarchyNode::new("leaf", "Leaf").with_parents(["goal"]),
            HierarchyNode::new("orphan", "Orphan"),
        ];

        let assignment = assign_levels(&view(&nodes)).unwrap();
        let rightmost = *assignment.levels.keys().max().unwrap();
        assert_eq!(assignment.level_of("orphan"), Some(rightmost));
        assert_eq!(assignment.level_of("goal"), Some(rightmost));
    }

    #[test]
    fn test_out_of_view_parents_are_ignored() {
        let nodes = [
            HierarchyNode::new("a", "A").with_parents(["elsewhere"]),
            HierarchyNode::new("b", "B").with_parents(["a"]),
        ];

        let assignment = assign_levels(&view(&nodes)).unwrap();
        assert_eq!(assignment.level_of("a"), Some(1));
        assert_eq!(assignment.level_of("b"), Some(0));
    }

    #[test]
    fn test_members_within_a_column_are_sorted() {
        let nodes = [
            HierarchyNode::new("goal", "Goal"),
            HierarchyNode::new("z", "Z").with_parents(["goal"]),
            HierarchyNode::new("a", "A").with_parents(["goal"]),
            HierarchyNode::new("m", "M").with_parents(["goal"]),
        ];

        let assignment = assign_levels(&view(&nodes)).unwrap();
        assert_eq!(assignment.levels[&0], vec!["a", "m", "z"]);
    }

    #[test]
    fn test_cycle_diverges_with_typed_error() {
        let nodes = [
            HierarchyNode::new("x", "X").with_parents(["y"]),
            HierarchyNode::new("y", "Y").with_parents(["x"]),
        ];

        assert!(matches!(
            assign_levels(&view(&nodes)),
            Err(GraphError::LevelingDiverged { .. })
        ));
    }

    #[test]
    fn test_active_column_count_skips_fully_completed_columns() {
        use crate::models::GoalStatus;

        let nodes = [
            HierarchyNode::new("goal", "Goal"),
            HierarchyNode::new("done-a", "Done A")
                .with_parents(["goal"])
                .with_status(GoalStatus::Completed),
            HierarchyNode::new("done-b", "Done B")
                .with_parents(["goal"])
                .with_status(GoalStatus::Completed),
        ];

        let nodes = view(&nodes);
        let assignment = assign_levels(&nodes).unwrap();
        assert_eq!(assignment.column_count(), 2);
        assert_eq!(assignment.active_column_count(&nodes), 1);
    }

    #[test]
    fn test_densest_column_ties_resolve_leftmost() {
        let nodes = [
            HierarchyNode::new("goal", "Goal"),
            HierarchyNode::new("other", "Other"),
            HierarchyNode::new("a", "A").with_parents(["goal"]),
            HierarchyNode::new("b", "B").with_parents(["other"]),
        ];

        let assignment = assign_levels(&view(&nodes)).unwrap();
        // Two columns of two members each; the leftmost wins the tie.
        assert_eq!(assignment.find_densest_column(), Some(0));
    }

    #[test]
    fn test_empty_view() {
        let assignment = assign_levels(&HashMap::new()).unwrap();
        assert_eq!(assignment.column_count(), 0);
        assert_eq!(assignment.find_densest_column(), None);
    }
}
