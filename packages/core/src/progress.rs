//! Weighted Progress Rollup and the Completion Ledger
//!
//! Progress is anchored to *end nodes*: the nodes no other node contributes
//! toward. Their weights are normalized against their sum (the final goal
//! value) so end nodes collectively represent 100%. Every other node's
//! absolute percentage is rolled up from the nodes contributing to it.
//!
//! Evaluation walks [`GraphDocument::aggregation_order`], end nodes first and
//! each node only after all of its contributors, so the rollup is a single
//! iterative pass with no recursion and each node is evaluated exactly once.
//!
//! The ledger ([`compute_history`]) buckets completed nodes by their UTC
//! completion day, then walks every calendar day from the earliest completion
//! through today, carrying a cumulative completed set. Days with no
//! completions still get an entry with a zero gain, so the ledger has no
//! holes.

use crate::models::{DayProgress, GraphDocument, GraphError};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

/// Each node's share of the overall goal, in percent.
///
/// Returns an empty map (with a warning) when the document has no end nodes
/// or their combined weight is zero, since there is nothing to anchor the
/// normalization to.
///
/// # Errors
///
/// Returns [`GraphError::CycleDetected`] if the `parents` relation is cyclic.
pub fn absolute_percentages(doc: &GraphDocument) -> Result<HashMap<String, f64>, GraphError> {
    let order = doc.aggregation_order()?;

    let end_nodes: HashSet<String> = doc.end_node_ids().into_iter().collect();
    if end_nodes.is_empty() {
        if !doc.is_empty() {
            warn!("no end nodes found, cannot anchor absolute percentages");
        }
        return Ok(HashMap::new());
    }

    let final_goal_value: f64 = end_nodes
        .iter()
        .filter_map(|id| doc.get(id))
        .map(|n| n.percentage_of_parent)
        .sum();
    if final_goal_value <= 0.0 {
        warn!(
            final_goal_value,
            "end node weights sum to nothing, cannot anchor absolute percentages"
        );
        return Ok(HashMap::new());
    }

    let dependents = doc.dependents_index();
    let mut absolute: HashMap<String, f64> = HashMap::with_capacity(order.len());

    // Dependents-first order guarantees every contributor is already
    // evaluated when its goal comes up.
    for id in order {
        let Some(node) = doc.get(&id) else {
            continue;
        };
        let value = if end_nodes.contains(&id) {
            node.percentage_of_parent / final_goal_value * 100.0
        } else {
            let contributed: f64 = dependents
                .get(&id)
                .into_iter()
                .flatten()
                .filter_map(|dep| absolute.get(dep))
                .sum();
            contributed * node.percentage_of_parent / 100.0
        };
        absolute.insert(id, value);
    }

    Ok(absolute)
}

/// Rebuild the day-by-day completion ledger from completion stamps.
///
/// Only nodes that are `completed` *and* carry a `completed_at` stamp count.
/// The walk runs from the earliest completion day through `today` inclusive;
/// a document with no stamped completions yields an empty ledger.
///
/// # Errors
///
/// Returns [`GraphError::CycleDetected`] if the `parents` relation is cyclic.
pub fn compute_history(
    doc: &GraphDocument,
    today: NaiveDate,
) -> Result<BTreeMap<NaiveDate, DayProgress>, GraphError> {
    let absolute = absolute_percentages(doc)?;

    let mut completed_by_day: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
    for node in doc.nodes.values() {
        if !node.status.is_completed() {
            continue;
        }
        if let Some(at) = node.completed_at {
            completed_by_day
                .entry(at.date_naive())
                .or_default()
                .push(node.id.clone());
        }
    }

    let mut history = BTreeMap::new();
    let Some(first_day) = completed_by_day.keys().next().copied() else {
        return Ok(history);
    };

    let mut cumulative: HashSet<String> = HashSet::new();
    let mut last_total = 0.0;
    let mut day = first_day;
    while day <= today {
        let mut completed_today = completed_by_day.remove(&day).unwrap_or_default();
        completed_today.sort_unstable();
        cumulative.extend(completed_today.iter().cloned());

        let total: f64 = cumulative.iter().filter_map(|id| absolute.get(id)).sum();
        history.insert(
            day,
            DayProgress {
                completed_nodes: completed_today,
                total_percentage_complete: total,
                daily_gain: total - last_total,
            },
        );

        last_total = total;
        let Some(next) = day.succ_opt() else {
            break;
        };
        day = next;
    }

    Ok(history)
}
