//! Normalizer / Serializer - Wire Document Conversion
//!
//! Converts between the persisted wire shape and the in-memory
//! [`GraphDocument`] arena. Normalization is deliberately permissive: the
//! remote store has accumulated several legacy document shapes, and anything
//! unrecognized degrades to an empty graph instead of an error. The one
//! *typed* failure is a cyclic `parents` relation, which every downstream
//! computation assumes away and which is therefore rejected at the door.
//!
//! # Accepted wire shapes
//!
//! 1. `{ nodes: { id: { graph, parents, … } } }`: flat map, hierarchy
//!    encoded in each node's `graph` field
//! 2. `{ nodes: { id: { children: { … } } } }`: nested map, detected by any
//!    top-level value carrying a `children` key
//! 3. `{ hierarchy: [ … ] }` / `{ roots: [ … ] }` / `{ children: [ … ] }` /
//!    `{ nodes: [ … ] }`: nested arrays of `{ id, children: [ … ] }`
//! 4. anything else: empty graph
//!
//! Top-level keys other than the reserved ones are preserved as metadata and
//! reattached on serialization.

use crate::models::document::{DayProgress, GraphDocument, GraphError};
use crate::models::node::{GoalStatus, HierarchyNode, Viewport, DEFAULT_WEIGHT, MAIN_GRAPH_ID};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

/// Top-level keys that are structure, not passthrough metadata.
const RESERVED_KEYS: [&str; 8] = [
    "nodes",
    "hierarchy",
    "roots",
    "children",
    "viewport",
    "historical_progress",
    "metadata",
    "nodesById",
];

/// Node-level keys owned by [`HierarchyNode`]'s named fields.
const NODE_KEYS: [&str; 12] = [
    "id",
    "type",
    "label",
    "status",
    "parents",
    "graph",
    "children",
    "percentage_of_parent",
    "completed_at",
    "scheduled_start",
    "scheduled_end",
    "color",
];

/// Parse a wire document into a [`GraphDocument`].
///
/// # Errors
///
/// Returns [`GraphError::CycleDetected`] when the `parents` relation is
/// cyclic. Every *shape* problem is absorbed: unrecognized input yields an
/// empty document.
pub fn normalize(raw: &Value) -> Result<GraphDocument, GraphError> {
    let Some(obj) = raw.as_object() else {
        return Ok(GraphDocument::new());
    };

    let mut doc = GraphDocument::new();

    if let Some(items) = obj.get("hierarchy").and_then(Value::as_array) {
        ingest_array(&mut doc, items, None);
    } else if let Some(items) = obj.get("roots").and_then(Value::as_array) {
        ingest_array(&mut doc, items, None);
    } else if let Some(items) = obj.get("children").and_then(Value::as_array) {
        ingest_array(&mut doc, items, None);
    } else if let Some(items) = obj.get("nodes").and_then(Value::as_array) {
        ingest_array(&mut doc, items, None);
    } else if let Some(nodes) = obj.get("nodes").and_then(Value::as_object) {
        // Flat vs nested is auto-detected: a nested document has at least one
        // top-level value that already carries a `children` key.
        let is_hierarchical = nodes
            .values()
            .any(|v| v.as_object().is_some_and(|o| o.contains_key("children")));
        if is_hierarchical {
            ingest_map(&mut doc, nodes, None);
        } else {
            for (id, value) in nodes {
                insert_node(&mut doc, id, value, None);
            }
        }
    }

    // The arena is built; reject cyclic parents before anything downstream
    // (leveling, rollup) can trip over them.
    doc.aggregation_order()?;

    doc.viewport = obj.get("viewport").and_then(Value::as_object).map(|vp| {
        Viewport::new(
            vp.get("x").and_then(Value::as_f64).unwrap_or(0.0),
            vp.get("y").and_then(Value::as_f64).unwrap_or(0.0),
            vp.get("zoom").and_then(Value::as_f64).unwrap_or(1.0),
        )
    });

    if let Some(history) = obj.get("historical_progress").and_then(Value::as_object) {
        for (key, value) in history {
            if let Ok(day) = NaiveDate::parse_from_str(key, "%Y-%m-%d") {
                doc.historical_progress.insert(day, day_progress_from_wire(value));
            }
        }
    }

    if let Some(meta) = obj.get("metadata").and_then(Value::as_object) {
        for (key, value) in meta {
            if key != "nodesById" && key != "roots" {
                doc.metadata.insert(key.clone(), value.clone());
            }
        }
    }
    for (key, value) in obj {
        if !RESERVED_KEYS.contains(&key.as_str()) {
            doc.metadata.insert(key.clone(), value.clone());
        }
    }

    Ok(doc)
}

/// Flatten a document back into the wire shape: a flat `nodes` map with
/// `children` stripped and `parents`/`graph` preserved, plus `viewport`,
/// `historical_progress` and passthrough metadata at the top level.
pub fn serialize(doc: &GraphDocument) -> Value {
    let mut top = doc.metadata.clone();

    let mut nodes = Map::new();
    for node in doc.nodes.values() {
        nodes.insert(
            node.id.clone(),
            serde_json::to_value(node).unwrap_or_default(),
        );
    }
    top.insert("nodes".to_string(), Value::Object(nodes));

    if let Some(viewport) = &doc.viewport {
        top.insert(
            "viewport".to_string(),
            serde_json::to_value(viewport).unwrap_or_default(),
        );
    }
    if !doc.historical_progress.is_empty() {
        top.insert(
            "historical_progress".to_string(),
            serde_json::to_value(&doc.historical_progress).unwrap_or_default(),
        );
    }

    Value::Object(top)
}

fn ingest_array(doc: &mut GraphDocument, items: &[Value], parent: Option<&str>) {
    for item in items {
        let Some(id) = wire_id(item) else {
            continue;
        };
        insert_node(doc, &id, item, parent);
    }
}

fn ingest_map(doc: &mut GraphDocument, entries: &Map<String, Value>, parent: Option<&str>) {
    for (id, value) in entries {
        insert_node(doc, id, value, parent);
    }
}

/// Insert one wire node into the arena and recurse into its children.
/// Nested children without an explicit `graph` inherit their parent's id.
fn insert_node(doc: &mut GraphDocument, id: &str, value: &Value, parent: Option<&str>) {
    let mut node = node_from_wire(id, value);
    if let Some(parent_id) = parent {
        let explicit_graph = value
            .get("graph")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !explicit_graph {
            node.graph = parent_id.to_string();
        }
    }
    if node.validate().is_err() {
        return;
    }
    doc.insert(node);

    match value.get("children") {
        Some(Value::Object(children)) => ingest_map(doc, children, Some(id)),
        Some(Value::Array(children)) => ingest_array(doc, children, Some(id)),
        _ => {}
    }
}

fn node_from_wire(id: &str, raw: &Value) -> HierarchyNode {
    let empty = Map::new();
    let obj = raw.as_object().unwrap_or(&empty);

    let label = obj
        .get("label")
        .and_then(Value::as_str)
        .unwrap_or(id)
        .to_string();
    let mut node = HierarchyNode::new(id, label);

    if let Some(node_type) = obj.get("type").and_then(Value::as_str) {
        node.node_type = node_type.to_string();
    }
    if let Some(status) = obj.get("status").and_then(Value::as_str) {
        node.status = GoalStatus::parse(status);
    }
    node.parents = string_list(obj.get("parents"));
    node.graph = graph_id(obj.get("graph"));
    node.percentage_of_parent = obj
        .get("percentage_of_parent")
        .and_then(Value::as_f64)
        .filter(|w| w.is_finite() && *w >= 0.0)
        .unwrap_or(DEFAULT_WEIGHT);
    node.completed_at = parse_instant(obj.get("completed_at"));
    node.scheduled_start = parse_instant(obj.get("scheduled_start"));
    node.scheduled_end = parse_instant(obj.get("scheduled_end"));
    node.color = obj.get("color").and_then(Value::as_str).map(String::from);

    for (key, value) in obj {
        if !NODE_KEYS.contains(&key.as_str()) {
            node.extra.insert(key.clone(), value.clone());
        }
    }

    node
}

fn day_progress_from_wire(raw: &Value) -> DayProgress {
    let Some(obj) = raw.as_object() else {
        return DayProgress::default();
    };
    DayProgress {
        completed_nodes: string_list(obj.get("completed_nodes")),
        total_percentage_complete: obj
            .get("total_percentage_complete")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        daily_gain: obj.get("daily_gain").and_then(Value::as_f64).unwrap_or(0.0),
    }
}

/// A non-empty trimmed string, else `"main"`; legacy documents carry null,
/// numbers or whitespace here.
fn graph_id(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| MAIN_GRAPH_ID.to_string())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn wire_id(item: &Value) -> Option<String> {
    match item.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_instant(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_flat_map() {
        let raw = json!({
            "nodes": {
                "goal": { "label": "Goal", "type": "goalNode" },
                "sub": { "label": "Sub", "parents": ["goal"], "graph": "goal" }
            },
            "viewport": { "x": 10.0, "y": -4.0, "zoom": 0.5 }
        });

        let doc = normalize(&raw).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.root_ids(), vec!["goal"]);
        assert_eq!(doc.children_ids("goal"), vec!["sub"]);
        assert_eq!(doc.get("sub").unwrap().parents, vec!["goal".to_string()]);
        assert_eq!(doc.viewport, Some(Viewport::new(10.0, -4.0, 0.5)));
    }

    #[test]
    fn test_normalize_nested_map_auto_detected() {
        let raw = json!({
            "nodes": {
                "goal": {
                    "label": "Goal",
                    "children": {
                        "sub-a": { "label": "A", "parents": ["goal"] },
                        "sub-b": { "label": "B", "parents": ["goal"] }
                    }
                }
            }
        });

        let doc = normalize(&raw).unwrap();
        assert_eq!(doc.len(), 3);
        assert_eq!(doc.root_ids(), vec!["goal"]);
        // Children without an explicit graph inherit the parent container.
        assert_eq!(doc.children_ids("goal"), vec!["sub-a", "sub-b"]);
    }

    #[test]
    fn test_normalize_hierarchy_array() {
        let raw = json!({
            "hierarchy": [
                {
                    "id": "goal",
                    "label": "Goal",
                    "children": [
                        { "id": "sub", "label": "Sub", "parents": ["goal"] }
                    ]
                }
            ]
        });

        let doc = normalize(&raw).unwrap();
        assert_eq!(doc.root_ids(), vec!["goal"]);
        assert_eq!(doc.children_ids("goal"), vec!["sub"]);
    }

    #[test]
    fn test_normalize_roots_array() {
        let raw = json!({ "roots": [ { "id": "only", "label": "Only" } ] });
        let doc = normalize(&raw).unwrap();
        assert_eq!(doc.root_ids(), vec!["only"]);
    }

    #[test]
    fn test_normalize_unrecognized_input_yields_empty() {
        for raw in [
            json!(null),
            json!("not a document"),
            json!(42),
            json!({}),
            json!({ "nodes": "garbage" }),
        ] {
            let doc = normalize(&raw).unwrap();
            assert!(doc.is_empty(), "expected empty for {raw}");
        }
    }

    #[test]
    fn test_normalize_defaults_and_status_alias() {
        let raw = json!({
            "nodes": {
                "bare": {},
                "legacy": { "status": "complete" },
                "weird": { "status": "someday", "percentage_of_parent": -3.0 }
            }
        });

        let doc = normalize(&raw).unwrap();
        let bare = doc.get("bare").unwrap();
        assert_eq!(bare.label, "bare");
        assert_eq!(bare.node_type, "objectiveNode");
        assert_eq!(bare.percentage_of_parent, 100.0);

        assert_eq!(doc.get("legacy").unwrap().status, GoalStatus::Completed);
        let weird = doc.get("weird").unwrap();
        assert_eq!(weird.status, GoalStatus::NotStarted);
        // Negative weights are rejected back to the default.
        assert_eq!(weird.percentage_of_parent, 100.0);
    }

    #[test]
    fn test_normalize_rejects_cycles() {
        let raw = json!({
            "nodes": {
                "x": { "parents": ["y"] },
                "y": { "parents": ["x"] }
            }
        });

        assert!(matches!(
            normalize(&raw),
            Err(GraphError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_normalize_tolerates_dangling_parents() {
        let raw = json!({
            "nodes": {
                "a": { "parents": ["ghost"] }
            }
        });

        let doc = normalize(&raw).unwrap();
        assert_eq!(doc.get("a").unwrap().parents, vec!["ghost".to_string()]);
    }

    #[test]
    fn test_normalize_metadata_passthrough() {
        let raw = json!({
            "nodes": {},
            "metadata": { "theme": "dark", "nodesById": { "stale": true } },
            "owner": "someone"
        });

        let doc = normalize(&raw).unwrap();
        assert_eq!(doc.metadata.get("theme"), Some(&json!("dark")));
        assert_eq!(doc.metadata.get("owner"), Some(&json!("someone")));
        // Stale index keys never survive normalization.
        assert!(doc.metadata.get("nodesById").is_none());
    }

    #[test]
    fn test_normalize_historical_progress_lenient() {
        let raw = json!({
            "nodes": {},
            "historical_progress": {
                "2025-03-01": {
                    "completed_nodes": ["a"],
                    "total_percentage_complete": 60.0,
                    "daily_gain": 60.0
                },
                "not-a-date": { "daily_gain": 1.0 }
            }
        });

        let doc = normalize(&raw).unwrap();
        assert_eq!(doc.historical_progress.len(), 1);
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(
            doc.historical_progress[&day].completed_nodes,
            vec!["a".to_string()]
        );
    }

    #[test]
    fn test_round_trip_flat_origin() {
        let raw = json!({
            "nodes": {
                "goal": { "label": "Goal", "type": "goalNode", "status": "in-progress" },
                "sub": {
                    "label": "Sub",
                    "parents": ["goal"],
                    "graph": "goal",
                    "percentage_of_parent": 60.0,
                    "completed_at": "2025-03-01T12:00:00Z",
                    "custom_field": { "nested": true }
                }
            },
            "viewport": { "x": 1.0, "y": 2.0, "zoom": 1.5 },
            "owner": "me"
        });

        let once = normalize(&raw).unwrap();
        let twice = normalize(&serialize(&once)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_round_trip_nested_origin() {
        let raw = json!({
            "nodes": {
                "goal": {
                    "label": "Goal",
                    "children": {
                        "sub": { "label": "Sub", "parents": ["goal"], "status": "complete" }
                    }
                }
            }
        });

        let once = normalize(&raw).unwrap();
        let twice = normalize(&serialize(&once)).unwrap();
        assert_eq!(once, twice);
        // The legacy alias is canonicalized on the way through.
        assert_eq!(twice.get("sub").unwrap().status, GoalStatus::Completed);
    }

    #[test]
    fn test_serialize_strips_children_and_keeps_graph() {
        let raw = json!({
            "nodes": {
                "goal": { "children": { "sub": { "parents": ["goal"] } } }
            }
        });

        let wire = serialize(&normalize(&raw).unwrap());
        let nodes = wire["nodes"].as_object().unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes["goal"].get("children").is_none());
        assert_eq!(nodes["sub"]["graph"], "goal");
        assert_eq!(nodes["sub"]["parents"], json!(["goal"]));
    }

    #[test]
    fn test_clone_is_a_full_independent_copy() {
        let raw = json!({ "nodes": { "a": { "label": "A" } } });
        let doc = normalize(&raw).unwrap();

        let mut cloned = doc.clone();
        cloned.get_mut("a").unwrap().status = GoalStatus::Completed;

        assert_eq!(doc.get("a").unwrap().status, GoalStatus::NotStarted);
        assert_eq!(cloned.get("a").unwrap().status, GoalStatus::Completed);
    }
}
