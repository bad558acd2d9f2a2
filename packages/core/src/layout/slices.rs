//! Slice Geometry and Position Solving
//!
//! Turns a [`LevelAssignment`] into canvas coordinates. Each column becomes a
//! vertical *slice* whose width is its widest member; slice midpoints are
//! chained left to right with a fixed gap, anchored so the leftmost slice's
//! midpoint sits at x = 0. A [`PositionSolver`] then places individual nodes
//! inside their slice; [`ColumnStackSolver`] is the default vertical-stack
//! strategy, and the trait seam exists so alternative solvers can be swapped
//! in without touching the geometry.
//!
//! Measured sizes reported back by a renderer are folded in through
//! [`NodeMeasurements`]; implausible reports are capped rather than trusted.

use crate::layout::leveling::LevelAssignment;
use crate::models::HierarchyNode;
use serde::Serialize;
use std::collections::HashMap;

/// Horizontal gap between adjacent slice edges.
pub const GAP_DISTANCE: f64 = 150.0;

/// Default vertical distance between stacked nodes in one slice.
pub const VERTICAL_NODE_SPACING: f64 = 120.0;

/// Widest measurement a renderer report is trusted for.
pub const MAX_SANE_WIDTH: f64 = 500.0;

/// Tallest measurement a renderer report is trusted for.
pub const MAX_SANE_HEIGHT: f64 = 300.0;

/// Box width assumed before any measurement arrives.
pub const DEFAULT_NODE_WIDTH: f64 = 180.0;

/// Box height assumed before any measurement arrives.
pub const DEFAULT_NODE_HEIGHT: f64 = 60.0;

const LABEL_CHAR_WIDTH: f64 = 9.0;
const LABEL_PADDING: f64 = 48.0;

/// Estimate a node's rendered width from its label before the renderer has
/// reported a real measurement.
pub fn estimated_width(node: &HierarchyNode) -> f64 {
    let text_width = node.label.chars().count() as f64 * LABEL_CHAR_WIDTH + LABEL_PADDING;
    text_width.clamp(DEFAULT_NODE_WIDTH, MAX_SANE_WIDTH)
}

/// Renderer-reported node sizes, with implausible values capped
#[derive(Debug, Clone, Default)]
pub struct NodeMeasurements {
    sizes: HashMap<String, (f64, f64)>,
}

impl NodeMeasurements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a measurement. Non-finite or non-positive reports are dropped;
    /// oversized ones are capped at the sane maxima.
    pub fn record(&mut self, id: impl Into<String>, width: f64, height: f64) {
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return;
        }
        self.sizes.insert(
            id.into(),
            (width.min(MAX_SANE_WIDTH), height.min(MAX_SANE_HEIGHT)),
        );
    }

    /// Measured width, falling back to the label estimate
    pub fn width_of(&self, node: &HierarchyNode) -> f64 {
        self.sizes
            .get(&node.id)
            .map_or_else(|| estimated_width(node), |(w, _)| *w)
    }

    /// Measured height, falling back to the default box height
    pub fn height_of(&self, node: &HierarchyNode) -> f64 {
        self.sizes
            .get(&node.id)
            .map_or(DEFAULT_NODE_HEIGHT, |(_, h)| *h)
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

/// One column's horizontal extent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slice {
    pub level: u32,
    pub width: f64,
    pub midpoint: f64,
}

impl Slice {
    pub fn left_edge(&self) -> f64 {
        self.midpoint - self.width / 2.0
    }

    pub fn right_edge(&self) -> f64 {
        self.midpoint + self.width / 2.0
    }
}

/// Chain slice midpoints left to right.
///
/// Each slice is as wide as its widest member; consecutive midpoints differ
/// by half of each slice's width plus `gap`, so the visible space between
/// slice edges is exactly `gap` regardless of how wide either slice is. The
/// leftmost midpoint is anchored at 0.
pub fn compute_slices(
    assignment: &LevelAssignment,
    gap: f64,
    width_of: impl Fn(&str) -> f64,
) -> Vec<Slice> {
    let mut slices: Vec<Slice> = Vec::with_capacity(assignment.levels.len());
    for (level, members) in &assignment.levels {
        let width = members
            .iter()
            .map(|id| width_of(id))
            .fold(0.0_f64, f64::max);
        let midpoint = match slices.last() {
            Some(previous) => previous.midpoint + previous.width / 2.0 + gap + width / 2.0,
            None => 0.0,
        };
        slices.push(Slice {
            level: *level,
            width,
            midpoint,
        });
    }
    slices
}

/// A node's resolved canvas position (top-left corner)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Everything a solver needs to place nodes inside their slices
#[derive(Debug)]
pub struct SolveRequest<'a> {
    pub assignment: &'a LevelAssignment,
    pub slices: &'a [Slice],
    pub widths: &'a HashMap<String, f64>,
    pub heights: &'a HashMap<String, f64>,
    pub vertical_spacing: f64,
}

/// Strategy seam for placing nodes within computed slices
pub trait PositionSolver: Send + Sync {
    fn solve(&self, request: &SolveRequest<'_>) -> HashMap<String, Position>;
}

/// Default solver: stack each slice's members vertically, centered on y = 0,
/// horizontally centered on the slice midpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnStackSolver;

impl PositionSolver for ColumnStackSolver {
    fn solve(&self, request: &SolveRequest<'_>) -> HashMap<String, Position> {
        let mut positions = HashMap::new();
        for slice in request.slices {
            let Some(members) = request.assignment.levels.get(&slice.level) else {
                continue;
            };
            // Stretch the row pitch when a column holds boxes taller than
            // the default spacing.
            let tallest = members
                .iter()
                .filter_map(|id| request.heights.get(id))
                .copied()
                .fold(0.0_f64, f64::max);
            let pitch = request.vertical_spacing.max(tallest);
            let count = members.len() as f64;

            for (row, id) in members.iter().enumerate() {
                let width = request.widths.get(id).copied().unwrap_or(DEFAULT_NODE_WIDTH);
                let x = slice.midpoint - width / 2.0;
                let y = (row as f64 - (count - 1.0) / 2.0) * pitch;
                positions.insert(id.clone(), Position { x, y });
            }
        }
        positions
    }
}
