//! Uniform grid index over node rectangles and connection polylines.
//!
//! The index only answers "which ids might be here"; the graph filters the
//! candidates with exact geometry. Every entity remembers the cells it
//! occupies so moving it touches only those cells.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use tracing::trace;

use crate::config::SpatialConfig;
use crate::geometry::{Point, Rect};
use crate::model::{ConnectionId, NodeId};

/// Column and row of a grid cell.
pub type CellKey = (i32, i32);

/// Nodes covering more cells than this are kept as a bare range.
const MAX_NODE_CELLS: u64 = 4096;

/// An inclusive block of grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    /// Top-left cell
    pub min: CellKey,
    /// Bottom-right cell, inclusive
    pub max: CellKey,
}

impl CellRange {
    /// Number of cells in the block, computed without overflow.
    pub fn len(&self) -> u64 {
        let span = |lo: i32, hi: i32| (hi as i64 - lo as i64 + 1).max(0) as u64;
        span(self.min.0, self.max.0).saturating_mul(span(self.min.1, self.max.1))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, (x, y): CellKey) -> bool {
        (self.min.0..=self.max.0).contains(&x) && (self.min.1..=self.max.1).contains(&y)
    }

    /// Whether the two blocks share at least one cell.
    pub fn intersects(&self, other: &CellRange) -> bool {
        self.min.0 <= other.max.0
            && other.min.0 <= self.max.0
            && self.min.1 <= other.max.1
            && other.min.1 <= self.max.1
    }

    /// Row-major cell keys.
    pub fn keys(self) -> impl Iterator<Item = CellKey> {
        let Self { min, max } = self;
        (min.1..=max.1).flat_map(move |y| (min.0..=max.0).map(move |x| (x, y)))
    }
}

#[derive(Debug, Default, Clone)]
struct Cell {
    nodes: Vec<NodeId>,
    connections: Vec<ConnectionId>,
}

impl Cell {
    fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty()
    }
}

/// Uniform grid over node rectangles and connection paths.
///
/// Answers are candidate sets; callers confirm hits against exact geometry.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    cell_size: f32,
    cells: HashMap<CellKey, Cell>,
    node_cells: HashMap<NodeId, Vec<CellKey>>,
    connection_cells: HashMap<ConnectionId, Vec<CellKey>>,
    /// Nodes too large to register cell by cell
    wide_nodes: HashMap<NodeId, CellRange>,
    /// Connections whose cells are stale until the next connection query
    dirty: HashSet<ConnectionId>,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(SpatialConfig::default())
    }
}

impl SpatialIndex {
    pub fn new(config: SpatialConfig) -> Self {
        Self {
            cell_size: config.cell_size,
            cells: HashMap::new(),
            node_cells: HashMap::new(),
            connection_cells: HashMap::new(),
            wide_nodes: HashMap::new(),
            dirty: HashSet::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Cell containing a canvas point. Points on a border belong to the cell
    /// below and to the right.
    pub fn cell_for(&self, p: Point) -> CellKey {
        (
            (p.x / self.cell_size).floor() as i32,
            (p.y / self.cell_size).floor() as i32,
        )
    }

    /// The block of cells a rectangle overlaps, borders included.
    pub fn cell_range(&self, rect: &Rect) -> CellRange {
        CellRange {
            min: self.cell_for(rect.origin()),
            max: self.cell_for(Point::new(rect.right(), rect.bottom())),
        }
    }

    /// Cells crossed by the segment `a`-`b`, in travel order.
    ///
    /// Grid traversal in the style of Amanatides and Woo. When the segment
    /// passes exactly through a cell corner both side cells are included,
    /// so a query touching the segment always finds it.
    fn cells_along_segment(&self, a: Point, b: Point, mut visit: impl FnMut(CellKey)) {
        let (mut x, mut y) = self.cell_for(a);
        let end = self.cell_for(b);
        visit((x, y));

        let axis = |from: f32, to: f32, cell: i32| -> (i32, f32, f32) {
            let delta = to - from;
            if delta > 0.0 {
                let boundary = (cell as f32 + 1.0) * self.cell_size;
                (1, (boundary - from) / delta, self.cell_size / delta)
            } else if delta < 0.0 {
                let boundary = cell as f32 * self.cell_size;
                (-1, (boundary - from) / delta, self.cell_size / -delta)
            } else {
                (0, f32::INFINITY, f32::INFINITY)
            }
        };
        let (step_x, mut next_x, delta_x) = axis(a.x, b.x, x);
        let (step_y, mut next_y, delta_y) = axis(a.y, b.y, y);

        // Float drift can overshoot the end cell; the step budget bounds the walk
        let mut budget = (end.0 as i64 - x as i64).abs() + (end.1 as i64 - y as i64).abs();
        while (x, y) != end && budget > 0 {
            if next_x < next_y {
                x = x.saturating_add(step_x);
                next_x += delta_x;
            } else if next_y < next_x {
                y = y.saturating_add(step_y);
                next_y += delta_y;
            } else {
                visit((x.saturating_add(step_x), y));
                visit((x, y.saturating_add(step_y)));
                x = x.saturating_add(step_x);
                y = y.saturating_add(step_y);
                next_x += delta_x;
                next_y += delta_y;
                budget -= 1;
            }
            budget -= 1;
            visit((x, y));
        }
        if (x, y) != end {
            visit(end);
        }
    }

    fn cells_for_polyline(&self, points: &[Point]) -> Vec<CellKey> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut add = |key: CellKey| {
            if seen.insert(key) {
                keys.push(key);
            }
        };
        match points {
            [] => {}
            [only] => add(self.cell_for(*only)),
            _ => {
                for pair in points.windows(2) {
                    self.cells_along_segment(pair[0], pair[1], &mut add);
                }
            }
        }
        keys
    }

    /// Index a node's rectangle, replacing any previous entry for the id.
    pub fn insert_node(&mut self, id: NodeId, rect: Rect) {
        self.remove_node(id);
        let range = self.cell_range(&rect);
        if range.len() > MAX_NODE_CELLS {
            trace!(node = id, cells = range.len(), "indexed oversized node");
            self.wide_nodes.insert(id, range);
            self.node_cells.insert(id, Vec::new());
            return;
        }
        let keys: Vec<CellKey> = range.keys().collect();
        for key in &keys {
            self.cells.entry(*key).or_default().nodes.push(id);
        }
        trace!(node = id, cells = keys.len(), "indexed node");
        self.node_cells.insert(id, keys);
    }

    /// Returns `false` if the node was not indexed.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        self.wide_nodes.remove(&id);
        let Some(keys) = self.node_cells.remove(&id) else {
            return false;
        };
        for key in keys {
            if let Some(cell) = self.cells.get_mut(&key) {
                cell.nodes.retain(|n| *n != id);
                if cell.is_empty() {
                    self.cells.remove(&key);
                }
            }
        }
        true
    }

    /// Index a connection along its flattened path; clears its dirty flag.
    pub fn insert_connection(&mut self, id: ConnectionId, polyline: &[Point]) {
        self.remove_connection(id);
        let keys = self.cells_for_polyline(polyline);
        for key in &keys {
            self.cells.entry(*key).or_default().connections.push(id);
        }
        trace!(connection = id, cells = keys.len(), "indexed connection");
        self.connection_cells.insert(id, keys);
    }

    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        self.dirty.remove(&id);
        let Some(keys) = self.connection_cells.remove(&id) else {
            return false;
        };
        for key in keys {
            if let Some(cell) = self.cells.get_mut(&key) {
                cell.connections.retain(|c| *c != id);
                if cell.is_empty() {
                    self.cells.remove(&key);
                }
            }
        }
        true
    }

    /// Flag a connection whose path changed. Its old cells stay until reindexed.
    pub fn mark_connection_dirty(&mut self, id: ConnectionId) {
        self.dirty.insert(id);
    }

    pub fn is_dirty(&self, id: ConnectionId) -> bool {
        self.dirty.contains(&id)
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Drain the dirty set, leaving it empty.
    pub fn take_dirty(&mut self) -> Vec<ConnectionId> {
        self.dirty.drain().collect()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node_cells.contains_key(&id)
    }

    pub fn contains_connection(&self, id: ConnectionId) -> bool {
        self.connection_cells.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.node_cells.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connection_cells.len()
    }

    /// Nodes registered in the cell containing `p`.
    pub fn nodes_near(&self, p: Point) -> Vec<NodeId> {
        let key = self.cell_for(p);
        let mut found = self
            .cells
            .get(&key)
            .map(|cell| cell.nodes.clone())
            .unwrap_or_default();
        found.extend(
            self.wide_nodes
                .iter()
                .filter(|(_, range)| range.contains(key))
                .map(|(id, _)| *id),
        );
        found
    }

    /// Nodes registered in any cell `rect` overlaps, deduplicated.
    pub fn nodes_in(&self, rect: &Rect) -> HashSet<NodeId> {
        let mut found = self.ids_in(rect, &self.node_cells, |cell| cell.nodes.as_slice());
        let range = self.cell_range(rect);
        found.extend(
            self.wide_nodes
                .iter()
                .filter(|(_, wide)| wide.intersects(&range))
                .map(|(id, _)| *id),
        );
        found
    }

    /// Connections registered in any cell `rect` overlaps, deduplicated.
    pub fn connections_in(&self, rect: &Rect) -> HashSet<ConnectionId> {
        self.ids_in(rect, &self.connection_cells, |cell| cell.connections.as_slice())
    }

    /// Walks the covered cells, or scans every entity's cell list when the
    /// range holds more cells than there are entities.
    fn ids_in<Id>(
        &self,
        rect: &Rect,
        owned: &HashMap<Id, Vec<CellKey>>,
        ids: impl Fn(&Cell) -> &[Id],
    ) -> HashSet<Id>
    where
        Id: Copy + Eq + Hash,
    {
        let range = self.cell_range(rect);
        if range.len() > owned.len() as u64 {
            return owned
                .iter()
                .filter(|(_, keys)| keys.iter().any(|key| range.contains(*key)))
                .map(|(id, _)| *id)
                .collect();
        }
        let mut result = HashSet::new();
        for key in range.keys() {
            if let Some(cell) = self.cells.get(&key) {
                result.extend(ids(cell).iter().copied());
            }
        }
        result
    }

    /// Forget every entry, including pending dirty flags.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.node_cells.clear();
        self.connection_cells.clear();
        self.wide_nodes.clear();
        self.dirty.clear();
    }
}
