//! Layered (Sugiyama) layout of the connection graph.
//!
//! Backed by the `rust-sugiyama` crate behind the `layout` feature, which is
//! on by default. The engine works in `f64` with layers stacked along y;
//! results come back as `f32` [`NodePosition`]s ready for
//! [`Graph::apply_positions`].

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::analysis::NodePosition;
use crate::graph::Graph;
use crate::model::NodeId;

/// Which way successive layers advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum Direction {
    #[default]
    TopToBottom,
    LeftToRight,
}

impl Direction {
    /// Maps a pair between layer-along-y space and canvas space. The swap
    /// is its own inverse.
    fn orient<T>(self, (a, b): (T, T)) -> (T, T) {
        match self {
            Direction::TopToBottom => (a, b),
            Direction::LeftToRight => (b, a),
        }
    }
}

/// Tuning for [`sugiyama_layout`]. Zero values keep the engine's defaults.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct SugiyamaConfig {
    pub vertex_spacing: f64,
    /// Minimum number of layers an edge spans.
    pub minimum_length: u32,
    pub dummy_vertices: bool,
    pub direction: Direction,
}

impl SugiyamaConfig {
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_vertex_spacing(mut self, spacing: f64) -> Self {
        self.vertex_spacing = spacing;
        self
    }

    fn engine_config(&self) -> rust_sugiyama::configure::Config {
        let defaults = rust_sugiyama::configure::Config::default();
        rust_sugiyama::configure::Config {
            dummy_vertices: self.dummy_vertices,
            vertex_spacing: if self.vertex_spacing > 0.0 {
                self.vertex_spacing
            } else {
                defaults.vertex_spacing
            },
            minimum_length: if self.minimum_length > 0 {
                self.minimum_length
            } else {
                defaults.minimum_length
            },
            ..defaults
        }
    }
}

/// Lays out `nodes` (id and `(width, height)`) along the directed `edges`.
///
/// The first size given for an id wins and edges naming an unknown node
/// are dropped. Every distinct node gets exactly one position; disconnected
/// components are laid out independently by the engine.
pub fn sugiyama_layout(
    edges: &[(NodeId, NodeId)],
    nodes: &[(NodeId, (f64, f64))],
    config: &SugiyamaConfig,
) -> Vec<NodePosition> {
    let mut sizes: IndexMap<NodeId, (f64, f64)> = IndexMap::with_capacity(nodes.len());
    for &(id, size) in nodes {
        sizes.entry(id).or_insert(config.direction.orient(size));
    }
    if sizes.is_empty() {
        return Vec::new();
    }

    let vertices: Vec<(u32, (f64, f64))> = sizes
        .values()
        .enumerate()
        .map(|(index, &size)| (index as u32, size))
        .collect();
    let index_of = |id: NodeId| sizes.get_index_of(&id).map(|i| i as u32);
    let engine_edges: Vec<(u32, u32)> = edges
        .iter()
        .filter_map(|&(from, to)| Some((index_of(from)?, index_of(to)?)))
        .collect();

    let components =
        rust_sugiyama::from_vertices_and_edges(&vertices, &engine_edges, &config.engine_config());

    let positions: Vec<NodePosition> = components
        .iter()
        .flat_map(|(placed, _, _)| placed.iter())
        .filter_map(|&(index, point)| {
            let (&id, _) = sizes.get_index(index)?;
            let (x, y) = config.direction.orient(point);
            Some(NodePosition {
                id,
                x: x as f32,
                y: y as f32,
            })
        })
        .collect();
    debug!(
        nodes = positions.len(),
        components = components.len(),
        "layered layout computed"
    );
    positions
}

impl<D> Graph<D> {
    /// Layered layout of the whole graph.
    ///
    /// Parallel connections between the same pair of nodes count once and
    /// self-loops are ignored.
    pub fn hierarchical_layout(&self, config: &SugiyamaConfig) -> Vec<NodePosition> {
        let mut seen = HashSet::new();
        let edges: Vec<(NodeId, NodeId)> = self
            .connections()
            .filter(|c| !c.is_self_loop())
            .map(|c| (c.source_node_id, c.target_node_id))
            .filter(|edge| seen.insert(*edge))
            .collect();
        let nodes: Vec<(NodeId, (f64, f64))> = self
            .nodes()
            .map(|n| (n.id, (n.size.width as f64, n.size.height as f64)))
            .collect();
        sugiyama_layout(&edges, &nodes, config)
    }
}
