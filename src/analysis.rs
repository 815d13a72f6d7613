//! Read-only graph analysis and layout helpers.
//!
//! Everything here borrows the graph immutably and returns plain values.
//! Layout helpers compute [`NodePosition`]s; commit them with
//! [`Graph::apply_positions`].

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::geometry::{Point, Rect};
use crate::graph::Graph;
use crate::model::{Node, NodeId};

/// Target top-left corner for a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodePosition {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
}

impl NodePosition {
    pub fn new(id: NodeId, position: Point) -> Self {
        Self {
            id,
            x: position.x,
            y: position.y,
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Edge of the selection bounds nodes are aligned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Right,
    Top,
    Bottom,
    /// Horizontal centres on the bounds' vertical centre line
    CenterHorizontal,
    /// Vertical centres on the bounds' horizontal centre line
    CenterVertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Dense adjacency over node insertion indices.
struct Adjacency {
    ids: Vec<NodeId>,
    successors: Vec<Vec<usize>>,
}

impl Adjacency {
    fn build<D>(graph: &Graph<D>) -> Self {
        let ids: Vec<NodeId> = graph.nodes.keys().copied().collect();
        let mut successors = vec![Vec::new(); ids.len()];
        for c in graph.connections.values() {
            let (Some(s), Some(t)) = (
                graph.nodes.get_index_of(&c.source_node_id),
                graph.nodes.get_index_of(&c.target_node_id),
            ) else {
                continue;
            };
            if !successors[s].contains(&t) {
                successors[s].push(t);
            }
        }
        Self { ids, successors }
    }

    /// Tarjan's strongly connected components, iterative.
    fn strongly_connected(&self) -> Vec<Vec<usize>> {
        const UNVISITED: usize = usize::MAX;
        let n = self.ids.len();
        let mut index = vec![UNVISITED; n];
        let mut low = vec![0; n];
        let mut on_stack = vec![false; n];
        let mut stack = Vec::new();
        let mut components = Vec::new();
        let mut next_index = 0;

        for root in 0..n {
            if index[root] != UNVISITED {
                continue;
            }
            // (vertex, next successor to visit)
            let mut work = vec![(root, 0usize)];
            while let Some(&(v, child)) = work.last() {
                if index[v] == UNVISITED {
                    index[v] = next_index;
                    low[v] = next_index;
                    next_index += 1;
                    stack.push(v);
                    on_stack[v] = true;
                }
                if let Some(&w) = self.successors[v].get(child) {
                    if let Some(top) = work.last_mut() {
                        top.1 += 1;
                    }
                    if index[w] == UNVISITED {
                        work.push((w, 0));
                    } else if on_stack[w] {
                        low[v] = low[v].min(index[w]);
                    }
                    continue;
                }

                work.pop();
                if let Some(&(parent, _)) = work.last() {
                    low[parent] = low[parent].min(low[v]);
                }
                if low[v] == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    component.sort_unstable();
                    components.push(component);
                }
            }
        }
        components
    }
}

impl<D> Graph<D> {
    /// Groups of nodes that lie on a directed cycle.
    ///
    /// Each group is a strongly connected component with more than one node,
    /// or a single node with a self-loop. Members are listed in insertion
    /// order and groups are ordered by their first member.
    pub fn detect_cycles(&self) -> Vec<Vec<NodeId>> {
        let adjacency = Adjacency::build(self);
        let mut cycles: Vec<Vec<usize>> = adjacency
            .strongly_connected()
            .into_iter()
            .filter(|c| c.len() > 1 || adjacency.successors[c[0]].contains(&c[0]))
            .collect();
        cycles.sort_unstable_by_key(|c| c[0]);
        cycles
            .into_iter()
            .map(|c| c.into_iter().map(|i| adjacency.ids[i]).collect())
            .collect()
    }

    pub fn has_cycles(&self) -> bool {
        !self.detect_cycles().is_empty()
    }

    /// Nodes with no incoming or outgoing connection, in insertion order.
    pub fn orphan_nodes(&self) -> Vec<NodeId> {
        let connected = self.connected_node_ids();
        self.nodes
            .keys()
            .filter(|id| !connected.contains(id))
            .copied()
            .collect()
    }

    /// Kahn ordering where ties go to the earlier inserted node.
    ///
    /// `None` when the graph has a cycle.
    pub fn topological_sort(&self) -> Option<Vec<NodeId>> {
        let adjacency = Adjacency::build(self);
        let n = adjacency.ids.len();
        let mut in_degree = vec![0usize; n];
        for targets in &adjacency.successors {
            for &t in targets {
                in_degree[t] += 1;
            }
        }
        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(v)) = ready.pop() {
            order.push(adjacency.ids[v]);
            for &t in &adjacency.successors[v] {
                in_degree[t] -= 1;
                if in_degree[t] == 0 {
                    ready.push(Reverse(t));
                }
            }
        }
        (order.len() == n).then_some(order)
    }

    /// Arrange every node on a grid, row-major in insertion order.
    ///
    /// Cells are as large as the largest node plus `gap`; the grid starts at
    /// the current top-left of the content.
    pub fn grid_layout(&self, columns: usize, gap: f32) -> Vec<NodePosition> {
        let columns = columns.max(1);
        let origin = Rect::union_all(self.nodes.values().map(Node::rect))
            .map(|r| r.origin())
            .unwrap_or(Point::ZERO);
        let cell_w = self.nodes.values().map(|n| n.size.width).fold(0.0, f32::max) + gap;
        let cell_h = self.nodes.values().map(|n| n.size.height).fold(0.0, f32::max) + gap;

        self.nodes
            .values()
            .enumerate()
            .map(|(i, n)| {
                let col = (i % columns) as f32;
                let row = (i / columns) as f32;
                NodePosition {
                    id: n.id,
                    x: origin.x + col * cell_w,
                    y: origin.y + row * cell_h,
                }
            })
            .collect()
    }

    /// Align nodes to one edge (or centre line) of their common bounds.
    ///
    /// Unknown ids are skipped.
    pub fn align(&self, ids: &[NodeId], alignment: Alignment) -> Vec<NodePosition> {
        let nodes: Vec<&Node<D>> = ids.iter().filter_map(|id| self.nodes.get(id)).collect();
        let Some(bounds) = self.bounds_of(nodes.iter().map(|n| n.id)) else {
            return Vec::new();
        };
        let center = bounds.center();
        nodes
            .into_iter()
            .map(|n| {
                let Point { x, y } = n.position;
                let (w, h) = (n.size.width, n.size.height);
                let (x, y) = match alignment {
                    Alignment::Left => (bounds.left(), y),
                    Alignment::Right => (bounds.right() - w, y),
                    Alignment::Top => (x, bounds.top()),
                    Alignment::Bottom => (x, bounds.bottom() - h),
                    Alignment::CenterHorizontal => (center.x - w / 2.0, y),
                    Alignment::CenterVertical => (x, center.y - h / 2.0),
                };
                NodePosition { id: n.id, x, y }
            })
            .collect()
    }

    /// Spread nodes so the gaps between neighbours along `axis` are equal.
    ///
    /// The first and last node keep their place; fewer than three nodes
    /// produce no moves.
    pub fn distribute(&self, ids: &[NodeId], axis: Axis) -> Vec<NodePosition> {
        let mut nodes: Vec<&Node<D>> = ids.iter().filter_map(|id| self.nodes.get(id)).collect();
        if nodes.len() < 3 {
            return Vec::new();
        }
        let start = |n: &Node<D>| match axis {
            Axis::Horizontal => n.position.x,
            Axis::Vertical => n.position.y,
        };
        let extent = |n: &Node<D>| match axis {
            Axis::Horizontal => n.size.width,
            Axis::Vertical => n.size.height,
        };
        nodes.sort_by(|a, b| start(a).total_cmp(&start(b)));

        let (first, last) = (nodes[0], nodes[nodes.len() - 1]);
        let span = start(last) + extent(last) - start(first);
        let occupied: f32 = nodes.iter().map(|n| extent(n)).sum();
        let gap = (span - occupied) / (nodes.len() - 1) as f32;

        let mut cursor = start(first);
        nodes
            .into_iter()
            .map(|n| {
                let (x, y) = match axis {
                    Axis::Horizontal => (cursor, n.position.y),
                    Axis::Vertical => (n.position.x, cursor),
                };
                cursor += extent(n) + gap;
                NodePosition { id: n.id, x, y }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::model::{Connection, Port};

    fn graph(nodes: &[NodeId], edges: &[(NodeId, NodeId)]) -> Graph<()> {
        let mut g = Graph::new();
        for (i, id) in nodes.iter().enumerate() {
            g.add_node(
                Node::new(*id, "n", Point::new(i as f32 * 150.0, 0.0), Size::new(100.0, 50.0), ())
                    .with_input(Port::input(1, "in").multi(true))
                    .with_output(Port::output(2, "out")),
            )
            .unwrap();
        }
        for (i, (s, t)) in edges.iter().enumerate() {
            g.add_connection(Connection::new(i as i32, (*s, 2), (*t, 1))).unwrap();
        }
        g
    }

    // ========================================================================
    // Cycles
    // ========================================================================

    #[test]
    fn test_three_cycle_found_once() {
        let g = graph(&[1, 2, 3], &[(1, 2), (2, 3), (3, 1)]);
        assert_eq!(g.detect_cycles(), vec![vec![1, 2, 3]]);
        assert!(g.topological_sort().is_none());
    }

    #[test]
    fn test_dag_has_no_cycles() {
        let g = graph(&[1, 2, 3, 4], &[(1, 2), (1, 3), (2, 4), (3, 4)]);
        assert!(g.detect_cycles().is_empty());
        assert!(!g.has_cycles());
        assert_eq!(g.topological_sort(), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let g = graph(&[1, 2], &[(1, 2), (2, 2)]);
        assert_eq!(g.detect_cycles(), vec![vec![2]]);
    }

    #[test]
    fn test_separate_cycles_in_insertion_order() {
        let g = graph(&[1, 2, 3, 4, 5], &[(4, 5), (5, 4), (1, 2), (2, 1), (2, 3)]);
        assert_eq!(g.detect_cycles(), vec![vec![1, 2], vec![4, 5]]);
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let ids: Vec<NodeId> = (0..2000).collect();
        let edges: Vec<(NodeId, NodeId)> = ids.windows(2).map(|w| (w[0], w[1])).collect();
        let g = graph(&ids, &edges);
        assert!(g.detect_cycles().is_empty());
    }

    // ========================================================================
    // Orphans
    // ========================================================================

    #[test]
    fn test_orphans() {
        let g = graph(&[1, 2, 3], &[(1, 2)]);
        assert_eq!(g.orphan_nodes(), vec![3]);
        let empty: Graph<()> = Graph::new();
        assert!(empty.orphan_nodes().is_empty());
    }

    // ========================================================================
    // Layout helpers
    // ========================================================================

    #[test]
    fn test_grid_layout_rows() {
        let g = graph(&[1, 2, 3], &[]);
        let positions = g.grid_layout(2, 10.0);
        assert_eq!(
            positions,
            vec![
                NodePosition { id: 1, x: 0.0, y: 0.0 },
                NodePosition { id: 2, x: 110.0, y: 0.0 },
                NodePosition { id: 3, x: 0.0, y: 60.0 },
            ]
        );
    }

    #[test]
    fn test_align_and_apply() {
        let mut g = graph(&[1, 2], &[]);
        g.set_node_position(2, Point::new(200.0, 80.0)).unwrap();
        let aligned = g.align(&[1, 2], Alignment::Bottom);
        assert_eq!(aligned[0], NodePosition { id: 1, x: 0.0, y: 80.0 });
        assert_eq!(aligned[1], NodePosition { id: 2, x: 200.0, y: 80.0 });

        let centred = g.align(&[1, 2, 99], Alignment::CenterHorizontal);
        assert_eq!(centred.len(), 2);
        assert_eq!(centred[0].x, 100.0);

        g.apply_positions(&aligned).unwrap();
        assert_eq!(g.node(1).unwrap().position, Point::new(0.0, 80.0));
    }

    #[test]
    fn test_distribute_equal_gaps() {
        let mut g = graph(&[1, 2, 3], &[]);
        g.set_node_position(2, Point::new(120.0, 0.0)).unwrap();
        g.set_node_position(3, Point::new(400.0, 0.0)).unwrap();
        let positions = g.distribute(&[3, 1, 2], Axis::Horizontal);
        let xs: Vec<f32> = positions.iter().map(|p| p.x).collect();
        // span 500, nodes take 300, two gaps of 100
        assert_eq!(xs, vec![0.0, 200.0, 400.0]);
        assert!(g.distribute(&[1, 2], Axis::Vertical).is_empty());
    }
}
