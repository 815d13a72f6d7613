//! Level 3: Spatial Query Tests
//!
//! Point and rectangle hit tests against the graph's grid index, checked
//! against brute-force answers and kept in sync as nodes move, hide and go.

mod common;

use common::*;
use node_graph_core::{Annotation, ConnectionStyle, Graph, Point, Rect};

/// `count` nodes on a grid with 150 x 100 spacing.
fn grid_graph(count: i32, columns: i32) -> Graph<()> {
    let mut g = Graph::new();
    for id in 0..count {
        let x = (id % columns) as f32 * 150.0;
        let y = (id / columns) as f32 * 100.0;
        g.add_node(node(id, x, y)).unwrap();
    }
    g
}

fn brute_force_in_rect(g: &Graph<()>, rect: Rect) -> Vec<i32> {
    g.nodes()
        .filter(|n| n.rect().overlaps(&rect))
        .map(|n| n.id)
        .collect()
}

// ============================================================================
// Node hit testing
// ============================================================================

#[test]
fn test_node_at_hits_and_misses() {
    let g = pipeline();
    assert_eq!(g.node_at(Point::new(50.0, 25.0)), Some(1));
    assert_eq!(g.node_at(Point::new(250.0, 0.0)), Some(2));
    assert_eq!(g.node_at(Point::new(150.0, 25.0)), None);
    assert_eq!(g.node_at(Point::new(-1000.0, -1000.0)), None);
}

#[test]
fn test_overlapping_nodes_topmost_wins() {
    let mut g = pipeline();
    g.add_node(node(4, 50.0, 10.0)).unwrap();
    let p = Point::new(75.0, 20.0);
    // Later insertion draws on top
    assert_eq!(g.node_at(p), Some(4));
    g.set_node_z_index(1, 5).unwrap();
    assert_eq!(g.node_at(p), Some(1));
}

#[test]
fn test_hidden_nodes_are_skipped() {
    let mut g = pipeline();
    g.set_node_visible(2, false).unwrap();
    assert_eq!(g.node_at(Point::new(250.0, 25.0)), None);
    let everything = Rect::new(-100.0, -100.0, 1000.0, 300.0);
    assert_eq!(g.visible_nodes(everything), vec![1, 3]);
    // Both connections touch the hidden node
    assert!(g.visible_connections(everything).is_empty());
    assert_eq!(g.connection_at(Point::new(150.0, 25.0), 4.0), None);
}

#[test]
fn test_index_follows_moves_and_removals() {
    let mut g = pipeline();
    g.set_node_position(3, Point::new(1000.0, 1000.0)).unwrap();
    assert_eq!(g.node_at(Point::new(450.0, 25.0)), None);
    assert_eq!(g.node_at(Point::new(1050.0, 1025.0)), Some(3));

    g.remove_node(3).unwrap();
    assert_eq!(g.node_at(Point::new(1050.0, 1025.0)), None);
}

// ============================================================================
// Rectangle queries
// ============================================================================

#[test]
fn test_nodes_in_rect_insertion_order() {
    let g = pipeline();
    assert_eq!(g.nodes_in_rect(Rect::new(150.0, -10.0, 300.0, 20.0)), vec![2, 3]);
    assert!(g.nodes_in_rect(Rect::new(0.0, 500.0, 10.0, 10.0)).is_empty());
}

#[test]
fn test_grid_queries_match_brute_force() {
    let g = grid_graph(400, 20);
    let queries = [
        Rect::new(0.0, 0.0, 10.0, 10.0),
        Rect::new(140.0, 90.0, 400.0, 250.0),
        Rect::new(-500.0, -500.0, 600.0, 600.0),
        Rect::new(1234.0, 567.0, 890.0, 1.0),
        Rect::new(0.0, 0.0, 3000.0, 2000.0),
    ];
    for rect in queries {
        assert_eq!(g.nodes_in_rect(rect), brute_force_in_rect(&g, rect), "{:?}", rect);
    }

    g.rebuild_spatial_index();
    for rect in queries {
        assert_eq!(g.nodes_in_rect(rect), brute_force_in_rect(&g, rect), "{:?}", rect);
    }
}

#[test]
fn test_huge_query_rect() {
    let mut g = pipeline();
    g.add_node(node(4, 1e6, -1e6)).unwrap();
    let everything = Rect::new(-1e7, -1e7, 2e7, 2e7);
    assert_eq!(g.nodes_in_rect(everything), vec![1, 2, 3, 4]);
    assert_eq!(g.visible_nodes(everything), vec![1, 2, 3, 4]);
    assert_eq!(g.visible_connections(everything), vec![1, 2]);
    assert!(g.nodes_in_rect(Rect::new(2e6, 2e6, 1e7, 1e7)).is_empty());
}

#[test]
fn test_oversized_node_is_hit_anywhere() {
    let mut g = pipeline();
    g.add_node(node(4, 0.0, 0.0)).unwrap();
    g.set_node_size(4, node_graph_core::Size::new(1e6, 1e6)).unwrap();
    assert_eq!(g.node_at(Point::new(500_000.0, 500_000.0)), Some(4));
    assert_eq!(g.nodes_in_rect(Rect::new(9e5, 9e5, 10.0, 10.0)), vec![4]);
    g.set_node_size(4, NODE_SIZE).unwrap();
    assert_eq!(g.node_at(Point::new(500_000.0, 500_000.0)), None);
}

// ============================================================================
// Connection hit testing
// ============================================================================

#[test]
fn test_connection_at_within_tolerance() {
    let g = pipeline();
    assert_eq!(g.connection_at(Point::new(150.0, 27.0), 4.0), Some(1));
    assert_eq!(g.connection_at(Point::new(350.0, 22.0), 4.0), Some(2));
    assert_eq!(g.connection_at(Point::new(150.0, 40.0), 4.0), None);
}

#[test]
fn test_connection_index_follows_node_moves() {
    let mut g = pipeline();
    g.move_node_by(2, Point::new(0.0, 300.0)).unwrap();
    assert_eq!(g.connection_at(Point::new(150.0, 27.0), 4.0), None);

    let midpoint = g.route(1).unwrap().midpoint();
    assert_eq!(g.connection_at(midpoint, 1.0), Some(1));
}

#[test]
fn test_connections_in_rect() {
    let g = pipeline();
    assert_eq!(g.connections_in_rect(Rect::new(110.0, 0.0, 80.0, 50.0)), vec![1]);
    assert_eq!(g.connections_in_rect(Rect::new(0.0, 0.0, 600.0, 50.0)), vec![1, 2]);
    assert!(g.connections_in_rect(Rect::new(0.0, 200.0, 600.0, 50.0)).is_empty());
}

#[test]
fn test_diagonal_connection_not_found_far_away() {
    let mut g: Graph<()> = Graph::new();
    g.add_node(node(1, -100.0, -25.0)).unwrap();
    g.add_node(node(2, 10_000.0, 9_975.0)).unwrap();
    g.add_connection(link(1, 1, 2).with_style(ConnectionStyle::Straight))
        .unwrap();

    // The route runs from (0, 0) to (10000, 10000)
    assert_eq!(g.connection_at(Point::new(5000.0, 5000.0), 2.0), Some(1));
    assert!(g.connections_in_rect(Rect::new(9950.0, 50.0, 1.0, 1.0)).is_empty());
    assert!(g.visible_connections(Rect::new(8000.0, 0.0, 500.0, 500.0)).is_empty());
    assert_eq!(g.connections_in_rect(Rect::new(4990.0, 4990.0, 20.0, 20.0)), vec![1]);
}

// ============================================================================
// Annotations
// ============================================================================

#[test]
fn test_annotation_at_respects_z_order() {
    let mut g = pipeline();
    g.add_annotation(Annotation::sticky(1, Rect::new(0.0, 100.0, 200.0, 100.0), "note"))
        .unwrap();
    let mut top = Annotation::sticky(2, Rect::new(100.0, 150.0, 200.0, 100.0), "later");
    top.z_index = -1;
    g.add_annotation(top).unwrap();

    assert_eq!(g.annotation_at(Point::new(150.0, 175.0)), Some(1));
    assert_eq!(g.annotation_at(Point::new(250.0, 225.0)), Some(2));
    g.set_annotation_visible(1, false).unwrap();
    assert_eq!(g.annotation_at(Point::new(150.0, 175.0)), Some(2));
    // Annotations never shadow nodes
    assert_eq!(g.node_at(Point::new(50.0, 25.0)), Some(1));
}
