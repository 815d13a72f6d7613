//! Level 1: Graph Model Tests
//!
//! Node and connection lifecycle through the public API: insertion, cascading
//! removal, port capacity, single-port replacement and the event stream
//! observers receive.

mod common;

use common::*;
use node_graph_core::{
    Connection, EntityRef, Graph, GraphError, GraphEvent, NoSelfLoopsValidator, Node, Point, Port,
    PortRole, Size,
};
use proptest::prelude::*;

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_pipeline_builds() {
    let g = pipeline();
    assert_eq!(g.node_count(), 3);
    assert_eq!(g.connection_count(), 2);
    let ids: Vec<_> = g.nodes().map(|n| n.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn test_duplicate_node_rejected_without_side_effects() {
    let mut g = pipeline();
    let events = record_events(&mut g);
    let err = g.add_node(node(2, 900.0, 900.0)).unwrap_err();
    assert_eq!(err, GraphError::DuplicateId(EntityRef::Node(2)));
    assert_eq!(g.node(2).map(|n| n.position), Some(Point::new(200.0, 0.0)));
    assert!(events.borrow().is_empty());
}

#[test]
fn test_remove_middle_node_cascades() {
    let mut g = pipeline();
    let events = record_events(&mut g);

    let removed = g.remove_node(2).unwrap();
    assert_eq!(removed.id, 2);
    assert_eq!(g.connection_count(), 0);
    assert!(g.connections_for_node(1).is_empty());
    assert_eq!(
        events.borrow().as_slice(),
        &[GraphEvent::NodeRemoved {
            id: 2,
            removed_connections: vec![1, 2],
        }]
    );

    // Removing again reports the missing id
    assert_eq!(
        g.remove_node(2).unwrap_err(),
        GraphError::NotFound(EntityRef::Node(2))
    );
}

#[test]
fn test_remove_connection_keeps_nodes() {
    let mut g = pipeline();
    let c = g.remove_connection(1).unwrap();
    assert_eq!(c.source(), (1, OUT));
    assert_eq!(g.node_count(), 3);
    assert!(g.remove_connection(1).is_err());
}

#[test]
fn test_clear_empties_everything() {
    let mut g = pipeline();
    let events = record_events(&mut g);
    g.clear();
    assert_eq!(g.node_count(), 0);
    assert_eq!(g.connection_count(), 0);
    assert_eq!(g.content_bounds(), None);
    assert_eq!(events.borrow().as_slice(), &[GraphEvent::Cleared]);
}

// ============================================================================
// Endpoint checks
// ============================================================================

#[test]
fn test_connection_to_missing_port() {
    let mut g = pipeline();
    let err = g.add_connection(Connection::new(9, (1, OUT), (3, 99))).unwrap_err();
    assert_eq!(err, GraphError::InvalidEndpoint { node: 3, port: 99 });
    let err = g.add_connection(Connection::new(9, (42, OUT), (3, IN))).unwrap_err();
    assert_eq!(err, GraphError::InvalidEndpoint { node: 42, port: OUT });
}

#[test]
fn test_direction_is_enforced() {
    let mut g = pipeline();
    // Input used as source
    let err = g.add_connection(Connection::new(9, (3, IN), (1, IN))).unwrap_err();
    assert_eq!(
        err,
        GraphError::Direction {
            node: 3,
            port: IN,
            role: PortRole::Source,
        }
    );
}

#[test]
fn test_non_connectable_port() {
    let mut g: Graph<()> = Graph::new();
    g.add_node(node(1, 0.0, 0.0)).unwrap();
    g.add_node(
        Node::new(2, "locked", Point::new(200.0, 0.0), Size::new(100.0, 50.0), ())
            .with_input(Port::input(IN, "in").connectable(false)),
    )
    .unwrap();
    assert_eq!(
        g.add_connection(link(1, 1, 2)).unwrap_err(),
        GraphError::PortNotConnectable { node: 2, port: IN }
    );
    assert!(g.check_start(2, IN).is_err());
}

// ============================================================================
// Capacity
// ============================================================================

#[test]
fn test_multi_port_respects_max() {
    let mut g: Graph<()> = Graph::new();
    g.add_node(
        Node::new(1, "hub", Point::ZERO, NODE_SIZE, ())
            .with_output(Port::output(OUT, "out").max_connections(2)),
    )
    .unwrap();
    for id in 2..=4 {
        g.add_node(node(id, 200.0, id as f32 * 100.0)).unwrap();
    }
    g.add_connection(link(1, 1, 2)).unwrap();
    g.add_connection(link(2, 1, 3)).unwrap();
    assert_eq!(
        g.add_connection(link(3, 1, 4)).unwrap_err(),
        GraphError::Capacity {
            node: 1,
            port: OUT,
            limit: 2,
        }
    );
    assert_eq!(g.connections_on_port(1, OUT).len(), 2);
    assert!(g.check_start(1, OUT).is_err());

    g.remove_connection(1).unwrap();
    g.add_connection(link(3, 1, 4)).unwrap();
}

#[test]
fn test_fan_in_port_accepts_many() {
    let mut g: Graph<()> = Graph::new();
    g.add_node(fan_in_node(10, 400.0, 0.0)).unwrap();
    for id in 1..=5 {
        g.add_node(node(id, 0.0, id as f32 * 80.0)).unwrap();
        g.add_connection(link(id, id, 10)).unwrap();
    }
    assert_eq!(g.connections_on_port(10, IN).len(), 5);
}

#[test]
fn test_single_input_is_replaced() {
    let mut g = pipeline();
    g.add_node(node(4, 0.0, 200.0)).unwrap();
    let events = record_events(&mut g);

    // Node 2 already has connection 1 on its single input
    g.add_connection(link(7, 4, 2)).unwrap();
    assert!(g.connection(1).is_none());
    assert_eq!(g.connection(7).map(|c| c.source()), Some((4, OUT)));
    assert_eq!(
        events.borrow().as_slice(),
        &[GraphEvent::ConnectionReplaced {
            added: 7,
            replaced: vec![1],
        }]
    );
}

#[test]
fn test_failed_add_leaves_graph_untouched() {
    let mut g = pipeline();
    g.add_validator(NoSelfLoopsValidator);
    g.add_node(fan_in_node(4, 0.0, 200.0)).unwrap();
    let before: Vec<_> = g.connections().cloned().collect();
    let events = record_events(&mut g);

    assert!(matches!(
        g.add_connection(link(9, 4, 4)),
        Err(GraphError::ValidationDenied(_))
    ));
    let after: Vec<_> = g.connections().cloned().collect();
    assert_eq!(before, after);
    assert!(events.borrow().is_empty());
}

/// Input ports: single, multi capped at 2, unbounded multi.
const INPUTS: [i32; 3] = [1, 2, 3];
/// Output ports: unbounded, capped at 3, single.
const OUTPUTS: [i32; 3] = [4, 5, 6];

fn mixed_node(id: i32) -> Node<()> {
    Node::new(id, "mixed", Point::new(id as f32 * 150.0, 0.0), NODE_SIZE, ())
        .with_input(Port::input(1, "single"))
        .with_input(Port::input(2, "pair").multi(true).max_connections(2))
        .with_input(Port::input(3, "any").multi(true))
        .with_output(Port::output(4, "any"))
        .with_output(Port::output(5, "three").max_connections(3))
        .with_output(Port::output(6, "single").multi(false))
}

fn assert_within_limits(g: &Graph<()>) {
    for node in g.nodes() {
        for port in node.ports() {
            let Some(limit) = port.connection_limit() else {
                continue;
            };
            let outgoing = g.connections().filter(|c| c.source() == (node.id, port.id)).count();
            let incoming = g.connections().filter(|c| c.target() == (node.id, port.id)).count();
            assert!(
                outgoing <= limit && incoming <= limit,
                "port {} on node {} holds {} out / {} in, limit {}",
                port.id,
                node.id,
                outgoing,
                incoming,
                limit
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// However connections are attempted, no port ends up past its limit.
    #[test]
    fn prop_ports_never_exceed_capacity(
        attempts in prop::collection::vec((1i32..=5, 0usize..3, 1i32..=5, 0usize..3), 0..80),
    ) {
        let mut g: Graph<()> = Graph::new();
        for id in 1..=5 {
            g.add_node(mixed_node(id)).unwrap();
        }
        for (i, &(from, out, to, input)) in attempts.iter().enumerate() {
            let connection = Connection::new(i as i32 + 1, (from, OUTPUTS[out]), (to, INPUTS[input]));
            let before = g.connection_count();
            match g.add_connection(connection) {
                Ok(()) => {
                    prop_assert!(g.connection_count() <= before + 1);
                }
                Err(GraphError::Capacity { .. }) => {
                    prop_assert_eq!(g.connection_count(), before);
                }
                Err(other) => {
                    prop_assert!(false, "unexpected error {:?}", other);
                }
            }
            assert_within_limits(&g);
        }
    }
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn test_mutations_emit_in_order() {
    let mut g: Graph<()> = Graph::new();
    let events = record_events(&mut g);

    g.add_node(node(1, 0.0, 0.0)).unwrap();
    g.add_node(node(2, 200.0, 0.0)).unwrap();
    g.add_connection(link(1, 1, 2)).unwrap();
    g.set_node_position(1, Point::new(10.0, 10.0)).unwrap();
    g.set_node_visible(2, false).unwrap();
    g.remove_connection(1).unwrap();

    assert_eq!(
        events.borrow().as_slice(),
        &[
            GraphEvent::NodeAdded(1),
            GraphEvent::NodeAdded(2),
            GraphEvent::ConnectionAdded(1),
            GraphEvent::NodeMoved {
                id: 1,
                position: Point::new(10.0, 10.0),
            },
            GraphEvent::NodeChanged(2),
            GraphEvent::ConnectionRemoved(1),
        ]
    );
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let mut g: Graph<()> = Graph::new();
    let events = std::rc::Rc::new(std::cell::RefCell::new(0));
    let counter = std::rc::Rc::clone(&events);
    let sub = g.subscribe(move |_| *counter.borrow_mut() += 1);

    g.add_node(node(1, 0.0, 0.0)).unwrap();
    assert!(g.unsubscribe(sub));
    g.add_node(node(2, 0.0, 0.0)).unwrap();
    assert_eq!(*events.borrow(), 1);
    assert!(!g.unsubscribe(sub));
}

#[test]
fn test_route_follows_moved_node() {
    let mut g = pipeline();
    let before = g.route(1).unwrap();
    assert_point_eq(before.end(), Point::new(200.0, 25.0));

    g.move_node_by(2, Point::new(0.0, 100.0)).unwrap();
    let after = g.route(1).unwrap();
    assert_point_eq(after.start(), Point::new(100.0, 25.0));
    assert_point_eq(after.end(), Point::new(200.0, 125.0));
}
