//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use node_graph_core::{
    Connection, ConnectionId, Graph, GraphEvent, Node, NodeId, Point, Port, PortType, Side, Size,
};

/// Default node footprint used by the builders.
pub const NODE_SIZE: Size = Size::new(100.0, 50.0);

/// Input port id on nodes built by [`node`].
pub const IN: i32 = 1;
/// Output port id on nodes built by [`node`].
pub const OUT: i32 = 2;

/// Node with one single-connection input on the left and one output on the right.
pub fn node(id: NodeId, x: f32, y: f32) -> Node<()> {
    Node::new(id, "op", Point::new(x, y), NODE_SIZE, ())
        .with_input(Port::input(IN, "in"))
        .with_output(Port::output(OUT, "out"))
}

/// Node whose input accepts any number of connections.
pub fn fan_in_node(id: NodeId, x: f32, y: f32) -> Node<()> {
    Node::new(id, "merge", Point::new(x, y), NODE_SIZE, ())
        .with_input(Port::input(IN, "in").multi(true))
        .with_output(Port::output(OUT, "out"))
}

/// Node with two bidirectional ports on the given sides, offset so they
/// never share an anchor.
pub fn loop_node(id: NodeId, source_side: Side, target_side: Side) -> Node<()> {
    let port = |id, side, offset| Port {
        id,
        port_type: PortType::Both,
        position: side,
        offset,
        ..Port::default()
    };
    Node::new(id, "loop", Point::new(0.0, 0.0), NODE_SIZE, ())
        .with_output(port(LOOP_OUT, source_side, -10.0))
        .with_input(port(LOOP_IN, target_side, 10.0))
}

pub const LOOP_OUT: i32 = 10;
pub const LOOP_IN: i32 = 11;

/// Connect `OUT` of `from` to `IN` of `to`.
pub fn link(id: ConnectionId, from: NodeId, to: NodeId) -> Connection {
    Connection::new(id, (from, OUT), (to, IN))
}

/// `Source -> Mid -> Sink` laid out on a horizontal line.
pub fn pipeline() -> Graph<()> {
    let mut g = Graph::new();
    g.add_node(node(1, 0.0, 0.0)).unwrap();
    g.add_node(node(2, 200.0, 0.0)).unwrap();
    g.add_node(node(3, 400.0, 0.0)).unwrap();
    g.add_connection(link(1, 1, 2)).unwrap();
    g.add_connection(link(2, 2, 3)).unwrap();
    g
}

/// Records every event a graph emits.
pub fn record_events(graph: &mut Graph<()>) -> Rc<RefCell<Vec<GraphEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    graph.subscribe(move |e| sink.borrow_mut().push(e.clone()));
    events
}

pub fn assert_point_eq(actual: Point, expected: Point) {
    assert!(
        (actual.x - expected.x).abs() < 1e-3 && (actual.y - expected.y).abs() < 1e-3,
        "expected {:?}, got {:?}",
        expected,
        actual
    );
}
