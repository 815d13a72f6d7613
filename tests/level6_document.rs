//! Level 6: Persistence Tests
//!
//! Graph documents survive a JSON round trip with their geometry, payloads,
//! annotations and unknown fields intact, and configs load from partial JSON.

mod common;

use common::*;
use node_graph_core::{
    Annotation, ConfigError, Connection, DocumentError, EditorConfig, Graph, GraphDocument,
    GraphError, GroupBehavior, Node, NodeEditor, Point, Port, Rect, Size, Viewport,
};
use proptest::prelude::*;
use serde_json::{json, Value};

fn build(positions: &[(i32, i32)], edges: &[(usize, usize)]) -> Graph<Value> {
    let mut g = Graph::new();
    for (i, &(x, y)) in positions.iter().enumerate() {
        let id = i as i32 + 1;
        g.add_node(
            Node::new(id, "op", Point::new(x as f32, y as f32), NODE_SIZE, json!({ "index": i }))
                .with_input(Port::input(IN, "in").multi(true))
                .with_output(Port::output(OUT, "out")),
        )
        .unwrap();
    }
    for (i, &(s, t)) in edges.iter().enumerate() {
        g.add_connection(Connection::new(
            i as i32 + 1,
            (s as i32 + 1, OUT),
            (t as i32 + 1, IN),
        ))
        .unwrap();
    }
    g
}

/// Node positions plus connection endpoints as indices into the positions.
fn graph_strategy() -> impl Strategy<Value = (Vec<(i32, i32)>, Vec<(usize, usize)>)> {
    (1usize..=50).prop_flat_map(|n| {
        (
            prop::collection::vec((-5000i32..5000, -5000i32..5000), n),
            prop::collection::vec((0..n, 0..n), 0..=100),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Decoding an encoded graph rebuilds the same entities, in the same
    /// order, with the same routes.
    #[test]
    fn prop_document_round_trip(
        (positions, edges) in graph_strategy(),
        pan in (-1000i32..1000, -1000i32..1000),
        zoom_steps in 1u32..16,
    ) {
        let graph = build(&positions, &edges);
        let viewport = Viewport::new(
            Point::new(pan.0 as f32, pan.1 as f32),
            zoom_steps as f32 * 0.25,
        );
        let doc = GraphDocument::encode(&graph, viewport);
        let json = doc.to_json().unwrap();

        let (decoded, decoded_viewport) = GraphDocument::<Value>::from_json(&json)
            .unwrap()
            .decode(EditorConfig::default())
            .unwrap();

        prop_assert_eq!(decoded_viewport, viewport);
        prop_assert_eq!(decoded.node_count(), positions.len());
        prop_assert_eq!(decoded.connection_count(), edges.len());
        prop_assert_eq!(&GraphDocument::encode(&decoded, decoded_viewport), &doc);
        for c in graph.connections() {
            prop_assert_eq!(decoded.route(c.id), graph.route(c.id));
        }
    }
}

// ============================================================================
// Editor save and load
// ============================================================================

const SAVED: &str = r#"{
    "nodes": [
        { "id": 1, "type": "source", "position": { "x": 0, "y": 0 },
          "size": { "width": 100, "height": 50 }, "data": { "label": "in" },
          "outputPorts": [{ "id": 2, "name": "out", "position": "right", "type": "source" }] },
        { "id": 2, "type": "sink", "position": { "x": 300, "y": 0 },
          "size": { "width": 100, "height": 50 }, "data": null, "zIndex": 3,
          "inputPorts": [{ "id": 1, "name": "in", "position": "left", "type": "target",
                           "multiConnections": false }],
          "collapsed": true }
    ],
    "connections": [
        { "id": 4, "sourceNodeId": 1, "sourcePortId": 2, "targetNodeId": 2, "targetPortId": 1,
          "style": "step", "label": "data" }
    ],
    "annotations": [
        { "id": 9, "kind": "group", "position": { "x": -20, "y": -20 },
          "size": { "width": 460, "height": 100 }, "title": "all",
          "behavior": { "mode": "parent", "members": [1, 2] } }
    ],
    "viewport": { "x": 40, "y": 30, "zoom": 0.5 },
    "schemaVersion": 2
}"#;

#[test]
fn test_editor_load_restores_state() {
    let editor: NodeEditor = NodeEditor::load_json(SAVED, EditorConfig::default()).unwrap();
    let g = editor.graph();
    assert_eq!(g.node_count(), 2);
    assert_eq!(g.node(2).unwrap().z_index, 3);
    assert_eq!(g.node(1).unwrap().data["label"], "in");
    assert_eq!(g.connection(4).unwrap().label.as_deref(), Some("data"));
    assert_eq!(g.group_members(9).unwrap(), vec![1, 2]);
    assert_eq!(
        editor.viewport().viewport(),
        Viewport::new(Point::new(40.0, 30.0), 0.5)
    );
}

#[test]
fn test_editor_save_keeps_unknown_fields() {
    let mut editor: NodeEditor = NodeEditor::load_json(SAVED, EditorConfig::default()).unwrap();
    editor.graph_mut().move_annotation_by(9, Point::new(10.0, 0.0)).unwrap();

    let saved: Value = serde_json::from_str(&editor.save_json().unwrap()).unwrap();
    assert_eq!(saved["schemaVersion"], 2);
    assert_eq!(saved["nodes"][1]["collapsed"], true);
    assert_eq!(saved["nodes"][1]["position"]["x"], 310.0);
    assert_eq!(saved["annotations"][0]["behavior"]["mode"], "parent");
    assert_eq!(saved["connections"][0]["style"], "step");
    // Selection is view state and never persisted
    assert!(saved["nodes"][0].get("isSelected").is_none());
}

#[test]
fn test_typed_payload_round_trip() {
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Op {
        kind: String,
        weight: u32,
    }

    let mut g: Graph<Op> = Graph::new();
    g.add_node(Node::new(
        1,
        "op",
        Point::ZERO,
        Size::new(80.0, 40.0),
        Op { kind: "add".into(), weight: 3 },
    ))
    .unwrap();
    let json = GraphDocument::encode(&g, Viewport::default()).to_json().unwrap();
    let (back, _) = GraphDocument::<Op>::from_json(&json)
        .unwrap()
        .decode(EditorConfig::default())
        .unwrap();
    assert_eq!(back.node(1).unwrap().data.weight, 3);
}

#[test]
fn test_annotations_round_trip() {
    let mut g = pipeline();
    g.add_annotation(Annotation::sticky(1, Rect::new(0.0, 100.0, 120.0, 80.0), "todo"))
        .unwrap();
    g.add_annotation(Annotation::marker(2, Point::new(450.0, -10.0), "warning"))
        .unwrap();
    g.add_annotation(Annotation::group(
        3,
        Rect::new(-10.0, -10.0, 320.0, 70.0),
        "front",
        GroupBehavior::Bounds,
    ))
    .unwrap();

    let doc = GraphDocument::encode(&g, Viewport::default());
    let (back, _) = GraphDocument::<()>::from_json(&doc.to_json().unwrap())
        .unwrap()
        .decode(EditorConfig::default())
        .unwrap();
    let kinds: Vec<_> = back.annotations().map(|a| a.kind.clone()).collect();
    let original: Vec<_> = g.annotations().map(|a| a.kind.clone()).collect();
    assert_eq!(kinds, original);
    assert_eq!(back.group_members(3).unwrap(), vec![1, 2]);
}

// ============================================================================
// Rejected input
// ============================================================================

#[test]
fn test_two_connections_on_single_input_rejected() {
    let doc = json!({
        "nodes": [
            { "id": 1, "type": "a", "position": { "x": 0, "y": 0 },
              "size": { "width": 10, "height": 10 }, "data": null,
              "outputPorts": [{ "id": 1, "type": "source" }] },
            { "id": 2, "type": "b", "position": { "x": 50, "y": 0 },
              "size": { "width": 10, "height": 10 }, "data": null,
              "inputPorts": [{ "id": 1, "type": "target", "multiConnections": false }] }
        ],
        "connections": [
            { "id": 1, "sourceNodeId": 1, "sourcePortId": 1, "targetNodeId": 2, "targetPortId": 1 },
            { "id": 2, "sourceNodeId": 1, "sourcePortId": 1, "targetNodeId": 2, "targetPortId": 1 }
        ]
    });
    let result = NodeEditor::<Value>::load_json(&doc.to_string(), EditorConfig::default());
    assert!(matches!(
        result,
        Err(DocumentError::Graph(GraphError::Capacity { node: 2, port: 1, limit: 1 }))
    ));
}

#[test]
fn test_malformed_document() {
    assert!(matches!(
        NodeEditor::<Value>::load_json("{ not json", EditorConfig::default()),
        Err(DocumentError::Json(_))
    ));
    assert!(matches!(
        NodeEditor::<Value>::load_json(r#"{ "nodes": [{ "id": "one" }] }"#, EditorConfig::default()),
        Err(DocumentError::Json(_))
    ));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_partial_config_fills_defaults() {
    let config = EditorConfig::from_json_str(r#"{ "router": { "cornerRadius": 4 } }"#).unwrap();
    assert_eq!(config.router.corner_radius, 4.0);
    assert_eq!(config.router.port_extension, EditorConfig::default().router.port_extension);
    assert_eq!(config.viewport, EditorConfig::default().viewport);
}

#[test]
fn test_invalid_config_rejected() {
    assert!(matches!(
        EditorConfig::from_json_str(r#"{ "router": { "curvature": 2.5 } }"#),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        EditorConfig::from_json_str(r#"{ "viewport": { "minZoom": 5, "maxZoom": 1 } }"#),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        EditorConfig::from_json_str(r#"{ "router": 7 }"#),
        Err(ConfigError::Json(_))
    ));
}
