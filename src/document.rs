//! Persisted graph document.
//!
//! The JSON shape is camelCase:
//!
//! ```json
//! {
//!   "nodes": [{ "id": 1, "type": "source", "position": { "x": 0, "y": 0 },
//!               "size": { "width": 100, "height": 50 }, "data": {},
//!               "inputPorts": [], "outputPorts": [] }],
//!   "connections": [{ "id": 1, "sourceNodeId": 1, "sourcePortId": 2,
//!                     "targetNodeId": 2, "targetPortId": 1 }],
//!   "viewport": { "x": 0, "y": 0, "zoom": 1 }
//! }
//! ```
//!
//! Unknown fields on the document, its nodes and its connections are kept in
//! `extra` maps and written back out unchanged.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::annotation::Annotation;
use crate::config::EditorConfig;
use crate::error::DocumentError;
use crate::geometry::Point;
use crate::graph::Graph;
use crate::model::{Connection, Extras, Node};
use crate::viewport::Viewport;

/// Viewport as persisted: pan offset and zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportState {
    /// Horizontal pan in screen pixels
    pub x: f32,
    /// Vertical pan in screen pixels
    pub y: f32,
    /// Zoom factor, clamped to the editor's limits on load
    pub zoom: f32,
}

impl Default for ViewportState {
    fn default() -> Self {
        Viewport::default().into()
    }
}

impl From<Viewport> for ViewportState {
    fn from(v: Viewport) -> Self {
        Self {
            x: v.pan.x,
            y: v.pan.y,
            zoom: v.zoom,
        }
    }
}

impl From<ViewportState> for Viewport {
    fn from(v: ViewportState) -> Self {
        Viewport::new(Point::new(v.x, v.y), v.zoom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "D: Deserialize<'de>"))]
pub struct GraphDocument<D = serde_json::Value> {
    #[serde(default)]
    pub nodes: Vec<Node<D>>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub viewport: ViewportState,
    #[serde(flatten)]
    pub extra: Extras,
}

impl<D: Clone> GraphDocument<D> {
    /// Snapshot a graph and viewport.
    pub fn encode(graph: &Graph<D>, viewport: Viewport) -> Self {
        Self {
            nodes: graph.nodes().cloned().collect(),
            connections: graph.connections().cloned().collect(),
            annotations: graph.annotations().cloned().collect(),
            viewport: viewport.into(),
            extra: Extras::new(),
        }
    }
}

impl<D> GraphDocument<D> {
    /// Build a graph, replaying every entity through the checked mutations.
    ///
    /// A document that breaks a graph invariant (duplicate ids, dangling
    /// endpoints, two connections on a single-connection port) is rejected.
    pub fn decode(self, config: EditorConfig) -> Result<(Graph<D>, Viewport), DocumentError> {
        let mut graph = Graph::with_config(config);
        for node in self.nodes {
            graph.add_node(node)?;
        }
        for connection in self.connections {
            graph.restore_connection(connection)?;
        }
        for annotation in self.annotations {
            graph.add_annotation(annotation)?;
        }
        Ok((graph, self.viewport.into()))
    }
}

impl<D: Serialize> GraphDocument<D> {
    /// Serialize as pretty-printed JSON. Unknown fields read in earlier are written back.
    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl<D: DeserializeOwned> GraphDocument<D> {
    /// Parse a document without validating it.
    ///
    /// Structural checks such as duplicate ids and dangling connections happen
    /// in [`GraphDocument::decode`].
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }
}
