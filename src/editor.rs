//! High-level editor facade.
//!
//! [`NodeEditor`] pairs a [`Graph`] with a [`ViewportController`] and takes
//! screen-space input from the host: hit testing converts screen points to
//! canvas coordinates before querying the graph, and tolerances given in
//! pixels are scaled by the zoom so they feel the same at every zoom level.
//!
//! # Example
//!
//! ```
//! use node_graph_core::{EditorConfig, Node, NodeEditor, Point, Port, Size};
//!
//! let mut editor: NodeEditor<()> = NodeEditor::new(EditorConfig::default());
//! editor.set_view_size(Size::new(800.0, 600.0));
//! editor
//!     .graph_mut()
//!     .add_node(Node::new(1, "source", Point::ZERO, Size::new(100.0, 50.0), ())
//!         .with_output(Port::output(1, "out")))
//!     .unwrap();
//!
//! editor.fit_to_view(50.0);
//! assert_eq!(editor.node_at_screen(Point::new(400.0, 300.0)), Some(1));
//! ```

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::animation::Easing;
use crate::config::EditorConfig;
use crate::document::GraphDocument;
use crate::error::{DocumentError, EntityRef, GraphError, Result};
use crate::geometry::{Point, Rect, Size};
use crate::graph::Graph;
use crate::model::{Connection, ConnectionId, ConnectionStyle, Extras, NodeId, PortId};
use crate::path::RoutedPath;
use crate::routing::Anchor;
use crate::viewport::{Viewport, ViewportController};

/// A connection being dragged out of a port.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionDrag {
    /// Node the drag started on
    pub node: NodeId,
    /// Port the drag started on
    pub port: PortId,
    /// Current pointer position in canvas coordinates
    pub cursor: Point,
}

/// A graph together with the camera that looks at it.
///
/// Adds screen-space hit tests, navigation, the connection-drag workflow and
/// save/load on top of [`Graph`].
pub struct NodeEditor<D = serde_json::Value> {
    graph: Graph<D>,
    viewport: ViewportController,
    drag: Option<ConnectionDrag>,
    /// Unknown top-level document fields, written back on save
    document_extra: Extras,
}

impl<D> NodeEditor<D> {
    /// Empty editor.
    pub fn new(config: EditorConfig) -> Self {
        Self {
            graph: Graph::with_config(config),
            viewport: ViewportController::new(config.viewport),
            drag: None,
            document_extra: Extras::new(),
        }
    }

    /// Wrap an existing graph; the viewport uses the graph's config.
    pub fn with_graph(graph: Graph<D>, viewport: Viewport) -> Self {
        let mut controller = ViewportController::new(graph.config().viewport);
        controller.set_viewport(viewport);
        Self {
            graph,
            viewport: controller,
            drag: None,
            document_extra: Extras::new(),
        }
    }

    pub fn graph(&self) -> &Graph<D> {
        &self.graph
    }

    /// Mutable access to the graph. Observers still see every change.
    pub fn graph_mut(&mut self) -> &mut Graph<D> {
        &mut self.graph
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportController {
        &mut self.viewport
    }

    /// Tell the editor how large the drawing area is, in screen pixels.
    pub fn set_view_size(&mut self, size: Size) {
        self.viewport.set_size(size);
    }

    // ========================================================================
    // Screen-space queries
    // ========================================================================

    /// Topmost visible node under a screen point.
    pub fn node_at_screen(&self, point: Point) -> Option<NodeId> {
        self.graph.node_at(self.viewport.screen_to_canvas(point))
    }

    /// Connection under the pointer; `tolerance` is in screen pixels.
    pub fn connection_at_screen(&self, point: Point, tolerance: f32) -> Option<ConnectionId> {
        let canvas = self.viewport.screen_to_canvas(point);
        self.graph.connection_at(canvas, tolerance / self.viewport.zoom())
    }

    /// Closest port anchor within `radius` screen pixels.
    pub fn port_at_screen(&self, point: Point, radius: f32) -> Option<(NodeId, PortId)> {
        let canvas = self.viewport.screen_to_canvas(point);
        let radius = radius / self.viewport.zoom();
        let mut best: Option<(f32, (NodeId, PortId))> = None;
        for node in self.graph.nodes().filter(|n| n.is_visible) {
            for port in node.ports() {
                let Some((anchor, _)) = node.anchor(port.id) else {
                    continue;
                };
                let d = anchor.distance(canvas);
                if d <= radius && best.map_or(true, |(bd, _)| d < bd) {
                    best = Some((d, (node.id, port.id)));
                }
            }
        }
        best.map(|(_, hit)| hit)
    }

    /// Box selection helper: nodes overlapping a screen rectangle.
    pub fn nodes_in_screen_rect(&self, rect: Rect) -> Vec<NodeId> {
        self.graph
            .nodes_in_rect(self.viewport.screen_rect_to_canvas(rect))
    }

    /// Connections whose path touches a screen rectangle.
    pub fn connections_in_screen_rect(&self, rect: Rect) -> Vec<ConnectionId> {
        self.graph
            .connections_in_rect(self.viewport.screen_rect_to_canvas(rect))
    }

    /// Nodes the host needs to draw for the current viewport.
    pub fn visible_nodes(&self) -> Vec<NodeId> {
        self.graph.visible_nodes(self.viewport.visible_rect())
    }

    /// Connections the host needs to draw for the current viewport.
    pub fn visible_connections(&self) -> Vec<ConnectionId> {
        self.graph.visible_connections(self.viewport.visible_rect())
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Centre the content bounds without changing zoom; false when empty.
    pub fn center_viewport(&mut self) -> bool {
        let Some(bounds) = self.graph.content_bounds() else {
            return false;
        };
        self.viewport.center_on(bounds.center());
        true
    }

    /// Fit every visible node; false when there is nothing to fit.
    pub fn fit_to_view(&mut self, padding: f32) -> bool {
        let Some(bounds) = self.graph.content_bounds() else {
            return false;
        };
        self.viewport.fit_rect(bounds, padding);
        true
    }

    /// Fit the selected nodes; false when nothing is selected.
    pub fn fit_selected_nodes(&mut self, padding: f32) -> bool {
        let Some(bounds) = self.graph.bounds_of(self.graph.selected_nodes()) else {
            return false;
        };
        self.viewport.fit_rect(bounds, padding);
        true
    }

    /// Glide to centre a node at the current zoom.
    pub fn animate_to_node(&mut self, id: NodeId, duration: Duration, easing: Easing) -> Result<()> {
        let node = self
            .graph
            .node(id)
            .ok_or(GraphError::NotFound(EntityRef::Node(id)))?;
        let center = node.rect().center();
        self.viewport.animate_to_position(center, duration, easing);
        Ok(())
    }

    /// Animate to show all content; false when the graph is empty.
    pub fn animate_to_fit(&mut self, padding: f32, duration: Duration, easing: Easing) -> bool {
        let Some(bounds) = self.graph.content_bounds() else {
            return false;
        };
        self.viewport.animate_to_bounds(bounds, padding, duration, easing);
        true
    }

    /// Drive viewport animations; returns true while one is running.
    pub fn advance(&mut self, dt: Duration) -> bool {
        self.viewport.advance(dt)
    }

    // ========================================================================
    // Connection drag
    // ========================================================================

    /// Begin dragging a new connection out of a port.
    pub fn start_connection_drag(&mut self, node: NodeId, port: PortId) -> Result<()> {
        self.graph.check_start(node, port)?;
        let cursor = self
            .graph
            .anchor(node, port)
            .map(|a| a.point)
            .unwrap_or(Point::ZERO);
        debug!(node, port, "connection drag started");
        self.drag = Some(ConnectionDrag { node, port, cursor });
        Ok(())
    }

    /// The drag in progress, if any.
    pub fn connection_drag(&self) -> Option<ConnectionDrag> {
        self.drag
    }

    /// Track the pointer (screen coordinates) during a drag.
    pub fn update_connection_drag(&mut self, screen: Point) {
        let cursor = self.viewport.screen_to_canvas(screen);
        if let Some(drag) = self.drag.as_mut() {
            drag.cursor = cursor;
        }
    }

    /// Path from the dragged port to the pointer, for the rubber band.
    pub fn connection_drag_preview(&self) -> Option<RoutedPath> {
        let drag = self.drag?;
        let from = self.graph.anchor(drag.node, drag.port)?;
        let to = Anchor::new(
            drag.cursor,
            from.side.opposite(),
            Rect::from_origin_size(drag.cursor, Size::default()),
        );
        Some(self.graph.router().route(&from, &to, ConnectionStyle::default(), &[]))
    }

    /// Drop the drag on a port and create the connection.
    ///
    /// A drag that started on a port which can only receive becomes the
    /// target end. Returns the id of the new connection; the drag ends either
    /// way.
    pub fn complete_connection_drag(&mut self, node: NodeId, port: PortId) -> Result<ConnectionId> {
        let drag = self
            .drag
            .take()
            .ok_or(GraphError::NotFound(EntityRef::Port { node, port }))?;
        let start = (drag.node, drag.port);
        let starts_as_target = self
            .graph
            .node(drag.node)
            .and_then(|n| n.port(drag.port))
            .is_some_and(|p| !p.port_type.can_source());
        let id = self.next_connection_id();
        let connection = if starts_as_target {
            Connection::new(id, (node, port), start)
        } else {
            Connection::new(id, start, (node, port))
        };
        self.graph.add_connection(connection)?;
        debug!(connection = id, "connection drag completed");
        Ok(id)
    }

    /// Abandon the drag without touching the graph.
    pub fn cancel_connection_drag(&mut self) {
        if self.drag.take().is_some() {
            debug!("connection drag cancelled");
        }
    }

    fn next_connection_id(&self) -> ConnectionId {
        self.graph.connections().map(|c| c.id).max().map_or(1, |max| max + 1)
    }
}

impl<D: Clone> NodeEditor<D> {
    /// Current state as a persistable document.
    pub fn to_document(&self) -> GraphDocument<D> {
        let mut doc = GraphDocument::encode(&self.graph, self.viewport.viewport());
        doc.extra = self.document_extra.clone();
        doc
    }
}

impl<D> NodeEditor<D> {
    /// Build an editor from a decoded document, keeping its unknown fields for the next save.
    pub fn from_document(doc: GraphDocument<D>, config: EditorConfig) -> std::result::Result<Self, DocumentError> {
        let extra = doc.extra.clone();
        let (graph, viewport) = doc.decode(config)?;
        let mut editor = Self::with_graph(graph, viewport);
        editor.document_extra = extra;
        Ok(editor)
    }
}

impl<D: Clone + Serialize> NodeEditor<D> {
    /// Serialize the graph and viewport.
    pub fn save_json(&self) -> std::result::Result<String, DocumentError> {
        self.to_document().to_json()
    }
}

impl<D: DeserializeOwned> NodeEditor<D> {
    /// Parse and validate a saved document.
    pub fn load_json(json: &str, config: EditorConfig) -> std::result::Result<Self, DocumentError> {
        Self::from_document(GraphDocument::from_json(json)?, config)
    }
}
