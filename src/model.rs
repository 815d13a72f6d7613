//! Entities owned by a [`Graph`](crate::graph::Graph): nodes, ports and connections.
//!
//! Entities only ever reference each other by id. The serde derives on these
//! types are the persisted document schema (camelCase JSON); unknown fields
//! are kept in the `extra` maps so they survive a decode/encode round trip.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect, Side, Size};

/// Caller-assigned node id, unique within a graph.
pub type NodeId = i32;
/// Port id, unique within its node.
pub type PortId = i32;
pub type ConnectionId = i32;
pub type AnnotationId = i32;

/// Opaque pass-through fields the core never interprets.
pub type Extras = serde_json::Map<String, serde_json::Value>;

/// Which connection roles a port can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortType {
    Source,
    Target,
    #[default]
    Both,
}

impl PortType {
    /// Whether a connection may leave this port.
    pub fn can_source(self) -> bool {
        matches!(self, PortType::Source | PortType::Both)
    }

    /// Whether a connection may arrive at this port.
    pub fn can_target(self) -> bool {
        matches!(self, PortType::Target | PortType::Both)
    }
}

/// Visual shape of a port. Persisted, never used by core behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortShape {
    #[default]
    Circle,
    Square,
    Diamond,
    Triangle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Port {
    pub id: PortId,
    pub name: String,
    /// Side of the node the port sits on
    pub position: Side,
    /// Distance along the side from its midpoint
    pub offset: f32,
    #[serde(rename = "type")]
    pub port_type: PortType,
    /// Accept more than one connection; single ports replace their old one
    pub multi_connections: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
    /// Refuse every new connection when false
    pub is_connectable: bool,
    pub shape: PortShape,
    pub size: f32,
}

impl Default for Port {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            position: Side::Right,
            offset: 0.0,
            port_type: PortType::Both,
            multi_connections: true,
            max_connections: None,
            is_connectable: true,
            shape: PortShape::Circle,
            size: 10.0,
        }
    }
}

impl Port {
    /// Target-only port on the left side holding a single connection.
    pub fn input(id: PortId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            position: Side::Left,
            port_type: PortType::Target,
            multi_connections: false,
            ..Default::default()
        }
    }

    /// Source-only port on the right side with unlimited fan-out.
    pub fn output(id: PortId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            position: Side::Right,
            port_type: PortType::Source,
            multi_connections: true,
            ..Default::default()
        }
    }

    pub fn on_side(mut self, side: Side) -> Self {
        self.position = side;
        self
    }

    pub fn with_offset(mut self, offset: f32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_type(mut self, port_type: PortType) -> Self {
        self.port_type = port_type;
        self
    }

    /// Allow several connections on the port.
    pub fn multi(mut self, multi: bool) -> Self {
        self.multi_connections = multi;
        self
    }

    /// Cap a multi port. Has no effect on single ports.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn connectable(mut self, connectable: bool) -> Self {
        self.is_connectable = connectable;
        self
    }

    /// Number of connections this port may hold per direction, `None` if unbounded.
    pub fn connection_limit(&self) -> Option<usize> {
        if self.multi_connections {
            self.max_connections
        } else {
            Some(self.max_connections.map_or(1, |m| m.min(1)))
        }
    }
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn is_true(v: &bool) -> bool {
    *v
}

pub(crate) fn is_zero(v: &i32) -> bool {
    *v == 0
}

/// A node on the canvas, generic over the consumer's payload `D`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node<D> {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Top-left corner in canvas coordinates
    pub position: Point,
    pub size: Size,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub z_index: i32,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub is_visible: bool,
    #[serde(skip)]
    pub is_selected: bool,
    #[serde(default)]
    pub input_ports: Vec<Port>,
    #[serde(default)]
    pub output_ports: Vec<Port>,
    pub data: D,
    #[serde(flatten)]
    pub extra: Extras,
}

impl<D> Node<D> {
    /// Visible node with no ports.
    pub fn new(id: NodeId, node_type: impl Into<String>, position: Point, size: Size, data: D) -> Self {
        Self {
            id,
            node_type: node_type.into(),
            position,
            size,
            z_index: 0,
            is_visible: true,
            is_selected: false,
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            data,
            extra: Extras::new(),
        }
    }

    pub fn with_input(mut self, port: Port) -> Self {
        self.input_ports.push(port);
        self
    }

    pub fn with_output(mut self, port: Port) -> Self {
        self.output_ports.push(port);
        self
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    /// Bounding rectangle in canvas coordinates.
    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }

    /// All ports, inputs first, in declaration order.
    pub fn ports(&self) -> impl Iterator<Item = &Port> + '_ {
        self.input_ports.iter().chain(self.output_ports.iter())
    }

    /// Look up a port on either side.
    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports().find(|p| p.id == id)
    }

    /// Canvas point and facing side where a connection meets the port.
    pub fn anchor(&self, port_id: PortId) -> Option<(Point, Side)> {
        let port = self.port(port_id)?;
        Some((port.position.anchor_on(&self.rect(), port.offset), port.position))
    }

    /// First port id that appears twice across the input and output lists.
    pub(crate) fn duplicate_port_id(&self) -> Option<PortId> {
        let mut seen = std::collections::HashSet::new();
        self.ports().map(|p| p.id).find(|id| !seen.insert(*id))
    }
}

/// Path style of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStyle {
    Straight,
    #[default]
    Bezier,
    Step,
    SmoothStep,
    /// Orthogonal path through user-authored control points
    Editable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub source_node_id: NodeId,
    pub source_port_id: PortId,
    pub target_node_id: NodeId,
    pub target_port_id: PortId,
    #[serde(default)]
    pub style: ConnectionStyle,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub control_points: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_label: Option<String>,
    #[serde(skip)]
    pub is_selected: bool,
    #[serde(flatten)]
    pub extra: Extras,
}

impl Connection {
    /// Create a connection from `(node, port)` to `(node, port)`.
    pub fn new(id: ConnectionId, source: (NodeId, PortId), target: (NodeId, PortId)) -> Self {
        Self {
            id,
            source_node_id: source.0,
            source_port_id: source.1,
            target_node_id: target.0,
            target_port_id: target.1,
            style: ConnectionStyle::default(),
            control_points: Vec::new(),
            label: None,
            start_label: None,
            end_label: None,
            is_selected: false,
            extra: Extras::new(),
        }
    }

    pub fn with_style(mut self, style: ConnectionStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_control_points(mut self, points: Vec<Point>) -> Self {
        self.control_points = points;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn source(&self) -> (NodeId, PortId) {
        (self.source_node_id, self.source_port_id)
    }

    pub fn target(&self) -> (NodeId, PortId) {
        (self.target_node_id, self.target_port_id)
    }

    pub fn touches_node(&self, node_id: NodeId) -> bool {
        self.source_node_id == node_id || self.target_node_id == node_id
    }

    /// Source and target are the same node.
    pub fn is_self_loop(&self) -> bool {
        self.source_node_id == self.target_node_id
    }
}
