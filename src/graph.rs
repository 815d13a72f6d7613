//! The graph model: single owner of nodes, connections and annotations.
//!
//! Every mutation goes through [`Graph`] so derived state stays in step:
//! node cells in the spatial index are updated in the same call, the
//! geometry version of the node is bumped (which invalidates memoized routes
//! of the touching connections) and those connections are marked dirty in the
//! index. Observers registered with [`Graph::subscribe`] see one
//! [`GraphEvent`] per committed mutation.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::analysis::NodePosition;
use crate::annotation::Annotation;
use crate::config::EditorConfig;
use crate::error::{EntityRef, GraphError, PortRole, Result};
use crate::geometry::{Point, Rect, Size};
use crate::model::{AnnotationId, Connection, ConnectionId, ConnectionStyle, Node, NodeId, Port, PortId};
use crate::path::RoutedPath;
use crate::routing::{control_point_insert_index, Anchor, ConnectionRouter};
use crate::spatial::SpatialIndex;
use crate::validation::{CompleteContext, ConnectionValidator, StartContext};

/// Handle returned by [`Graph::subscribe`].
pub type SubscriptionId = u64;

/// Notification emitted synchronously after each committed mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    NodeAdded(NodeId),
    NodeRemoved {
        id: NodeId,
        /// Connections removed along with the node
        removed_connections: Vec<ConnectionId>,
    },
    NodeMoved {
        id: NodeId,
        position: Point,
    },
    NodeResized {
        id: NodeId,
        size: Size,
    },
    /// Visibility, z-order or payload changed
    NodeChanged(NodeId),
    ConnectionAdded(ConnectionId),
    /// A connection was added and displaced the connections holding its
    /// single-connection ports
    ConnectionReplaced {
        added: ConnectionId,
        replaced: Vec<ConnectionId>,
    },
    ConnectionRemoved(ConnectionId),
    /// Style, labels or control points changed
    ConnectionChanged(ConnectionId),
    AnnotationAdded(AnnotationId),
    AnnotationRemoved(AnnotationId),
    AnnotationChanged(AnnotationId),
    SelectionChanged,
    Cleared,
}

type Observer = Box<dyn FnMut(&GraphEvent)>;

/// (source node version, target node version, connection version)
type RouteKey = (u64, u64, u64);

struct CachedRoute {
    key: RouteKey,
    path: Rc<RoutedPath>,
}

/// Node graph generic over the node payload `D`.
pub struct Graph<D = serde_json::Value> {
    pub(crate) nodes: IndexMap<NodeId, Node<D>>,
    pub(crate) connections: IndexMap<ConnectionId, Connection>,
    pub(crate) annotations: IndexMap<AnnotationId, Annotation>,
    config: EditorConfig,
    router: ConnectionRouter,
    index: RefCell<SpatialIndex>,
    routes: RefCell<HashMap<ConnectionId, CachedRoute>>,
    node_versions: HashMap<NodeId, u64>,
    connection_versions: HashMap<ConnectionId, u64>,
    /// Connections touching each port, in insertion order
    port_links: HashMap<(NodeId, PortId), Vec<ConnectionId>>,
    version_counter: u64,
    validators: Vec<Box<dyn ConnectionValidator<D>>>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: SubscriptionId,
}

impl<D> Default for Graph<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for Graph<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("connections", &self.connections.len())
            .field("annotations", &self.annotations.len())
            .field("validators", &self.validators.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl<D> Graph<D> {
    /// Empty graph with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EditorConfig::default())
    }

    /// Empty graph whose router and spatial index use `config`.
    pub fn with_config(config: EditorConfig) -> Self {
        Self {
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
            annotations: IndexMap::new(),
            config,
            router: ConnectionRouter::new(config.router),
            index: RefCell::new(SpatialIndex::new(config.spatial)),
            routes: RefCell::new(HashMap::new()),
            node_versions: HashMap::new(),
            connection_versions: HashMap::new(),
            port_links: HashMap::new(),
            version_counter: 0,
            validators: Vec::new(),
            observers: Vec::new(),
            next_subscription: 1,
        }
    }

    /// Configuration the graph was built with.
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Router used to compute connection paths.
    pub fn router(&self) -> &ConnectionRouter {
        &self.router
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Register an observer called synchronously after every mutation.
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&GraphEvent) + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Drop an observer. Returns `false` if the id was never registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sid, _)| *sid != id);
        self.observers.len() != before
    }

    pub(crate) fn emit(&mut self, event: GraphEvent) {
        debug!(?event, "graph mutation");
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }
    }

    fn next_version(&mut self) -> u64 {
        self.version_counter += 1;
        self.version_counter
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Insert a node and index its rectangle.
    ///
    /// Fails with [`GraphError::DuplicateId`] when the node id is taken or two
    /// of its ports share an id.
    pub fn add_node(&mut self, node: Node<D>) -> Result<()> {
        let id = node.id;
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateId(EntityRef::Node(id)));
        }
        if let Some(port) = node.duplicate_port_id() {
            return Err(GraphError::DuplicateId(EntityRef::Port { node: id, port }));
        }
        let rect = node.rect();
        self.nodes.insert(id, node);
        let version = self.next_version();
        self.node_versions.insert(id, version);
        self.index.get_mut().insert_node(id, rect);
        self.emit(GraphEvent::NodeAdded(id));
        Ok(())
    }

    /// Remove a node and every connection attached to it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node<D>> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::NotFound(EntityRef::Node(id)));
        }
        let removed_connections: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.touches_node(id))
            .map(|c| c.id)
            .collect();
        for cid in &removed_connections {
            self.detach_connection(*cid);
        }

        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or(GraphError::NotFound(EntityRef::Node(id)))?;
        self.node_versions.remove(&id);
        self.index.get_mut().remove_node(id);

        let mut touched_groups = Vec::new();
        for annotation in self.annotations.values_mut() {
            if annotation.forget_member(id) {
                touched_groups.push(annotation.id);
            }
        }

        self.emit(GraphEvent::NodeRemoved {
            id,
            removed_connections,
        });
        for group in touched_groups {
            self.emit(GraphEvent::AnnotationChanged(group));
        }
        Ok(node)
    }

    /// Look up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node<D>> {
        self.nodes.get(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node<D>> + '_ {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Payload access that leaves geometry untouched. No event is emitted;
    /// use [`Graph::update_node_data`] when observers need to know.
    pub fn node_data_mut(&mut self, id: NodeId) -> Option<&mut D> {
        self.nodes.get_mut(&id).map(|n| &mut n.data)
    }

    /// Mutate the payload and emit [`GraphEvent::NodeChanged`].
    pub fn update_node_data<F>(&mut self, id: NodeId, update: F) -> Result<()>
    where
        F: FnOnce(&mut D),
    {
        let node = self.node_mut(id)?;
        update(&mut node.data);
        self.emit(GraphEvent::NodeChanged(id));
        Ok(())
    }

    /// Move a node to an absolute canvas position.
    ///
    /// Reindexes the node and invalidates the routes of its connections.
    pub fn set_node_position(&mut self, id: NodeId, position: Point) -> Result<()> {
        self.node_mut(id)?.position = position;
        self.node_geometry_changed(id);
        self.emit(GraphEvent::NodeMoved { id, position });
        Ok(())
    }

    /// Move a node by a relative offset.
    pub fn move_node_by(&mut self, id: NodeId, delta: Point) -> Result<()> {
        let position = self.node_mut(id)?.position + delta;
        self.set_node_position(id, position)
    }

    /// Resize a node. Attached routes are recomputed on next access.
    pub fn set_node_size(&mut self, id: NodeId, size: Size) -> Result<()> {
        self.node_mut(id)?.size = size;
        self.node_geometry_changed(id);
        self.emit(GraphEvent::NodeResized { id, size });
        Ok(())
    }

    /// Hidden nodes are skipped by hit tests and culling, along with their connections.
    pub fn set_node_visible(&mut self, id: NodeId, visible: bool) -> Result<()> {
        self.node_mut(id)?.is_visible = visible;
        self.emit(GraphEvent::NodeChanged(id));
        Ok(())
    }

    /// Higher z-index wins overlapping hit tests.
    pub fn set_node_z_index(&mut self, id: NodeId, z_index: i32) -> Result<()> {
        self.node_mut(id)?.z_index = z_index;
        self.emit(GraphEvent::NodeChanged(id));
        Ok(())
    }

    /// Move many nodes at once, e.g. to commit a layout.
    ///
    /// Every id is checked before anything moves, so an unknown id leaves the
    /// graph untouched.
    pub fn apply_positions(&mut self, positions: &[NodePosition]) -> Result<()> {
        if let Some(missing) = positions.iter().find(|p| !self.nodes.contains_key(&p.id)) {
            return Err(GraphError::NotFound(EntityRef::Node(missing.id)));
        }
        for p in positions {
            self.set_node_position(p.id, Point::new(p.x, p.y))?;
        }
        Ok(())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<D>> {
        self.nodes
            .get_mut(&id)
            .ok_or(GraphError::NotFound(EntityRef::Node(id)))
    }

    fn node_geometry_changed(&mut self, id: NodeId) {
        let version = self.next_version();
        self.node_versions.insert(id, version);
        let Some(rect) = self.nodes.get(&id).map(Node::rect) else {
            return;
        };
        let index = self.index.get_mut();
        index.insert_node(id, rect);
        for c in self.connections.values().filter(|c| c.touches_node(id)) {
            index.mark_connection_dirty(c.id);
        }
    }

    /// Bounding rectangle of the visible nodes.
    pub fn content_bounds(&self) -> Option<Rect> {
        Rect::union_all(self.nodes.values().filter(|n| n.is_visible).map(Node::rect))
    }

    /// Bounding rectangle of the given nodes; unknown ids are skipped.
    pub fn bounds_of<I>(&self, ids: I) -> Option<Rect>
    where
        I: IntoIterator<Item = NodeId>,
    {
        Rect::union_all(ids.into_iter().filter_map(|id| self.nodes.get(&id)).map(Node::rect))
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Register a hook consulted by [`Graph::check_start`] and
    /// [`Graph::add_connection`], after the built-in checks.
    pub fn add_validator<V>(&mut self, validator: V)
    where
        V: ConnectionValidator<D> + 'static,
    {
        self.validators.push(Box::new(validator));
    }

    /// Remove every custom validator. Built-in port checks still apply.
    pub fn clear_validators(&mut self) {
        self.validators.clear();
    }

    fn endpoint(&self, node_id: NodeId, port_id: PortId) -> Result<(&Node<D>, &Port)> {
        let invalid = GraphError::InvalidEndpoint {
            node: node_id,
            port: port_id,
        };
        let node = self.nodes.get(&node_id).ok_or_else(|| invalid.clone())?;
        let port = node.port(port_id).ok_or(invalid)?;
        Ok((node, port))
    }

    fn linked(&self, endpoint: (NodeId, PortId)) -> impl Iterator<Item = &Connection> + '_ {
        self.port_links
            .get(&endpoint)
            .into_iter()
            .flatten()
            .filter_map(|id| self.connections.get(id))
    }

    fn outgoing(&self, node: NodeId, port: PortId) -> Vec<&Connection> {
        self.linked((node, port))
            .filter(|c| c.source() == (node, port))
            .collect()
    }

    fn incoming(&self, node: NodeId, port: PortId) -> Vec<&Connection> {
        self.linked((node, port))
            .filter(|c| c.target() == (node, port))
            .collect()
    }

    fn link_ports(&mut self, connection: &Connection) {
        self.port_links
            .entry(connection.source())
            .or_default()
            .push(connection.id);
        if connection.target() != connection.source() {
            self.port_links
                .entry(connection.target())
                .or_default()
                .push(connection.id);
        }
    }

    fn unlink_ports(&mut self, connection: &Connection) {
        for endpoint in [connection.source(), connection.target()] {
            if let Some(ids) = self.port_links.get_mut(&endpoint) {
                ids.retain(|id| *id != connection.id);
                if ids.is_empty() {
                    self.port_links.remove(&endpoint);
                }
            }
        }
    }

    /// May a connection drag start from this port?
    pub fn check_start(&self, node_id: NodeId, port_id: PortId) -> Result<()> {
        let (node, port) = self.endpoint(node_id, port_id)?;
        if !port.is_connectable {
            return Err(GraphError::PortNotConnectable {
                node: node_id,
                port: port_id,
            });
        }
        if let Some(max) = refusal_limit(port) {
            let outgoing_full = self.outgoing(node_id, port_id).len() >= max;
            let incoming_full = self.incoming(node_id, port_id).len() >= max;
            let full = (!port.port_type.can_source() || outgoing_full)
                && (!port.port_type.can_target() || incoming_full);
            if full {
                return Err(GraphError::Capacity {
                    node: node_id,
                    port: port_id,
                    limit: max,
                });
            }
        }

        let ctx = StartContext {
            node,
            port,
            existing: self.connections_on_port(node_id, port_id),
        };
        for validator in &self.validators {
            validator.before_start(&ctx).into_result()?;
        }
        Ok(())
    }

    /// Run every check [`Graph::add_connection`] runs, without mutating.
    pub fn check_connection(&self, connection: &Connection) -> Result<()> {
        if self.connections.contains_key(&connection.id) {
            return Err(GraphError::DuplicateId(EntityRef::Connection(connection.id)));
        }
        let (source_node, source_port) =
            self.endpoint(connection.source_node_id, connection.source_port_id)?;
        let (target_node, target_port) =
            self.endpoint(connection.target_node_id, connection.target_port_id)?;

        for (node, port) in [(source_node, source_port), (target_node, target_port)] {
            if !port.is_connectable {
                return Err(GraphError::PortNotConnectable {
                    node: node.id,
                    port: port.id,
                });
            }
        }
        if !source_port.port_type.can_source() {
            return Err(GraphError::Direction {
                node: source_node.id,
                port: source_port.id,
                role: PortRole::Source,
            });
        }
        if !target_port.port_type.can_target() {
            return Err(GraphError::Direction {
                node: target_node.id,
                port: target_port.id,
                role: PortRole::Target,
            });
        }

        let existing_on_source = self.outgoing(source_node.id, source_port.id);
        let existing_on_target = self.incoming(target_node.id, target_port.id);
        for (node, port, existing) in [
            (source_node, source_port, existing_on_source.len()),
            (target_node, target_port, existing_on_target.len()),
        ] {
            if let Some(max) = refusal_limit(port) {
                if existing >= max {
                    return Err(GraphError::Capacity {
                        node: node.id,
                        port: port.id,
                        limit: max,
                    });
                }
            }
        }

        let ctx = CompleteContext {
            candidate: connection,
            source_node,
            source_port,
            target_node,
            target_port,
            existing_on_source,
            existing_on_target,
        };
        for validator in &self.validators {
            validator.before_complete(&ctx).into_result()?;
        }
        Ok(())
    }

    fn port_at(&self, (node, port): (NodeId, PortId)) -> Option<&Port> {
        self.nodes.get(&node).and_then(|n| n.port(port))
    }

    fn is_single_port(&self, endpoint: (NodeId, PortId)) -> bool {
        self.port_at(endpoint).is_some_and(|p| !p.multi_connections)
    }

    /// Connections a new connection would displace from single-connection ports.
    fn displaced_by(&self, connection: &Connection) -> Vec<ConnectionId> {
        let source_single = self.is_single_port(connection.source());
        let target_single = self.is_single_port(connection.target());
        let mut displaced: Vec<(usize, ConnectionId)> = self
            .linked(connection.source())
            .chain(self.linked(connection.target()))
            .filter(|c| {
                (source_single && c.source() == connection.source())
                    || (target_single && c.target() == connection.target())
            })
            .filter_map(|c| Some((self.connections.get_index_of(&c.id)?, c.id)))
            .collect();
        displaced.sort_unstable();
        displaced.dedup();
        displaced.into_iter().map(|(_, id)| id).collect()
    }

    /// Validate and insert a connection.
    ///
    /// A connection landing on a port that holds a single connection replaces
    /// the one already there; observers see a single
    /// [`GraphEvent::ConnectionReplaced`] for the whole swap.
    pub fn add_connection(&mut self, connection: Connection) -> Result<()> {
        self.check_connection(&connection)?;
        let replaced = self.displaced_by(&connection);
        for old in &replaced {
            self.detach_connection(*old);
        }

        let id = connection.id;
        self.link_ports(&connection);
        self.connections.insert(id, connection);
        let version = self.next_version();
        self.connection_versions.insert(id, version);
        self.index.get_mut().mark_connection_dirty(id);

        if replaced.is_empty() {
            self.emit(GraphEvent::ConnectionAdded(id));
        } else {
            self.emit(GraphEvent::ConnectionReplaced { added: id, replaced });
        }
        Ok(())
    }

    /// Insert a connection loaded from a document.
    ///
    /// Same checks as [`Graph::add_connection`], but a second connection on a
    /// single-connection port is a [`GraphError::Capacity`] error instead of
    /// a replacement.
    pub(crate) fn restore_connection(&mut self, connection: Connection) -> Result<()> {
        self.check_connection(&connection)?;
        if let Some(clash) = self
            .displaced_by(&connection)
            .first()
            .and_then(|id| self.connections.get(id))
        {
            let source_clash =
                self.is_single_port(connection.source()) && clash.source() == connection.source();
            let (node, port) = if source_clash {
                connection.source()
            } else {
                connection.target()
            };
            let limit = self
                .port_at((node, port))
                .and_then(Port::connection_limit)
                .unwrap_or(1);
            return Err(GraphError::Capacity { node, port, limit });
        }
        self.add_connection(connection)
    }

    /// Remove a connection and return it.
    ///
    /// Freed ports become available to new connections immediately.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Result<Connection> {
        let connection = self
            .detach_connection(id)
            .ok_or(GraphError::NotFound(EntityRef::Connection(id)))?;
        self.emit(GraphEvent::ConnectionRemoved(id));
        Ok(connection)
    }

    /// Drop a connection and its derived state without emitting.
    fn detach_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.shift_remove(&id)?;
        self.unlink_ports(&connection);
        self.connection_versions.remove(&id);
        self.routes.get_mut().remove(&id);
        self.index.get_mut().remove_connection(id);
        Some(connection)
    }

    /// Look up a connection by id.
    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Connections in insertion order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.values()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Connections with the node as source or target.
    pub fn connections_for_node(&self, id: NodeId) -> Vec<&Connection> {
        self.connections
            .values()
            .filter(|c| c.touches_node(id))
            .collect()
    }

    /// Connections attached to one port, either direction.
    pub fn connections_on_port(&self, node: NodeId, port: PortId) -> Vec<&Connection> {
        self.linked((node, port)).collect()
    }

    fn connection_mut(&mut self, id: ConnectionId) -> Result<&mut Connection> {
        self.connections
            .get_mut(&id)
            .ok_or(GraphError::NotFound(EntityRef::Connection(id)))
    }

    /// Bump the route version after a path-affecting change.
    fn connection_route_changed(&mut self, id: ConnectionId) {
        let version = self.next_version();
        self.connection_versions.insert(id, version);
        self.index.get_mut().mark_connection_dirty(id);
        self.emit(GraphEvent::ConnectionChanged(id));
    }

    /// Change the routing style. The cached path is dropped.
    pub fn set_connection_style(&mut self, id: ConnectionId, style: ConnectionStyle) -> Result<()> {
        self.connection_mut(id)?.style = style;
        self.connection_route_changed(id);
        Ok(())
    }

    /// Set or clear the label drawn at the path midpoint.
    pub fn set_connection_label(&mut self, id: ConnectionId, label: Option<String>) -> Result<()> {
        self.connection_mut(id)?.label = label;
        self.emit(GraphEvent::ConnectionChanged(id));
        Ok(())
    }

    /// Set the labels drawn next to each end of the path.
    pub fn set_connection_labels(
        &mut self,
        id: ConnectionId,
        start_label: Option<String>,
        end_label: Option<String>,
    ) -> Result<()> {
        let connection = self.connection_mut(id)?;
        connection.start_label = start_label;
        connection.end_label = end_label;
        self.emit(GraphEvent::ConnectionChanged(id));
        Ok(())
    }

    /// Insert a control point into the closest leg of the connection.
    ///
    /// Returns the index the point was inserted at.
    pub fn add_control_point(&mut self, id: ConnectionId, point: Point) -> Result<usize> {
        let connection = self
            .connections
            .get(&id)
            .ok_or(GraphError::NotFound(EntityRef::Connection(id)))?;
        let source = self.anchor_point(connection.source_node_id, connection.source_port_id);
        let target = self.anchor_point(connection.target_node_id, connection.target_port_id);
        let index = control_point_insert_index(source, &connection.control_points, target, point);

        self.connection_mut(id)?.control_points.insert(index, point);
        self.connection_route_changed(id);
        Ok(index)
    }

    /// Move one control point in place.
    pub fn move_control_point(&mut self, id: ConnectionId, index: usize, point: Point) -> Result<()> {
        let slot = self
            .connection_mut(id)?
            .control_points
            .get_mut(index)
            .ok_or(GraphError::ControlPointOutOfRange {
                connection: id,
                index,
            })?;
        *slot = point;
        self.connection_route_changed(id);
        Ok(())
    }

    /// Remove a control point and return its old position.
    pub fn remove_control_point(&mut self, id: ConnectionId, index: usize) -> Result<Point> {
        let connection = self.connection_mut(id)?;
        if index >= connection.control_points.len() {
            return Err(GraphError::ControlPointOutOfRange {
                connection: id,
                index,
            });
        }
        let point = connection.control_points.remove(index);
        self.connection_route_changed(id);
        Ok(point)
    }

    pub fn clear_control_points(&mut self, id: ConnectionId) -> Result<()> {
        self.connection_mut(id)?.control_points.clear();
        self.connection_route_changed(id);
        Ok(())
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Canvas anchor of a port, with the side it faces and its node's rectangle.
    pub fn anchor(&self, node_id: NodeId, port_id: PortId) -> Option<Anchor> {
        let node = self.nodes.get(&node_id)?;
        let (point, side) = node.anchor(port_id)?;
        Some(Anchor::new(point, side, node.rect()))
    }

    fn anchor_point(&self, node_id: NodeId, port_id: PortId) -> Point {
        self.anchor(node_id, port_id)
            .map(|a| a.point)
            .or_else(|| self.nodes.get(&node_id).map(|n| n.rect().center()))
            .unwrap_or(Point::ZERO)
    }

    fn route_key(&self, connection: &Connection) -> RouteKey {
        let version = |map: &HashMap<i32, u64>, id: i32| map.get(&id).copied().unwrap_or(0);
        (
            version(&self.node_versions, connection.source_node_id),
            version(&self.node_versions, connection.target_node_id),
            version(&self.connection_versions, connection.id),
        )
    }

    /// Routed path of a connection, memoized until its geometry changes.
    pub fn route(&self, id: ConnectionId) -> Option<Rc<RoutedPath>> {
        let connection = self.connections.get(&id)?;
        let key = self.route_key(connection);
        if let Some(cached) = self.routes.borrow().get(&id) {
            if cached.key == key {
                return Some(Rc::clone(&cached.path));
            }
        }

        let source = self.anchor(connection.source_node_id, connection.source_port_id);
        let target = self.anchor(connection.target_node_id, connection.target_port_id);
        let path = match (source, target) {
            (Some(s), Some(t)) => self.router.route(&s, &t, connection.style, &connection.control_points),
            (Some(a), None) | (None, Some(a)) => RoutedPath::point(a.point),
            (None, None) => RoutedPath::point(Point::ZERO),
        };
        trace!(connection = id, length = path.length(), "route recomputed");
        let path = Rc::new(path);
        self.routes.borrow_mut().insert(
            id,
            CachedRoute {
                key,
                path: Rc::clone(&path),
            },
        );
        Some(path)
    }

    // ========================================================================
    // Spatial queries
    // ========================================================================

    fn is_connection_visible(&self, connection: &Connection) -> bool {
        let visible = |id: NodeId| self.nodes.get(&id).is_some_and(|n| n.is_visible);
        visible(connection.source_node_id) && visible(connection.target_node_id)
    }

    /// Re-route and re-index connections whose cells went stale.
    fn sync_connection_index(&self) {
        let dirty = {
            let mut index = self.index.borrow_mut();
            if !index.has_dirty() {
                return;
            }
            index.take_dirty()
        };
        trace!(count = dirty.len(), "re-indexing dirty connections");
        for id in dirty {
            match self.route(id) {
                Some(path) => self.index.borrow_mut().insert_connection(id, path.polyline()),
                None => {
                    self.index.borrow_mut().remove_connection(id);
                }
            }
        }
    }

    /// Rebuild the whole spatial index from the graph.
    pub fn rebuild_spatial_index(&self) {
        {
            let mut index = self.index.borrow_mut();
            index.clear();
            for node in self.nodes.values() {
                index.insert_node(node.id, node.rect());
            }
            for id in self.connections.keys() {
                index.mark_connection_dirty(*id);
            }
        }
        self.sync_connection_index();
    }

    fn recover_index(&self, reason: &str) {
        warn!(reason, "spatial index out of sync with the graph, rebuilding");
        self.rebuild_spatial_index();
    }

    /// Topmost visible node containing the point.
    pub fn node_at(&self, point: Point) -> Option<NodeId> {
        let mut candidates = self.index.borrow().nodes_near(point);
        if candidates.iter().any(|id| !self.nodes.contains_key(id)) {
            self.recover_index("unknown node id in cell");
            candidates = self.index.borrow().nodes_near(point);
        }
        candidates
            .into_iter()
            .filter_map(|id| {
                let (order, _, node) = self.nodes.get_full(&id)?;
                (node.is_visible && node.rect().contains_point(point)).then_some((node.z_index, order, id))
            })
            .max_by_key(|(z, order, _)| (*z, *order))
            .map(|(_, _, id)| id)
    }

    /// Closest visible connection whose path passes within `tolerance`.
    pub fn connection_at(&self, point: Point, tolerance: f32) -> Option<ConnectionId> {
        self.sync_connection_index();
        let tolerance = tolerance.max(0.0);
        let area = Rect::from_center(point, Size::new(tolerance * 2.0, tolerance * 2.0));
        let candidates = self.index.borrow().connections_in(&area);

        let mut best: Option<(f32, usize, ConnectionId)> = None;
        for id in candidates {
            let Some((order, _, connection)) = self.connections.get_full(&id) else {
                continue;
            };
            if !self.is_connection_visible(connection) {
                continue;
            }
            let Some(path) = self.route(id) else {
                continue;
            };
            let distance = path.distance_to(point);
            if distance > tolerance {
                continue;
            }
            let better = match best {
                None => true,
                Some((d, o, _)) => distance < d || (distance == d && order < o),
            };
            if better {
                best = Some((distance, order, id));
            }
        }
        best.map(|(_, _, id)| id)
    }

    /// Nodes overlapping the rectangle, in insertion order.
    pub fn nodes_in_rect(&self, rect: Rect) -> Vec<NodeId> {
        let candidates = self.index.borrow().nodes_in(&rect);
        let mut hits: Vec<(usize, NodeId)> = candidates
            .into_iter()
            .filter_map(|id| {
                let (order, _, node) = self.nodes.get_full(&id)?;
                node.rect().overlaps(&rect).then_some((order, id))
            })
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|(_, id)| id).collect()
    }

    /// Connections whose path touches the rectangle, in insertion order.
    pub fn connections_in_rect(&self, rect: Rect) -> Vec<ConnectionId> {
        self.sync_connection_index();
        let candidates = self.index.borrow().connections_in(&rect);
        let mut hits: Vec<(usize, ConnectionId)> = candidates
            .into_iter()
            .filter_map(|id| {
                let order = self.connections.get_index_of(&id)?;
                let path = self.route(id)?;
                let touches = match path.polyline() {
                    [only] => rect.contains_point(*only),
                    points => points.windows(2).any(|w| rect.segment_intersects(w[0], w[1])),
                };
                touches.then_some((order, id))
            })
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|(_, id)| id).collect()
    }

    /// Visible nodes overlapping the viewport rectangle.
    pub fn visible_nodes(&self, viewport: Rect) -> Vec<NodeId> {
        self.nodes_in_rect(viewport)
            .into_iter()
            .filter(|id| self.nodes.get(id).is_some_and(|n| n.is_visible))
            .collect()
    }

    /// Connections between visible nodes whose path touches the viewport rectangle.
    pub fn visible_connections(&self, viewport: Rect) -> Vec<ConnectionId> {
        self.connections_in_rect(viewport)
            .into_iter()
            .filter(|id| {
                self.connections
                    .get(id)
                    .is_some_and(|c| self.is_connection_visible(c))
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn index_node_count(&self) -> usize {
        self.index.borrow().node_count()
    }

    #[cfg(test)]
    pub(crate) fn corrupt_index_for_test(&self, stale: NodeId, rect: Rect) {
        self.index.borrow_mut().insert_node(stale, rect);
    }

    // ========================================================================
    // Whole-graph operations
    // ========================================================================

    /// Remove every node, connection and annotation.
    ///
    /// Validators and observers stay registered.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.connections.clear();
        self.annotations.clear();
        self.node_versions.clear();
        self.connection_versions.clear();
        self.port_links.clear();
        self.routes.get_mut().clear();
        self.index.get_mut().clear();
        self.emit(GraphEvent::Cleared);
    }

    /// Ids of every node touched by at least one connection.
    pub(crate) fn connected_node_ids(&self) -> HashSet<NodeId> {
        self.connections
            .values()
            .flat_map(|c| [c.source_node_id, c.target_node_id])
            .collect()
    }
}

/// Count at which a new connection is refused. Single ports have none:
/// they replace their occupant instead.
fn refusal_limit(port: &Port) -> Option<usize> {
    if port.multi_connections {
        port.connection_limit()
    } else {
        None
    }
}
