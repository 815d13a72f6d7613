//! Node and connection selection.
//!
//! Selection state lives on the entities themselves (`is_selected`), so a
//! removed entity can never linger in the selection. Click handling follows
//! the usual shift-click rules: a plain click collapses the selection to the
//! clicked item, an additive click toggles it.

use crate::error::{EntityRef, GraphError, Result};
use crate::geometry::{Point, Rect};
use crate::graph::{Graph, GraphEvent};
use crate::model::{ConnectionId, NodeId};

/// Ids removed by [`Graph::remove_selected`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovedSelection {
    pub nodes: Vec<NodeId>,
    /// Selected connections plus those cascaded away with removed nodes
    pub connections: Vec<ConnectionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    Node(NodeId),
    Connection(ConnectionId),
}

impl<D> Graph<D> {
    fn is_item_selected(&self, item: Item) -> bool {
        match item {
            Item::Node(id) => self.nodes.get(&id).is_some_and(|n| n.is_selected),
            Item::Connection(id) => self.connections.get(&id).is_some_and(|c| c.is_selected),
        }
    }

    fn set_item_selected(&mut self, item: Item, selected: bool) {
        match item {
            Item::Node(id) => {
                if let Some(n) = self.nodes.get_mut(&id) {
                    n.is_selected = selected;
                }
            }
            Item::Connection(id) => {
                if let Some(c) = self.connections.get_mut(&id) {
                    c.is_selected = selected;
                }
            }
        }
    }

    fn selection_len(&self) -> usize {
        self.nodes.values().filter(|n| n.is_selected).count()
            + self.connections.values().filter(|c| c.is_selected).count()
    }

    /// Clear every flag without emitting; true when anything was selected.
    fn reset_selection(&mut self) -> bool {
        let mut changed = false;
        for n in self.nodes.values_mut() {
            changed |= std::mem::take(&mut n.is_selected);
        }
        for c in self.connections.values_mut() {
            changed |= std::mem::take(&mut c.is_selected);
        }
        changed
    }

    fn handle_interaction(&mut self, item: Item, additive: bool) {
        if additive {
            let selected = self.is_item_selected(item);
            self.set_item_selected(item, !selected);
        } else {
            if self.selection_len() == 1 && self.is_item_selected(item) {
                return;
            }
            self.reset_selection();
            self.set_item_selected(item, true);
        }
        self.emit(GraphEvent::SelectionChanged);
    }

    /// Click on a node; `additive` is the shift modifier.
    pub fn select_node(&mut self, id: NodeId, additive: bool) -> Result<()> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::NotFound(EntityRef::Node(id)));
        }
        self.handle_interaction(Item::Node(id), additive);
        Ok(())
    }

    /// Click on a connection; `additive` is the shift modifier.
    pub fn select_connection(&mut self, id: ConnectionId, additive: bool) -> Result<()> {
        if !self.connections.contains_key(&id) {
            return Err(GraphError::NotFound(EntityRef::Connection(id)));
        }
        self.handle_interaction(Item::Connection(id), additive);
        Ok(())
    }

    /// Deselect everything. Emits only if something was selected.
    pub fn clear_selection(&mut self) {
        if self.reset_selection() {
            self.emit(GraphEvent::SelectionChanged);
        }
    }

    /// Select every node and connection.
    pub fn select_all(&mut self) {
        for n in self.nodes.values_mut() {
            n.is_selected = true;
        }
        for c in self.connections.values_mut() {
            c.is_selected = true;
        }
        self.emit(GraphEvent::SelectionChanged);
    }

    pub fn invert_selection(&mut self) {
        for n in self.nodes.values_mut() {
            n.is_selected = !n.is_selected;
        }
        for c in self.connections.values_mut() {
            c.is_selected = !c.is_selected;
        }
        self.emit(GraphEvent::SelectionChanged);
    }

    /// Box selection over visible nodes and connections touching `rect`.
    ///
    /// Without `additive` the previous selection is replaced.
    pub fn select_in_rect(&mut self, rect: Rect, additive: bool) {
        let nodes = self.visible_nodes(rect);
        let connections = self.visible_connections(rect);
        if !additive {
            self.reset_selection();
        }
        for id in nodes {
            self.set_item_selected(Item::Node(id), true);
        }
        for id in connections {
            self.set_item_selected(Item::Connection(id), true);
        }
        self.emit(GraphEvent::SelectionChanged);
    }

    /// Selected nodes in insertion order.
    pub fn selected_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.is_selected)
            .map(|n| n.id)
            .collect()
    }

    /// Selected connections in insertion order.
    pub fn selected_connections(&self) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| c.is_selected)
            .map(|c| c.id)
            .collect()
    }

    pub fn is_selection_empty(&self) -> bool {
        self.selection_len() == 0
    }

    /// Commit a drag of the whole node selection.
    pub fn move_selected_by(&mut self, delta: Point) -> Result<()> {
        for id in self.selected_nodes() {
            self.move_node_by(id, delta)?;
        }
        Ok(())
    }

    /// Delete everything selected.
    pub fn remove_selected(&mut self) -> Result<RemovedSelection> {
        let mut removed = RemovedSelection::default();
        for id in self.selected_connections() {
            self.remove_connection(id)?;
            removed.connections.push(id);
        }
        for id in self.selected_nodes() {
            let cascaded: Vec<ConnectionId> =
                self.connections_for_node(id).iter().map(|c| c.id).collect();
            self.remove_node(id)?;
            removed.nodes.push(id);
            removed.connections.extend(cascaded);
        }
        Ok(removed)
    }
}
