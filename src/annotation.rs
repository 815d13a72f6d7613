//! Canvas annotations: sticky notes, markers and groups.
//!
//! Annotations never take part in connections. Groups own a membership rule
//! ([`GroupBehavior`]) that decides which nodes belong to them and whether
//! moving the group drags its members along.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{EntityRef, GraphError, Result};
use crate::geometry::{Point, Rect, Size};
use crate::graph::{Graph, GraphEvent};
use crate::model::{default_true, is_true, is_zero, AnnotationId, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: AnnotationId,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub is_visible: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub z_index: i32,
    #[serde(flatten)]
    pub kind: AnnotationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AnnotationKind {
    Sticky {
        position: Point,
        size: Size,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    /// Point-like flag, e.g. a warning badge
    Marker {
        position: Point,
        category: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tooltip: Option<String>,
    },
    Group {
        position: Point,
        size: Size,
        title: String,
        #[serde(default)]
        behavior: GroupBehavior,
    },
}

/// How a group decides its members.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "members", rename_all = "camelCase")]
pub enum GroupBehavior {
    /// Every node fully inside the group rectangle, computed on demand
    #[default]
    Bounds,
    /// Fixed member set
    Explicit(BTreeSet<NodeId>),
    /// Fixed member set; moving the group moves the members
    Parent(BTreeSet<NodeId>),
}

impl GroupBehavior {
    pub fn mode(&self) -> GroupMode {
        match self {
            GroupBehavior::Bounds => GroupMode::Bounds,
            GroupBehavior::Explicit(_) => GroupMode::Explicit,
            GroupBehavior::Parent(_) => GroupMode::Parent,
        }
    }

    fn members_mut(&mut self) -> Option<&mut BTreeSet<NodeId>> {
        match self {
            GroupBehavior::Bounds => None,
            GroupBehavior::Explicit(m) | GroupBehavior::Parent(m) => Some(m),
        }
    }
}

/// Target mode for [`Graph::set_group_behavior`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupMode {
    Bounds,
    Explicit,
    Parent,
}

impl Annotation {
    pub fn new(id: AnnotationId, kind: AnnotationKind) -> Self {
        Self {
            id,
            is_visible: true,
            z_index: 0,
            kind,
        }
    }

    pub fn sticky(id: AnnotationId, rect: Rect, text: impl Into<String>) -> Self {
        Self::new(
            id,
            AnnotationKind::Sticky {
                position: rect.origin(),
                size: rect.size(),
                text: text.into(),
                color: None,
            },
        )
    }

    pub fn marker(id: AnnotationId, position: Point, category: impl Into<String>) -> Self {
        Self::new(
            id,
            AnnotationKind::Marker {
                position,
                category: category.into(),
                tooltip: None,
            },
        )
    }

    pub fn group(id: AnnotationId, rect: Rect, title: impl Into<String>, behavior: GroupBehavior) -> Self {
        Self::new(
            id,
            AnnotationKind::Group {
                position: rect.origin(),
                size: rect.size(),
                title: title.into(),
                behavior,
            },
        )
    }

    pub fn position(&self) -> Point {
        match &self.kind {
            AnnotationKind::Sticky { position, .. }
            | AnnotationKind::Marker { position, .. }
            | AnnotationKind::Group { position, .. } => *position,
        }
    }

    /// Covered area; markers are zero-sized.
    pub fn rect(&self) -> Rect {
        match &self.kind {
            AnnotationKind::Sticky { position, size, .. } | AnnotationKind::Group { position, size, .. } => {
                Rect::from_origin_size(*position, *size)
            }
            AnnotationKind::Marker { position, .. } => Rect::from_origin_size(*position, Size::default()),
        }
    }

    pub fn behavior(&self) -> Option<&GroupBehavior> {
        match &self.kind {
            AnnotationKind::Group { behavior, .. } => Some(behavior),
            _ => None,
        }
    }

    fn behavior_mut(&mut self) -> Option<&mut GroupBehavior> {
        match &mut self.kind {
            AnnotationKind::Group { behavior, .. } => Some(behavior),
            _ => None,
        }
    }

    pub fn translate(&mut self, delta: Point) {
        match &mut self.kind {
            AnnotationKind::Sticky { position, .. }
            | AnnotationKind::Marker { position, .. }
            | AnnotationKind::Group { position, .. } => *position = *position + delta,
        }
    }

    /// Drop a node from an explicit member set; true when it was a member.
    pub(crate) fn forget_member(&mut self, node: NodeId) -> bool {
        self.behavior_mut()
            .and_then(GroupBehavior::members_mut)
            .is_some_and(|members| members.remove(&node))
    }
}

impl<D> Graph<D> {
    /// Add an annotation. Its id is independent of node ids.
    pub fn add_annotation(&mut self, annotation: Annotation) -> Result<()> {
        let id = annotation.id;
        if self.annotations.contains_key(&id) {
            return Err(GraphError::DuplicateId(EntityRef::Annotation(id)));
        }
        self.annotations.insert(id, annotation);
        self.emit(GraphEvent::AnnotationAdded(id));
        Ok(())
    }

    /// Remove an annotation. Member nodes of a group stay in the graph.
    pub fn remove_annotation(&mut self, id: AnnotationId) -> Result<Annotation> {
        let annotation = self
            .annotations
            .shift_remove(&id)
            .ok_or(GraphError::NotFound(EntityRef::Annotation(id)))?;
        self.emit(GraphEvent::AnnotationRemoved(id));
        Ok(annotation)
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.get(&id)
    }

    /// Annotations in insertion order.
    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> + '_ {
        self.annotations.values()
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    /// Topmost visible annotation covering the point.
    pub fn annotation_at(&self, point: Point) -> Option<AnnotationId> {
        self.annotations
            .values()
            .enumerate()
            .filter(|(_, a)| a.is_visible && a.rect().contains_point(point))
            .max_by_key(|(order, a)| (a.z_index, *order))
            .map(|(_, a)| a.id)
    }

    fn annotation_mut(&mut self, id: AnnotationId) -> Result<&mut Annotation> {
        self.annotations
            .get_mut(&id)
            .ok_or(GraphError::NotFound(EntityRef::Annotation(id)))
    }

    /// Nodes whose rectangle lies fully inside `rect`, in insertion order.
    fn nodes_inside(&self, rect: Rect) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| rect.contains_rect(&n.rect()))
            .map(|n| n.id)
            .collect()
    }

    /// Current members of a group, in node insertion order.
    ///
    /// Bounds groups are evaluated against the current node geometry, so a
    /// node dragged out of the rectangle stops being a member immediately.
    pub fn group_members(&self, id: AnnotationId) -> Result<Vec<NodeId>> {
        let annotation = self
            .annotations
            .get(&id)
            .ok_or(GraphError::NotFound(EntityRef::Annotation(id)))?;
        match annotation.behavior() {
            None => Err(GraphError::GroupBehaviorMismatch(id)),
            Some(GroupBehavior::Bounds) => Ok(self.nodes_inside(annotation.rect())),
            Some(GroupBehavior::Explicit(members) | GroupBehavior::Parent(members)) => Ok(self
                .nodes
                .keys()
                .filter(|n| members.contains(n))
                .copied()
                .collect()),
        }
    }

    /// Switch a group's membership rule.
    ///
    /// Leaving `Bounds` captures the nodes currently inside the group;
    /// `Explicit` and `Parent` hand their member set to each other; switching
    /// to `Bounds` drops it.
    pub fn set_group_behavior(&mut self, id: AnnotationId, mode: GroupMode) -> Result<()> {
        let annotation = self
            .annotations
            .get(&id)
            .ok_or(GraphError::NotFound(EntityRef::Annotation(id)))?;
        let current = annotation
            .behavior()
            .ok_or(GraphError::GroupBehaviorMismatch(id))?;
        if current.mode() == mode {
            return Ok(());
        }
        let members: BTreeSet<NodeId> = match current {
            GroupBehavior::Bounds => self.nodes_inside(annotation.rect()).into_iter().collect(),
            GroupBehavior::Explicit(m) | GroupBehavior::Parent(m) => m.clone(),
        };
        let next = match mode {
            GroupMode::Bounds => GroupBehavior::Bounds,
            GroupMode::Explicit => GroupBehavior::Explicit(members),
            GroupMode::Parent => GroupBehavior::Parent(members),
        };
        if let Some(behavior) = self.annotation_mut(id)?.behavior_mut() {
            *behavior = next;
        }
        self.emit(GraphEvent::AnnotationChanged(id));
        Ok(())
    }

    fn edit_members<F>(&mut self, id: AnnotationId, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut BTreeSet<NodeId>) -> bool,
    {
        let members = self
            .annotation_mut(id)?
            .behavior_mut()
            .and_then(GroupBehavior::members_mut)
            .ok_or(GraphError::GroupBehaviorMismatch(id))?;
        let changed = edit(members);
        if changed {
            self.emit(GraphEvent::AnnotationChanged(id));
        }
        Ok(changed)
    }

    /// Add a node to an explicit or parent group.
    ///
    /// Returns whether membership changed. Bounds groups fail with
    /// [`GraphError::GroupBehaviorMismatch`].
    pub fn add_group_member(&mut self, id: AnnotationId, node: NodeId) -> Result<bool> {
        if !self.nodes.contains_key(&node) {
            return Err(GraphError::NotFound(EntityRef::Node(node)));
        }
        self.edit_members(id, |m| m.insert(node))
    }

    /// Inverse of [`Graph::add_group_member`].
    pub fn remove_group_member(&mut self, id: AnnotationId, node: NodeId) -> Result<bool> {
        self.edit_members(id, |m| m.remove(&node))
    }

    /// Move an annotation; parent groups carry their members along.
    pub fn move_annotation_by(&mut self, id: AnnotationId, delta: Point) -> Result<()> {
        let annotation = self.annotation_mut(id)?;
        annotation.translate(delta);
        let carried: Vec<NodeId> = match annotation.behavior() {
            Some(GroupBehavior::Parent(members)) => members.iter().copied().collect(),
            _ => Vec::new(),
        };
        self.emit(GraphEvent::AnnotationChanged(id));
        for node in carried {
            if self.nodes.contains_key(&node) {
                self.move_node_by(node, delta)?;
            }
        }
        Ok(())
    }

    /// Move and resize a sticky note or group. Markers only take the origin.
    pub fn set_annotation_rect(&mut self, id: AnnotationId, rect: Rect) -> Result<()> {
        match &mut self.annotation_mut(id)?.kind {
            AnnotationKind::Sticky { position, size, .. } | AnnotationKind::Group { position, size, .. } => {
                *position = rect.origin();
                *size = rect.size();
            }
            AnnotationKind::Marker { position, .. } => *position = rect.origin(),
        }
        self.emit(GraphEvent::AnnotationChanged(id));
        Ok(())
    }

    /// Replace the text of a sticky note.
    pub fn set_sticky_text(&mut self, id: AnnotationId, new_text: impl Into<String>) -> Result<()> {
        match &mut self.annotation_mut(id)?.kind {
            AnnotationKind::Sticky { text, .. } => *text = new_text.into(),
            _ => return Err(GraphError::NotFound(EntityRef::Annotation(id))),
        }
        self.emit(GraphEvent::AnnotationChanged(id));
        Ok(())
    }

    pub fn set_annotation_visible(&mut self, id: AnnotationId, visible: bool) -> Result<()> {
        self.annotation_mut(id)?.is_visible = visible;
        self.emit(GraphEvent::AnnotationChanged(id));
        Ok(())
    }
}
