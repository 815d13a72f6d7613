use std::fmt;

use crate::model::{AnnotationId, ConnectionId, NodeId, PortId};

/// Identifies the entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Node(NodeId),
    Port { node: NodeId, port: PortId },
    Connection(ConnectionId),
    Annotation(AnnotationId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "node {}", id),
            Self::Port { node, port } => write!(f, "port {} on node {}", port, node),
            Self::Connection(id) => write!(f, "connection {}", id),
            Self::Annotation(id) => write!(f, "annotation {}", id),
        }
    }
}

/// Role a port was asked to play in a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRole {
    Source,
    Target,
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Target => f.write_str("target"),
        }
    }
}

/// Failures reported synchronously by graph mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("{0} not found")]
    NotFound(EntityRef),
    #[error("{0} already exists")]
    DuplicateId(EntityRef),
    #[error("connection endpoint references missing port {port} on node {node}")]
    InvalidEndpoint { node: NodeId, port: PortId },
    #[error("port {port} on node {node} cannot act as a {role}")]
    Direction {
        node: NodeId,
        port: PortId,
        role: PortRole,
    },
    #[error("port {port} on node {node} has reached max {limit} connections")]
    Capacity {
        node: NodeId,
        port: PortId,
        limit: usize,
    },
    #[error("port {port} on node {node} does not accept new connections")]
    PortNotConnectable { node: NodeId, port: PortId },
    #[error("connection rejected: {0}")]
    ValidationDenied(String),
    #[error("annotation {0} is not a group with explicit membership")]
    GroupBehaviorMismatch(AnnotationId),
    #[error("connection {connection} has no control point {index}")]
    ControlPointOutOfRange {
        connection: ConnectionId,
        index: usize,
    },
}

pub type Result<T> = std::result::Result<T, GraphError>;

/// Failures while decoding a persisted graph document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("malformed graph document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("graph document is inconsistent: {0}")]
    Graph(#[from] GraphError),
}

/// Failures while loading or checking an [`EditorConfig`](crate::config::EditorConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed editor config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid editor config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_display() {
        assert_eq!(
            GraphError::NotFound(EntityRef::Node(42)).to_string(),
            "node 42 not found"
        );
        assert_eq!(
            GraphError::DuplicateId(EntityRef::Connection(7)).to_string(),
            "connection 7 already exists"
        );
        assert_eq!(
            GraphError::Direction { node: 1, port: 2, role: PortRole::Target }.to_string(),
            "port 2 on node 1 cannot act as a target"
        );
        assert_eq!(
            GraphError::Capacity { node: 1, port: 3, limit: 2 }.to_string(),
            "port 3 on node 1 has reached max 2 connections"
        );
        assert_eq!(
            GraphError::ValidationDenied("no loops".into()).to_string(),
            "connection rejected: no loops"
        );
    }

    #[test]
    fn test_entity_ref_display() {
        assert_eq!(EntityRef::Port { node: 5, port: 9 }.to_string(), "port 9 on node 5");
        assert_eq!(EntityRef::Annotation(3).to_string(), "annotation 3");
    }

    #[test]
    fn test_document_error_from_graph_error() {
        let err: DocumentError = GraphError::NotFound(EntityRef::Node(1)).into();
        assert!(err.to_string().contains("node 1 not found"));
    }
}
