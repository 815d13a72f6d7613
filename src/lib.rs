//! # Node Graph Core
//!
//! The model and geometry engine behind a node-based diagram editor: typed
//! nodes with ports, routed connections, annotations, a spatial index for
//! hit testing and culling, and a pan/zoom camera with animated navigation.
//! Rendering is left to the host.
//!
//! ## Features
//!
//! - **Single-owner graph** - [`Graph`] owns nodes, connections and
//!   annotations in insertion-ordered arenas; everything references by id
//! - **Connection routing** - straight, bezier, step, smooth-step and
//!   editable orthogonal paths that keep clear of the nodes they join
//! - **Spatial index** - uniform grid over nodes and routed paths for
//!   point and rectangle queries
//! - **Validation hooks** - built-in port checks plus pluggable
//!   [`ConnectionValidator`]s
//! - **Observers** - every mutation emits a [`GraphEvent`]
//! - **Viewport** - screen/canvas transforms, fitting and eased animation
//! - **Layout** - cycle and orphan detection, grid/align/distribute helpers
//!   and Sugiyama layering (feature `layout`, on by default)
//!
//! ## Quick Start
//!
//! ```
//! use node_graph_core::{Connection, ConnectionStyle, Graph, Node, Point, Port, Size};
//!
//! let mut graph: Graph<()> = Graph::new();
//! graph.add_node(Node::new(1, "source", Point::new(0.0, 0.0), Size::new(100.0, 50.0), ())
//!     .with_output(Port::output(1, "out"))).unwrap();
//! graph.add_node(Node::new(2, "sink", Point::new(300.0, 0.0), Size::new(100.0, 50.0), ())
//!     .with_input(Port::input(1, "in"))).unwrap();
//! graph.add_connection(Connection::new(1, (1, 1), (2, 1))
//!     .with_style(ConnectionStyle::SmoothStep)).unwrap();
//!
//! let path = graph.route(1).unwrap();
//! assert_eq!(path.start(), Point::new(100.0, 25.0));
//! assert_eq!(path.end(), Point::new(300.0, 25.0));
//! assert!(path.to_svg_path().starts_with("M 100 25"));
//! assert_eq!(graph.connection_at(Point::new(200.0, 26.0), 4.0), Some(1));
//! ```
//!
//! ## Modules
//!
//! - [`graph`], [`model`], [`annotation`], [`selection`] - the graph model
//! - [`routing`], [`path`] - connection paths
//! - [`spatial`] - grid index used by the graph's hit tests
//! - [`validation`] - connection rules
//! - [`analysis`], `layout` - graph queries and layout
//! - [`viewport`], [`animation`] - camera
//! - [`document`] - persisted JSON form
//! - [`editor`] - screen-space facade tying graph and viewport together

pub mod analysis;
pub mod animation;
pub mod annotation;
pub mod config;
pub mod document;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod graph;
#[cfg(feature = "layout")]
pub mod layout;
pub mod model;
pub mod path;
pub mod routing;
pub mod selection;
pub mod spatial;
pub mod validation;
pub mod viewport;

pub use analysis::{Alignment, Axis, NodePosition};
pub use animation::{Easing, ViewportAnimation};
pub use annotation::{Annotation, AnnotationKind, GroupBehavior, GroupMode};
pub use config::{EditorConfig, RouterConfig, SpatialConfig, ViewportConfig};
pub use document::{GraphDocument, ViewportState};
pub use editor::{ConnectionDrag, NodeEditor};
pub use error::{ConfigError, DocumentError, EntityRef, GraphError, PortRole, Result};
pub use geometry::{Point, Rect, Side, Size};
pub use graph::{Graph, GraphEvent, SubscriptionId};
#[cfg(feature = "layout")]
pub use layout::{sugiyama_layout, Direction, SugiyamaConfig};
pub use model::{
    AnnotationId, Connection, ConnectionId, ConnectionStyle, Node, NodeId, Port, PortId,
    PortShape, PortType,
};
pub use path::{PathSegment, RoutedPath};
pub use routing::{Anchor, ConnectionRouter};
pub use selection::RemovedSelection;
pub use validation::{
    CompleteContext, ConnectionValidator, FnValidator, NoDuplicatesValidator,
    NoSelfLoopsValidator, StartContext, ValidatorChain, Verdict,
};
pub use viewport::{Viewport, ViewportController};
