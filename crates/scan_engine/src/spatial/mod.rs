//! Spatial partitioning data structures
//!
//! Build-once, query-many indices over scan geometry:
//! - [`PointIndex`]: bounding-box tree over oriented points, answering
//!   nearest-neighbor queries with an optional normal-compatibility filter
//! - [`SurfaceIndex`]: bounding-sphere tree over a triangle mesh, answering
//!   closest-point-on-surface queries
//!
//! Nodes of both trees live in a slot map arena addressed by [`NodeId`];
//! dropping the index drops every node.

mod bounds;
mod normal_cone;
mod partition;
mod point_index;
mod surface_index;

pub use bounds::{Aabb, BoundingSphere, Triangle};
pub use normal_cone::NormalCone;
pub use partition::partition_in_place;
pub use point_index::{Neighbor, PointIndex, PointNode, PointNodeKind};
pub use surface_index::{PointSide, SurfaceHit, SurfaceIndex, SurfaceNode, SurfaceNodeKind};

use thiserror::Error;

slotmap::new_key_type! {
    /// Stable handle of a node inside an index arena
    pub struct NodeId;
}

/// Malformed input to index construction
///
/// Empty input is not an error: builders report it as `Ok(None)`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    /// Per-point arrays disagree in length
    #[error("{what} has {actual} entries but there are {expected} points")]
    LengthMismatch {
        /// Which array is off
        what: &'static str,
        /// Number of points
        expected: usize,
        /// Entries in the offending array
        actual: usize,
    },

    /// A coordinate is NaN or infinite
    #[error("{what} {index} has a non-finite coordinate")]
    NonFinite {
        /// Kind of element
        what: &'static str,
        /// Offending element index
        index: usize,
    },

    /// A triangle references a vertex that does not exist
    #[error("triangle {triangle} references vertex {vertex} but only {vertex_count} vertices exist")]
    VertexOutOfRange {
        /// Triangle index
        triangle: usize,
        /// Offending vertex index
        vertex: u32,
        /// Number of vertices supplied
        vertex_count: usize,
    },

    /// Leaves must hold at least one point
    #[error("leaf threshold must be at least 1")]
    ZeroLeafThreshold,
}
