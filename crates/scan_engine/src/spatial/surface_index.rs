//! Closest-point index over a triangulated surface
//!
//! Each triangle is bounded by its smallest enclosing sphere. Triangles are
//! split at the median sphere center along the axis of widest spread, and
//! every internal node keeps the minimal sphere around its two children.

use slotmap::SlotMap;

use super::bounds::{BoundingSphere, Triangle};
use super::partition::partition_in_place;
use super::{IndexError, NodeId};
use crate::foundation::math::{utils, Axis, Vec3};

/// Relative tolerance for sphere nesting checks after construction
const SPHERE_SLACK: f32 = 1e-4;

/// Shape of a surface index node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceNodeKind {
    /// A single triangle
    Leaf {
        /// Triangle index
        triangle: usize,
    },
    /// Two children split at a sphere-center median
    Internal {
        /// Split axis
        axis: Axis,
        /// Children whose sphere center is at or below this went left
        split: f32,
        /// Lower child
        left: NodeId,
        /// Upper child
        right: NodeId,
    },
}

/// Node of a [`SurfaceIndex`]
#[derive(Debug, Clone, Copy)]
pub struct SurfaceNode {
    /// Leaf or internal payload
    pub kind: SurfaceNodeKind,
    /// Sphere around every triangle in the subtree
    pub sphere: BoundingSphere,
}

/// Closest point found on the surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    /// Closest point on the surface
    pub point: Vec3,
    /// Distance from the query to `point`
    pub distance: f32,
    /// Triangle containing `point`
    pub triangle: usize,
}

/// Which side of the surface a point lies on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointSide {
    /// Behind the closest triangle's front face
    Inside,
    /// In front of (or on) the closest triangle
    Outside,
}

/// Immutable closest-point index over a triangle mesh
#[derive(Debug, Clone)]
pub struct SurfaceIndex {
    nodes: SlotMap<NodeId, SurfaceNode>,
    root: NodeId,
    vertices: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
}

impl SurfaceIndex {
    /// Build an index over `triangles`, each three indices into `vertices`
    ///
    /// Returns `Ok(None)` when there are no triangles.
    pub fn build(triangles: &[[u32; 3]], vertices: &[Vec3]) -> Result<Option<Self>, IndexError> {
        for (triangle, corners) in triangles.iter().enumerate() {
            if let Some(&vertex) = corners.iter().find(|&&v| v as usize >= vertices.len()) {
                return Err(IndexError::VertexOutOfRange {
                    triangle,
                    vertex,
                    vertex_count: vertices.len(),
                });
            }
        }
        if let Some(index) = vertices.iter().position(|v| !utils::is_finite(v)) {
            return Err(IndexError::NonFinite { what: "vertex", index });
        }
        if triangles.is_empty() {
            return Ok(None);
        }

        let mut index = Self {
            nodes: SlotMap::with_capacity_and_key(2 * triangles.len()),
            root: NodeId::default(),
            vertices: vertices.to_vec(),
            triangles: triangles.to_vec(),
        };
        let spheres: Vec<BoundingSphere> = (0..triangles.len())
            .map(|t| index.triangle(t).enclosing_sphere())
            .collect();
        let mut order: Vec<usize> = (0..triangles.len()).collect();
        index.root = index.build_range(&mut order, &spheres);

        log::debug!(
            "SurfaceIndex: {} triangles, {} nodes, root radius {:.4}",
            index.triangles.len(),
            index.nodes.len(),
            index.nodes[index.root].sphere.radius
        );
        debug_assert!(index.verify_bounds(), "surface index spheres are inconsistent");
        Ok(Some(index))
    }

    fn build_range(&mut self, order: &mut [usize], spheres: &[BoundingSphere]) -> NodeId {
        if let [triangle] = *order {
            return self.nodes.insert(SurfaceNode {
                kind: SurfaceNodeKind::Leaf { triangle },
                sphere: spheres[triangle],
            });
        }

        let axis = widest_axis(order, spheres);
        let coord = |t: &usize| axis.of(&spheres[*t].center);

        let mid = order.len() / 2;
        order.select_nth_unstable_by(mid, |a, b| coord(a).total_cmp(&coord(b)));
        let mut split = coord(&order[mid]);
        let mut count = partition_in_place(order, |t| coord(t) <= split);

        if count == order.len() {
            // Median is the maximum: fall back to the next distinct value below it
            match order.iter().map(coord).filter(|&c| c < split).reduce(f32::max) {
                Some(lower) => {
                    split = lower;
                    count = partition_in_place(order, |t| coord(t) <= split);
                }
                // Every center coincides on the widest axis, so on all axes
                None => count = mid,
            }
        }
        debug_assert!(count > 0 && count < order.len(), "median split produced an empty side");

        let (lower, upper) = order.split_at_mut(count);
        let left = self.build_range(lower, spheres);
        let right = self.build_range(upper, spheres);
        let sphere = self.nodes[left].sphere.merge(&self.nodes[right].sphere);
        self.nodes.insert(SurfaceNode {
            kind: SurfaceNodeKind::Internal { axis, split, left, right },
            sphere,
        })
    }

    /// Closest point on the surface to `query`
    pub fn nearest_on_surface(&self, query: &Vec3) -> Option<SurfaceHit> {
        self.nearest_on_surface_within(query, f32::INFINITY)
    }

    /// Closest point on the surface no farther than `max_distance`
    pub fn nearest_on_surface_within(&self, query: &Vec3, max_distance: f32) -> Option<SurfaceHit> {
        if max_distance.is_nan() || max_distance < 0.0 {
            return None;
        }
        let mut best_sq = max_distance * max_distance;
        let mut best = None;
        self.visit(self.root, query, &mut best_sq, &mut best);
        best.map(|(triangle, point)| SurfaceHit {
            point,
            distance: best_sq.sqrt(),
            triangle,
        })
    }

    fn visit(&self, id: NodeId, query: &Vec3, best_sq: &mut f32, best: &mut Option<(usize, Vec3)>) {
        let node = &self.nodes[id];
        let reach = node.sphere.distance_lower_bound(query);
        if reach > 0.0 && reach * reach >= *best_sq && (best.is_some() || reach * reach > *best_sq) {
            return;
        }

        match node.kind {
            SurfaceNodeKind::Leaf { triangle } => {
                let point = self.triangle(triangle).closest_point(query);
                let distance_sq = (point - query).norm_squared();
                let improves = if best.is_some() {
                    distance_sq < *best_sq
                } else {
                    distance_sq <= *best_sq
                };
                if improves {
                    *best_sq = distance_sq;
                    *best = Some((triangle, point));
                }
            }
            SurfaceNodeKind::Internal { axis, split, left, right } => {
                let (near, far) = if axis.of(query) <= split { (left, right) } else { (right, left) };
                self.visit(near, query, best_sq, best);
                self.visit(far, query, best_sq, best);
            }
        }
    }

    /// Classify `query` against the facing of its closest triangle
    ///
    /// Returns `None` for an empty search or when the closest triangle is
    /// degenerate. Points exactly on the surface count as outside.
    pub fn side_of(&self, query: &Vec3) -> Option<(PointSide, SurfaceHit)> {
        let hit = self.nearest_on_surface(query)?;
        let normal = utils::try_normalize(&self.triangle(hit.triangle).area_normal())?;
        let side = if (query - hit.point).dot(&normal) < 0.0 {
            PointSide::Inside
        } else {
            PointSide::Outside
        };
        Some((side, hit))
    }

    /// Triangle `t` with its vertex positions resolved
    pub fn triangle(&self, t: usize) -> Triangle {
        let [a, b, c] = self.triangles[t];
        Triangle::new(
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        )
    }

    /// Number of triangles indexed
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    /// Always false: empty input never produces an index
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Root node handle
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a node
    pub fn node(&self, id: NodeId) -> &SurfaceNode {
        &self.nodes[id]
    }

    /// Check that every node's sphere holds its children's spheres and
    /// every leaf sphere holds its triangle
    pub fn verify_bounds(&self) -> bool {
        self.verify_node(self.root)
    }

    fn verify_node(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        let slack = node.sphere.inflated(SPHERE_SLACK);
        match node.kind {
            SurfaceNodeKind::Leaf { triangle } => {
                let tri = self.triangle(triangle);
                [tri.v0, tri.v1, tri.v2]
                    .iter()
                    .all(|v| slack.contains_sphere(&BoundingSphere::new(*v, 0.0)))
            }
            SurfaceNodeKind::Internal { left, right, .. } => [left, right].iter().all(|&child| {
                slack.contains_sphere(&self.nodes[child].sphere) && self.verify_node(child)
            }),
        }
    }
}

/// Axis along which the sphere centers spread the most (later axis wins ties)
fn widest_axis(order: &[usize], spheres: &[BoundingSphere]) -> Axis {
    let mut lo = Vec3::repeat(f32::INFINITY);
    let mut hi = Vec3::repeat(f32::NEG_INFINITY);
    for &t in order {
        lo = lo.inf(&spheres[t].center);
        hi = hi.sup(&spheres[t].center);
    }
    let spread = hi - lo;
    let mut axis = Axis::X;
    for candidate in [Axis::Y, Axis::Z] {
        if candidate.of(&spread) >= axis.of(&spread) {
            axis = candidate;
        }
    }
    axis
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Axis-aligned grid of `n x n` quads (two triangles each) in the plane z = 0
    fn grid_mesh(n: u32) -> (Vec<[u32; 3]>, Vec<Vec3>) {
        let mut vertices = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                vertices.push(Vec3::new(x as f32, y as f32, 0.0));
            }
        }
        let mut triangles = Vec::new();
        for y in 0..n {
            for x in 0..n {
                let i = y * (n + 1) + x;
                triangles.push([i, i + 1, i + n + 2]);
                triangles.push([i, i + n + 2, i + n + 1]);
            }
        }
        (triangles, vertices)
    }

    fn brute_force(index: &SurfaceIndex, query: &Vec3) -> f32 {
        (0..index.len())
            .map(|t| (index.triangle(t).closest_point(query) - query).norm())
            .fold(f32::INFINITY, f32::min)
    }

    #[test]
    fn test_empty_input_yields_no_index() {
        assert!(SurfaceIndex::build(&[], &[Vec3::zeros()]).unwrap().is_none());
    }

    #[test]
    fn test_out_of_range_vertex_is_rejected() {
        let err = SurfaceIndex::build(&[[0, 1, 3]], &[Vec3::zeros(); 3]).unwrap_err();
        assert_eq!(err, IndexError::VertexOutOfRange { triangle: 0, vertex: 3, vertex_count: 3 });
    }

    #[test]
    fn test_centroid_of_isolated_triangle() {
        let vertices = [Vec3::new(1.0, 0.0, 2.0), Vec3::new(3.0, 0.5, 2.0), Vec3::new(2.0, 2.0, 2.5)];
        let index = SurfaceIndex::build(&[[0, 1, 2]], &vertices).unwrap().unwrap();
        let tri = index.triangle(0);

        let hit = index.nearest_on_surface(&tri.centroid()).unwrap();
        assert_eq!(hit.triangle, 0);
        assert_relative_eq!(hit.distance, 0.0, epsilon = 1e-5);
        assert_relative_eq!(hit.point, tri.centroid(), epsilon = 1e-5);
    }

    #[test]
    fn test_point_above_grid_projects_down() {
        let (triangles, vertices) = grid_mesh(8);
        let index = SurfaceIndex::build(&triangles, &vertices).unwrap().unwrap();

        let hit = index.nearest_on_surface(&Vec3::new(3.3, 4.6, 2.0)).unwrap();
        assert_relative_eq!(hit.distance, 2.0, epsilon = 1e-5);
        assert_relative_eq!(hit.point, Vec3::new(3.3, 4.6, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_matches_brute_force() {
        let (triangles, vertices) = grid_mesh(10);
        let mut vertices = vertices;
        let mut rng = StdRng::seed_from_u64(17);
        for v in &mut vertices {
            v.z = rng.gen_range(-0.5..0.5);
        }
        let index = SurfaceIndex::build(&triangles, &vertices).unwrap().unwrap();

        for _ in 0..300 {
            let q = Vec3::new(rng.gen_range(-2.0..12.0), rng.gen_range(-2.0..12.0), rng.gen_range(-3.0..3.0));
            let hit = index.nearest_on_surface(&q).unwrap();
            assert_relative_eq!(hit.distance, brute_force(&index, &q), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_max_distance_bounds_search() {
        let (triangles, vertices) = grid_mesh(2);
        let index = SurfaceIndex::build(&triangles, &vertices).unwrap().unwrap();
        assert!(index.nearest_on_surface_within(&Vec3::new(1.0, 1.0, 3.0), 2.5).is_none());
        assert!(index.nearest_on_surface_within(&Vec3::new(1.0, 1.0, 3.0), 3.5).is_some());
    }

    #[test]
    fn test_spheres_nest() {
        let (triangles, vertices) = grid_mesh(12);
        let index = SurfaceIndex::build(&triangles, &vertices).unwrap().unwrap();
        assert!(index.verify_bounds());
    }

    #[test]
    fn test_duplicate_triangles_still_split() {
        let vertices = [Vec3::zeros(), Vec3::x(), Vec3::y()];
        let triangles = vec![[0, 1, 2]; 5];
        let index = SurfaceIndex::build(&triangles, &vertices).unwrap().unwrap();
        assert!(index.verify_bounds());
        assert!(index.nearest_on_surface(&Vec3::new(0.2, 0.2, 1.0)).is_some());
    }

    #[test]
    fn test_side_of_uses_triangle_facing() {
        let (triangles, vertices) = grid_mesh(4);
        let index = SurfaceIndex::build(&triangles, &vertices).unwrap().unwrap();

        let (above, _) = index.side_of(&Vec3::new(2.2, 1.7, 1.0)).unwrap();
        let (below, _) = index.side_of(&Vec3::new(2.2, 1.7, -1.0)).unwrap();
        assert_eq!(above, PointSide::Outside);
        assert_eq!(below, PointSide::Inside);
    }
}
