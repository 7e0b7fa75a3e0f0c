//! Nearest-neighbor index over oriented scan points
//!
//! A binary tree of axis-aligned boxes. Every node also carries a cone
//! bounding the normals beneath it, so a query that only accepts points
//! facing roughly the same way as its own normal can discard whole
//! subtrees without looking at a single point.

use std::ops::Range;

use slotmap::SlotMap;

use super::bounds::Aabb;
use super::normal_cone::NormalCone;
use super::partition::partition_in_place;
use super::{IndexError, NodeId};
use crate::config::PointIndexConfig;
use crate::foundation::math::{utils, Axis, Vec3};

/// Angular slack used when checking cone containment after construction
const CONE_SLACK: f32 = 1e-4;

/// Widens cached pruning cones so rounding never discards a compatible
/// point. Each cone merge renormalizes its axis (a few f32 ulps of angle)
/// and the pruning and leaf tests each round one dot product; over a tree
/// of depth 64 that stays well below 1e-4 rad.
const PRUNE_SLACK: f32 = 1e-4;

/// Shape of a point index node
#[derive(Debug, Clone, PartialEq)]
pub enum PointNodeKind {
    /// Bucket of points, stored as a range of the index's point order
    Leaf {
        /// Range into the permuted point order
        members: Range<usize>,
    },
    /// Two children split by an axis-aligned plane
    Internal {
        /// Split axis
        axis: Axis,
        /// Points strictly below this coordinate went left
        split: f32,
        /// Lower child
        left: NodeId,
        /// Upper child
        right: NodeId,
    },
}

/// Node of a [`PointIndex`]
#[derive(Debug, Clone)]
pub struct PointNode {
    /// Leaf or internal payload
    pub kind: PointNodeKind,
    /// Box around every point in the subtree
    pub bounds: Aabb,
    /// Cone around every normal in the subtree
    pub cone: NormalCone,
    /// `cos(cone.half_angle + tolerance)`, cached for pruning
    pub cone_threshold: f32,
}

/// Result of a nearest-neighbor query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the point in the arrays the index was built from
    pub index: usize,
    /// Euclidean distance to the query
    pub distance: f32,
    /// Whether the point was flagged as lying on a scan boundary
    pub on_boundary: bool,
}

/// Immutable nearest-neighbor index over points with unit normals
#[derive(Debug, Clone)]
pub struct PointIndex {
    nodes: SlotMap<NodeId, PointNode>,
    root: NodeId,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    boundary: Vec<bool>,
    order: Vec<u32>,
    cos_tolerance: f32,
    collapsed: usize,
}

impl PointIndex {
    /// Build an index over `points` with matching `normals`
    ///
    /// Returns `Ok(None)` when there are no points.
    pub fn build(
        points: &[Vec3],
        normals: &[Vec3],
        config: &PointIndexConfig,
    ) -> Result<Option<Self>, IndexError> {
        Self::build_with_boundary(points, normals, &vec![false; points.len()], config)
    }

    /// Build an index that also records which points lie on a scan boundary
    pub fn build_with_boundary(
        points: &[Vec3],
        normals: &[Vec3],
        boundary: &[bool],
        config: &PointIndexConfig,
    ) -> Result<Option<Self>, IndexError> {
        if normals.len() != points.len() {
            return Err(IndexError::LengthMismatch {
                what: "normals",
                expected: points.len(),
                actual: normals.len(),
            });
        }
        if boundary.len() != points.len() {
            return Err(IndexError::LengthMismatch {
                what: "boundary flags",
                expected: points.len(),
                actual: boundary.len(),
            });
        }
        if config.leaf_threshold == 0 {
            return Err(IndexError::ZeroLeafThreshold);
        }
        if let Some(index) = points.iter().position(|p| !utils::is_finite(p)) {
            return Err(IndexError::NonFinite { what: "point", index });
        }
        if points.is_empty() {
            return Ok(None);
        }

        let normals = normals
            .iter()
            .enumerate()
            .map(|(index, n)| {
                if utils::is_finite(n) {
                    // Zero normals cannot be oriented; point them anywhere
                    Ok(utils::try_normalize(n).unwrap_or_else(Vec3::z))
                } else {
                    Err(IndexError::NonFinite { what: "normal", index })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tolerance = config.normal_tolerance();
        let mut builder = Builder {
            nodes: SlotMap::with_capacity_and_key(2 * points.len() / config.leaf_threshold + 1),
            positions: points,
            normals: &normals,
            order: (0..points.len() as u32).collect(),
            leaf_threshold: config.leaf_threshold,
            tolerance,
            collapsed: 0,
        };
        let root = builder.build_range(0, points.len());
        let Builder { nodes, order, collapsed, .. } = builder;

        if collapsed > 0 {
            log::warn!("PointIndex: collapsed {} coincident points", collapsed);
        }

        let index = Self {
            nodes,
            root,
            positions: points.to_vec(),
            normals,
            boundary: boundary.to_vec(),
            order,
            cos_tolerance: tolerance.cos(),
            collapsed,
        };
        log::debug!(
            "PointIndex: {} points, {} nodes, depth {}",
            index.len(),
            index.node_count(),
            index.depth()
        );
        debug_assert!(index.verify_bounds(), "point index bounds are inconsistent");
        Ok(Some(index))
    }

    /// Closest point to `query` no farther than `max_distance`
    ///
    /// With a `normal`, only points whose normal lies within the configured
    /// tolerance of it are eligible. A point exactly `max_distance` away is
    /// still accepted; pass `f32::INFINITY` for an unbounded search.
    pub fn nearest(&self, query: &Vec3, normal: Option<&Vec3>, max_distance: f32) -> Option<Neighbor> {
        if max_distance.is_nan() || max_distance < 0.0 {
            return None;
        }
        let mut search = NearestSearch {
            index: self,
            query: *query,
            normal: normal.and_then(utils::try_normalize),
            best_sq: max_distance * max_distance,
            best: None,
        };
        if search.can_improve(&self.nodes[self.root].bounds) {
            search.visit(self.root);
        }

        search.best.map(|i| Neighbor {
            index: i,
            distance: search.best_sq.sqrt(),
            on_boundary: self.boundary[i],
        })
    }

    /// Number of points supplied at construction
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Always false: empty input never produces an index
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Coincident points dropped while building
    pub fn collapsed_points(&self) -> usize {
        self.collapsed
    }

    /// Position of point `i`
    pub fn position(&self, i: usize) -> Vec3 {
        self.positions[i]
    }

    /// Unit normal of point `i`
    pub fn normal(&self, i: usize) -> Vec3 {
        self.normals[i]
    }

    /// Root node handle
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a node
    pub fn node(&self, id: NodeId) -> &PointNode {
        &self.nodes[id]
    }

    /// Number of nodes in the tree
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Length of the longest root-to-leaf path, counting nodes
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self.root, 1)];
        while let Some((id, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let PointNodeKind::Internal { left, right, .. } = &self.nodes[id].kind {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        deepest
    }

    /// Check every node's box and cone against its children (or, for
    /// leaves, against its points)
    pub fn verify_bounds(&self) -> bool {
        self.verify_node(self.root)
    }

    fn verify_node(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        match &node.kind {
            PointNodeKind::Leaf { members } => self.order[members.clone()].iter().all(|&i| {
                let i = i as usize;
                node.bounds.contains_point(&self.positions[i])
                    && node.cone.contains_direction(&self.normals[i], CONE_SLACK)
            }),
            PointNodeKind::Internal { left, right, .. } => [*left, *right].iter().all(|&child| {
                let child_node = &self.nodes[child];
                node.bounds.contains(&child_node.bounds)
                    && node.cone.contains_cone(&child_node.cone, CONE_SLACK)
                    && self.verify_node(child)
            }),
        }
    }
}

struct Builder<'a> {
    nodes: SlotMap<NodeId, PointNode>,
    positions: &'a [Vec3],
    normals: &'a [Vec3],
    order: Vec<u32>,
    leaf_threshold: usize,
    tolerance: f32,
    collapsed: usize,
}

impl Builder<'_> {
    fn build_range(&mut self, start: usize, mut end: usize) -> NodeId {
        let positions = self.positions;
        let bounds = Aabb::from_points(self.order[start..end].iter().map(|&i| &positions[i as usize]));

        // Identical points cannot be split; keep one of them
        if end - start > self.leaf_threshold && bounds.is_point() {
            self.collapsed += end - start - 1;
            end = start + 1;
        }

        if end - start <= self.leaf_threshold {
            let mut members = self.order[start..end].iter().map(|&i| self.normals[i as usize]);
            let first = members.next().map_or_else(|| NormalCone::from_normal(Vec3::z()), NormalCone::from_normal);
            let cone = members.fold(first, |cone, n| cone.merge(&NormalCone::from_normal(n)));
            return self.push(PointNodeKind::Leaf { members: start..end }, bounds, cone);
        }

        // Midpoint of the widest extent, not a median: cheaper, less balanced
        let axis = bounds.longest_axis();
        let split = 0.5 * (axis.of(&bounds.min) + axis.of(&bounds.max));
        let range = &mut self.order[start..end];
        let mut mid = partition_in_place(range, |&i| axis.of(&positions[i as usize]) < split);
        if mid == 0 {
            // The midpoint rounded onto the minimum
            mid = partition_in_place(range, |&i| axis.of(&positions[i as usize]) <= split);
        }
        debug_assert!(mid > 0 && mid < end - start, "split produced an empty side");

        let left = self.build_range(start, start + mid);
        let right = self.build_range(start + mid, end);
        let cone = self.nodes[left].cone.merge(&self.nodes[right].cone);
        self.push(PointNodeKind::Internal { axis, split, left, right }, bounds, cone)
    }

    fn push(&mut self, kind: PointNodeKind, bounds: Aabb, cone: NormalCone) -> NodeId {
        self.nodes.insert(PointNode {
            kind,
            bounds,
            cone,
            cone_threshold: cone.pruning_threshold(self.tolerance + PRUNE_SLACK),
        })
    }
}

struct NearestSearch<'a> {
    index: &'a PointIndex,
    query: Vec3,
    normal: Option<Vec3>,
    best_sq: f32,
    best: Option<usize>,
}

impl NearestSearch<'_> {
    /// Visit a subtree; returns true once the best candidate is provably final
    fn visit(&mut self, id: NodeId) -> bool {
        let index = self.index;
        let node = &index.nodes[id];

        if let Some(normal) = &self.normal {
            if normal.dot(&node.cone.center) < node.cone_threshold {
                return false;
            }
        }

        match &node.kind {
            PointNodeKind::Leaf { members } => {
                for &i in &index.order[members.clone()] {
                    self.consider(i as usize);
                }
            }
            PointNodeKind::Internal { axis, split, left, right } => {
                let (near, far) = if axis.of(&self.query) < *split {
                    (*left, *right)
                } else {
                    (*right, *left)
                };
                if self.visit(near) {
                    return true;
                }
                if self.can_improve(&index.nodes[far].bounds) && self.visit(far) {
                    return true;
                }
            }
        }

        // Nothing outside this box can beat a best ball lying inside it
        self.best.is_some() && node.bounds.contains_ball(&self.query, self.best_sq)
    }

    fn consider(&mut self, i: usize) {
        if let Some(normal) = &self.normal {
            if normal.dot(&self.index.normals[i]) < self.index.cos_tolerance {
                return;
            }
        }
        let distance_sq = (self.index.positions[i] - self.query).norm_squared();
        if self.improves(distance_sq) {
            self.best_sq = distance_sq;
            self.best = Some(i);
        }
    }

    fn can_improve(&self, bounds: &Aabb) -> bool {
        self.improves(bounds.distance_squared(&self.query))
    }

    fn improves(&self, distance_sq: f32) -> bool {
        if self.best.is_some() {
            distance_sq < self.best_sq
        } else {
            distance_sq <= self.best_sq
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::constants::{self, QUARTER_PI};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_unit(rng: &mut StdRng) -> Vec3 {
        loop {
            let v = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            if let Some(n) = v.try_normalize(1e-3) {
                return n;
            }
        }
    }

    fn random_cloud(rng: &mut StdRng, count: usize) -> (Vec<Vec3>, Vec<Vec3>) {
        let points = (0..count)
            .map(|_| Vec3::new(rng.gen_range(-10.0..10.0), rng.gen_range(-5.0..5.0), rng.gen_range(0.0..1.0)))
            .collect();
        let normals = (0..count).map(|_| random_unit(rng)).collect();
        (points, normals)
    }

    fn cos_tolerance() -> f32 {
        PointIndexConfig::default().normal_tolerance().cos()
    }

    /// Linear scan using the same normalized normals and tolerance as the index
    fn brute_force(index: &PointIndex, points: &[Vec3], q: &Vec3, n: Option<&Vec3>) -> Option<(usize, f32)> {
        let n = n.map(Vec3::normalize);
        points
            .iter()
            .enumerate()
            .filter(|(i, _)| n.map_or(true, |n| n.dot(&index.normal(*i)) >= cos_tolerance()))
            .map(|(i, p)| (i, (p - q).norm_squared()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, d)| (i, d.sqrt()))
    }

    fn build(points: &[Vec3], normals: &[Vec3]) -> PointIndex {
        PointIndex::build(points, normals, &PointIndexConfig::default())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_empty_input_yields_no_index() {
        let result = PointIndex::build(&[], &[], &PointIndexConfig::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let err = PointIndex::build(&[Vec3::zeros()], &[], &PointIndexConfig::default()).unwrap_err();
        assert!(matches!(err, IndexError::LengthMismatch { what: "normals", .. }));
    }

    #[test]
    fn test_non_finite_point_is_rejected() {
        let err = PointIndex::build(&[Vec3::new(f32::NAN, 0.0, 0.0)], &[Vec3::z()], &PointIndexConfig::default())
            .unwrap_err();
        assert_eq!(err, IndexError::NonFinite { what: "point", index: 0 });
    }

    #[test]
    fn test_four_point_example() {
        let points = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        let normals = [Vec3::z(); 4];
        let index = build(&points, &normals);

        let hit = index.nearest(&Vec3::new(0.1, 0.1, 0.1), Some(&Vec3::z()), 2.0).unwrap();
        assert_eq!(hit.index, 0);
        assert_relative_eq!(hit.distance, 0.03_f32.sqrt(), epsilon = 1e-6);
        assert!(!hit.on_boundary);
    }

    #[test]
    fn test_every_point_finds_itself() {
        let mut rng = StdRng::seed_from_u64(7);
        let (points, normals) = random_cloud(&mut rng, 1500);
        let index = build(&points, &normals);

        for (i, (p, n)) in points.iter().zip(&normals).enumerate() {
            let hit = index.nearest(p, Some(n), 0.0).expect("point must find itself");
            assert_eq!(hit.distance, 0.0);
            assert_eq!(index.position(hit.index), points[i]);
        }
    }

    #[test]
    fn test_unconstrained_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(11);
        let (points, normals) = random_cloud(&mut rng, 2000);
        let index = build(&points, &normals);

        for _ in 0..500 {
            let q = Vec3::new(rng.gen_range(-12.0..12.0), rng.gen_range(-7.0..7.0), rng.gen_range(-2.0..3.0));
            let hit = index.nearest(&q, None, f32::INFINITY).unwrap();
            let (expected, distance) = brute_force(&index, &points, &q, None).unwrap();
            assert_eq!(hit.index, expected);
            assert_eq!(hit.distance, distance);
        }
    }

    #[test]
    fn test_normal_constrained_matches_filtered_brute_force() {
        let mut rng = StdRng::seed_from_u64(23);
        let (points, normals) = random_cloud(&mut rng, 2000);
        let index = build(&points, &normals);

        for _ in 0..500 {
            let q = Vec3::new(rng.gen_range(-12.0..12.0), rng.gen_range(-7.0..7.0), rng.gen_range(-2.0..3.0));
            let n = random_unit(&mut rng);
            let hit = index.nearest(&q, Some(&n), f32::INFINITY);
            let expected = brute_force(&index, &points, &q, Some(&n));
            match (hit, expected) {
                (Some(hit), Some((i, distance))) => {
                    assert_eq!(hit.index, i);
                    assert_eq!(hit.distance, distance);
                    assert!(n.dot(&normals[hit.index]) >= cos_tolerance() - 1e-6);
                }
                (None, None) => {}
                other => panic!("index and brute force disagree: {:?}", other),
            }
        }
    }

    #[test]
    fn test_nearly_parallel_normals_keep_both_points_reachable() {
        let tilt = 2e-4_f32;
        let points = [Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0)];
        let normals = [Vec3::z(), Vec3::new(tilt.sin(), 0.0, tilt.cos())];
        let config = PointIndexConfig { leaf_threshold: 1, ..Default::default() };
        let index = PointIndex::build(&points, &normals, &config).unwrap().unwrap();

        let root = index.node(index.root());
        assert!(root.cone.half_angle > 0.0);
        assert!(root.cone.contains_direction(&normals[0], 1e-6));
        assert!(root.cone.contains_direction(&normals[1], 1e-6));

        // Just inside the tolerance of point 1, just outside that of point 0
        let angle = QUARTER_PI + 1e-4;
        let query = Vec3::new(angle.sin(), 0.0, angle.cos());
        assert!(query.dot(&index.normal(0)) < cos_tolerance());
        assert!(query.dot(&index.normal(1)) >= cos_tolerance());
        let hit = index.nearest(&points[0], Some(&query), f32::INFINITY).unwrap();
        assert_eq!(hit.index, 1);
        assert_eq!(brute_force(&index, &points, &points[0], Some(&query)).map(|(i, _)| i), Some(1));
    }

    #[test]
    fn test_clustered_normals_match_filtered_brute_force() {
        let mut rng = StdRng::seed_from_u64(31);
        let count = 3000;
        let points: Vec<Vec3> = (0..count)
            .map(|_| Vec3::new(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0), rng.gen_range(-0.1..0.1)))
            .collect();
        // A smooth surface: every normal within 1e-3 rad of +Z
        let normals: Vec<Vec3> = (0..count)
            .map(|_| Vec3::new(rng.gen_range(-7e-4..7e-4), rng.gen_range(-7e-4..7e-4), 1.0).normalize())
            .collect();
        let config = PointIndexConfig { leaf_threshold: 4, ..Default::default() };
        let index = PointIndex::build(&points, &normals, &config).unwrap().unwrap();
        assert!(index.verify_bounds());

        for _ in 0..1000 {
            let q = Vec3::new(rng.gen_range(-11.0..11.0), rng.gen_range(-11.0..11.0), rng.gen_range(-1.0..1.0));
            // Query normals sit on the tolerance edge of the cluster
            let tilt = QUARTER_PI + rng.gen_range(-1.5e-3..1.5e-3);
            let heading = rng.gen_range(0.0..constants::PI * 2.0);
            let n = Vec3::new(tilt.sin() * heading.cos(), tilt.sin() * heading.sin(), tilt.cos());

            let hit = index.nearest(&q, Some(&n), f32::INFINITY).map(|h| h.index);
            let expected = brute_force(&index, &points, &q, Some(&n)).map(|(i, _)| i);
            assert_eq!(hit, expected, "query {:?} normal {:?}", q, n);
        }
    }

    #[test]
    fn test_max_distance_limits_results() {
        let points = [Vec3::zeros(), Vec3::new(5.0, 0.0, 0.0)];
        let normals = [Vec3::z(); 2];
        let index = build(&points, &normals);

        assert!(index.nearest(&Vec3::new(2.0, 0.0, 0.0), None, 1.5).is_none());
        let hit = index.nearest(&Vec3::new(2.0, 0.0, 0.0), None, 2.0).unwrap();
        assert_eq!(hit.index, 0);
    }

    #[test]
    fn test_incompatible_normals_are_skipped() {
        let points = [Vec3::zeros(), Vec3::new(3.0, 0.0, 0.0)];
        let normals = [-Vec3::z(), Vec3::z()];
        let index = build(&points, &normals);

        let hit = index.nearest(&Vec3::zeros(), Some(&Vec3::z()), f32::INFINITY).unwrap();
        assert_eq!(hit.index, 1);
        assert!(index.nearest(&Vec3::zeros(), Some(&Vec3::x()), f32::INFINITY).is_none());
    }

    #[test]
    fn test_bounds_and_cones_nest() {
        let mut rng = StdRng::seed_from_u64(3);
        let (points, normals) = random_cloud(&mut rng, 1000);
        let index = build(&points, &normals);
        assert!(index.verify_bounds());
        assert!(index.node_count() > 1);

        let root = index.node(index.root());
        for p in &points {
            assert!(root.bounds.contains_point(p));
        }
    }

    #[test]
    fn test_leaves_respect_threshold() {
        let mut rng = StdRng::seed_from_u64(5);
        let (points, normals) = random_cloud(&mut rng, 800);
        let config = PointIndexConfig { leaf_threshold: 4, ..Default::default() };
        let index = PointIndex::build(&points, &normals, &config).unwrap().unwrap();

        let mut stack = vec![index.root()];
        while let Some(id) = stack.pop() {
            match &index.node(id).kind {
                PointNodeKind::Leaf { members } => assert!(members.len() <= 4 && !members.is_empty()),
                PointNodeKind::Internal { left, right, .. } => {
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }
    }

    #[test]
    fn test_coincident_points_collapse() {
        let points = vec![Vec3::new(1.0, 2.0, 3.0); 40];
        let normals = vec![Vec3::z(); 40];
        let index = build(&points, &normals);

        assert_eq!(index.collapsed_points(), 39);
        assert_eq!(index.node_count(), 1);
        let hit = index.nearest(&points[17], Some(&Vec3::z()), 0.0).unwrap();
        assert_eq!(hit.distance, 0.0);
    }

    #[test]
    fn test_boundary_flags_are_reported() {
        let points = [Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0)];
        let normals = [Vec3::z(); 2];
        let index = PointIndex::build_with_boundary(&points, &normals, &[false, true], &PointIndexConfig::default())
            .unwrap()
            .unwrap();

        assert!(index.nearest(&Vec3::new(0.9, 0.0, 0.0), None, 1.0).unwrap().on_boundary);
        assert!(!index.nearest(&Vec3::new(0.1, 0.0, 0.0), None, 1.0).unwrap().on_boundary);
    }
}
