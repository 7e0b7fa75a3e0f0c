//! Octree space-carving sweep over one or more scans
//!
//! Cubes are classified against every scan, accepted as leaves when the
//! scans agree and split into eight octants when the surface passes
//! through them. Each scan gets its own [`CarveCache`] for the duration of
//! the sweep.

use super::classifier::{CarveCache, Occupancy};
use super::ray_cache::RayCache;
use crate::config::CarveConfig;
use crate::foundation::math::Vec3;
use crate::foundation::time::Stopwatch;

/// Axis-aligned cube
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cube {
    /// Center in world space
    pub center: Vec3,
    /// Half the side length
    pub half_side: f32,
}

impl Cube {
    /// Create a cube
    pub fn new(center: Vec3, half_side: f32) -> Self {
        Self { center, half_side }
    }

    /// The eight half-size cubes filling this one
    ///
    /// Octant layout:
    /// 0: -X, -Y, -Z
    /// 1: +X, -Y, -Z
    /// 2: -X, +Y, -Z
    /// 3: +X, +Y, -Z
    /// 4: -X, -Y, +Z
    /// 5: +X, -Y, +Z
    /// 6: -X, +Y, +Z
    /// 7: +X, +Y, +Z
    pub fn octants(&self) -> [Cube; 8] {
        let quarter = self.half_side * 0.5;
        std::array::from_fn(|octant| {
            let x_sign = if octant & 1 != 0 { 1.0 } else { -1.0 };
            let y_sign = if octant & 2 != 0 { 1.0 } else { -1.0 };
            let z_sign = if octant & 4 != 0 { 1.0 } else { -1.0 };
            Cube::new(self.center + Vec3::new(x_sign, y_sign, z_sign) * quarter, quarter)
        })
    }
}

/// Final state of a sweep leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellState {
    /// Occupied by the object
    Inside,
    /// Free space carved away by at least one scan
    Outside,
    /// Crossed by the surface at the finest level
    Surface,
    /// No scan had evidence about the cell
    Unseen,
}

/// Leaf produced by a sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeCell {
    /// Cell geometry
    pub cube: Cube,
    /// Subdivision level, 0 for the root
    pub depth: u32,
    /// Decided state
    pub state: CellState,
}

/// How the scans' verdicts on one cube combine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Accept as a leaf in this state
    Leaf(CellState),
    /// Split into octants
    Subdivide,
}

/// Merge per-scan outcomes for the same cube
///
/// Free space seen by any scan wins. Otherwise a surface or silhouette in
/// any scan forces subdivision, and a cube some scan saw as inside is
/// inside. Abstaining scans never count as evidence.
pub fn combine(outcomes: &[Occupancy]) -> Verdict {
    if outcomes.contains(&Occupancy::Outside) {
        Verdict::Leaf(CellState::Outside)
    } else if outcomes.iter().any(|o| o.is_ambiguous()) {
        Verdict::Subdivide
    } else if outcomes.contains(&Occupancy::Inside) {
        Verdict::Leaf(CellState::Inside)
    } else {
        Verdict::Leaf(CellState::Unseen)
    }
}

/// Counters collected during a sweep
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SweepStats {
    /// Cubes visited
    pub cubes: u64,
    /// Per-scan classifications performed
    pub classifications: u64,
    /// Candidate lists reused from an enclosing cube
    pub cache_hits: u64,
    /// Candidate lists rebuilt from a direction grid
    pub cache_misses: u64,
    /// Wall time in milliseconds
    pub elapsed_ms: f32,
}

/// Result of a sweep
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    /// Accepted leaves, in depth-first order
    pub cells: Vec<VolumeCell>,
    /// True if the cancellation predicate stopped the sweep early
    pub cancelled: bool,
    /// Counters
    pub stats: SweepStats,
}

impl SweepOutcome {
    /// Number of leaves in `state`
    pub fn count(&self, state: CellState) -> usize {
        self.cells.iter().filter(|c| c.state == state).count()
    }
}

/// Depth-first carving driver
#[derive(Debug, Clone, Copy)]
pub struct CarveSweep {
    max_depth: u32,
}

impl CarveSweep {
    /// Create a sweep using the configured maximum depth
    pub fn new(config: &CarveConfig) -> Self {
        Self { max_depth: config.max_depth }
    }

    /// Deepest subdivision level
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Carve `root` against every scan
    ///
    /// `cancel` is polled before each cube; once it returns true the sweep
    /// stops and returns the leaves accepted so far.
    pub fn run(&self, root: Cube, scans: &[&RayCache], cancel: &mut dyn FnMut() -> bool) -> SweepOutcome {
        let watch = Stopwatch::start_new();
        let mut caches = vec![CarveCache::new(); scans.len()];
        let mut outcome = SweepOutcome::default();
        let mut outcomes = Vec::with_capacity(scans.len());

        outcome.cancelled = !self.carve(root, 0, scans, &mut caches, cancel, &mut outcomes, &mut outcome);

        outcome.stats.cache_hits = caches.iter().map(CarveCache::hits).sum();
        outcome.stats.cache_misses = caches.iter().map(CarveCache::misses).sum();
        outcome.stats.elapsed_ms = watch.elapsed_millis();
        log::info!(
            "CarveSweep: {} cells from {} cubes in {:.1} ms (cache {} hits / {} misses){}",
            outcome.cells.len(),
            outcome.stats.cubes,
            outcome.stats.elapsed_ms,
            outcome.stats.cache_hits,
            outcome.stats.cache_misses,
            if outcome.cancelled { ", cancelled" } else { "" }
        );
        outcome
    }

    /// Returns false once cancelled
    fn carve(
        &self,
        cube: Cube,
        depth: u32,
        scans: &[&RayCache],
        caches: &mut [CarveCache],
        cancel: &mut dyn FnMut() -> bool,
        outcomes: &mut Vec<Occupancy>,
        result: &mut SweepOutcome,
    ) -> bool {
        if cancel() {
            return false;
        }
        result.stats.cubes += 1;

        outcomes.clear();
        for (scan, cache) in scans.iter().zip(caches.iter_mut()) {
            outcomes.push(scan.classify(&cube.center, cube.half_side, cache));
        }
        result.stats.classifications += scans.len() as u64;

        let state = match combine(outcomes) {
            Verdict::Leaf(state) => state,
            Verdict::Subdivide if depth >= self.max_depth => CellState::Surface,
            Verdict::Subdivide => {
                return cube
                    .octants()
                    .into_iter()
                    .all(|child| self.carve(child, depth + 1, scans, caches, cancel, outcomes, result));
            }
        };
        result.cells.push(VolumeCell { cube, depth, state });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_octants_tile_parent() {
        let parent = Cube::new(Vec3::new(1.0, 2.0, 3.0), 2.0);
        let children = parent.octants();
        let mut sum = Vec3::zeros();
        for child in &children {
            assert_eq!(child.half_side, 1.0);
            assert_relative_eq!((child.center - parent.center).abs(), Vec3::repeat(1.0));
            sum += child.center;
        }
        assert_relative_eq!(sum / 8.0, parent.center);
        assert_eq!(children[7].center, Vec3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn test_combine_rules() {
        use Occupancy::*;
        assert_eq!(combine(&[Inside, Outside]), Verdict::Leaf(CellState::Outside));
        assert_eq!(combine(&[Inside, Boundary]), Verdict::Subdivide);
        assert_eq!(combine(&[Silhouette, NotInFrustum]), Verdict::Subdivide);
        assert_eq!(combine(&[Inside, NotInFrustum]), Verdict::Leaf(CellState::Inside));
        assert_eq!(combine(&[NotInFrustum, NotInFrustum]), Verdict::Leaf(CellState::Unseen));
        assert_eq!(combine(&[]), Verdict::Leaf(CellState::Unseen));
    }

    /// Dense, narrow scan of a plane at z = 5 facing the sensor
    fn plane_scan() -> RayCache {
        let mut samples = Vec::new();
        for i in -20..=20 {
            for j in -20..=20 {
                samples.push(Vec3::new(i as f32 * 0.005, j as f32 * 0.005, 1.0) * 5.0);
            }
        }
        let config = CarveConfig { grid_resolution: 16, ..Default::default() };
        RayCache::build(&samples, Vec3::zeros(), &config)
    }

    fn plane_root() -> Cube {
        Cube::new(Vec3::new(0.0, 0.0, 5.0), 0.25)
    }

    #[test]
    fn test_sweep_separates_both_sides_of_plane() {
        let scan = plane_scan();
        let sweep = CarveSweep::new(&CarveConfig { max_depth: 3, ..Default::default() });

        let outcome = sweep.run(plane_root(), &[&scan], &mut || false);

        assert!(!outcome.cancelled);
        assert!(outcome.count(CellState::Surface) > 0);
        assert!(outcome.count(CellState::Inside) > 0);
        assert!(outcome.count(CellState::Outside) > 0);
        for cell in &outcome.cells {
            match cell.state {
                CellState::Inside => assert!(cell.cube.center.z < 5.0, "{:?}", cell),
                CellState::Outside => assert!(cell.cube.center.z > 5.0, "{:?}", cell),
                _ => {}
            }
        }

        let volume: f32 = outcome.cells.iter().map(|c| (2.0 * c.cube.half_side).powi(3)).sum();
        assert_relative_eq!(volume, 0.125, epsilon = 1e-5);
        assert!(outcome.stats.cache_hits > 0);
    }

    #[test]
    fn test_cancellation_stops_sweep() {
        let scan = plane_scan();
        let sweep = CarveSweep::new(&CarveConfig { max_depth: 3, ..Default::default() });

        let mut budget = 5;
        let outcome = sweep.run(plane_root(), &[&scan], &mut || {
            budget -= 1;
            budget < 0
        });
        assert!(outcome.cancelled);
        assert_eq!(outcome.stats.cubes, 5);
    }

    #[test]
    fn test_scans_without_evidence_leave_cells_unseen() {
        let scan = plane_scan();
        let sweep = CarveSweep::new(&CarveConfig::default());
        let root = Cube::new(Vec3::new(0.0, 0.0, -5.0), 0.5);

        let outcome = sweep.run(root, &[&scan], &mut || false);
        assert_eq!(outcome.cells.len(), 1);
        assert_eq!(outcome.cells[0].state, CellState::Unseen);
    }

    #[test]
    fn test_any_scan_seeing_free_space_wins() {
        let front = plane_scan();
        // A second sensor looking along +X hits a wall at x = -5, before the cube
        let origin = Vec3::new(-10.0, 0.0, 4.0);
        let side_samples: Vec<Vec3> = (0..50)
            .map(|i| Vec3::new(-5.0, (i as f32 - 25.0) * 0.01, 4.0 + (i % 5) as f32 * 0.01))
            .collect();
        let side = RayCache::build(&side_samples, origin, &CarveConfig::default());
        let sweep = CarveSweep::new(&CarveConfig { max_depth: 0, ..Default::default() });
        let cube = Cube::new(Vec3::new(0.0, 0.0, 4.0), 0.1);

        let mut cache = CarveCache::new();
        assert_eq!(front.classify(&cube.center, cube.half_side, &mut cache), Occupancy::Inside);
        let mut cache = CarveCache::new();
        assert_eq!(side.classify(&cube.center, cube.half_side, &mut cache), Occupancy::Outside);

        let outcome = sweep.run(cube, &[&front, &side], &mut || false);
        assert_eq!(outcome.cells[0].state, CellState::Outside);
    }
}
