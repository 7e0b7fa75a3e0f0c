//! Occupancy classification of cubes against a scan's rays
//!
//! A cube is tested through its circumscribed sphere. Each candidate ray
//! crossing the sphere over `[t1, t2]` compares its measured magnitude with
//! that interval: a surface measured before `t1` means the sensor saw past
//! the cube, one beyond `t2` means it stopped short of it, and one inside
//! the interval puts the surface in the cube.
//!
//! Sweeps visit nested cubes depth first, so the candidate rays of a cube
//! are a superset of those of any cube inside it. [`CarveCache`] keeps that
//! chain of candidate lists to avoid rescanning the direction grid.

use super::ray_cache::RayCache;
use crate::foundation::math::Vec3;
use crate::spatial::BoundingSphere;

/// Outcome of classifying one cube against one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occupancy {
    /// Every crossing ray measured its surface beyond the cube
    Inside,
    /// Every crossing ray measured its surface before the cube
    Outside,
    /// Some ray measured its surface within the cube
    Boundary,
    /// Rays disagree: some before, some beyond; the cube straddles a
    /// silhouette and needs subdividing
    Silhouette,
    /// The scan has no ray through the cube and abstains
    NotInFrustum,
}

impl Occupancy {
    /// True for outcomes that call for subdivision
    pub fn is_ambiguous(self) -> bool {
        matches!(self, Occupancy::Boundary | Occupancy::Silhouette)
    }
}

/// One level of the carve cache: a sphere and every ray that may cross it
#[derive(Debug, Clone)]
pub struct CarveCacheEntry {
    /// Padded circumscribed sphere of the cube, relative to the scan origin
    pub bound: BoundingSphere,
    /// Indices of rays that may cross `bound`
    pub candidates: Vec<u32>,
}

/// Stack of candidate lists for the cubes enclosing the current one
///
/// Session state for one sweep over one scan. Independent sweeps, even over
/// the same scan, each need their own cache.
#[derive(Debug, Clone, Default)]
pub struct CarveCache {
    entries: Vec<CarveCacheEntry>,
    hits: u64,
    misses: u64,
}

impl CarveCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry (statistics are kept)
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stacked entries
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Entries from least to most specific
    pub fn entries(&self) -> &[CarveCacheEntry] {
        &self.entries
    }

    /// Lookups answered from an enclosing entry
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that rescanned the direction grid
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

impl RayCache {
    /// Classify the cube at `center` (world space) with half side `half_side`
    pub fn classify(&self, center: &Vec3, half_side: f32, cache: &mut CarveCache) -> Occupancy {
        let exact = BoundingSphere::around_cube(center - self.origin, half_side);
        let padded = exact.inflated(self.inflation);

        let Some(grid) = &self.grid else {
            return Occupancy::NotInFrustum;
        };
        let Some(footprint) = grid.footprint(&padded) else {
            log::trace!("classify: cube at {:?} is outside the frustum", center);
            return Occupancy::NotInFrustum;
        };

        while cache.entries.last().is_some_and(|top| !top.bound.contains_sphere(&padded)) {
            cache.entries.pop();
        }

        let rescanned;
        let source: &[u32] = match cache.entries.last() {
            Some(top) => {
                cache.hits += 1;
                &top.candidates
            }
            None => {
                cache.misses += 1;
                rescanned = grid.collect(&footprint);
                &rescanned
            }
        };

        let mut retained = Vec::with_capacity(source.len());
        let mut before = false;
        let mut after = false;
        for (k, &ray_id) in source.iter().enumerate() {
            let ray = &self.rays[ray_id as usize];
            if padded.intersect_origin_ray(&ray.direction).is_none() {
                continue;
            }
            retained.push(ray_id);

            let Some((t1, t2)) = exact.intersect_origin_ray(&ray.direction) else {
                continue;
            };
            if ray.magnitude < t1 {
                before = true;
            } else if ray.magnitude > t2 {
                after = true;
            } else {
                // Untested rays stay candidates for the cubes inside this one
                retained.extend_from_slice(&source[k + 1..]);
                cache.entries.push(CarveCacheEntry { bound: padded, candidates: retained });
                return Occupancy::Boundary;
            }
        }

        log::trace!(
            "classify: {} of {} candidates kept, before={} after={}",
            retained.len(),
            source.len(),
            before,
            after
        );
        cache.entries.push(CarveCacheEntry { bound: padded, candidates: retained });

        match (before, after) {
            (true, true) => Occupancy::Silhouette,
            (false, true) => Occupancy::Inside,
            (true, false) => Occupancy::Outside,
            (false, false) => Occupancy::NotInFrustum,
        }
    }
}
