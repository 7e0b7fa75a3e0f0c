//! Correspondence pairs for rigid alignment
//!
//! Pairs each point of a source scan with its nearest compatible point in
//! a target [`PointIndex`]. Solving for the aligning transform is left to
//! the caller.

use crate::foundation::math::Vec3;
use crate::spatial::{IndexError, PointIndex};

/// Rules for accepting a pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrespondenceParams {
    /// Pairs farther apart than this are discarded
    pub max_distance: f32,
    /// Require the target normal to face the same way as the source normal
    pub match_normals: bool,
    /// Discard pairs whose target point lies on a scan boundary
    pub reject_boundary: bool,
}

impl Default for CorrespondenceParams {
    fn default() -> Self {
        Self {
            max_distance: f32::INFINITY,
            match_normals: true,
            reject_boundary: true,
        }
    }
}

/// A matched source/target point pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// Index into the source arrays
    pub source: usize,
    /// Index into the target index
    pub target: usize,
    /// Source position
    pub source_point: Vec3,
    /// Target position
    pub target_point: Vec3,
    /// Distance between the two
    pub distance: f32,
}

/// Every accepted pair plus the reasons others were dropped
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceSet {
    /// Accepted pairs, in source order
    pub pairs: Vec<Correspondence>,
    /// Source points with no target in range
    pub unmatched: usize,
    /// Pairs dropped because the target was on a boundary
    pub rejected_boundary: usize,
}

impl CorrespondenceSet {
    /// Number of accepted pairs
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when nothing matched
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Root-mean-square pair distance, if any pair was accepted
    pub fn rms_distance(&self) -> Option<f32> {
        if self.pairs.is_empty() {
            return None;
        }
        let sum: f32 = self.pairs.iter().map(|p| p.distance * p.distance).sum();
        Some((sum / self.pairs.len() as f32).sqrt())
    }
}

/// Match every source point against `target`
pub fn find_correspondences(
    source_points: &[Vec3],
    source_normals: &[Vec3],
    target: &PointIndex,
    params: &CorrespondenceParams,
) -> Result<CorrespondenceSet, IndexError> {
    if params.match_normals && source_normals.len() != source_points.len() {
        return Err(IndexError::LengthMismatch {
            what: "source normals",
            expected: source_points.len(),
            actual: source_normals.len(),
        });
    }

    let mut set = CorrespondenceSet::default();
    for (i, point) in source_points.iter().enumerate() {
        let normal = params.match_normals.then(|| &source_normals[i]);
        let Some(hit) = target.nearest(point, normal, params.max_distance) else {
            set.unmatched += 1;
            continue;
        };
        if params.reject_boundary && hit.on_boundary {
            set.rejected_boundary += 1;
            continue;
        }
        set.pairs.push(Correspondence {
            source: i,
            target: hit.index,
            source_point: *point,
            target_point: target.position(hit.index),
            distance: hit.distance,
        });
    }

    log::debug!(
        "find_correspondences: {} pairs, {} unmatched, {} on boundary",
        set.len(),
        set.unmatched,
        set.rejected_boundary
    );
    Ok(set)
}
