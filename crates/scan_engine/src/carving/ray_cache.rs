//! Scan samples reinterpreted as rays from the sensor
//!
//! Every sample becomes a unit direction and the distance at which the
//! sensor measured a surface along it. Valid rays are binned on a uniform
//! grid over two direction components so a cube's angular footprint maps to
//! a small rectangle of cells.

use std::ops::RangeInclusive;

use crate::config::CarveConfig;
use crate::foundation::math::{utils, Axis, Vec3};
use crate::spatial::BoundingSphere;

/// One range sample seen as a ray from the common origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayRecord {
    /// Unit direction from the origin
    pub direction: Vec3,
    /// Distance to the measured surface; 0 marks a missing sample
    pub magnitude: f32,
}

impl RayRecord {
    /// Ray through `sample`, relative to the origin
    pub fn from_sample(sample: &Vec3) -> Self {
        if !utils::is_finite(sample) {
            return Self::missing();
        }
        match utils::try_normalize(sample) {
            Some(direction) => Self {
                direction,
                magnitude: sample.norm(),
            },
            None => Self::missing(),
        }
    }

    /// Placeholder for a sample the scanner did not return
    pub fn missing() -> Self {
        Self {
            direction: Vec3::zeros(),
            magnitude: 0.0,
        }
    }

    /// True unless this is a missing sample
    pub fn is_valid(&self) -> bool {
        self.magnitude > 0.0
    }
}

/// Rectangle of grid cells covered by a direction footprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footprint {
    /// Cell columns along the first binned component
    pub u: RangeInclusive<usize>,
    /// Cell rows along the second binned component
    pub v: RangeInclusive<usize>,
}

/// Uniform 2D grid over two components of the ray directions
#[derive(Debug, Clone)]
pub struct DirectionGrid {
    axes: [Axis; 2],
    min: [f32; 2],
    max: [f32; 2],
    cell_size: [f32; 2],
    resolution: usize,
    cells: Vec<Vec<u32>>,
}

impl DirectionGrid {
    /// Bin every valid ray; `None` if there are none
    pub fn build(rays: &[RayRecord], resolution: usize) -> Option<Self> {
        let resolution = resolution.max(1);
        let valid = || rays.iter().enumerate().filter(|(_, r)| r.is_valid());

        // Drop the component the scanner mostly looks along
        let mut weight = Vec3::zeros();
        let mut count = 0usize;
        for (_, ray) in valid() {
            weight += ray.direction.abs();
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let dominant = Axis::ALL
            .into_iter()
            .fold(Axis::X, |best, axis| if axis.of(&weight) > best.of(&weight) { axis } else { best });
        let mut binned = Axis::ALL.into_iter().filter(|&a| a != dominant);
        let axes = [binned.next()?, binned.next()?];

        let mut min = [f32::INFINITY; 2];
        let mut max = [f32::NEG_INFINITY; 2];
        for (_, ray) in valid() {
            for (k, axis) in axes.iter().enumerate() {
                min[k] = min[k].min(axis.of(&ray.direction));
                max[k] = max[k].max(axis.of(&ray.direction));
            }
        }
        let cell_size = [0, 1].map(|k| ((max[k] - min[k]) / resolution as f32).max(f32::MIN_POSITIVE));

        let mut grid = Self {
            axes,
            min,
            max,
            cell_size,
            resolution,
            cells: vec![Vec::new(); resolution * resolution],
        };
        for (i, ray) in valid() {
            let u = grid.cell_of(0, axes[0].of(&ray.direction));
            let v = grid.cell_of(1, axes[1].of(&ray.direction));
            grid.cells[v * resolution + u].push(i as u32);
        }
        Some(grid)
    }

    /// The two binned direction components
    pub fn axes(&self) -> [Axis; 2] {
        self.axes
    }

    /// Observed `(min, max)` of the binned component `k` (0 or 1)
    pub fn range(&self, k: usize) -> (f32, f32) {
        (self.min[k], self.max[k])
    }

    /// Cells any ray from the origin hitting `sphere` must lie in
    ///
    /// `None` when the footprint misses every observed direction, meaning
    /// the sphere is outside the scan's frustum.
    pub fn footprint(&self, sphere: &BoundingSphere) -> Option<Footprint> {
        let distance = sphere.center.norm();
        if distance <= sphere.radius {
            // The origin is inside: every direction qualifies
            let all = 0..=self.resolution - 1;
            return Some(Footprint { u: all.clone(), v: all });
        }

        let direction = sphere.center / distance;
        // A direction within angle a of the axis differs from it by at most a
        // in each component
        let angular_radius = (sphere.radius / distance).min(1.0).asin();
        let mut spans = [0..=0, 0..=0];
        for (k, axis) in self.axes.iter().enumerate() {
            let lo = axis.of(&direction) - angular_radius;
            let hi = axis.of(&direction) + angular_radius;
            if hi < self.min[k] || lo > self.max[k] {
                return None;
            }
            spans[k] = self.cell_of(k, lo)..=self.cell_of(k, hi);
        }
        let [u, v] = spans;
        Some(Footprint { u, v })
    }

    /// Every ray binned under `footprint`
    pub fn collect(&self, footprint: &Footprint) -> Vec<u32> {
        let mut rays = Vec::new();
        for v in footprint.v.clone() {
            for u in footprint.u.clone() {
                rays.extend_from_slice(&self.cells[v * self.resolution + u]);
            }
        }
        rays
    }

    fn cell_of(&self, k: usize, value: f32) -> usize {
        let cell = ((value - self.min[k]) / self.cell_size[k]).floor();
        if cell <= 0.0 {
            0
        } else {
            (cell as usize).min(self.resolution - 1)
        }
    }
}

/// Per-scan ray set with its direction grid, built once per scan
#[derive(Debug, Clone)]
pub struct RayCache {
    pub(crate) origin: Vec3,
    pub(crate) rays: Vec<RayRecord>,
    pub(crate) grid: Option<DirectionGrid>,
    pub(crate) inflation: f32,
}

impl RayCache {
    /// Turn raw samples, all measured from `origin`, into rays and bin them
    pub fn build(samples: &[Vec3], origin: Vec3, config: &CarveConfig) -> Self {
        let rays: Vec<RayRecord> = samples
            .iter()
            .map(|s| RayRecord::from_sample(&(s - origin)))
            .collect();
        Self::from_rays(rays, origin, config)
    }

    /// Use rays that are already relative to `origin`
    pub fn from_rays(rays: Vec<RayRecord>, origin: Vec3, config: &CarveConfig) -> Self {
        let grid = DirectionGrid::build(&rays, config.grid_resolution);
        match &grid {
            Some(grid) => log::debug!(
                "RayCache: {} rays ({} valid), binned on {:?}",
                rays.len(),
                rays.iter().filter(|r| r.is_valid()).count(),
                grid.axes()
            ),
            None => log::warn!("RayCache: none of {} samples is usable", rays.len()),
        }
        Self {
            origin,
            rays,
            grid,
            inflation: config.sphere_inflation.max(0.0),
        }
    }

    /// Common origin of every ray
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// All rays, including missing samples
    pub fn rays(&self) -> &[RayRecord] {
        &self.rays
    }

    /// Direction grid, absent when the scan has no valid sample
    pub fn grid(&self) -> Option<&DirectionGrid> {
        self.grid.as_ref()
    }
}
