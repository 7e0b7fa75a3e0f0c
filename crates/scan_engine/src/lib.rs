//! # Scan Engine
//!
//! Spatial proximity and volumetric occupancy core for multi-scan 3D
//! reconstruction.
//!
//! ## Features
//!
//! - **Point index**: nearest-neighbor queries over oriented scan points,
//!   optionally restricted to points whose normals face the query's way
//! - **Surface index**: closest point on a triangle mesh, plus
//!   inside/outside classification
//! - **Space carving**: occupancy of cubes against raw scan rays, with a
//!   reusable candidate cache for nested octree sweeps
//! - **Registration**: correspondence pairs for rigid alignment loops
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scan_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let points = vec![Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 1.0)];
//!     let normals = vec![Vec3::z(); points.len()];
//!
//!     if let Some(index) = PointIndex::build(&points, &normals, &config.point_index)? {
//!         let hit = index.nearest(&Vec3::new(0.2, 0.0, 1.0), Some(&Vec3::z()), 1.0);
//!         println!("{:?}", hit);
//!     }
//!
//!     let scan = RayCache::build(&points, Vec3::zeros(), &config.carving);
//!     let mut cache = CarveCache::new();
//!     let occupancy = scan.classify(&Vec3::new(0.0, 0.0, 0.5), 0.1, &mut cache);
//!     println!("{:?}", occupancy);
//!     Ok(())
//! }
//! ```
//!
//! Built indices are immutable and can be shared across threads for
//! queries. A [`carving::CarveCache`] belongs to a single sweep.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod spatial;
pub mod carving;
pub mod registration;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        foundation::{
            math::{Vec3, Axis},
            time::{Deadline, Stopwatch},
        },
        config::{Config, ConfigError, EngineConfig, PointIndexConfig, CarveConfig},
        spatial::{IndexError, Neighbor, PointIndex, PointSide, SurfaceHit, SurfaceIndex},
        carving::{CarveCache, CarveSweep, CellState, Cube, Occupancy, RayCache, SweepOutcome},
        registration::{find_correspondences, CorrespondenceParams, CorrespondenceSet},
    };
}
