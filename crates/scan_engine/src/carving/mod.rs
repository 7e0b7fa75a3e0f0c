//! Space carving against range scans
//!
//! A scan's samples become rays from its sensor ([`RayCache`]); cubes are
//! classified against those rays ([`RayCache::classify`]) with a
//! caller-owned [`CarveCache`], and [`CarveSweep`] drives a cancellable
//! octree subdivision over any number of scans.

mod classifier;
mod ray_cache;
mod sweep;

pub use classifier::{CarveCache, CarveCacheEntry, Occupancy};
pub use ray_cache::{DirectionGrid, Footprint, RayCache, RayRecord};
pub use sweep::{combine, CarveSweep, CellState, Cube, SweepOutcome, SweepStats, Verdict, VolumeCell};
