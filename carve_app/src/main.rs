//! Carving demo application
//!
//! Synthesizes range scans of a sphere, then exercises the engine end to
//! end: correspondences between two scans, distance and side queries on a
//! reference mesh, and a time-boxed carving sweep.
//!
//! Usage: `carve_demo [config.toml|config.ron]`

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scan_engine::foundation::logging;
use scan_engine::prelude::*;
use scan_engine::spatial::BoundingSphere;

const SPHERE_RADIUS: f32 = 1.5;
const BACKDROP_Z: f32 = 10.0;

fn sphere_center() -> Vec3 {
    Vec3::new(0.0, 0.0, 6.0)
}

#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("index: {0}")]
    Index(#[from] IndexError),

    #[error("nothing to index: {0}")]
    Empty(&'static str),
}

/// A simulated range scan
struct Scan {
    origin: Vec3,
    samples: Vec<Vec3>,
    /// Points on the sphere with their outward normals
    surface: Vec<(Vec3, Vec3)>,
}

/// Cast a jittered raster of rays from `origin` toward the sphere
fn simulate_scan(rng: &mut StdRng, origin: Vec3, resolution: usize, noise: f32) -> Scan {
    let sphere = BoundingSphere::new(sphere_center() - origin, SPHERE_RADIUS);
    let mut samples = Vec::with_capacity(resolution * resolution);
    let mut surface = Vec::new();

    for i in 0..resolution {
        for j in 0..resolution {
            let u = (i as f32 + rng.gen::<f32>()) / resolution as f32 - 0.5;
            let v = (j as f32 + rng.gen::<f32>()) / resolution as f32 - 0.5;
            let direction = (sphere_center() - origin).normalize() + Vec3::new(u, v, 0.0) * 0.8;
            let direction = direction.normalize();

            // Scanners drop some returns
            if rng.gen_bool(0.02) {
                samples.push(origin);
                continue;
            }
            match sphere.intersect_origin_ray(&direction) {
                Some((t1, _)) => {
                    let point = origin + direction * (t1 + rng.gen_range(-noise..=noise));
                    samples.push(point);
                    surface.push((point, (point - sphere_center()).normalize()));
                }
                None if direction.z > 1e-3 => {
                    samples.push(origin + direction * ((BACKDROP_Z - origin.z) / direction.z));
                }
                None => samples.push(origin),
            }
        }
    }
    Scan { origin, samples, surface }
}

/// Latitude/longitude triangulation of the sphere
fn uv_sphere(rings: u32, segments: u32) -> (Vec<Vec3>, Vec<[u32; 3]>) {
    let mut vertices = Vec::new();
    for ring in 0..=rings {
        let theta = std::f32::consts::PI * ring as f32 / rings as f32;
        for segment in 0..segments {
            let phi = std::f32::consts::TAU * segment as f32 / segments as f32;
            let offset = Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
            vertices.push(sphere_center() + offset * SPHERE_RADIUS);
        }
    }

    let mut triangles = Vec::new();
    for ring in 0..rings {
        for segment in 0..segments {
            let next = (segment + 1) % segments;
            let a = ring * segments + segment;
            let b = ring * segments + next;
            let c = (ring + 1) * segments + segment;
            let d = (ring + 1) * segments + next;
            triangles.push([a, c, b]);
            triangles.push([b, c, d]);
        }
    }
    (vertices, triangles)
}

fn run(config: &EngineConfig) -> Result<(), AppError> {
    let mut rng = StdRng::seed_from_u64(7);

    let front = simulate_scan(&mut rng, Vec3::zeros(), 96, 0.002);
    let side = simulate_scan(&mut rng, Vec3::new(-6.0, 0.0, 6.0), 96, 0.002);
    log::info!(
        "Simulated scans: {} and {} samples, {} and {} surface hits",
        front.samples.len(),
        side.samples.len(),
        front.surface.len(),
        side.surface.len()
    );

    // Correspondences between the front scan and a slightly shifted copy
    let (points, normals): (Vec<Vec3>, Vec<Vec3>) = front.surface.iter().copied().unzip();
    let index = PointIndex::build(&points, &normals, &config.point_index)?
        .ok_or(AppError::Empty("front scan"))?;
    log::info!("PointIndex: {} points, {} nodes, depth {}", index.len(), index.node_count(), index.depth());

    let shift = Vec3::new(0.01, -0.005, 0.0);
    let moved: Vec<Vec3> = points.iter().map(|p| p + shift).collect();
    let params = CorrespondenceParams {
        max_distance: 0.1,
        ..Default::default()
    };
    let pairs = find_correspondences(&moved, &normals, &index, &params)?;
    log::info!(
        "Correspondences: {} pairs, {} unmatched, rms {:.4}",
        pairs.len(),
        pairs.unmatched,
        pairs.rms_distance().unwrap_or(f32::NAN)
    );

    // Reference mesh queries
    let (vertices, triangles) = uv_sphere(24, 48);
    let mesh = SurfaceIndex::build(&triangles, &vertices)?.ok_or(AppError::Empty("reference mesh"))?;
    let mut worst = 0.0_f32;
    for point in &points {
        if let Some(hit) = mesh.nearest_on_surface(point) {
            worst = worst.max(hit.distance);
        }
    }
    log::info!("SurfaceIndex: {} triangles, worst scan-to-mesh distance {:.4}", mesh.len(), worst);
    for probe in [sphere_center(), sphere_center() + Vec3::new(0.0, 0.0, 3.0)] {
        if let Some((facing, hit)) = mesh.side_of(&probe) {
            log::info!("  {:?} is {:?} ({:.3} from triangle {})", probe, facing, hit.distance, hit.triangle);
        }
    }

    // Carving
    let front_rays = RayCache::build(&front.samples, front.origin, &config.carving);
    let side_rays = RayCache::build(&side.samples, side.origin, &config.carving);
    let sweep = CarveSweep::new(&config.carving);
    let deadline = Deadline::after(Duration::from_secs(10));
    let root = Cube::new(sphere_center(), SPHERE_RADIUS * 1.25);

    let outcome = sweep.run(root, &[&front_rays, &side_rays], &mut || deadline.expired());
    let inside_volume: f32 = outcome
        .cells
        .iter()
        .filter(|c| c.state == CellState::Inside)
        .map(|c| (2.0 * c.cube.half_side).powi(3))
        .sum();
    log::info!(
        "CarveSweep: {} inside, {} outside, {} surface, {} unseen; inside volume {:.3}{}",
        outcome.count(CellState::Inside),
        outcome.count(CellState::Outside),
        outcome.count(CellState::Surface),
        outcome.count(CellState::Unseen),
        inside_volume,
        if outcome.cancelled { " (deadline hit)" } else { "" }
    );
    Ok(())
}

fn main() {
    logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => match EngineConfig::load_from_file(&path) {
            Ok(config) => {
                log::info!("Loaded configuration from {}", path);
                config
            }
            Err(e) => {
                log::error!("Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    if let Err(e) = run(&config) {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}
