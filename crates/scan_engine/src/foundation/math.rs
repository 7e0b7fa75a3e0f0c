//! Math utilities and types
//!
//! Provides the fundamental vector types used by the spatial indices and
//! the carving classifier.

pub use nalgebra::Vector3;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// Index of a coordinate axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// X axis
    X,
    /// Y axis
    Y,
    /// Z axis
    Z,
}

impl Axis {
    /// All three axes in order
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index of this axis (0, 1 or 2)
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Read this axis' component of a vector
    pub fn of(self, v: &Vec3) -> f32 {
        v[self.index()]
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Pi / 4
    pub const QUARTER_PI: f32 = PI * 0.25;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;

    /// Radians to degrees conversion factor
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
}

/// Math utility functions
pub mod utils {
    use super::*;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians * constants::RAD_TO_DEG
    }

    /// Angle in radians between two unit vectors
    ///
    /// Uses `atan2` of the cross and dot products, which stays accurate for
    /// nearly parallel and nearly opposite vectors where `acos` of the dot
    /// product collapses to 0 or `PI`.
    pub fn angle_between(a: &Vec3, b: &Vec3) -> f32 {
        a.cross(b).norm().atan2(a.dot(b))
    }

    /// Normalize a vector, or `None` if it has no usable length
    pub fn try_normalize(v: &Vec3) -> Option<Vec3> {
        v.try_normalize(f32::EPSILON)
    }

    /// Any unit vector perpendicular to `v` (which must be unit length)
    pub fn any_perpendicular(v: &Vec3) -> Vec3 {
        let helper = if v.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
        v.cross(&helper).normalize()
    }

    /// True when every component is finite
    pub fn is_finite(v: &Vec3) -> bool {
        v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
    }
}
