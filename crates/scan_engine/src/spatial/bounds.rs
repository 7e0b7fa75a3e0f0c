//! Bounding volumes and triangle primitives
//!
//! Axis-aligned boxes bound point index nodes, spheres bound surface index
//! nodes and carve cubes.

use crate::foundation::math::{Axis, Vec3};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Inverted box that any point extends
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::INFINITY),
            max: Vec3::repeat(f32::NEG_INFINITY),
        }
    }

    /// Smallest box containing every point yielded
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.extend(p);
        }
        aabb
    }

    /// Grow to include a point
    pub fn extend(&mut self, p: &Vec3) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Full side lengths
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Axis with the largest extent (earlier axis wins ties)
    pub fn longest_axis(&self) -> Axis {
        let size = self.size();
        if size.x >= size.y && size.x >= size.z {
            Axis::X
        } else if size.y >= size.z {
            Axis::Y
        } else {
            Axis::Z
        }
    }

    /// True when the box has zero extent on every axis
    pub fn is_point(&self) -> bool {
        self.min == self.max
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: &Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB fully contains another
    pub fn contains(&self, other: &Aabb) -> bool {
        self.contains_point(&other.min) && self.contains_point(&other.max)
    }

    /// Squared distance from a point to the box (zero inside)
    pub fn distance_squared(&self, p: &Vec3) -> f32 {
        let closest = p.sup(&self.min).inf(&self.max);
        (closest - p).norm_squared()
    }

    /// True when the ball around `center` with squared radius `radius_sq`
    /// lies entirely inside the box
    pub fn contains_ball(&self, center: &Vec3, radius_sq: f32) -> bool {
        (0..3).all(|i| {
            let below = center[i] - self.min[i];
            let above = self.max[i] - center[i];
            below >= 0.0 && above >= 0.0 && below * below >= radius_sq && above * above >= radius_sq
        })
    }
}

/// A bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// The center position of the sphere
    pub center: Vec3,
    /// The radius of the sphere
    pub radius: f32,
}

impl BoundingSphere {
    /// Creates a new bounding sphere with the given center and radius
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Circumscribed sphere of an axis-aligned cube
    pub fn around_cube(center: Vec3, half_side: f32) -> Self {
        Self::new(center, half_side * 3.0_f32.sqrt())
    }

    /// Same center, radius scaled by `1 + inflation`
    pub fn inflated(&self, inflation: f32) -> Self {
        Self::new(self.center, self.radius * (1.0 + inflation))
    }

    /// True if `other` lies entirely inside this sphere
    pub fn contains_sphere(&self, other: &BoundingSphere) -> bool {
        (self.center - other.center).norm() + other.radius <= self.radius
    }

    /// Smallest sphere enclosing both
    ///
    /// If either already contains the other it is returned unchanged,
    /// otherwise the result is tangent to both along the line through
    /// their centers.
    pub fn merge(&self, other: &BoundingSphere) -> BoundingSphere {
        if self.contains_sphere(other) {
            return *self;
        }
        if other.contains_sphere(self) {
            return *other;
        }
        let offset = other.center - self.center;
        let distance = offset.norm();
        let radius = (distance + self.radius + other.radius) * 0.5;
        // distance > 0 here: coincident centers always take a branch above
        let center = self.center + offset * ((radius - self.radius) / distance);
        BoundingSphere::new(center, radius)
    }

    /// Lower bound on the distance from `p` to anything inside the sphere
    pub fn distance_lower_bound(&self, p: &Vec3) -> f32 {
        (p - self.center).norm() - self.radius
    }

    /// Intersect the ray `t * direction` (origin at zero, unit direction)
    ///
    /// Returns the entry and exit parameters `(t1, t2)` with `t1 <= t2`, or
    /// `None` if the ray misses or the whole interval lies behind the origin.
    pub fn intersect_origin_ray(&self, direction: &Vec3) -> Option<(f32, f32)> {
        let b = direction.dot(&self.center);
        let c = self.center.norm_squared() - self.radius * self.radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let (t1, t2) = (b - root, b + root);
        if t2 <= 0.0 {
            return None;
        }
        Some((t1, t2))
    }
}

/// A triangle in space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// First vertex
    pub v0: Vec3,
    /// Second vertex
    pub v1: Vec3,
    /// Third vertex
    pub v2: Vec3,
}

impl Triangle {
    /// Creates a new triangle
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    /// Unnormalized face normal (right-hand rule); zero for degenerate triangles
    pub fn area_normal(&self) -> Vec3 {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0))
    }

    /// Calculates the centroid (center point) of the triangle
    pub fn centroid(&self) -> Vec3 {
        (self.v0 + self.v1 + self.v2) / 3.0
    }

    /// Smallest sphere containing all three vertices
    ///
    /// For right and obtuse triangles (and degenerate ones) this is the
    /// circle on the longest edge; otherwise it is the circumcircle.
    pub fn enclosing_sphere(&self) -> BoundingSphere {
        let edges = [
            (self.v0, self.v1, self.v2),
            (self.v1, self.v2, self.v0),
            (self.v2, self.v0, self.v1),
        ];
        for (a, b, opposite) in edges {
            // Angle at `opposite` is right or obtuse: the edge a-b is the diameter
            if (a - opposite).dot(&(b - opposite)) <= 0.0 {
                return BoundingSphere::new((a + b) * 0.5, (b - a).norm() * 0.5);
            }
        }

        let a = self.v1 - self.v0;
        let b = self.v2 - self.v0;
        let n = a.cross(&b);
        let denom = 2.0 * n.norm_squared();
        let offset = (b.cross(&n) * a.norm_squared() + n.cross(&a) * b.norm_squared()) / denom;
        let center = self.v0 + offset;
        // Guard against rounding leaving a vertex just outside
        let radius = [self.v0, self.v1, self.v2]
            .iter()
            .map(|v| (v - center).norm())
            .fold(0.0_f32, f32::max);
        BoundingSphere::new(center, radius)
    }

    /// Get the closest point on the triangle to a given point
    pub fn closest_point(&self, point: &Vec3) -> Vec3 {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;
        let v0_to_point = point - self.v0;

        let d1 = edge1.dot(&v0_to_point);
        let d2 = edge2.dot(&v0_to_point);

        // Vertex region outside v0
        if d1 <= 0.0 && d2 <= 0.0 {
            return self.v0;
        }

        // Vertex region outside v1
        let v1_to_point = point - self.v1;
        let d3 = edge1.dot(&v1_to_point);
        let d4 = edge2.dot(&v1_to_point);
        if d3 >= 0.0 && d4 <= d3 {
            return self.v1;
        }

        // Vertex region outside v2
        let v2_to_point = point - self.v2;
        let d5 = edge1.dot(&v2_to_point);
        let d6 = edge2.dot(&v2_to_point);
        if d6 >= 0.0 && d5 <= d6 {
            return self.v2;
        }

        // Edge regions
        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return self.v0 + edge1 * v;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return self.v0 + edge2 * w;
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return self.v1 + (self.v2 - self.v1) * w;
        }

        // Interior: barycentric projection onto the plane
        let denom = 1.0 / (va + vb + vc);
        let v = vb * denom;
        let w = vc * denom;
        self.v0 + edge1 * v + edge2 * w
    }
}
