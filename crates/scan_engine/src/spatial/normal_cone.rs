//! Cones of directions bounding the normals beneath an index node

use crate::foundation::math::{constants::PI, utils, Vec3};

/// Circular cone of unit directions: a center axis and a half-angle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalCone {
    /// Unit axis of the cone
    pub center: Vec3,
    /// Half-angle in radians, `PI` covers the whole sphere
    pub half_angle: f32,
}

impl NormalCone {
    /// Degenerate cone containing exactly one direction
    pub fn from_normal(normal: Vec3) -> Self {
        Self {
            center: normal,
            half_angle: 0.0,
        }
    }

    /// True when the cone covers every direction
    pub fn is_whole_sphere(&self) -> bool {
        self.half_angle >= PI
    }

    /// True if `direction` lies inside the cone (up to `slack` radians)
    pub fn contains_direction(&self, direction: &Vec3, slack: f32) -> bool {
        self.is_whole_sphere() || utils::angle_between(&self.center, direction) <= self.half_angle + slack
    }

    /// True if the whole of `other` lies inside this cone (up to `slack`)
    pub fn contains_cone(&self, other: &NormalCone, slack: f32) -> bool {
        self.is_whole_sphere()
            || utils::angle_between(&self.center, &other.center) + other.half_angle <= self.half_angle + slack
    }

    /// Cone covering both inputs
    ///
    /// A cone that already holds the other is returned as is. Otherwise the
    /// half-angle is the mean of both plus the angle between their axes,
    /// clamped to a whole-sphere cone, and the axis is swung from `self`
    /// toward `other` far enough that both inputs fit.
    pub fn merge(&self, other: &NormalCone) -> NormalCone {
        if self.is_whole_sphere() || other.is_whole_sphere() {
            return Self::whole_sphere(self.center);
        }

        let between = utils::angle_between(&self.center, &other.center);
        if self.half_angle >= between + other.half_angle {
            return *self;
        }
        if other.half_angle >= between + self.half_angle {
            return *other;
        }

        let half_angle = 0.5 * (self.half_angle + other.half_angle) + between;
        if half_angle >= PI {
            return Self::whole_sphere(self.center);
        }

        // In [0, between] because neither cone contains the other
        let swing = 0.5 * (between + other.half_angle - self.half_angle);
        Self {
            center: rotate_toward(&self.center, &other.center, swing),
            half_angle,
        }
    }

    /// Cosine of the widest angle at which a query direction can still be
    /// within `tolerance` of some direction in the cone
    ///
    /// A query whose dot product with the axis falls below this value cannot
    /// match anything inside.
    pub fn pruning_threshold(&self, tolerance: f32) -> f32 {
        let reach = self.half_angle + tolerance;
        if reach >= PI {
            // Nothing has a dot product below -1, so this never prunes
            -1.0
        } else {
            reach.cos()
        }
    }

    fn whole_sphere(center: Vec3) -> Self {
        Self {
            center,
            half_angle: PI,
        }
    }
}

/// Rotate unit vector `from` toward unit vector `to` by `angle` radians
/// within the plane they span
fn rotate_toward(from: &Vec3, to: &Vec3, angle: f32) -> Vec3 {
    let tangent = to - from * from.dot(to);
    let tangent = utils::try_normalize(&tangent).unwrap_or_else(|| utils::any_perpendicular(from));
    (from * angle.cos() + tangent * angle.sin()).normalize()
}
