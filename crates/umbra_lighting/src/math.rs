//! Frustum and bounds types for light culling
//!
//! Planes are extracted from a view-projection matrix with the
//! Gribb/Hartmann method, assuming a `[0, 1]` clip depth range (the range
//! produced by `glam::Mat4::perspective_rh` and `orthographic_rh`).

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Plane in 3D space (normal . p + distance = 0)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Plane normal (unit vector)
    pub normal: Vec3,
    /// Distance term
    pub distance: f32,
}

impl Plane {
    /// Create a plane from an unnormalized (a, b, c, d) vector
    pub fn from_vec4(v: Vec4) -> Self {
        let normal = v.truncate();
        let len = normal.length();
        if len > 1e-10 {
            Self {
                normal: normal / len,
                distance: v.w / len,
            }
        } else {
            Self {
                normal: Vec3::Y,
                distance: 0.0,
            }
        }
    }

    /// Create a plane from a point on the plane and its normal
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    /// Signed distance; positive on the normal side
    #[inline]
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Result of a containment test
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrustumTestResult {
    /// Completely inside
    Inside,
    /// Completely outside
    Outside,
    /// Crosses the boundary
    Intersecting,
}

impl FrustumTestResult {
    /// At least partially visible
    #[inline]
    pub fn is_visible(&self) -> bool {
        *self != FrustumTestResult::Outside
    }
}

/// Axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// Bounds of a sphere
    pub fn from_sphere(center: Vec3, radius: f32) -> Self {
        Self::from_center_half_extents(center, Vec3::splat(radius.abs()))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// The eight corners
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }
}

/// View frustum. All plane normals point inward.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    /// left, right, bottom, top, near, far
    pub planes: [Plane; 6],
}

impl Frustum {
    pub const LEFT: usize = 0;
    pub const RIGHT: usize = 1;
    pub const BOTTOM: usize = 2;
    pub const TOP: usize = 3;
    pub const NEAR: usize = 4;
    pub const FAR: usize = 5;

    /// Extract planes from a view-projection matrix
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let r0 = vp.row(0);
        let r1 = vp.row(1);
        let r2 = vp.row(2);
        let r3 = vp.row(3);

        Self {
            planes: [
                Plane::from_vec4(r3 + r0),
                Plane::from_vec4(r3 - r0),
                Plane::from_vec4(r3 + r1),
                Plane::from_vec4(r3 - r1),
                // [0, 1] depth: near plane is row 2 alone
                Plane::from_vec4(r2),
                Plane::from_vec4(r3 - r2),
            ],
        }
    }

    /// Inside / outside / intersecting test for a box (p/n-vertex method)
    pub fn test_aabb(&self, aabb: &Aabb) -> FrustumTestResult {
        let mut result = FrustumTestResult::Inside;

        for plane in &self.planes {
            let p = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            let n = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.min.x } else { aabb.max.x },
                if plane.normal.y >= 0.0 { aabb.min.y } else { aabb.max.y },
                if plane.normal.z >= 0.0 { aabb.min.z } else { aabb.max.z },
            );

            if plane.distance_to_point(p) < 0.0 {
                return FrustumTestResult::Outside;
            }
            if plane.distance_to_point(n) < 0.0 {
                result = FrustumTestResult::Intersecting;
            }
        }

        result
    }

    /// Inside / outside / intersecting test for a sphere
    pub fn test_sphere(&self, center: Vec3, radius: f32) -> FrustumTestResult {
        let mut result = FrustumTestResult::Inside;

        for plane in &self.planes {
            let dist = plane.distance_to_point(center);
            if dist < -radius {
                return FrustumTestResult::Outside;
            }
            if dist < radius {
                result = FrustumTestResult::Intersecting;
            }
        }

        result
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.distance_to_point(point) >= 0.0)
    }

    /// Conservative frustum/frustum overlap using the other frustum's corners.
    ///
    /// Returns false only when every corner of `other` lies behind one plane
    /// of `self`.
    pub fn may_intersect(&self, other_corners: &[Vec3; 8]) -> bool {
        for plane in &self.planes {
            if other_corners.iter().all(|c| plane.distance_to_point(*c) < 0.0) {
                return false;
            }
        }
        true
    }
}

/// World-space corners of the frustum described by a view-projection matrix
pub fn frustum_corners(view_projection: &Mat4) -> [Vec3; 8] {
    let inv = view_projection.inverse();
    let mut corners = [Vec3::ZERO; 8];
    let mut i = 0;
    for z in [0.0f32, 1.0] {
        for y in [-1.0f32, 1.0] {
            for x in [-1.0f32, 1.0] {
                corners[i] = inv.project_point3(Vec3::new(x, y, z));
                i += 1;
            }
        }
    }
    corners
}
