//! Scene collaborators
//!
//! The lighting core does not own a scene graph. It asks the host for
//! spatial visibility and for surface hits (used to turn reflective shadow
//! map texels into virtual point lights) through [`SceneQuery`], and receives
//! the camera each frame through [`FrameInputs`].

use glam::{Mat4, Vec3};

use crate::math::{Aabb, Frustum};

/// Surface found along a ray
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceHit {
    pub position: Vec3,
    pub normal: Vec3,
    /// Diffuse reflectance
    pub albedo: Vec3,
}

/// Spatial queries answered by the host scene.
///
/// Must be `Sync`: visibility is evaluated on worker threads.
pub trait SceneQuery: Sync {
    /// Whether anything inside `bounds` is visible this frame
    fn is_visible(&self, bounds: &Aabb) -> bool;

    /// First surface hit along a ray
    fn surface_hit(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<SurfaceHit>;
}

/// Everything is visible and nothing is hit
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyScene;

impl SceneQuery for EmptyScene {
    fn is_visible(&self, _bounds: &Aabb) -> bool {
        true
    }

    fn surface_hit(&self, _origin: Vec3, _direction: Vec3, _max_distance: f32) -> Option<SurfaceHit> {
        None
    }
}

/// An infinite horizontal ground plane
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundPlane {
    pub height: f32,
    pub albedo: Vec3,
}

impl Default for GroundPlane {
    fn default() -> Self {
        Self {
            height: 0.0,
            albedo: Vec3::splat(0.5),
        }
    }
}

impl SceneQuery for GroundPlane {
    fn is_visible(&self, _bounds: &Aabb) -> bool {
        true
    }

    fn surface_hit(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<SurfaceHit> {
        if direction.y.abs() < 1e-6 {
            return None;
        }
        let t = (self.height - origin.y) / direction.y;
        if t <= 0.0 || t > max_distance {
            return None;
        }
        let normal = if origin.y >= self.height { Vec3::Y } else { Vec3::NEG_Y };
        Some(SurfaceHit {
            position: origin + direction * t,
            normal,
            albedo: self.albedo,
        })
    }
}

/// Camera used for culling and LOD
#[derive(Clone, Debug, PartialEq)]
pub struct CameraView {
    pub position: Vec3,
    pub view_projection: Mat4,
    pub near: f32,
    pub far: f32,
}

impl CameraView {
    /// Right-handed perspective camera looking at `target`
    pub fn look_at(position: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let forward = (target - position).normalize_or_zero();
        let up = if forward.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let view = Mat4::look_at_rh(position, target, up);
        let projection = Mat4::perspective_rh(fov_y, aspect.max(1e-3), near, far);
        Self {
            position,
            view_projection: projection * view,
            near,
            far,
        }
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection)
    }
}

impl Default for CameraView {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 2.0, 10.0), Vec3::ZERO, 60f32.to_radians(), 16.0 / 9.0, 0.1, 500.0)
    }
}

/// Per-frame inputs to `LightingContext::update`
#[derive(Clone, Copy)]
pub struct FrameInputs<'a> {
    pub camera: &'a CameraView,
    pub scene: &'a dyn SceneQuery,
}

impl<'a> FrameInputs<'a> {
    pub fn new(camera: &'a CameraView, scene: &'a dyn SceneQuery) -> Self {
        Self { camera, scene }
    }
}
