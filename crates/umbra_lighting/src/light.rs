//! Light nodes
//!
//! Lights are a tagged variant ([`LightKind`]) with one struct per type.
//! Every type implements [`LightShape`], the capability set the pipeline
//! needs: bounds, face count, shadow frustums and volume tests. The shared
//! per-light policy (level of detail, visibility, refresh timing) lives on
//! [`Light`].
//!
//! # Faces
//!
//! | Type        | Faces                              |
//! |-------------|------------------------------------|
//! | Point       | 6 cube faces                       |
//! | Hemisphere  | 5 (cube without the back face)     |
//! | Spot        | 1 perspective frustum              |
//! | Projector   | 1 perspective frustum              |
//! | Directional | 1-4 cascades                       |

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::cascade::{build_cascades, CascadeConfig};
use crate::math::{frustum_corners, Aabb, Frustum, FrustumTestResult};
use crate::scene::{CameraView, SceneQuery};
use crate::settings::{LodTier, ShadowSettingsLight, ShadowSettingsLod, UpdateRate};

/// Near plane used by perspective shadow frustums
const SHADOW_NEAR: f32 = 0.05;

/// Look direction and up vector of each cube face (+X, -X, +Y, -Y, +Z, -Z)
const CUBE_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// Light color terms, each with its own HDR scale
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightColor {
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub ambient: Vec3,
    pub rim: Vec3,
    pub diffuse_scale: f32,
    pub specular_scale: f32,
    pub ambient_scale: f32,
    pub rim_scale: f32,
}

impl Default for LightColor {
    fn default() -> Self {
        Self {
            diffuse: Vec3::ONE,
            specular: Vec3::ONE,
            ambient: Vec3::ZERO,
            rim: Vec3::ZERO,
            diffuse_scale: 1.0,
            specular_scale: 1.0,
            ambient_scale: 1.0,
            rim_scale: 1.0,
        }
    }
}

impl LightColor {
    /// Same color for diffuse and specular
    pub fn white(intensity: f32) -> Self {
        Self {
            diffuse_scale: intensity,
            specular_scale: intensity,
            ..Default::default()
        }
    }

    /// Radiant flux used for reflective shadow maps
    pub fn flux(&self) -> Vec3 {
        self.diffuse * self.diffuse_scale
    }
}

/// Distance attenuation curve
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
    /// Distance at which the light reaches zero
    pub range: f32,
}

impl Default for Attenuation {
    fn default() -> Self {
        Self {
            constant: 1.0,
            linear: 0.09,
            quadratic: 0.032,
            range: 10.0,
        }
    }
}

impl Attenuation {
    pub fn with_range(range: f32) -> Self {
        Self {
            range: range.max(1e-3),
            ..Default::default()
        }
    }

    /// Attenuation factor at distance `d`, windowed to reach zero at `range`
    pub fn evaluate(&self, d: f32) -> f32 {
        if d >= self.range {
            return 0.0;
        }
        let falloff = 1.0 / (self.constant + self.linear * d + self.quadratic * d * d).max(1e-6);
        let ratio = (d / self.range).powi(4);
        let window = (1.0 - ratio).clamp(0.0, 1.0);
        falloff * window * window
    }
}

/// Min / max distance pairs driving LOD fades
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodDistances {
    pub specular: [f32; 2],
    /// Shadows are off beyond `shadow[1]`
    pub shadow: [f32; 2],
    /// Fade that selects the LOD tier
    pub shadow_lod: [f32; 2],
}

impl Default for LodDistances {
    fn default() -> Self {
        Self {
            specular: [50.0, 100.0],
            shadow: [40.0, 80.0],
            shadow_lod: [10.0, 60.0],
        }
    }
}

/// `lod_scale` thresholds for each tier
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodThresholds {
    pub high: f32,
    pub medium: f32,
}

impl Default for LodThresholds {
    fn default() -> Self {
        Self {
            high: 0.75,
            medium: 0.4,
        }
    }
}

impl LodThresholds {
    pub fn tier(&self, lod_scale: f32) -> LodTier {
        if lod_scale >= self.high {
            LodTier::High
        } else if lod_scale >= self.medium {
            LodTier::Medium
        } else {
            LodTier::Low
        }
    }
}

/// Result of LOD evaluation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightLod {
    pub tier: LodTier,
    pub shadow_attenuation: f32,
    pub specular_attenuation: f32,
    /// 1 near, 0 far
    pub lod_scale: f32,
    pub distance: f32,
}

/// Linear fade: 1 at or before `range[0]`, 0 at or after `range[1]`
fn fade(distance: f32, range: [f32; 2]) -> f32 {
    let [min, max] = range;
    if distance <= min {
        1.0
    } else if distance >= max {
        0.0
    } else {
        1.0 - (distance - min) / (max - min).max(1e-6)
    }
}

/// One face or cascade to render
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowFrustum {
    pub view_projection: Mat4,
    pub clip_range: [f32; 2],
    /// Array layer in the shadow surface
    pub layer: u32,
}

/// Inputs for building shadow frustums
#[derive(Clone, Copy, Debug)]
pub struct FrustumContext<'a> {
    pub camera: &'a CameraView,
    pub resolution: u32,
}

/// Capability set shared by every light type
pub trait LightShape {
    /// World bounds of the lit volume (`None` = unbounded)
    fn bounds(&self) -> Option<Aabb>;

    /// Number of shadow faces / cascades
    fn face_count(&self) -> u32;

    /// Shadow frustums, one per face
    fn shadow_frustums(&self, ctx: &FrustumContext<'_>) -> Vec<ShadowFrustum>;

    /// Distance from the camera used for LOD
    fn distance_to(&self, point: Vec3) -> f32;

    /// Containment of the lit volume in a frustum
    fn bounds_in_volume(&self, frustum: &Frustum) -> FrustumTestResult {
        match self.bounds() {
            Some(bounds) => frustum.test_aabb(&bounds),
            None => FrustumTestResult::Intersecting,
        }
    }

    /// Whether faces can be culled against the camera
    fn has_face_mask(&self) -> bool {
        false
    }
}

/// Omnidirectional light
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    pub position: Vec3,
    pub radius: f32,
}

/// Cone light
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub range: f32,
    /// Half-angles in radians
    pub inner_angle: f32,
    pub outer_angle: f32,
}

/// Infinitely distant light
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub cascades: CascadeConfig,
}

/// Half-space light: a point light that only emits forward
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HemisphereLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub radius: f32,
}

/// Rectangular projector
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectorLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub range: f32,
    /// Full horizontal / vertical field of view in radians
    pub fov_x: f32,
    pub fov_y: f32,
}

fn up_for(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

fn face_frustum(position: Vec3, look: Vec3, up: Vec3, far: f32, layer: u32) -> ShadowFrustum {
    let far = far.max(SHADOW_NEAR * 2.0);
    let view = Mat4::look_at_rh(position, position + look, up);
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, SHADOW_NEAR, far);
    ShadowFrustum {
        view_projection: proj * view,
        clip_range: [SHADOW_NEAR, far],
        layer,
    }
}

/// Bounds of a cone or pyramid from its apex, axis, length and half-extents
fn cone_bounds(apex: Vec3, direction: Vec3, length: f32, half_angle: f32) -> Aabb {
    let direction = direction.normalize_or_zero();
    let cap = apex + direction * length;
    let radius = length * half_angle.clamp(0.0, 1.55).tan();
    let cap_bounds = Aabb::from_sphere(cap, radius);
    Aabb::new(apex.min(cap_bounds.min), apex.max(cap_bounds.max))
}

impl LightShape for PointLight {
    fn bounds(&self) -> Option<Aabb> {
        Some(Aabb::from_sphere(self.position, self.radius))
    }

    fn face_count(&self) -> u32 {
        6
    }

    fn shadow_frustums(&self, _ctx: &FrustumContext<'_>) -> Vec<ShadowFrustum> {
        CUBE_FACES
            .iter()
            .enumerate()
            .map(|(i, (look, up))| face_frustum(self.position, *look, *up, self.radius, i as u32))
            .collect()
    }

    fn distance_to(&self, point: Vec3) -> f32 {
        self.position.distance(point)
    }

    fn has_face_mask(&self) -> bool {
        true
    }
}

impl LightShape for SpotLight {
    fn bounds(&self) -> Option<Aabb> {
        Some(cone_bounds(self.position, self.direction, self.range, self.outer_angle))
    }

    fn face_count(&self) -> u32 {
        1
    }

    fn shadow_frustums(&self, _ctx: &FrustumContext<'_>) -> Vec<ShadowFrustum> {
        let direction = self.direction.normalize_or_zero();
        let far = self.range.max(SHADOW_NEAR * 2.0);
        let fov = (self.outer_angle * 2.0).clamp(0.01, 3.1);
        let view = Mat4::look_at_rh(self.position, self.position + direction, up_for(direction));
        let proj = Mat4::perspective_rh(fov, 1.0, SHADOW_NEAR, far);
        vec![ShadowFrustum {
            view_projection: proj * view,
            clip_range: [SHADOW_NEAR, far],
            layer: 0,
        }]
    }

    fn distance_to(&self, point: Vec3) -> f32 {
        self.position.distance(point)
    }
}

impl LightShape for DirectionalLight {
    fn bounds(&self) -> Option<Aabb> {
        None
    }

    fn face_count(&self) -> u32 {
        self.cascades.count.clamp(1, crate::cascade::MAX_CASCADES as u32)
    }

    fn shadow_frustums(&self, ctx: &FrustumContext<'_>) -> Vec<ShadowFrustum> {
        build_cascades(
            &self.cascades,
            &ctx.camera.view_projection,
            ctx.camera.near,
            ctx.camera.far,
            self.direction,
            ctx.resolution,
        )
        .into_iter()
        .enumerate()
        .map(|(i, cascade)| ShadowFrustum {
            view_projection: cascade.view_projection,
            clip_range: cascade.split,
            layer: i as u32,
        })
        .collect()
    }

    fn distance_to(&self, _point: Vec3) -> f32 {
        0.0
    }
}

impl LightShape for HemisphereLight {
    fn bounds(&self) -> Option<Aabb> {
        Some(Aabb::from_sphere(self.position, self.radius))
    }

    fn face_count(&self) -> u32 {
        5
    }

    fn shadow_frustums(&self, _ctx: &FrustumContext<'_>) -> Vec<ShadowFrustum> {
        let forward = self.direction.normalize_or_zero();
        let forward = if forward == Vec3::ZERO { Vec3::NEG_Y } else { forward };
        let right = forward.cross(up_for(forward)).normalize();
        let up = right.cross(forward);

        let faces = [(forward, up), (right, up), (-right, up), (up, forward), (-up, forward)];
        faces
            .iter()
            .enumerate()
            .map(|(i, (look, face_up))| face_frustum(self.position, *look, *face_up, self.radius, i as u32))
            .collect()
    }

    fn distance_to(&self, point: Vec3) -> f32 {
        self.position.distance(point)
    }

    fn has_face_mask(&self) -> bool {
        true
    }
}

impl LightShape for ProjectorLight {
    fn bounds(&self) -> Option<Aabb> {
        let half = self.fov_x.max(self.fov_y) * 0.5;
        Some(cone_bounds(self.position, self.direction, self.range, half))
    }

    fn face_count(&self) -> u32 {
        1
    }

    fn shadow_frustums(&self, _ctx: &FrustumContext<'_>) -> Vec<ShadowFrustum> {
        let direction = self.direction.normalize_or_zero();
        let far = self.range.max(SHADOW_NEAR * 2.0);
        let fov_y = self.fov_y.clamp(0.01, 3.1);
        let aspect = (self.fov_x.clamp(0.01, 3.1) * 0.5).tan() / (fov_y * 0.5).tan();
        let view = Mat4::look_at_rh(self.position, self.position + direction, up_for(direction));
        let proj = Mat4::perspective_rh(fov_y, aspect, SHADOW_NEAR, far);
        vec![ShadowFrustum {
            view_projection: proj * view,
            clip_range: [SHADOW_NEAR, far],
            layer: 0,
        }]
    }

    fn distance_to(&self, point: Vec3) -> f32 {
        self.position.distance(point)
    }
}

/// Light type tag
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LightKind {
    Point(PointLight),
    Spot(SpotLight),
    Directional(DirectionalLight),
    Hemisphere(HemisphereLight),
    Projector(ProjectorLight),
}

impl LightKind {
    fn shape(&self) -> &dyn LightShape {
        match self {
            Self::Point(l) => l,
            Self::Spot(l) => l,
            Self::Directional(l) => l,
            Self::Hemisphere(l) => l,
            Self::Projector(l) => l,
        }
    }

    /// Numeric tag written to constant buffers
    pub fn type_index(&self) -> u32 {
        match self {
            Self::Point(_) => 0,
            Self::Spot(_) => 1,
            Self::Directional(_) => 2,
            Self::Hemisphere(_) => 3,
            Self::Projector(_) => 4,
        }
    }

    pub fn position(&self) -> Vec3 {
        match self {
            Self::Point(l) => l.position,
            Self::Spot(l) => l.position,
            Self::Directional(_) => Vec3::ZERO,
            Self::Hemisphere(l) => l.position,
            Self::Projector(l) => l.position,
        }
    }

    pub fn direction(&self) -> Vec3 {
        match self {
            Self::Point(_) => Vec3::ZERO,
            Self::Spot(l) => l.direction,
            Self::Directional(l) => l.direction,
            Self::Hemisphere(l) => l.direction,
            Self::Projector(l) => l.direction,
        }
    }
}

impl LightShape for LightKind {
    fn bounds(&self) -> Option<Aabb> {
        self.shape().bounds()
    }

    fn face_count(&self) -> u32 {
        self.shape().face_count()
    }

    fn shadow_frustums(&self, ctx: &FrustumContext<'_>) -> Vec<ShadowFrustum> {
        self.shape().shadow_frustums(ctx)
    }

    fn distance_to(&self, point: Vec3) -> f32 {
        self.shape().distance_to(point)
    }

    fn bounds_in_volume(&self, frustum: &Frustum) -> FrustumTestResult {
        self.shape().bounds_in_volume(frustum)
    }

    fn has_face_mask(&self) -> bool {
        self.shape().has_face_mask()
    }
}

/// A registered light
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub name: String,
    pub kind: LightKind,
    pub color: LightColor,
    pub attenuation: Attenuation,
    pub enabled: bool,
    pub casts_shadows: bool,
    /// System settings per shadow detail level
    pub shadow_lods: Vec<ShadowSettingsLod>,
    /// System settings per indirect detail level; non-empty marks the light
    /// as a reflective shadow map source
    pub indirect_lods: Vec<ShadowSettingsLod>,
    pub shadow: ShadowSettingsLight,
    pub lod_distances: LodDistances,
}

impl Light {
    pub fn new(name: impl Into<String>, kind: LightKind) -> Self {
        let range = match &kind {
            LightKind::Point(l) => l.radius,
            LightKind::Spot(l) => l.range,
            LightKind::Hemisphere(l) => l.radius,
            LightKind::Projector(l) => l.range,
            LightKind::Directional(_) => f32::MAX,
        };
        let shadow = match &kind {
            LightKind::Point(_) | LightKind::Hemisphere(_) => ShadowSettingsLight::point(),
            LightKind::Directional(_) => ShadowSettingsLight::directional(),
            _ => ShadowSettingsLight::default(),
        };
        Self {
            name: name.into(),
            kind,
            color: LightColor::default(),
            attenuation: Attenuation::with_range(range),
            enabled: true,
            casts_shadows: true,
            shadow_lods: Vec::new(),
            indirect_lods: Vec::new(),
            shadow,
            lod_distances: LodDistances::default(),
        }
    }

    pub fn point(name: impl Into<String>, position: Vec3, radius: f32) -> Self {
        Self::new(name, LightKind::Point(PointLight { position, radius }))
    }

    pub fn spot(name: impl Into<String>, position: Vec3, direction: Vec3, range: f32, outer_angle: f32) -> Self {
        Self::new(
            name,
            LightKind::Spot(SpotLight {
                position,
                direction,
                range,
                inner_angle: outer_angle * 0.8,
                outer_angle,
            }),
        )
    }

    pub fn directional(name: impl Into<String>, direction: Vec3) -> Self {
        Self::new(
            name,
            LightKind::Directional(DirectionalLight {
                direction,
                cascades: CascadeConfig::default(),
            }),
        )
    }

    pub fn hemisphere(name: impl Into<String>, position: Vec3, direction: Vec3, radius: f32) -> Self {
        Self::new(
            name,
            LightKind::Hemisphere(HemisphereLight {
                position,
                direction,
                radius,
            }),
        )
    }

    pub fn projector(name: impl Into<String>, position: Vec3, direction: Vec3, range: f32, fov_x: f32, fov_y: f32) -> Self {
        Self::new(
            name,
            LightKind::Projector(ProjectorLight {
                position,
                direction,
                range,
                fov_x,
                fov_y,
            }),
        )
    }

    pub fn with_color(mut self, color: LightColor) -> Self {
        self.color = color;
        self
    }

    pub fn with_shadow_lods(mut self, lods: Vec<ShadowSettingsLod>) -> Self {
        self.shadow_lods = lods;
        self
    }

    pub fn with_indirect_lods(mut self, lods: Vec<ShadowSettingsLod>) -> Self {
        self.indirect_lods = lods;
        self
    }

    pub fn with_shadow_settings(mut self, shadow: ShadowSettingsLight) -> Self {
        self.shadow = shadow;
        self
    }

    pub fn with_lod_distances(mut self, distances: LodDistances) -> Self {
        self.lod_distances = distances;
        self
    }

    pub fn without_shadows(mut self) -> Self {
        self.casts_shadows = false;
        self
    }

    /// Contributes a reflective shadow map to indirect lighting
    pub fn is_indirect(&self) -> bool {
        !self.indirect_lods.is_empty()
    }

    /// Level of detail for a camera distance.
    ///
    /// Specular, shadow and shadow-LOD fades are each linear between their
    /// min and max distance. Beyond the shadow max distance the tier is `Off`.
    pub fn compute_level_of_detail(&self, camera_distance: f32, thresholds: &LodThresholds) -> LightLod {
        let d = camera_distance.max(0.0);
        let shadow_attenuation = fade(d, self.lod_distances.shadow);
        let specular_attenuation = fade(d, self.lod_distances.specular);
        let lod_scale = fade(d, self.lod_distances.shadow_lod);

        let tier = if d >= self.lod_distances.shadow[1] {
            LodTier::Off
        } else {
            thresholds.tier(lod_scale)
        };

        LightLod {
            tier,
            shadow_attenuation,
            specular_attenuation,
            lod_scale,
            distance: d,
        }
    }

    /// Visible when enabled, inside the camera frustum and reported visible
    /// by the scene. Unbounded lights are always visible.
    pub fn compute_visibility(&self, scene: &dyn SceneQuery, camera_frustum: &Frustum) -> bool {
        if !self.enabled {
            return false;
        }
        match self.kind.bounds() {
            Some(bounds) => camera_frustum.test_aabb(&bounds).is_visible() && scene.is_visible(&bounds),
            None => true,
        }
    }

    pub fn bounds_in_volume(&self, frustum: &Frustum) -> FrustumTestResult {
        self.kind.bounds_in_volume(frustum)
    }

    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.kind.distance_to(point)
    }
}

/// Bit `i` set when face `i` may contribute to the camera view.
///
/// Lights without a face mask get every bit set.
pub fn face_visibility_mask(shape: &dyn LightShape, faces: &[ShadowFrustum], camera: &CameraView) -> u32 {
    let all = if faces.len() >= 32 { u32::MAX } else { (1u32 << faces.len()) - 1 };
    if !shape.has_face_mask() {
        return all;
    }

    let camera_frustum = camera.frustum();
    let camera_corners = frustum_corners(&camera.view_projection);
    faces.iter().enumerate().fold(0, |mask, (i, face)| {
        let face_frustum = Frustum::from_view_projection(&face.view_projection);
        let face_corners = frustum_corners(&face.view_projection);
        if face_frustum.may_intersect(&camera_corners) && camera_frustum.may_intersect(&face_corners) {
            mask | (1 << i)
        } else {
            mask
        }
    })
}

/// Elapsed-time refresh policy for cached shadows
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RefreshTimer {
    accumulated: f32,
    invalidated: bool,
}

impl RefreshTimer {
    /// Advance by `dt` and report whether a refresh is due.
    ///
    /// Without a valid cached map a refresh is always due.
    pub fn advance(&mut self, rate: UpdateRate, dt: f32, has_cache: bool) -> bool {
        self.accumulated += dt.max(0.0);
        if !has_cache || self.invalidated {
            return true;
        }
        match rate.interval() {
            None => false,
            Some(interval) => self.accumulated + 1e-6 >= interval,
        }
    }

    pub fn mark_refreshed(&mut self) {
        self.accumulated = 0.0;
        self.invalidated = false;
    }

    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::EmptyScene;

    struct HiddenScene;

    impl SceneQuery for HiddenScene {
        fn is_visible(&self, _bounds: &Aabb) -> bool {
            false
        }

        fn surface_hit(&self, _o: Vec3, _d: Vec3, _m: f32) -> Option<crate::scene::SurfaceHit> {
            None
        }
    }

    #[test]
    fn test_lod_tiers_by_distance() {
        let light = Light::point("p", Vec3::ZERO, 10.0);
        let thresholds = LodThresholds::default();

        assert_eq!(light.compute_level_of_detail(5.0, &thresholds).tier, LodTier::High);
        assert_eq!(light.compute_level_of_detail(30.0, &thresholds).tier, LodTier::Medium);
        assert_eq!(light.compute_level_of_detail(50.0, &thresholds).tier, LodTier::Low);
        assert_eq!(light.compute_level_of_detail(80.0, &thresholds).tier, LodTier::Off);
    }

    #[test]
    fn test_lod_attenuation_is_linear() {
        let light = Light::point("p", Vec3::ZERO, 10.0);
        let lod = light.compute_level_of_detail(60.0, &LodThresholds::default());
        assert!((lod.shadow_attenuation - 0.5).abs() < 1e-5);
        assert!((lod.specular_attenuation - 0.8).abs() < 1e-5);
        assert_eq!(lod.lod_scale, 0.0);

        let near = light.compute_level_of_detail(0.0, &LodThresholds::default());
        assert_eq!(near.shadow_attenuation, 1.0);
        assert_eq!(near.lod_scale, 1.0);
    }

    #[test]
    fn test_face_counts() {
        let camera = CameraView::default();
        let ctx = FrustumContext {
            camera: &camera,
            resolution: 1024,
        };
        let point = Light::point("p", Vec3::ZERO, 5.0);
        let hemi = Light::hemisphere("h", Vec3::ZERO, Vec3::NEG_Y, 5.0);
        let spot = Light::spot("s", Vec3::ZERO, Vec3::NEG_Y, 5.0, 0.5);
        let proj = Light::projector("pr", Vec3::ZERO, Vec3::NEG_Y, 5.0, 0.8, 0.5);
        let sun = Light::directional("d", Vec3::new(0.2, -1.0, 0.1));

        assert_eq!(point.kind.shadow_frustums(&ctx).len(), 6);
        assert_eq!(hemi.kind.shadow_frustums(&ctx).len(), 5);
        assert_eq!(spot.kind.shadow_frustums(&ctx).len(), 1);
        assert_eq!(proj.kind.shadow_frustums(&ctx).len(), 1);
        assert_eq!(sun.kind.shadow_frustums(&ctx).len(), 3);
        assert_eq!(sun.kind.face_count(), 3);
    }

    #[test]
    fn test_cube_faces_cover_axes() {
        let camera = CameraView::default();
        let ctx = FrustumContext {
            camera: &camera,
            resolution: 256,
        };
        let point = PointLight {
            position: Vec3::ZERO,
            radius: 10.0,
        };
        let faces = point.shadow_frustums(&ctx);
        for (i, (look, _)) in CUBE_FACES.iter().enumerate() {
            let frustum = Frustum::from_view_projection(&faces[i].view_projection);
            assert!(frustum.contains_point(*look * 5.0), "face {} misses its axis", i);
            assert_eq!(faces[i].layer, i as u32);
        }
    }

    #[test]
    fn test_visibility() {
        let camera = CameraView::default();
        let frustum = camera.frustum();
        let inside = Light::point("in", Vec3::ZERO, 1.0);
        let behind = Light::point("out", Vec3::new(0.0, 2.0, 40.0), 1.0);
        let sun = Light::directional("sun", Vec3::NEG_Y);

        assert!(inside.compute_visibility(&EmptyScene, &frustum));
        assert!(!behind.compute_visibility(&EmptyScene, &frustum));
        assert!(!inside.compute_visibility(&HiddenScene, &frustum));
        assert!(sun.compute_visibility(&HiddenScene, &frustum));

        let mut disabled = inside.clone();
        disabled.enabled = false;
        assert!(!disabled.compute_visibility(&EmptyScene, &frustum));
    }

    #[test]
    fn test_bounds_in_volume() {
        let frustum = CameraView::default().frustum();
        let sun = Light::directional("sun", Vec3::NEG_Y);
        assert_eq!(sun.bounds_in_volume(&frustum), FrustumTestResult::Intersecting);

        let small = Light::point("p", Vec3::ZERO, 0.5);
        assert_eq!(small.bounds_in_volume(&frustum), FrustumTestResult::Inside);
        let far = Light::spot("s", Vec3::new(0.0, 0.0, 100.0), Vec3::Z, 5.0, 0.3);
        assert_eq!(far.bounds_in_volume(&frustum), FrustumTestResult::Outside);
    }

    #[test]
    fn test_face_mask_skips_hidden_faces() {
        // Camera in front of the light looking away from it: only -Z overlaps
        let camera = CameraView::look_at(
            Vec3::new(0.0, 0.0, -3.0),
            Vec3::new(0.0, 0.0, -10.0),
            60f32.to_radians(),
            1.0,
            0.1,
            50.0,
        );
        let light = Light::point("p", Vec3::ZERO, 5.0);
        let ctx = FrustumContext {
            camera: &camera,
            resolution: 256,
        };
        let faces = light.kind.shadow_frustums(&ctx);
        let mask = face_visibility_mask(&light.kind, &faces, &camera);
        assert_eq!(mask, 1 << 5);

        let spot = Light::spot("s", Vec3::ZERO, Vec3::NEG_Z, 5.0, 0.5);
        let faces = spot.kind.shadow_frustums(&ctx);
        assert_eq!(face_visibility_mask(&spot.kind, &faces, &camera), 1);
    }

    #[test]
    fn test_refresh_timer() {
        let mut timer = RefreshTimer::default();
        // No cache: always due
        assert!(timer.advance(UpdateRate::Never, 0.016, false));
        timer.mark_refreshed();
        assert!(!timer.advance(UpdateRate::Never, 0.016, true));
        timer.invalidate();
        assert!(timer.advance(UpdateRate::Never, 0.016, true));
        timer.mark_refreshed();

        assert!(timer.advance(UpdateRate::Always, 0.016, true));

        let mut timer = RefreshTimer::default();
        assert!(!timer.advance(UpdateRate::Fps(10), 0.05, true));
        assert!(timer.advance(UpdateRate::Fps(10), 0.05, true));
        timer.mark_refreshed();
        assert!(!timer.advance(UpdateRate::Fps(10), 0.05, true));
    }

    #[test]
    fn test_attenuation_window() {
        let att = Attenuation::with_range(10.0);
        assert!(att.evaluate(0.0) > att.evaluate(5.0));
        assert_eq!(att.evaluate(10.0), 0.0);
        assert_eq!(att.evaluate(20.0), 0.0);
    }

    #[test]
    fn test_light_json_round_trip() {
        let light = Light::spot("s", Vec3::ONE, Vec3::NEG_Y, 8.0, 0.4)
            .with_shadow_lods(vec![ShadowSettingsLod::new(0, "default")]);
        let json = serde_json::to_string(&light).unwrap();
        let restored: Light = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, light);
    }
}
