//! Cascaded shadow frustums for directional lights
//!
//! The camera frustum is divided into up to [`MAX_CASCADES`] depth ranges.
//! Each range is enclosed by a bounding sphere and covered by an
//! orthographic projection looking down the light direction. The projection
//! is snapped to whole shadow-map texels so shadows do not swim as the camera
//! moves.

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::math::frustum_corners;

/// Maximum supported cascade count
pub const MAX_CASCADES: usize = 4;

/// Cascade layout for a directional light
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Number of cascades (1-4)
    pub count: u32,
    /// Split scheme blend (0 = linear, 1 = logarithmic)
    pub lambda: f32,
    /// Maximum distance from the camera covered by the cascades
    pub shadow_distance: f32,
    /// Overlap between neighbouring cascades in world units
    pub overlap: f32,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            count: 3,
            lambda: 0.5,
            shadow_distance: 100.0,
            overlap: 2.0,
        }
    }
}

impl CascadeConfig {
    /// Clamp to valid ranges
    pub fn validate(&mut self) {
        self.count = self.count.clamp(1, MAX_CASCADES as u32);
        self.lambda = self.lambda.clamp(0.0, 1.0);
        self.shadow_distance = self.shadow_distance.max(1.0);
        self.overlap = self.overlap.max(0.0);
    }
}

/// Split distances using the practical split scheme.
///
/// Returns `count + 1` view-space distances starting at `near` and ending
/// at `far`.
pub fn calculate_splits(near: f32, far: f32, count: u32, lambda: f32) -> Vec<f32> {
    let count = count.clamp(1, MAX_CASCADES as u32) as usize;
    let lambda = lambda.clamp(0.0, 1.0);
    let near = near.max(1e-4);
    let far = far.max(near + 1e-3);

    let mut splits = Vec::with_capacity(count + 1);
    splits.push(near);
    for i in 1..=count {
        let p = i as f32 / count as f32;
        let log_split = near * (far / near).powf(p);
        let lin_split = near + (far - near) * p;
        splits.push(lambda * log_split + (1.0 - lambda) * lin_split);
    }
    splits
}

/// One cascade's shadow projection
#[derive(Clone, Debug, PartialEq)]
pub struct CascadeFrustum {
    pub view_projection: Mat4,
    /// View-space depth range covered
    pub split: [f32; 2],
    pub center: Vec3,
    pub radius: f32,
    /// Texel size in world units
    pub texel_size: f32,
}

/// Build the cascade projections for a camera and a light direction.
///
/// `camera_view_projection` must span `camera_near..camera_far`.
pub fn build_cascades(
    config: &CascadeConfig,
    camera_view_projection: &Mat4,
    camera_near: f32,
    camera_far: f32,
    light_direction: Vec3,
    resolution: u32,
) -> Vec<CascadeFrustum> {
    let far = config.shadow_distance.min(camera_far);
    let splits = calculate_splits(camera_near, far, config.count, config.lambda);
    let corners = frustum_corners(camera_view_projection);
    let depth = (camera_far - camera_near).max(1e-4);
    let direction = light_direction.normalize_or_zero();
    let direction = if direction == Vec3::ZERO { Vec3::NEG_Y } else { direction };

    splits
        .windows(2)
        .map(|range| {
            let start = (range[0] - config.overlap).max(camera_near);
            let end = range[1];
            let t0 = (start - camera_near) / depth;
            let t1 = (end - camera_near) / depth;

            // Corners 0..4 are on the near plane, 4..8 on the far plane
            let mut slice = [Vec3::ZERO; 8];
            for i in 0..4 {
                let edge = corners[i + 4] - corners[i];
                slice[i] = corners[i] + edge * t0;
                slice[i + 4] = corners[i] + edge * t1;
            }

            let center = slice.iter().copied().sum::<Vec3>() / 8.0;
            let radius = slice
                .iter()
                .map(|c| c.distance(center))
                .fold(0.0f32, f32::max)
                .max(1e-3);

            let eye = center - direction * radius * 2.0;
            let view = Mat4::look_at_rh(eye, center, up_vector(direction));
            let proj = Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, radius * 4.0);
            let view_projection = snap_to_texel(proj * view, resolution);

            CascadeFrustum {
                view_projection,
                split: [start, end],
                center,
                radius,
                texel_size: radius * 2.0 / resolution.max(1) as f32,
            }
        })
        .collect()
}

fn up_vector(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.9 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

/// Round the projected origin to a whole texel
fn snap_to_texel(matrix: Mat4, resolution: u32) -> Mat4 {
    let half = resolution.max(1) as f32 * 0.5;
    let origin = matrix * Vec4::new(0.0, 0.0, 0.0, 1.0);
    let texel = Vec4::new(origin.x * half, origin.y * half, 0.0, 0.0);
    let rounded = Vec4::new(texel.x.round(), texel.y.round(), 0.0, 0.0);
    let offset = (rounded - texel) / half;

    let mut snapped = matrix;
    snapped.w_axis.x += offset.x;
    snapped.w_axis.y += offset.y;
    snapped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Mat4 {
        Mat4::perspective_rh(60f32.to_radians(), 1.5, 0.1, 200.0)
            * Mat4::look_at_rh(Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, 2.0, -1.0), Vec3::Y)
    }

    #[test]
    fn test_linear_splits() {
        let splits = calculate_splits(1.0, 101.0, 4, 0.0);
        assert_eq!(splits.len(), 5);
        assert!((splits[1] - 26.0).abs() < 1e-4);
        assert!((splits[4] - 101.0).abs() < 1e-4);
    }

    #[test]
    fn test_log_splits() {
        let splits = calculate_splits(1.0, 1000.0, 3, 1.0);
        assert!((splits[1] - 10.0).abs() < 1e-2);
        assert!((splits[2] - 100.0).abs() < 1e-1);
    }

    #[test]
    fn test_splits_monotonic() {
        let splits = calculate_splits(0.1, 150.0, 4, 0.5);
        for w in splits.windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn test_build_cascades() {
        let config = CascadeConfig {
            count: 3,
            shadow_distance: 60.0,
            ..Default::default()
        };
        let cascades = build_cascades(&config, &camera(), 0.1, 200.0, Vec3::new(0.3, -1.0, 0.2), 1024);
        assert_eq!(cascades.len(), 3);
        for pair in cascades.windows(2) {
            // Later cascades cover more of the scene
            assert!(pair[1].radius > pair[0].radius);
        }
        assert!(cascades[2].split[1] <= 60.0 + 1e-3);
        for c in &cascades {
            assert!(c.texel_size > 0.0);
            // Cascade center projects inside the cascade's clip volume
            let clip = c.view_projection.project_point3(c.center);
            assert!(clip.x.abs() <= 1.0 + 1e-2 && clip.y.abs() <= 1.0 + 1e-2);
        }
    }

    #[test]
    fn test_config_validate() {
        let mut config = CascadeConfig {
            count: 9,
            lambda: -1.0,
            shadow_distance: 0.0,
            overlap: -3.0,
        };
        config.validate();
        assert_eq!(config.count, 4);
        assert_eq!(config.lambda, 0.0);
        assert_eq!(config.shadow_distance, 1.0);
        assert_eq!(config.overlap, 0.0);
    }
}
