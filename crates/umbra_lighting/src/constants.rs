//! Lighting constant buffers
//!
//! GPU-ready layouts uploaded at the end of every `update`. All structs are
//! `#[repr(C)]`, `Pod`, and sized to multiples of 16 bytes so they can be
//! packed into arrays without extra padding.

use serde::{Deserialize, Serialize};

use crate::grid::RadianceGrid;
use crate::light::{Light, LightLod, ShadowFrustum};
use crate::settings::{ShadowMethod, ShadowSettings};

/// Frame-wide lighting terms
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightingSystemConstants {
    /// Scene ambient (linear RGB)
    pub ambient: [f32; 3],
    /// Seconds since the previous update
    pub frame_time: f32,
    pub light_count: u32,
    pub shadow_count: u32,
    /// Non-zero when the radiance grid is sampled
    pub indirect_active: u32,
    pub dynamics_enabled: u32,
    pub shadow_detail_level: i32,
    pub indirect_detail_level: i32,
    pub frame: u32,
    pub _pad: u32,
}

impl LightingSystemConstants {
    pub const SIZE: usize = core::mem::size_of::<Self>();
}

/// Per-light shading terms
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightConstants {
    pub position: [f32; 3],
    pub range: f32,
    pub direction: [f32; 3],
    /// 0 point, 1 spot, 2 directional, 3 hemisphere, 4 projector
    pub light_type: u32,
    pub diffuse: [f32; 3],
    pub diffuse_scale: f32,
    pub specular: [f32; 3],
    pub specular_scale: f32,
    pub ambient: [f32; 3],
    pub ambient_scale: f32,
    pub rim: [f32; 3],
    pub rim_scale: f32,
    /// Attenuation coefficients [constant, linear, quadratic]
    pub attenuation: [f32; 3],
    pub shadow_attenuation: f32,
    pub specular_attenuation: f32,
    /// First entry in the shadow array (-1 if unshadowed this frame)
    pub shadow_index: i32,
    pub shadow_faces: u32,
    pub _pad: u32,
}

impl LightConstants {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn new(light: &Light, lod: &LightLod) -> Self {
        let color = &light.color;
        Self {
            position: light.kind.position().to_array(),
            range: light.attenuation.range,
            direction: light.kind.direction().to_array(),
            light_type: light.kind.type_index(),
            diffuse: color.diffuse.to_array(),
            diffuse_scale: color.diffuse_scale,
            specular: color.specular.to_array(),
            specular_scale: color.specular_scale,
            ambient: color.ambient.to_array(),
            ambient_scale: color.ambient_scale,
            rim: color.rim.to_array(),
            rim_scale: color.rim_scale,
            attenuation: [
                light.attenuation.constant,
                light.attenuation.linear,
                light.attenuation.quadratic,
            ],
            shadow_attenuation: lod.shadow_attenuation,
            specular_attenuation: lod.specular_attenuation,
            shadow_index: -1,
            shadow_faces: 0,
            _pad: 0,
        }
    }

    pub fn with_shadow(mut self, index: usize, faces: u32) -> Self {
        self.shadow_index = index as i32;
        self.shadow_faces = faces;
        self
    }
}

/// Shadow sampling terms for one face or cascade
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowConstants {
    /// Face view-projection (column-major)
    pub view_projection: [[f32; 4]; 4],
    pub clip_range: [f32; 2],
    pub depth_bias: f32,
    pub normal_bias: f32,
    pub filter_radius: [f32; 2],
    pub intensity: f32,
    pub samples: u32,
    /// 0 PCF, 1 PCSS, 2 VSM, 3 ESM, 4 EVSM, 5 RSM
    pub method: u32,
    pub light_index: u32,
    pub layer: u32,
    pub resolution: u32,
    pub exponent: f32,
    pub minimum_variance: f32,
    pub minimum_cutoff: f32,
    pub translucency: u32,
}

impl ShadowConstants {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn new(settings: &ShadowSettings, frustum: &ShadowFrustum, light_index: usize) -> Self {
        let light = &settings.light;
        Self {
            view_projection: frustum.view_projection.to_cols_array_2d(),
            clip_range: frustum.clip_range,
            depth_bias: light.depth_bias,
            normal_bias: light.normal_bias,
            filter_radius: light.filter_radius,
            intensity: light.intensity,
            samples: settings.samples(),
            method: method_index(settings.method()),
            light_index: light_index as u32,
            layer: frustum.layer,
            resolution: settings.resolution,
            exponent: light.exponent,
            minimum_variance: light.minimum_variance,
            minimum_cutoff: light.minimum_cutoff,
            translucency: settings.translucency() as u32,
        }
    }
}

fn method_index(method: ShadowMethod) -> u32 {
    match method {
        ShadowMethod::Pcf => 0,
        ShadowMethod::Pcss => 1,
        ShadowMethod::Vsm => 2,
        ShadowMethod::Esm => 3,
        ShadowMethod::Evsm => 4,
        ShadowMethod::Rsm => 5,
    }
}

/// Radiance grid sampling terms
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GridConstants {
    /// World position of the minimum corner
    pub origin: [f32; 3],
    pub cell_size: f32,
    pub dimensions: [u32; 3],
    pub cycles_completed: u32,
    pub temporal_weight: f32,
    pub sh_clamp: f32,
    pub light_strength: f32,
    pub enabled: u32,
}

impl GridConstants {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn new(grid: &RadianceGrid, enabled: bool) -> Self {
        let config = grid.config();
        Self {
            origin: grid.origin().to_array(),
            cell_size: config.cell_size,
            dimensions: config.dimensions,
            cycles_completed: grid.stats().cycles_completed as u32,
            temporal_weight: config.temporal_weight,
            sh_clamp: config.sh_clamp,
            light_strength: config.light_strength,
            enabled: enabled as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::RadianceGridConfig;
    use crate::light::LodThresholds;
    use glam::Vec3;

    #[test]
    fn test_layouts_are_16_byte_multiples() {
        assert_eq!(LightingSystemConstants::SIZE, 48);
        assert_eq!(LightConstants::SIZE, 128);
        assert_eq!(ShadowConstants::SIZE, 128);
        assert_eq!(GridConstants::SIZE, 48);
    }

    #[test]
    fn test_light_constants_from_light() {
        let light = Light::spot("spot", Vec3::new(1.0, 2.0, 3.0), Vec3::NEG_Y, 15.0, 0.5);
        let lod = light.compute_level_of_detail(5.0, &LodThresholds::default());
        let constants = LightConstants::new(&light, &lod).with_shadow(3, 1);
        assert_eq!(constants.position, [1.0, 2.0, 3.0]);
        assert_eq!(constants.light_type, 1);
        assert_eq!(constants.shadow_index, 3);

        let array = [constants, LightConstants::new(&light, &lod)];
        let bytes: &[u8] = bytemuck::cast_slice(&array);
        assert_eq!(bytes.len(), 2 * LightConstants::SIZE);
        let back: &[LightConstants] = bytemuck::cast_slice(bytes);
        assert_eq!(back[1].shadow_index, -1);
    }

    #[test]
    fn test_grid_constants() {
        let grid = RadianceGrid::new(RadianceGridConfig::default());
        let constants = GridConstants::new(&grid, true);
        assert_eq!(constants.dimensions, [16, 8, 16]);
        assert_eq!(constants.origin, [-16.0, -8.0, -16.0]);
        assert_eq!(constants.enabled, 1);
    }
}
