//! Screen-space ambient occlusion
//!
//! # Algorithm
//!
//! 1. Occlusion: depth + normal -> work surface (half resolution), sampling
//!    a hemisphere kernel oriented along the surface normal
//! 2. Resolve: color * upsampled occlusion -> target

use serde::{Deserialize, Serialize};
use umbra_driver::BlendStateDesc;

use crate::error::PostResult;
use crate::stage::{config_data, parse_config, PostConstants, PostStage, StageConfigData, StageContext, StageInput};

/// Configuration for the ambient occlusion stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientOcclusionConfig {
    /// World-space sampling radius
    pub radius: f32,
    /// Occlusion strength (0.0 - 4.0)
    pub intensity: f32,
    /// Depth bias against self-occlusion
    pub bias: f32,
    /// Kernel size (4 - 64)
    pub samples: u32,
}

impl Default for AmbientOcclusionConfig {
    fn default() -> Self {
        Self {
            radius: 0.5,
            intensity: 1.0,
            bias: 0.025,
            samples: 16,
        }
    }
}

impl AmbientOcclusionConfig {
    pub fn validate(&mut self) {
        self.radius = self.radius.clamp(0.01, 8.0);
        self.intensity = self.intensity.clamp(0.0, 4.0);
        self.bias = self.bias.clamp(0.0, 1.0);
        self.samples = self.samples.clamp(4, 64);
    }
}

fn radical_inverse(mut bits: u32) -> f32 {
    bits = bits.reverse_bits();
    bits as f32 * 2.328_306_4e-10
}

/// Hemisphere sample kernel (+Z up) of `count` points.
///
/// Points follow a Hammersley sequence and are pulled toward the origin so
/// nearby occluders weigh more.
pub fn hemisphere_kernel(count: u32) -> Vec<[f32; 3]> {
    let count = count.max(1);
    (0..count)
        .map(|i| {
            let u = (i as f32 + 0.5) / count as f32;
            let v = radical_inverse(i);
            let phi = v * core::f32::consts::TAU;
            let cos_theta = 1.0 - u;
            let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

            let t = i as f32 / count as f32;
            let scale = 0.1 + 0.9 * t * t;
            [
                sin_theta * phi.cos() * scale,
                sin_theta * phi.sin() * scale,
                cos_theta * scale,
            ]
        })
        .collect()
}

/// Hemisphere SSAO
pub struct AmbientOcclusionStage {
    config: AmbientOcclusionConfig,
    kernel: Vec<[f32; 3]>,
    enabled: bool,
}

impl Default for AmbientOcclusionStage {
    fn default() -> Self {
        Self::new()
    }
}

impl AmbientOcclusionStage {
    pub fn new() -> Self {
        Self::with_config(AmbientOcclusionConfig::default())
    }

    pub fn with_config(mut config: AmbientOcclusionConfig) -> Self {
        config.validate();
        Self {
            kernel: hemisphere_kernel(config.samples),
            config,
            enabled: true,
        }
    }

    pub fn settings(&self) -> &AmbientOcclusionConfig {
        &self.config
    }

    pub fn set_settings(&mut self, mut config: AmbientOcclusionConfig) {
        config.validate();
        if config.samples != self.config.samples {
            self.kernel = hemisphere_kernel(config.samples);
        }
        self.config = config;
    }

    pub fn kernel(&self) -> &[[f32; 3]] {
        &self.kernel
    }
}

impl PostStage for AmbientOcclusionStage {
    fn name(&self) -> &str {
        "ao"
    }

    fn inputs(&self) -> &[StageInput] {
        &[StageInput::Depth, StageInput::Normal]
    }

    fn uses_work_surface(&self) -> bool {
        true
    }

    fn execute(&mut self, ctx: &mut StageContext<'_>) -> PostResult<()> {
        let depth = ctx.input(StageInput::Depth)?;
        let normal = ctx.input(StageInput::Normal)?;
        let work = ctx.work()?;
        let (source, target) = (ctx.source(), ctx.target());

        let occlusion = PostConstants::new(ctx.work_size()).with_params([
            self.config.radius,
            self.config.intensity,
            self.config.bias,
            self.kernel.len() as f32,
        ]);
        ctx.upload(&occlusion)?;
        ctx.draw("occlusion", &[depth, normal], work, BlendStateDesc::opaque())?;

        ctx.upload(&PostConstants::new(ctx.viewport()).with_params([self.config.intensity, 0.0, 0.0, 0.0]))?;
        ctx.draw("resolve", &[source, work, depth], target, BlendStateDesc::opaque())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn config(&self) -> Option<StageConfigData> {
        config_data(self.name(), self.enabled, &self.config)
    }

    fn apply_config(&mut self, data: &StageConfigData) -> PostResult<()> {
        self.set_settings(parse_config(data)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_in_unit_hemisphere() {
        let kernel = hemisphere_kernel(32);
        assert_eq!(kernel.len(), 32);
        for p in &kernel {
            let len = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            assert!(p[2] >= 0.0);
            assert!(len <= 1.0 + 1e-5);
        }
        // Later samples reach further out
        let first = kernel[0];
        let last = kernel[31];
        let len = |p: [f32; 3]| (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
        assert!(len(last) > len(first));
    }

    #[test]
    fn test_kernel_rebuilt_on_sample_change() {
        let mut stage = AmbientOcclusionStage::new();
        assert_eq!(stage.kernel().len(), 16);
        stage.set_settings(AmbientOcclusionConfig {
            samples: 100,
            ..Default::default()
        });
        assert_eq!(stage.kernel().len(), 64);
    }

    #[test]
    fn test_declares_inputs() {
        let stage = AmbientOcclusionStage::new();
        assert_eq!(stage.inputs(), &[StageInput::Depth, StageInput::Normal]);
        assert!(stage.uses_work_surface());
    }
}
