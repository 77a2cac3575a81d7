//! Separable Gaussian blur
//!
//! # Algorithm
//!
//! 1. Horizontal pass: source -> work surface
//! 2. Vertical pass: work surface -> target
//!
//! Weights are computed on the CPU and the first four taps are uploaded
//! with the pass constants; the shader mirrors them around the center.

use serde::{Deserialize, Serialize};
use umbra_driver::BlendStateDesc;

use crate::error::PostResult;
use crate::stage::{config_data, parse_config, PostConstants, PostStage, StageConfigData, StageContext};

/// Configuration for the blur stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurConfig {
    /// Taps on each side of the center (1 - 16)
    pub radius: u32,
    /// Standard deviation in texels
    pub sigma: f32,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self { radius: 4, sigma: 2.0 }
    }
}

impl BlurConfig {
    pub fn validate(&mut self) {
        self.radius = self.radius.clamp(1, 16);
        self.sigma = self.sigma.clamp(0.1, 16.0);
    }
}

/// Normalized Gaussian weights for taps `-radius..=radius`
pub fn gaussian_weights(radius: u32, sigma: f32) -> Vec<f32> {
    let sigma = sigma.max(f32::EPSILON);
    let r = radius as i32;
    let mut weights: Vec<f32> = (-r..=r)
        .map(|x| (-(x * x) as f32 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// Two-pass Gaussian blur
pub struct GaussianBlurStage {
    config: BlurConfig,
    weights: Vec<f32>,
    enabled: bool,
}

impl Default for GaussianBlurStage {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianBlurStage {
    pub fn new() -> Self {
        Self::with_config(BlurConfig::default())
    }

    pub fn with_config(mut config: BlurConfig) -> Self {
        config.validate();
        Self {
            weights: gaussian_weights(config.radius, config.sigma),
            config,
            enabled: true,
        }
    }

    pub fn settings(&self) -> &BlurConfig {
        &self.config
    }

    pub fn set_settings(&mut self, mut config: BlurConfig) {
        config.validate();
        self.weights = gaussian_weights(config.radius, config.sigma);
        self.config = config;
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    fn constants(&self, size: (u32, u32), direction: (f32, f32)) -> PostConstants {
        let center = self.config.radius as usize;
        let mut taps = [0.0; 4];
        for (i, tap) in taps.iter_mut().enumerate() {
            *tap = self.weights.get(center + i).copied().unwrap_or(0.0);
        }
        PostConstants::new(size)
            .with_direction(direction.0, direction.1)
            .with_params([self.config.radius as f32, self.config.sigma, 0.0, 0.0])
            .with_extra(taps)
    }
}

impl PostStage for GaussianBlurStage {
    fn name(&self) -> &str {
        "blur"
    }

    fn uses_work_surface(&self) -> bool {
        true
    }

    fn execute(&mut self, ctx: &mut StageContext<'_>) -> PostResult<()> {
        let work = ctx.work()?;
        let (source, target) = (ctx.source(), ctx.target());

        ctx.upload(&self.constants(ctx.work_size(), (1.0, 0.0)))?;
        ctx.draw("horizontal", &[source], work, BlendStateDesc::opaque())?;

        ctx.upload(&self.constants(ctx.viewport(), (0.0, 1.0)))?;
        ctx.draw("vertical", &[work], target, BlendStateDesc::opaque())
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
