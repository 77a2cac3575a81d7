//! Glare (bright-pass bloom)
//!
//! # Algorithm
//!
//! 1. Extract: soft-knee bright pass of the source into the work surface
//! 2. Composite: source + blurred work surface * intensity -> target

use serde::{Deserialize, Serialize};
use umbra_driver::BlendStateDesc;

use crate::error::PostResult;
use crate::stage::{config_data, parse_config, PostConstants, PostStage, StageConfigData, StageContext};

/// Configuration for the glare stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlareConfig {
    /// Luminance where glare starts (0.0 - 10.0)
    pub threshold: f32,
    /// Soft knee width (0.0 - 1.0)
    pub knee: f32,
    /// Glare intensity (0.0 - 2.0)
    pub intensity: f32,
}

impl Default for GlareConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            knee: 0.5,
            intensity: 0.5,
        }
    }
}

impl GlareConfig {
    pub fn validate(&mut self) {
        self.threshold = self.threshold.clamp(0.0, 10.0);
        self.knee = self.knee.clamp(0.0, 1.0);
        self.intensity = self.intensity.clamp(0.0, 2.0);
    }
}

/// Bright-pass glare
pub struct GlareStage {
    config: GlareConfig,
    enabled: bool,
}

impl Default for GlareStage {
    fn default() -> Self {
        Self::new()
    }
}

impl GlareStage {
    pub fn new() -> Self {
        Self::with_config(GlareConfig::default())
    }

    pub fn with_config(mut config: GlareConfig) -> Self {
        config.validate();
        Self { config, enabled: true }
    }

    pub fn settings(&self) -> &GlareConfig {
        &self.config
    }

    pub fn set_settings(&mut self, mut config: GlareConfig) {
        config.validate();
        self.config = config;
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.config.intensity = intensity.clamp(0.0, 2.0);
    }

    /// Fraction of a pixel of `luminance` that feeds the glare
    pub fn bright_pass(&self, luminance: f32) -> f32 {
        let GlareConfig { threshold, knee, .. } = self.config;
        if luminance <= 0.0 {
            return 0.0;
        }
        let knee = knee * threshold;
        let soft = (luminance - threshold + knee).clamp(0.0, 2.0 * knee);
        let soft = soft * soft / (4.0 * knee + 1e-5);
        soft.max(luminance - threshold) / luminance
    }
}

impl PostStage for GlareStage {
    fn name(&self) -> &str {
        "glare"
    }

    fn uses_work_surface(&self) -> bool {
        true
    }

    fn execute(&mut self, ctx: &mut StageContext<'_>) -> PostResult<()> {
        let work = ctx.work()?;
        let (source, target) = (ctx.source(), ctx.target());
        let c = &self.config;
        let params = [c.threshold, c.knee, c.intensity, 0.0];

        ctx.upload(&PostConstants::new(ctx.work_size()).with_params(params))?;
        ctx.draw("extract", &[source], work, BlendStateDesc::opaque())?;

        ctx.upload(&PostConstants::new(ctx.viewport()).with_params(params))?;
        ctx.draw("composite", &[source, work], target, BlendStateDesc::opaque())
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
