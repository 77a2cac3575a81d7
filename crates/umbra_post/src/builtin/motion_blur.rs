//! Velocity-buffer motion blur
//!
//! Samples the color along the per-pixel screen-space velocity. Velocity is
//! scaled by the ratio of the current frame rate to the target frame rate,
//! so blur length stays perceptually constant when the frame rate changes.

use serde::{Deserialize, Serialize};
use umbra_driver::BlendStateDesc;

use crate::error::PostResult;
use crate::stage::{config_data, parse_config, PostConstants, PostStage, StageConfigData, StageContext, StageInput};

/// Configuration for the motion blur stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionBlurConfig {
    /// Samples along the velocity vector (4 - 32)
    pub samples: u32,
    /// Blur strength (0.0 - 1.0)
    pub intensity: f32,
    /// Frame rate at which velocity is used unscaled
    pub target_fps: f32,
    /// Upper bound on the velocity scale
    pub max_scale: f32,
}

impl Default for MotionBlurConfig {
    fn default() -> Self {
        Self {
            samples: 8,
            intensity: 0.5,
            target_fps: 60.0,
            max_scale: 2.0,
        }
    }
}

impl MotionBlurConfig {
    pub fn validate(&mut self) {
        self.samples = self.samples.clamp(4, 32);
        self.intensity = self.intensity.clamp(0.0, 1.0);
        self.target_fps = self.target_fps.max(1.0);
        self.max_scale = self.max_scale.max(0.0);
    }
}

/// Motion blur from the velocity buffer
pub struct MotionBlurStage {
    config: MotionBlurConfig,
    enabled: bool,
}

impl Default for MotionBlurStage {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionBlurStage {
    pub fn new() -> Self {
        Self::with_config(MotionBlurConfig::default())
    }

    pub fn with_config(mut config: MotionBlurConfig) -> Self {
        config.validate();
        Self { config, enabled: true }
    }

    pub fn settings(&self) -> &MotionBlurConfig {
        &self.config
    }

    pub fn set_settings(&mut self, mut config: MotionBlurConfig) {
        config.validate();
        self.config = config;
    }

    /// Multiplier applied to the stored velocity for a frame of `delta_time`
    pub fn velocity_scale(&self, delta_time: f32) -> f32 {
        if delta_time <= 0.0 {
            return 0.0;
        }
        let fps = 1.0 / delta_time;
        (self.config.intensity * fps / self.config.target_fps).min(self.config.max_scale)
    }
}

impl PostStage for MotionBlurStage {
    fn name(&self) -> &str {
        "motion_blur"
    }

    fn inputs(&self) -> &[StageInput] {
        &[StageInput::Velocity]
    }

    fn execute(&mut self, ctx: &mut StageContext<'_>) -> PostResult<()> {
        let velocity = ctx.input(StageInput::Velocity)?;
        let (source, target) = (ctx.source(), ctx.target());
        let scale = self.velocity_scale(ctx.delta_time());

        ctx.upload(&PostConstants::new(ctx.viewport()).with_params([scale, self.config.samples as f32, 0.0, 0.0]))?;
        ctx.draw("gather", &[source, velocity], target, BlendStateDesc::opaque())
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
