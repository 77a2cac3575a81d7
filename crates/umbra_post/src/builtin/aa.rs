//! Antialiasing
//!
//! Two modes:
//! - **FXAA**: single pass edge detection and blend on the current color
//! - **Temporal**: reprojects the previous frame's output along velocity and
//!   blends it with the current color. Needs history and velocity.

use serde::{Deserialize, Serialize};
use umbra_driver::BlendStateDesc;

use crate::error::PostResult;
use crate::stage::{config_data, parse_config, PostConstants, PostStage, StageConfigData, StageContext, StageInput};

const TEMPORAL_INPUTS: &[StageInput] = &[StageInput::PreviousColor, StageInput::Velocity];

/// Antialiasing technique
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AntialiasMode {
    #[default]
    Fxaa,
    Temporal,
}

/// Configuration for the antialiasing stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntialiasConfig {
    pub mode: AntialiasMode,
    /// Minimum local contrast treated as an edge (FXAA)
    pub edge_threshold: f32,
    /// Sub-pixel aliasing removal (FXAA, 0.0 - 1.0)
    pub subpixel: f32,
    /// History weight (temporal, 0.0 - 0.98)
    pub feedback: f32,
}

impl Default for AntialiasConfig {
    fn default() -> Self {
        Self {
            mode: AntialiasMode::Fxaa,
            edge_threshold: 0.125,
            subpixel: 0.75,
            feedback: 0.9,
        }
    }
}

impl AntialiasConfig {
    pub fn validate(&mut self) {
        self.edge_threshold = self.edge_threshold.clamp(0.031, 0.333);
        self.subpixel = self.subpixel.clamp(0.0, 1.0);
        self.feedback = self.feedback.clamp(0.0, 0.98);
    }
}

/// FXAA or temporal antialiasing
pub struct AntialiasStage {
    config: AntialiasConfig,
    enabled: bool,
}

impl Default for AntialiasStage {
    fn default() -> Self {
        Self::new()
    }
}

impl AntialiasStage {
    pub fn new() -> Self {
        Self::with_config(AntialiasConfig::default())
    }

    pub fn temporal() -> Self {
        Self::with_config(AntialiasConfig {
            mode: AntialiasMode::Temporal,
            ..Default::default()
        })
    }

    pub fn with_config(mut config: AntialiasConfig) -> Self {
        config.validate();
        Self { config, enabled: true }
    }

    pub fn settings(&self) -> &AntialiasConfig {
        &self.config
    }

    pub fn set_settings(&mut self, mut config: AntialiasConfig) {
        config.validate();
        self.config = config;
    }

    pub fn mode(&self) -> AntialiasMode {
        self.config.mode
    }
}

impl PostStage for AntialiasStage {
    fn name(&self) -> &str {
        "aa"
    }

    fn inputs(&self) -> &[StageInput] {
        match self.config.mode {
            AntialiasMode::Fxaa => &[],
            AntialiasMode::Temporal => TEMPORAL_INPUTS,
        }
    }

    fn execute(&mut self, ctx: &mut StageContext<'_>) -> PostResult<()> {
        let (source, target) = (ctx.source(), ctx.target());
        let constants = PostConstants::new(ctx.viewport());

        match self.config.mode {
            AntialiasMode::Fxaa => {
                ctx.upload(&constants.with_params([self.config.edge_threshold, self.config.subpixel, 0.0, 0.0]))?;
                ctx.draw("fxaa", &[source], target, BlendStateDesc::opaque())
            }
            AntialiasMode::Temporal => {
                let history = ctx.input(StageInput::PreviousColor)?;
                let velocity = ctx.input(StageInput::Velocity)?;
                ctx.upload(&constants.with_params([self.config.feedback, 0.0, 0.0, 0.0]))?;
                ctx.draw("temporal", &[source, history, velocity], target, BlendStateDesc::opaque())
            }
        }
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
