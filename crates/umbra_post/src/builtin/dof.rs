//! Depth of field
//!
//! # Algorithm
//!
//! 1. Circle of confusion + downsample: color + depth -> work surface
//! 2. Composite: blend sharp color with the blurred work surface by CoC
//!
//! CoC is signed: negative in front of the focus band, positive behind it.

use serde::{Deserialize, Serialize};
use umbra_driver::BlendStateDesc;

use crate::error::PostResult;
use crate::stage::{config_data, parse_config, PostConstants, PostStage, StageConfigData, StageContext, StageInput};

/// Configuration for the depth of field stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthOfFieldConfig {
    /// View-space distance in perfect focus
    pub focus_distance: f32,
    /// Half width of the in-focus band
    pub focus_range: f32,
    /// Distance over which blur ramps up to the maximum
    pub falloff: f32,
    /// Maximum circle of confusion in pixels (0 - 32)
    pub max_coc: f32,
}

impl Default for DepthOfFieldConfig {
    fn default() -> Self {
        Self {
            focus_distance: 10.0,
            focus_range: 2.0,
            falloff: 8.0,
            max_coc: 8.0,
        }
    }
}

impl DepthOfFieldConfig {
    pub fn validate(&mut self) {
        self.focus_distance = self.focus_distance.max(0.0);
        self.focus_range = self.focus_range.max(0.0);
        self.falloff = self.falloff.max(0.01);
        self.max_coc = self.max_coc.clamp(0.0, 32.0);
    }
}

/// Gather-based depth of field
pub struct DepthOfFieldStage {
    config: DepthOfFieldConfig,
    enabled: bool,
}

impl Default for DepthOfFieldStage {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthOfFieldStage {
    pub fn new() -> Self {
        Self::with_config(DepthOfFieldConfig::default())
    }

    pub fn with_config(mut config: DepthOfFieldConfig) -> Self {
        config.validate();
        Self { config, enabled: true }
    }

    pub fn settings(&self) -> &DepthOfFieldConfig {
        &self.config
    }

    pub fn set_settings(&mut self, mut config: DepthOfFieldConfig) {
        config.validate();
        self.config = config;
    }

    pub fn set_focus(&mut self, distance: f32) {
        self.config.focus_distance = distance.max(0.0);
    }

    /// Signed circle of confusion in pixels for a view-space depth
    pub fn circle_of_confusion(&self, depth: f32) -> f32 {
        let c = &self.config;
        let offset = depth - c.focus_distance;
        let outside = offset.abs() - c.focus_range;
        if outside <= 0.0 {
            return 0.0;
        }
        let t = (outside / c.falloff).min(1.0);
        t * c.max_coc * offset.signum()
    }
}

impl PostStage for DepthOfFieldStage {
    fn name(&self) -> &str {
        "dof"
    }

    fn inputs(&self) -> &[StageInput] {
        &[StageInput::Depth]
    }

    fn uses_work_surface(&self) -> bool {
        true
    }

    fn execute(&mut self, ctx: &mut StageContext<'_>) -> PostResult<()> {
        let depth = ctx.input(StageInput::Depth)?;
        let work = ctx.work()?;
        let (source, target) = (ctx.source(), ctx.target());
        let c = &self.config;
        let params = [c.focus_distance, c.focus_range, c.falloff, c.max_coc];

        ctx.upload(&PostConstants::new(ctx.work_size()).with_params(params))?;
        ctx.draw("coc", &[source, depth], work, BlendStateDesc::opaque())?;

        ctx.upload(&PostConstants::new(ctx.viewport()).with_params(params))?;
        ctx.draw("composite", &[source, work, depth], target, BlendStateDesc::opaque())
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
    fn test_circle_of_confusion() {
        let stage = DepthOfFieldStage::with_config(DepthOfFieldConfig {
            focus_distance: 10.0,
            focus_range: 2.0,
            falloff: 4.0,
            max_coc: 8.0,
        });
        assert_eq!(stage.circle_of_confusion(10.0), 0.0);
        assert_eq!(stage.circle_of_confusion(11.5), 0.0);
        assert!((stage.circle_of_confusion(14.0) - 4.0).abs() < 1e-5);
        assert!((stage.circle_of_confusion(6.0) + 4.0).abs() < 1e-5);
        assert_eq!(stage.circle_of_confusion(100.0), 8.0);
        assert_eq!(stage.circle_of_confusion(0.0), -8.0);
    }

    #[test]
    fn test_focus_never_negative() {
        let mut stage = DepthOfFieldStage::new();
        stage.set_focus(-3.0);
        assert_eq!(stage.settings().focus_distance, 0.0);
    }
}
