//! Tone mapping
//!
//! Maps HDR scene color to display range in a single pass. The CPU
//! [`ToneMapStage::tone_map`] mirrors the shader and is used for exposure
//! tooling and tests.

use serde::{Deserialize, Serialize};
use umbra_driver::BlendStateDesc;

use crate::error::PostResult;
use crate::stage::{config_data, parse_config, PostConstants, PostStage, StageConfigData, StageContext};

/// Tone mapping curve
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToneMapOperator {
    /// `c / (1 + c)`; ignores the white point
    Reinhard,
    /// Reinhard with a white point mapped to 1
    #[default]
    ReinhardExtended,
    /// Filmic ACES fit, normalized to the white point
    Aces,
}

impl ToneMapOperator {
    fn index(self) -> f32 {
        match self {
            Self::Reinhard => 0.0,
            Self::ReinhardExtended => 1.0,
            Self::Aces => 2.0,
        }
    }
}

/// Configuration for the tone mapping stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneMapConfig {
    pub operator: ToneMapOperator,
    /// Linear exposure multiplier (0.01 - 16.0)
    pub exposure: f32,
    /// Scene luminance mapped to display white (1.0 - 64.0)
    pub white_point: f32,
}

impl Default for ToneMapConfig {
    fn default() -> Self {
        Self {
            operator: ToneMapOperator::default(),
            exposure: 1.0,
            white_point: 4.0,
        }
    }
}

impl ToneMapConfig {
    pub fn validate(&mut self) {
        self.exposure = self.exposure.clamp(0.01, 16.0);
        self.white_point = self.white_point.clamp(1.0, 64.0);
    }
}

fn aces(x: f32) -> f32 {
    ((x * (2.51 * x + 0.03)) / (x * (2.43 * x + 0.59) + 0.14)).clamp(0.0, 1.0)
}

/// HDR to display range mapping
pub struct ToneMapStage {
    config: ToneMapConfig,
    enabled: bool,
}

impl Default for ToneMapStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ToneMapStage {
    pub fn new() -> Self {
        Self::with_config(ToneMapConfig::default())
    }

    pub fn with_config(mut config: ToneMapConfig) -> Self {
        config.validate();
        Self { config, enabled: true }
    }

    pub fn settings(&self) -> &ToneMapConfig {
        &self.config
    }

    pub fn set_settings(&mut self, mut config: ToneMapConfig) {
        config.validate();
        self.config = config;
    }

    pub fn set_exposure(&mut self, exposure: f32) {
        self.config.exposure = exposure.clamp(0.01, 16.0);
    }

    /// Map one linear HDR color
    pub fn tone_map(&self, rgb: [f32; 3]) -> [f32; 3] {
        let white = self.config.white_point;
        let curve = |c: f32| -> f32 {
            let c = (c * self.config.exposure).max(0.0);
            match self.config.operator {
                ToneMapOperator::Reinhard => c / (1.0 + c),
                ToneMapOperator::ReinhardExtended => (c * (1.0 + c / (white * white)) / (1.0 + c)).min(1.0),
                ToneMapOperator::Aces => (aces(c) / aces(white)).min(1.0),
            }
        };
        rgb.map(curve)
    }
}

impl PostStage for ToneMapStage {
    fn name(&self) -> &str {
        "tonemap"
    }

    fn execute(&mut self, ctx: &mut StageContext<'_>) -> PostResult<()> {
        let (source, target) = (ctx.source(), ctx.target());
        let constants = PostConstants::new(ctx.viewport()).with_params([
            self.config.exposure,
            self.config.white_point,
            self.config.operator.index(),
            0.0,
        ]);
        ctx.upload(&constants)?;
        ctx.draw("map", &[source], target, BlendStateDesc::opaque())
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
    fn test_white_point_maps_to_one() {
        for operator in [ToneMapOperator::ReinhardExtended, ToneMapOperator::Aces] {
            let stage = ToneMapStage::with_config(ToneMapConfig {
                operator,
                exposure: 1.0,
                white_point: 6.0,
            });
            let [r, _, _] = stage.tone_map([6.0, 0.0, 0.0]);
            assert!((r - 1.0).abs() < 1e-4, "{:?} gave {}", operator, r);
            let [above, _, _] = stage.tone_map([20.0, 0.0, 0.0]);
            assert_eq!(above, 1.0);
        }
    }

    #[test]
    fn test_curves_monotonic() {
        for operator in [ToneMapOperator::Reinhard, ToneMapOperator::ReinhardExtended, ToneMapOperator::Aces] {
            let stage = ToneMapStage::with_config(ToneMapConfig {
                operator,
                ..Default::default()
            });
            let mut last = -1.0;
            for i in 0..40 {
                let [v, _, _] = stage.tone_map([i as f32 * 0.1, 0.0, 0.0]);
                assert!(v >= last);
                assert!((0.0..=1.0).contains(&v));
                last = v;
            }
        }
    }

    #[test]
    fn test_exposure_scales_input() {
        let mut stage = ToneMapStage::with_config(ToneMapConfig {
            operator: ToneMapOperator::Reinhard,
            ..Default::default()
        });
        stage.set_exposure(2.0);
        let [r, g, _] = stage.tone_map([1.0, 0.5, 0.0]);
        assert!((r - 2.0 / 3.0).abs() < 1e-6);
        assert!((g - 0.5).abs() < 1e-6);
        stage.set_exposure(0.0);
        assert_eq!(stage.settings().exposure, 0.01);
    }
}
